//! Generation Backends
//!
//! Turns a frozen [`QueryResult`] into user-facing prose. The router hands the result
//! over once, by shared reference, after it is fully materialized; a backend can only
//! read it.
//!
//! # Backends
//! - [`OllamaGenerator`]: an Ollama server's `/api/generate`, streamed as NDJSON
//! - [`TemplateGenerator`]: deterministic text, no model required
//!
//! [`Backend`] selects one of them from configuration.

use futures::stream::{self, BoxStream, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::Write as _;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

use crate::error::{Result, TalkError};
use crate::tools::{QueryResult, ToolName};

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
pub const DEFAULT_MODEL: &str = "llama3:latest";
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_TOP_P: f32 = 0.9;

/// Rows rendered into a prompt; the rest are summarized by count
const PROMPT_ROW_LIMIT: usize = 50;

/// Everything a backend may see for one answer
#[derive(Debug, Clone, Copy)]
pub struct PromptContext<'a> {
    pub utterance: &'a str,
    pub tool: ToolName,
    /// Table the tool ran against, if any
    pub table: Option<&'a str>,
    pub result: &'a QueryResult,
}

impl PromptContext<'_> {
    /// Full prompt text for a language model
    #[must_use]
    pub fn render_prompt(&self) -> String {
        let mut prompt = String::from(
            "You are a helpful database assistant. Answer the user's question using only the \
             query result below. If the result is empty, say so. Do not invent data.\n\n",
        );
        let _ = writeln!(prompt, "Question: {}", self.utterance);
        let _ = write!(prompt, "Tool: {}", self.tool);
        if let Some(table) = self.table {
            let _ = write!(prompt, " (table {table})");
        }
        let _ = writeln!(prompt, "\nRows: {}{}", self.result.row_count, truncation_note(self.result));
        prompt.push('\n');
        prompt.push_str(&render_table(self.result, PROMPT_ROW_LIMIT));
        prompt.push_str("\nAnswer:");
        prompt
    }
}

fn truncation_note(result: &QueryResult) -> &'static str {
    if result.truncated {
        " (row cap reached; more rows may exist)"
    } else {
        ""
    }
}

/// Plain-text value, `NULL` for nulls
fn display_value(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Pipe-separated header and rows
fn render_table(result: &QueryResult, max_rows: usize) -> String {
    let mut out = result.column_names().join(" | ");
    out.push('\n');
    for index in 0..result.row_count.min(max_rows) {
        if let Some(row) = result.row(index) {
            let cells: Vec<String> = row.into_iter().map(display_value).collect();
            out.push_str(&cells.join(" | "));
            out.push('\n');
        }
    }
    if result.row_count > max_rows {
        let _ = writeln!(out, "... {} more rows", result.row_count - max_rows);
    }
    out
}

/// A generation backend
pub trait Generator: Send + Sync {
    /// Produce the whole answer
    fn generate(&self, context: &PromptContext<'_>) -> impl Future<Output = Result<String>> + Send;

    /// Produce the answer as a finite, single-pass sequence of fragments
    fn generate_streaming<'a>(
        &'a self,
        context: &'a PromptContext<'a>,
    ) -> BoxStream<'a, Result<String>> {
        stream::once(self.generate(context)).boxed()
    }
}

// ============================================================================
// Template backend
// ============================================================================

/// Deterministic answers built from the result alone
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateGenerator;

impl TemplateGenerator {
    /// Render the answer synchronously
    #[must_use]
    pub fn render(&self, context: &PromptContext<'_>) -> String {
        let result = context.result;
        let table = context.table.unwrap_or("the table");
        let column = |name: &str| result.column(name).unwrap_or(&[]);

        match context.tool {
            ToolName::GetTables if result.is_empty() => "The database has no tables.".to_string(),
            ToolName::GetTables => {
                let names: Vec<String> = column("table_name").iter().map(display_value).collect();
                let lead = if result.truncated { "The first" } else { "The database has" };
                format!("{lead} {} tables: {}.", names.len(), names.join(", "))
            }
            ToolName::DescribeTable => {
                let mut out = format!("{table} has {} columns:", result.row_count);
                for index in 0..result.row_count {
                    let cell = |name: &str| column(name).get(index).cloned().unwrap_or(Value::Null);
                    let mut notes = vec![display_value(&cell("data_type"))];
                    if cell("nullable") == Value::Bool(true) {
                        notes.push("nullable".to_string());
                    }
                    if cell("is_key") == Value::Bool(true) {
                        notes.push("primary key".to_string());
                    }
                    let _ = write!(out, "\n- {} ({})", display_value(&cell("column_name")), notes.join(", "));
                }
                out
            }
            ToolName::GetAllSchemas if result.is_empty() => "The database has no tables.".to_string(),
            ToolName::GetAllSchemas => {
                let mut out = String::from("Column counts by table:");
                for (name, count) in column("table_name").iter().zip(column("column_count")) {
                    let _ = write!(out, "\n- {}: {} columns", display_value(name), display_value(count));
                }
                if result.truncated {
                    out.push_str("\n(more tables exist)");
                }
                out
            }
            ToolName::CountRecords => {
                let count = column("record_count").first().map_or_else(|| "0".to_string(), display_value);
                format!("{table} contains {count} records.")
            }
            ToolName::ExecuteSelect if result.is_empty() => "The query returned no rows.".to_string(),
            ToolName::ExecuteSelect => format!(
                "The query returned {} rows{}:\n{}",
                result.row_count,
                truncation_note(result),
                render_table(result, result.row_count).trim_end()
            ),
        }
    }
}

impl Generator for TemplateGenerator {
    async fn generate(&self, context: &PromptContext<'_>) -> Result<String> {
        Ok(self.render(context))
    }
}

// ============================================================================
// Ollama backend
// ============================================================================

#[derive(Debug, Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: String,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Clone, Copy, Serialize)]
struct OllamaOptions {
    temperature: f32,
    top_p: f32,
}

#[derive(Debug, Deserialize)]
struct OllamaChunk {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

/// Client for an Ollama server
#[derive(Debug, Clone)]
pub struct OllamaGenerator {
    client: reqwest::Client,
    url: String,
    model: String,
    options: OllamaOptions,
}

impl OllamaGenerator {
    /// Create a client for `url` (e.g. `http://localhost:11434`)
    ///
    /// # Errors
    /// Returns `TalkError::ConfigError` if the HTTP client cannot be built.
    pub fn new(url: impl Into<String>, model: impl Into<String>, connect_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| TalkError::config_error(format!("Could not build HTTP client: {e}")))?;

        Ok(Self {
            client,
            url: url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            options: OllamaOptions { temperature: DEFAULT_TEMPERATURE, top_p: DEFAULT_TOP_P },
        })
    }

    #[must_use]
    pub fn with_sampling(mut self, temperature: f32, top_p: f32) -> Self {
        self.options = OllamaOptions { temperature, top_p };
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn send(&self, context: &PromptContext<'_>, stream: bool) -> Result<reqwest::Response> {
        let request = OllamaRequest {
            model: &self.model,
            prompt: context.render_prompt(),
            stream,
            options: self.options,
        };
        debug!(model = %self.model, stream, "sending generation request");

        let response = self
            .client
            .post(format!("{}/api/generate", self.url))
            .json(&request)
            .send()
            .await
            .map_err(|e| TalkError::generation_failed(format!("Ollama request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(TalkError::generation_failed(format!(
                "Ollama returned status {}",
                response.status()
            )));
        }
        Ok(response)
    }
}

impl Generator for OllamaGenerator {
    async fn generate(&self, context: &PromptContext<'_>) -> Result<String> {
        let chunk: OllamaChunk = self
            .send(context, false)
            .await?
            .json()
            .await
            .map_err(|e| TalkError::generation_failed(format!("Invalid Ollama response: {e}")))?;

        match chunk.error {
            Some(error) => Err(TalkError::generation_failed(error)),
            None => Ok(chunk.response),
        }
    }

    fn generate_streaming<'a>(
        &'a self,
        context: &'a PromptContext<'a>,
    ) -> BoxStream<'a, Result<String>> {
        stream::once(self.send(context, true))
            .flat_map(|response| match response {
                Ok(response) => ndjson_fragments(response.bytes_stream()).boxed(),
                Err(e) => stream::once(async move { Err(e) }).boxed(),
            })
            .boxed()
    }
}

struct NdjsonState<S> {
    body: std::pin::Pin<Box<S>>,
    buffer: Vec<u8>,
    eof: bool,
    finished: bool,
}

/// Decode a newline-delimited stream of Ollama chunks into text fragments
///
/// Ends after the chunk marked `done`, at end of body, or after the first error.
fn ndjson_fragments<S, B, E>(body: S) -> impl Stream<Item = Result<String>> + Send
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send,
    E: std::fmt::Display + Send,
{
    let state = NdjsonState { body: Box::pin(body), buffer: Vec::new(), eof: false, finished: false };

    stream::unfold(state, |mut state| async move {
        loop {
            if state.finished {
                return None;
            }

            if let Some(pos) = state.buffer.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = state.buffer.drain(..=pos).collect();
                match decode_line(&line) {
                    Ok(None) => continue,
                    Ok(Some((fragment, done))) => {
                        state.finished = done;
                        if fragment.is_empty() {
                            continue;
                        }
                        return Some((Ok(fragment), state));
                    }
                    Err(e) => {
                        state.finished = true;
                        return Some((Err(e), state));
                    }
                }
            }

            if state.eof {
                return None;
            }

            match state.body.next().await {
                Some(Ok(chunk)) => state.buffer.extend_from_slice(chunk.as_ref()),
                Some(Err(e)) => {
                    state.finished = true;
                    return Some((Err(TalkError::generation_failed(format!("Stream interrupted: {e}"))), state));
                }
                None if state.buffer.iter().all(u8::is_ascii_whitespace) => return None,
                // Last line without a trailing newline
                None => {
                    state.eof = true;
                    state.buffer.push(b'\n');
                }
            }
        }
    })
}

/// Parse one NDJSON line; `None` for blank lines
fn decode_line(line: &[u8]) -> Result<Option<(String, bool)>> {
    if line.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    let chunk: OllamaChunk = serde_json::from_slice(line)
        .map_err(|e| TalkError::generation_failed(format!("Invalid stream chunk: {e}")))?;
    if let Some(error) = chunk.error {
        return Err(TalkError::generation_failed(error));
    }
    Ok(Some((chunk.response, chunk.done)))
}

// ============================================================================
// Backend selection
// ============================================================================

/// Configured generation backend
#[derive(Debug, Clone)]
pub enum Backend {
    Ollama(OllamaGenerator),
    Template(TemplateGenerator),
}

impl Generator for Backend {
    async fn generate(&self, context: &PromptContext<'_>) -> Result<String> {
        match self {
            Self::Ollama(generator) => generator.generate(context).await,
            Self::Template(generator) => generator.generate(context).await,
        }
    }

    fn generate_streaming<'a>(
        &'a self,
        context: &'a PromptContext<'a>,
    ) -> BoxStream<'a, Result<String>> {
        match self {
            Self::Ollama(generator) => generator.generate_streaming(context),
            Self::Template(generator) => generator.generate_streaming(context),
        }
    }
}
