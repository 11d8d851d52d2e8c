//! Conversation Router
//!
//! Runs one conversation turn: classify the utterance, execute the matching tool or
//! decline, then respond.
//!
//! ```text
//! Received -> Classified -> ToolExecuted -> Responded
//!                        \-> Declined ----/
//! ```
//!
//! Declines never reach the generation backend. An out-of-domain utterance gets a fixed
//! redirect without touching the database; a failed tool gets the error's user-safe
//! message. Only the transcript carries over between turns.

use futures::StreamExt;
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

use crate::engine::ConnectionProvider;
use crate::generation::{Generator, PromptContext, TemplateGenerator};
use crate::intent::{Intent, IntentClassifier, NoMatchReason};
use crate::tools::{QueryResult, ToolExecutor};

/// Reply to utterances no tool covers
pub const REDIRECT_MESSAGE: &str = "I can only answer questions about the connected database. \
Try asking:
- What tables are available?
- Show me the structure of [table_name]
- How many records are in [table_name]?
- Show me sample data from [table_name]";

/// Reply when a table tool was asked for without naming a known table
pub const UNKNOWN_TABLE_MESSAGE: &str = "I couldn't find a table with that name in this database. \
Ask \"What tables are available?\" to see the table names.";

/// Turn lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnState {
    Received,
    Classified,
    ToolExecuted,
    Declined,
    Responded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TranscriptEntry {
    pub role: Role,
    pub content: String,
}

/// Append-only record of the conversation
#[derive(Debug, Clone, Default, Serialize)]
pub struct Transcript {
    entries: Vec<TranscriptEntry>,
}

impl Transcript {
    fn push(&mut self, role: Role, content: impl Into<String>) {
        self.entries.push(TranscriptEntry { role, content: content.into() });
    }

    #[must_use]
    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Everything that happened in one turn
#[derive(Debug, Clone, Serialize)]
pub struct TurnOutcome {
    pub intent: Intent,
    /// States visited, in order
    pub states: Vec<TurnState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<QueryResult>,
    /// Coarse reason code of a failed tool call
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub response: String,
}

impl TurnOutcome {
    #[must_use]
    pub fn declined(&self) -> bool {
        self.states.contains(&TurnState::Declined)
    }
}

/// Drives conversation turns over a tool executor and a generation backend
#[derive(Debug)]
pub struct ConversationRouter<P, G> {
    executor: ToolExecutor<P>,
    classifier: IntentClassifier,
    generator: G,
    fallback: TemplateGenerator,
    transcript: Transcript,
}

impl<P: ConnectionProvider, G: Generator> ConversationRouter<P, G> {
    pub fn new(executor: ToolExecutor<P>, classifier: IntentClassifier, generator: G) -> Self {
        Self { executor, classifier, generator, fallback: TemplateGenerator, transcript: Transcript::default() }
    }

    pub const fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub const fn executor(&self) -> &ToolExecutor<P> {
        &self.executor
    }

    /// Run one turn and return the complete response
    pub async fn turn(&mut self, utterance: &str) -> TurnOutcome {
        self.turn_streaming(utterance, |_| {}).await
    }

    /// Run one turn, passing each response fragment to `on_fragment` as it is produced
    pub async fn turn_streaming<F>(&mut self, utterance: &str, mut on_fragment: F) -> TurnOutcome
    where
        F: FnMut(&str) + Send,
    {
        let mut states = vec![TurnState::Received];
        self.transcript.push(Role::User, utterance);

        let Some(tool) = self.classifier.route(utterance) else {
            info!(reason = %NoMatchReason::OutOfDomain, "turn declined");
            states.push(TurnState::Classified);
            let intent = Intent::none(NoMatchReason::OutOfDomain);
            return self.decline(states, intent, None, REDIRECT_MESSAGE, &mut on_fragment);
        };

        let catalog = if tool.requires_table() {
            match self.executor.known_tables().await {
                Ok(tables) => tables,
                Err(e) => {
                    warn!(error = %e, "could not load table catalog");
                    states.push(TurnState::Classified);
                    let intent = Intent::routed(tool);
                    let message = e.user_message();
                    return self.decline(states, intent, Some(e.reason_code()), &message, &mut on_fragment);
                }
            }
        } else {
            BTreeSet::new()
        };

        let intent = self.classifier.classify(utterance, &catalog);
        states.push(TurnState::Classified);

        let Some(call) = intent.to_call() else {
            info!(reason = ?intent.reason, "turn declined");
            let message = match intent.reason {
                Some(NoMatchReason::UnknownTableReference) => UNKNOWN_TABLE_MESSAGE,
                _ => REDIRECT_MESSAGE,
            };
            return self.decline(states, intent, None, message, &mut on_fragment);
        };

        let result = match self.executor.execute(&call).await {
            Ok(result) => result,
            Err(e) => {
                let message = e.user_message();
                return self.decline(states, intent, Some(e.reason_code()), &message, &mut on_fragment);
            }
        };
        states.push(TurnState::ToolExecuted);

        let context = PromptContext {
            utterance,
            tool: call.name(),
            table: intent.argument("table_name"),
            result: &result,
        };
        let response = self.respond(&context, &mut on_fragment).await;

        states.push(TurnState::Responded);
        self.transcript.push(Role::Assistant, response.clone());
        TurnOutcome { intent, states, result: Some(result), error: None, response }
    }

    /// Stream the generated answer, falling back to the template rendering on failure
    async fn respond<F>(&self, context: &PromptContext<'_>, on_fragment: &mut F) -> String
    where
        F: FnMut(&str) + Send,
    {
        let mut response = String::new();
        let mut fragments = self.generator.generate_streaming(context);

        while let Some(fragment) = fragments.next().await {
            match fragment {
                Ok(fragment) => {
                    on_fragment(&fragment);
                    response.push_str(&fragment);
                }
                Err(e) => {
                    warn!(error = %e, "generation failed, using template answer");
                    let fallback = self.fallback.render(context);
                    let fallback = if response.is_empty() { fallback } else { format!("\n\n{fallback}") };
                    on_fragment(&fallback);
                    response.push_str(&fallback);
                    return response;
                }
            }
        }

        if response.trim().is_empty() {
            debug!("generation returned no text, using template answer");
            let fallback = self.fallback.render(context);
            on_fragment(&fallback);
            return fallback;
        }
        response
    }

    fn decline<F>(
        &mut self,
        mut states: Vec<TurnState>,
        intent: Intent,
        error: Option<String>,
        message: &str,
        on_fragment: &mut F,
    ) -> TurnOutcome
    where
        F: FnMut(&str),
    {
        states.push(TurnState::Declined);
        on_fragment(message);
        states.push(TurnState::Responded);
        self.transcript.push(Role::Assistant, message);
        TurnOutcome { intent, states, result: None, error, response: message.to_string() }
    }
}
