//! JSON Output Envelope Types
//!
//! This module defines the structured JSON output of the `tool`, `validate` and `ask`
//! commands and of MCP tool calls. Every operation returns either a `SuccessEnvelope`
//! or an `ErrorEnvelope`.
//!
//! # Output Contract
//! - Success: `{"ok": true, "engine": "...", "command": "...", "data": {...}, "meta": {...}}`
//! - Error: `{"ok": false, "engine": "...", "command": "...", "error": {"code": "...", "reason": "...", "message": "..."}}`
//!
//! Error messages come from [`TalkError::user_message`]; raw database text never
//! appears in an envelope.

use serde::{Deserialize, Serialize};

use crate::error::TalkError;
use crate::tools::QueryResult;

/// Success envelope for operation results
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuccessEnvelope<T> {
    /// Always true for success envelopes
    pub ok: bool,

    /// Database engine used (postgres, mysql, sqlite); empty when no database was involved
    pub engine: String,

    /// Command or tool that was executed (`count_records`, `validate`, `ask`)
    pub command: String,

    pub data: T,

    pub meta: Metadata,
}

impl<T> SuccessEnvelope<T> {
    pub fn new(engine: impl Into<String>, command: impl Into<String>, data: T, meta: Metadata) -> Self {
        Self { ok: true, engine: engine.into(), command: command.into(), data, meta }
    }
}

impl SuccessEnvelope<QueryResult> {
    /// Envelope for a tool result, with row count and truncation in `meta`
    pub fn from_result(
        engine: impl Into<String>,
        command: impl Into<String>,
        result: QueryResult,
        execution_ms: u64,
    ) -> Self {
        let meta = Metadata::with_rows(execution_ms, result.row_count, result.truncated);
        Self::new(engine, command, result, meta)
    }
}

/// Error envelope for operation failures
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    /// Always false for error envelopes
    pub ok: bool,

    pub engine: String,

    pub command: String,

    pub error: ErrorInfo,
}

impl ErrorEnvelope {
    pub fn new(engine: impl Into<String>, command: impl Into<String>, error: ErrorInfo) -> Self {
        Self { ok: false, engine: engine.into(), command: command.into(), error }
    }

    /// Create error envelope from `TalkError`
    pub fn from_error(engine: impl Into<String>, command: impl Into<String>, err: &TalkError) -> Self {
        Self::new(
            engine,
            command,
            ErrorInfo {
                code: err.error_code().to_string(),
                reason: err.reason_code(),
                message: err.user_message(),
            },
        )
    }
}

/// Error information structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Stable error code (e.g., "VALIDATION_REJECTED", "UNKNOWN_TABLE")
    pub code: String,

    /// Coarse reason code (e.g., "validation-rejected:stacked-statement")
    pub reason: String,

    /// User-safe message
    pub message: String,
}

impl ErrorInfo {
    pub fn new(code: impl Into<String>, reason: impl Into<String>, message: impl Into<String>) -> Self {
        Self { code: code.into(), reason: reason.into(), message: message.into() }
    }
}

/// Execution metadata included in all success responses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metadata {
    pub execution_ms: u64,

    /// Number of rows returned (tool results only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows_returned: Option<usize>,

    /// Whether the row cap cut the result short (tool results only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub truncated: Option<bool>,
}

impl Metadata {
    #[must_use]
    pub const fn new(execution_ms: u64) -> Self {
        Self { execution_ms, rows_returned: None, truncated: None }
    }

    #[must_use]
    pub const fn with_rows(execution_ms: u64, rows_returned: usize, truncated: bool) -> Self {
        Self { execution_ms, rows_returned: Some(rows_returned), truncated: Some(truncated) }
    }
}
