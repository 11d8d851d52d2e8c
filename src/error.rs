//! Error Handling Infrastructure
//!
//! This module defines all error types used throughout tabletalk.
//! All errors are structured and map to specific error codes for JSON output.
//!
//! # Error Categories
//! - `ValidationRejected`: Statement rejected before execution (never reaches the database)
//! - `UnknownTable`: Argument references a table not present in the live catalog
//! - `BackendUnavailable`: Connection provider unreachable or timed out (transient)
//! - `QueryFailed`: The database refused a statement the validator accepted
//! - `InvalidArguments`: Missing or mistyped tool arguments, unknown tool name
//! - `ConfigError`: Configuration file or environment errors
//! - `GenerationFailed`: The generation backend could not produce text
//!
//! `Display` carries internal detail and is meant for stderr logs only.
//! Anything shown to a user or placed in a prompt goes through [`TalkError::user_message`].

use thiserror::Error;

use crate::validator::RejectReason;

/// Main error type for tabletalk operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TalkError {
    /// Statement rejected by the SQL validator
    #[error("Validation rejected: {0}")]
    ValidationRejected(RejectReason),

    /// Table name not present in the live catalog (or not a valid identifier)
    #[error("Unknown table: {0}")]
    UnknownTable(String),

    /// Connection provider unreachable or timed out
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Statement accepted by the validator but refused by the database
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Missing or mistyped tool arguments
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    /// Configuration error (file not found, invalid JSON, missing field)
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Generation backend error
    #[error("Generation failed: {0}")]
    GenerationFailed(String),
}

impl TalkError {
    /// Convert error to error code string for JSON output
    ///
    /// Error codes are stable and suitable for programmatic handling by agents.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::ValidationRejected(_) => "VALIDATION_REJECTED",
            Self::UnknownTable(_) => "UNKNOWN_TABLE",
            Self::BackendUnavailable(_) => "BACKEND_UNAVAILABLE",
            Self::QueryFailed(_) => "QUERY_FAILED",
            Self::InvalidArguments(_) => "INVALID_ARGUMENTS",
            Self::ConfigError(_) => "CONFIG_ERROR",
            Self::GenerationFailed(_) => "GENERATION_FAILED",
        }
    }

    /// Coarse reason code, e.g. `validation-rejected:stacked-statement`
    ///
    /// This is the only error detail that may reach a generation prompt.
    #[must_use]
    pub fn reason_code(&self) -> String {
        match self {
            Self::ValidationRejected(reason) => format!("validation-rejected:{reason}"),
            Self::UnknownTable(_) => "unknown-table".to_string(),
            Self::BackendUnavailable(_) => "backend-unavailable".to_string(),
            Self::QueryFailed(_) => "query-failed".to_string(),
            Self::InvalidArguments(_) => "invalid-arguments".to_string(),
            Self::ConfigError(_) => "config-error".to_string(),
            Self::GenerationFailed(_) => "generation-failed".to_string(),
        }
    }

    /// Human-readable message that is safe to show to users and agents
    ///
    /// Never contains raw database error text, credentials or SQL.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::ValidationRejected(reason) => {
                format!("The query was rejected by the read-only safety check ({reason}).")
            }
            Self::UnknownTable(name) if crate::tools::looks_like_identifier(name) => {
                format!("There is no table named '{name}' in this database.")
            }
            Self::UnknownTable(_) => "That table does not exist in this database.".to_string(),
            Self::BackendUnavailable(_) => {
                "The database is not reachable right now. Please try again in a moment."
                    .to_string()
            }
            Self::QueryFailed(_) => "The database could not run that query.".to_string(),
            Self::InvalidArguments(detail) => format!("Invalid arguments: {detail}"),
            Self::ConfigError(_) => "tabletalk is not configured correctly.".to_string(),
            Self::GenerationFailed(_) => "No answer could be generated.".to_string(),
        }
    }

    /// Whether a retry later might succeed
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::BackendUnavailable(_))
    }

    /// Create a validation rejection error
    #[must_use]
    pub const fn validation_rejected(reason: RejectReason) -> Self {
        Self::ValidationRejected(reason)
    }

    /// Create an unknown table error
    pub fn unknown_table(name: impl Into<String>) -> Self {
        Self::UnknownTable(name.into())
    }

    /// Create a backend unavailable error
    pub fn backend_unavailable(detail: impl Into<String>) -> Self {
        Self::BackendUnavailable(detail.into())
    }

    /// Create a query failed error
    pub fn query_failed(detail: impl Into<String>) -> Self {
        Self::QueryFailed(detail.into())
    }

    /// Create an invalid arguments error
    pub fn invalid_arguments(message: impl Into<String>) -> Self {
        Self::InvalidArguments(message.into())
    }

    /// Create a configuration error
    pub fn config_error(message: impl Into<String>) -> Self {
        Self::ConfigError(message.into())
    }

    /// Create a generation error
    pub fn generation_failed(detail: impl Into<String>) -> Self {
        Self::GenerationFailed(detail.into())
    }
}

/// Result type alias for tabletalk operations
pub type Result<T> = std::result::Result<T, TalkError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            TalkError::validation_rejected(RejectReason::NotASelect).error_code(),
            "VALIDATION_REJECTED"
        );
        assert_eq!(TalkError::unknown_table("t").error_code(), "UNKNOWN_TABLE");
        assert_eq!(TalkError::backend_unavailable("x").error_code(), "BACKEND_UNAVAILABLE");
        assert_eq!(TalkError::query_failed("x").error_code(), "QUERY_FAILED");
        assert_eq!(TalkError::invalid_arguments("x").error_code(), "INVALID_ARGUMENTS");
        assert_eq!(TalkError::config_error("x").error_code(), "CONFIG_ERROR");
        assert_eq!(TalkError::generation_failed("x").error_code(), "GENERATION_FAILED");
    }

    #[test]
    fn test_reason_codes() {
        let err = TalkError::validation_rejected(RejectReason::ForbiddenKeyword("DROP".into()));
        assert_eq!(err.reason_code(), "validation-rejected:forbidden-keyword:DROP");
        assert_eq!(
            TalkError::validation_rejected(RejectReason::StackedStatement).reason_code(),
            "validation-rejected:stacked-statement"
        );
        assert_eq!(TalkError::unknown_table("nope").reason_code(), "unknown-table");
        assert_eq!(TalkError::backend_unavailable("tcp reset").reason_code(), "backend-unavailable");
    }

    #[test]
    fn test_user_message_hides_backend_detail() {
        let err = TalkError::backend_unavailable("password authentication failed for user admin");
        assert!(!err.user_message().contains("admin"));
        assert!(err.user_message().contains("try again"));

        let err = TalkError::query_failed("syntax error at or near \"FORM\"");
        assert!(!err.user_message().contains("FORM"));
    }

    #[test]
    fn test_user_message_does_not_echo_odd_table_names() {
        let err = TalkError::unknown_table("users; DROP TABLE x");
        assert!(!err.user_message().contains("DROP"));

        let err = TalkError::unknown_table("nonexistent_table");
        assert!(err.user_message().contains("nonexistent_table"));
    }

    #[test]
    fn test_transient() {
        assert!(TalkError::backend_unavailable("timeout").is_transient());
        assert!(!TalkError::query_failed("x").is_transient());
    }
}
