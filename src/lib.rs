//! tabletalk - Chat With a Database, Read-Only
//!
//! tabletalk lets a conversational agent (a language model or a person) ask questions of a
//! relational database through a small fixed set of tools. No tool can change data,
//! return more rows than the configured cap, or carry caller SQL past the validator.
//!
//! # Core Principles
//! - Read-only by construction: caller SQL must be a single `SELECT`
//! - Every result is row-capped
//! - Table names are matched against the live catalog before use
//! - Raw database errors are logged, never shown
//! - Configuration is passed in at construction, never read from globals
//!
//! # Module Organization
//! - [`validator`] - SQL validation and row-limit rewriting
//! - [`tools`] - Tool catalog and executor
//! - [`intent`] - Rule-based intent classification
//! - [`router`] - Conversation turns
//! - [`generation`] - Generation backends (Ollama, template)
//! - [`engine`] - Connection providers (`PostgreSQL`, `MySQL`, `SQLite`)
//! - [`config`] - Layered configuration
//! - [`error`] - Error types
//! - [`output`] - JSON output envelopes
//! - [`mcp`] - MCP server

pub mod config;
pub mod engine;
pub mod error;
pub mod generation;
pub mod intent;
pub mod mcp;
pub mod output;
pub mod router;
pub mod tools;
pub mod validator;

pub use config::{Config, GenerationBackend, StoredConnection};
pub use engine::{ColumnInfo, ConnectionConfig, ConnectionProvider, DatabaseType, Engine, RowSet, SqlParam};
pub use error::{Result, TalkError};
pub use generation::{Backend, Generator, OllamaGenerator, PromptContext, TemplateGenerator};
pub use intent::{ClassifierConfig, Intent, IntentClassifier, NoMatchReason};
pub use output::{ErrorEnvelope, ErrorInfo, Metadata, SuccessEnvelope};
pub use router::{ConversationRouter, Transcript, TurnOutcome, TurnState};
pub use tools::{catalog, IdentifierPolicy, QueryResult, ToolCall, ToolExecutor, ToolName, ToolSpec};
pub use validator::{validate, RejectReason, SqlValidator, ValidationVerdict, ValidatorConfig};

/// Build a tool executor from configuration
///
/// # Errors
/// Returns `TalkError::ConfigError` when no usable connection is configured.
pub fn executor_from_config(config: &Config) -> Result<ToolExecutor<Engine>> {
    let engine = Engine::from_config(config.connection_config()?, config.timeout())?;
    Ok(ToolExecutor::new(engine, SqlValidator::new(config.validator_config()), config.identifier_policy()))
}

/// Build the configured generation backend
///
/// # Errors
/// Returns `TalkError::ConfigError` if the HTTP client cannot be built.
pub fn generator_from_config(config: &Config) -> Result<Backend> {
    match config.generation.backend {
        GenerationBackend::Template => Ok(Backend::Template(TemplateGenerator)),
        GenerationBackend::Ollama => {
            let generator = OllamaGenerator::new(&config.generation.url, &config.generation.model, config.timeout())?
                .with_sampling(config.generation.temperature, config.generation.top_p);
            Ok(Backend::Ollama(generator))
        }
    }
}

/// Build a conversation router from configuration
///
/// # Errors
/// See [`executor_from_config`] and [`generator_from_config`].
pub fn router_from_config(config: &Config) -> Result<ConversationRouter<Engine, Backend>> {
    let executor = executor_from_config(config)?;
    let classifier =
        IntentClassifier::new(&config.classifier).with_quote_style(executor.provider().quote_style());
    Ok(ConversationRouter::new(executor, classifier, generator_from_config(config)?))
}
