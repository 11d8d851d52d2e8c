//! Connection Providers
//!
//! This module defines the narrow interface through which the tool catalog reaches a
//! database. Each engine (`PostgreSQL`, `MySQL`, `SQLite`) implements
//! [`ConnectionProvider`]; [`Engine`] picks one from configuration.
//!
//! # Stateless Design
//! Providers hold only configuration. A connection is opened, used, and closed within
//! each call, so no connection is ever shared across concurrent statements.
//!
//! # Error Mapping
//! - Connection failures and timeouts: `TalkError::BackendUnavailable`
//! - Statement failures: `TalkError::QueryFailed`
//!
//! Raw driver messages end up in those variants' detail and are only ever logged.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Result, TalkError};
use crate::tools::QuoteStyle;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "postgres")]
pub mod postgres;

#[cfg(feature = "mysql")]
pub mod mysql;

#[cfg(not(any(feature = "postgres", feature = "mysql", feature = "sqlite")))]
compile_error!("tabletalk needs at least one engine feature: postgres, mysql or sqlite");

/// Supported database engine types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseType {
    /// `PostgreSQL` database
    Postgres,
    /// `MySQL` database (includes `MariaDB`)
    MySQL,
    /// `SQLite` database
    SQLite,
}

impl DatabaseType {
    /// Get the engine name as a string
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::MySQL => "mysql",
            Self::SQLite => "sqlite",
        }
    }
}

impl std::fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Connection configuration for database engines
///
/// Fields are engine-specific (e.g., `file` only applies to `SQLite`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub engine: DatabaseType,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    /// WARNING: Sensitive data, do not log or include in error messages
    #[serde(skip_serializing)]
    pub password: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,

    /// Database file path (for sqlite)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,

    /// Schema whose tables are exposed (postgres only, defaults to `public`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
}

impl ConnectionConfig {
    /// Create a new `PostgreSQL` connection config
    #[must_use]
    pub const fn postgres(
        host: String,
        port: u16,
        user: String,
        password: String,
        database: String,
    ) -> Self {
        Self {
            engine: DatabaseType::Postgres,
            host: Some(host),
            port: Some(port),
            user: Some(user),
            password: Some(password),
            database: Some(database),
            file: None,
            schema: None,
        }
    }

    /// Create a new `MySQL` connection config
    #[must_use]
    pub const fn mysql(
        host: String,
        port: u16,
        user: String,
        password: String,
        database: String,
    ) -> Self {
        Self {
            engine: DatabaseType::MySQL,
            host: Some(host),
            port: Some(port),
            user: Some(user),
            password: Some(password),
            database: Some(database),
            file: None,
            schema: None,
        }
    }

    /// Create a new `SQLite` connection config
    #[must_use]
    pub const fn sqlite(file: PathBuf) -> Self {
        Self {
            engine: DatabaseType::SQLite,
            host: None,
            port: None,
            user: None,
            password: None,
            database: None,
            file: Some(file),
            schema: None,
        }
    }

    /// Fetch a required field or fail with a configuration error
    pub(crate) fn require<'a, T: ?Sized>(
        &self,
        value: Option<&'a T>,
        field: &str,
    ) -> Result<&'a T> {
        value.ok_or_else(|| {
            TalkError::config_error(format!("{} connection requires '{field}'", self.engine))
        })
    }
}

/// Positional statement parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlParam {
    Text(String),
    Integer(i64),
}

impl From<&str> for SqlParam {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

/// Column metadata returned by `describe_columns`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,

    /// Column data type (engine-specific spelling)
    pub data_type: String,

    pub nullable: bool,

    /// Part of the primary key
    pub is_key: bool,
}

/// Row-major result of one provider call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RowSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
}

impl RowSet {
    #[must_use]
    pub fn new(columns: Vec<String>) -> Self {
        Self { columns, rows: Vec::new() }
    }
}

/// The only way the crate reaches a database
///
/// Implementations must be safe to call concurrently; each call uses its own connection.
pub trait ConnectionProvider: Send + Sync {
    /// Run one statement and materialize every row it returns
    fn run(
        &self,
        statement: &str,
        params: &[SqlParam],
    ) -> impl Future<Output = Result<RowSet>> + Send;

    /// Names of the user tables visible to this connection
    fn list_tables(&self) -> impl Future<Output = Result<BTreeSet<String>>> + Send;

    /// Columns of one table in ordinal order; empty when the table does not exist
    fn describe_columns(
        &self,
        table: &str,
    ) -> impl Future<Output = Result<Vec<ColumnInfo>>> + Send;

    /// Identifier quoting used when the crate writes SQL for this backend
    fn quote_style(&self) -> QuoteStyle {
        QuoteStyle::Double
    }
}

/// Run a provider future under a deadline
///
/// An elapsed deadline is reported as a transient backend failure.
pub async fn with_timeout<T>(
    timeout: Duration,
    future: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::time::timeout(timeout, future).await.map_err(|_| {
        TalkError::backend_unavailable(format!("timed out after {}ms", timeout.as_millis()))
    })?
}

/// Provider selected from configuration
#[derive(Debug, Clone)]
pub enum Engine {
    #[cfg(feature = "sqlite")]
    Sqlite(sqlite::SqliteEngine),
    #[cfg(feature = "postgres")]
    Postgres(postgres::PostgresEngine),
    #[cfg(feature = "mysql")]
    MySql(mysql::MySqlEngine),
}

impl Engine {
    /// Build the provider for `config.engine`
    ///
    /// # Errors
    /// Returns `TalkError::ConfigError` when the engine was not compiled in.
    #[allow(unused_variables)]
    pub fn from_config(config: ConnectionConfig, timeout: Duration) -> Result<Self> {
        match config.engine {
            #[cfg(feature = "sqlite")]
            DatabaseType::SQLite => Ok(Self::Sqlite(sqlite::SqliteEngine::new(config, timeout))),
            #[cfg(feature = "postgres")]
            DatabaseType::Postgres => {
                Ok(Self::Postgres(postgres::PostgresEngine::new(config, timeout)))
            }
            #[cfg(feature = "mysql")]
            DatabaseType::MySQL => Ok(Self::MySql(mysql::MySqlEngine::new(config, timeout))),
            #[allow(unreachable_patterns)]
            other => Err(TalkError::config_error(format!(
                "engine '{other}' is not enabled in this build"
            ))),
        }
    }

    #[must_use]
    pub const fn database_type(&self) -> DatabaseType {
        match self {
            #[cfg(feature = "sqlite")]
            Self::Sqlite(_) => DatabaseType::SQLite,
            #[cfg(feature = "postgres")]
            Self::Postgres(_) => DatabaseType::Postgres,
            #[cfg(feature = "mysql")]
            Self::MySql(_) => DatabaseType::MySQL,
        }
    }
}

impl ConnectionProvider for Engine {
    async fn run(&self, statement: &str, params: &[SqlParam]) -> Result<RowSet> {
        match self {
            #[cfg(feature = "sqlite")]
            Self::Sqlite(engine) => engine.run(statement, params).await,
            #[cfg(feature = "postgres")]
            Self::Postgres(engine) => engine.run(statement, params).await,
            #[cfg(feature = "mysql")]
            Self::MySql(engine) => engine.run(statement, params).await,
        }
    }

    async fn list_tables(&self) -> Result<BTreeSet<String>> {
        match self {
            #[cfg(feature = "sqlite")]
            Self::Sqlite(engine) => engine.list_tables().await,
            #[cfg(feature = "postgres")]
            Self::Postgres(engine) => engine.list_tables().await,
            #[cfg(feature = "mysql")]
            Self::MySql(engine) => engine.list_tables().await,
        }
    }

    async fn describe_columns(&self, table: &str) -> Result<Vec<ColumnInfo>> {
        match self {
            #[cfg(feature = "sqlite")]
            Self::Sqlite(engine) => engine.describe_columns(table).await,
            #[cfg(feature = "postgres")]
            Self::Postgres(engine) => engine.describe_columns(table).await,
            #[cfg(feature = "mysql")]
            Self::MySql(engine) => engine.describe_columns(table).await,
        }
    }

    fn quote_style(&self) -> QuoteStyle {
        match self {
            #[cfg(feature = "sqlite")]
            Self::Sqlite(engine) => engine.quote_style(),
            #[cfg(feature = "postgres")]
            Self::Postgres(engine) => engine.quote_style(),
            #[cfg(feature = "mysql")]
            Self::MySql(engine) => engine.quote_style(),
        }
    }
}
