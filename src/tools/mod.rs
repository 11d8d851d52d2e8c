//! Tool Catalog
//!
//! The fixed set of operations a caller may request. Each tool is one variant of the
//! closed [`ToolCall`] enum and is dispatched by [`ToolExecutor`].
//!
//! # Tools
//! - `get_tables` - List table names
//! - `describe_table` - Columns of one table
//! - `get_all_schemas` - Column counts for every table
//! - `count_records` - Row count of one table
//! - `execute_select` - Run caller SQL after validation
//!
//! # Safety Contract
//! - Table names pass the identifier allow-list and must exist in the live catalog;
//!   statements only ever contain the catalog's spelling, quoted
//! - Caller SQL always passes the [`SqlValidator`]; a rejected statement is never sent
//! - Every result respects the row cap

pub mod identifier;
pub mod result;

pub use identifier::{looks_like_identifier, IdentifierPolicy, QuoteStyle};
pub use result::{QueryResult, ResultColumn};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info, warn};

use crate::engine::ConnectionProvider;
use crate::error::{Result, TalkError};
use crate::validator::{SqlValidator, ValidationVerdict};

/// Tool names, in catalog order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolName {
    GetTables,
    DescribeTable,
    GetAllSchemas,
    CountRecords,
    ExecuteSelect,
}

impl ToolName {
    pub const ALL: [Self; 5] = [
        Self::GetTables,
        Self::DescribeTable,
        Self::GetAllSchemas,
        Self::CountRecords,
        Self::ExecuteSelect,
    ];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::GetTables => "get_tables",
            Self::DescribeTable => "describe_table",
            Self::GetAllSchemas => "get_all_schemas",
            Self::CountRecords => "count_records",
            Self::ExecuteSelect => "execute_select",
        }
    }

    /// Whether the tool needs a table name argument
    #[must_use]
    pub const fn requires_table(&self) -> bool {
        matches!(self, Self::DescribeTable | Self::CountRecords | Self::ExecuteSelect)
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ToolName {
    type Err = TalkError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|tool| tool.as_str() == s)
            .ok_or_else(|| TalkError::invalid_arguments(format!("unknown tool '{s}'")))
    }
}

/// Arguments of `describe_table` and `count_records`
#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct TableArgs {
    /// Name of a table returned by `get_tables`
    pub table_name: String,
}

/// Arguments of `execute_select`
#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ExecuteSelectArgs {
    /// A single read-only SELECT statement
    pub query: String,

    /// Optional row limit; can only lower the configured ceiling
    #[serde(default)]
    pub limit: Option<u64>,
}

/// Tools without arguments
#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct NoArgs {}

/// One requested tool invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "tool", rename_all = "snake_case")]
pub enum ToolCall {
    GetTables,
    DescribeTable { table_name: String },
    GetAllSchemas,
    CountRecords { table_name: String },
    ExecuteSelect {
        query: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        limit: Option<u64>,
    },
}

impl ToolCall {
    #[must_use]
    pub const fn name(&self) -> ToolName {
        match self {
            Self::GetTables => ToolName::GetTables,
            Self::DescribeTable { .. } => ToolName::DescribeTable,
            Self::GetAllSchemas => ToolName::GetAllSchemas,
            Self::CountRecords { .. } => ToolName::CountRecords,
            Self::ExecuteSelect { .. } => ToolName::ExecuteSelect,
        }
    }

    /// Parse a transport-level invocation (`name` plus JSON arguments)
    ///
    /// # Errors
    /// Returns `TalkError::InvalidArguments` for an unknown tool or bad arguments.
    pub fn from_invocation(name: &str, arguments: &Value) -> Result<Self> {
        let tool: ToolName = name.parse()?;
        let arguments = if arguments.is_null() { json!({}) } else { arguments.clone() };

        let parse_err =
            |e: serde_json::Error| TalkError::invalid_arguments(format!("{tool}: {e}"));

        Ok(match tool {
            ToolName::GetTables => {
                serde_json::from_value::<NoArgs>(arguments).map_err(parse_err)?;
                Self::GetTables
            }
            ToolName::GetAllSchemas => {
                serde_json::from_value::<NoArgs>(arguments).map_err(parse_err)?;
                Self::GetAllSchemas
            }
            ToolName::DescribeTable => {
                let args: TableArgs = serde_json::from_value(arguments).map_err(parse_err)?;
                Self::DescribeTable { table_name: args.table_name }
            }
            ToolName::CountRecords => {
                let args: TableArgs = serde_json::from_value(arguments).map_err(parse_err)?;
                Self::CountRecords { table_name: args.table_name }
            }
            ToolName::ExecuteSelect => {
                let args: ExecuteSelectArgs =
                    serde_json::from_value(arguments).map_err(parse_err)?;
                if args.limit == Some(0) {
                    return Err(TalkError::invalid_arguments("execute_select: limit must be at least 1"));
                }
                Self::ExecuteSelect { query: args.query, limit: args.limit }
            }
        })
    }
}

/// Argument name and JSON type
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArgumentSpec {
    pub name: &'static str,
    #[serde(rename = "type")]
    pub ty: &'static str,
    pub required: bool,
}

/// Catalog entry describing one tool
#[derive(Debug, Clone, Serialize)]
pub struct ToolSpec {
    pub name: ToolName,
    pub description: &'static str,
    pub arguments: Vec<ArgumentSpec>,
    /// Whether caller input is SQL that must pass the validator
    pub requires_validation: bool,
    /// JSON schema of the arguments object
    pub input_schema: Value,
}

fn schema_of<T: JsonSchema>() -> Value {
    serde_json::to_value(schemars::schema_for!(T)).unwrap_or_else(|_| json!({"type": "object"}))
}

/// The full tool catalog
#[must_use]
pub fn catalog() -> Vec<ToolSpec> {
    let table_arg = || vec![ArgumentSpec { name: "table_name", ty: "string", required: true }];

    vec![
        ToolSpec {
            name: ToolName::GetTables,
            description: "List all tables in the database.",
            arguments: Vec::new(),
            requires_validation: false,
            input_schema: schema_of::<NoArgs>(),
        },
        ToolSpec {
            name: ToolName::DescribeTable,
            description: "Describe the columns of a table: name, data type, nullability and \
                          whether the column is part of the primary key.",
            arguments: table_arg(),
            requires_validation: false,
            input_schema: schema_of::<TableArgs>(),
        },
        ToolSpec {
            name: ToolName::GetAllSchemas,
            description: "List every table with its number of columns.",
            arguments: Vec::new(),
            requires_validation: false,
            input_schema: schema_of::<NoArgs>(),
        },
        ToolSpec {
            name: ToolName::CountRecords,
            description: "Count the rows of a table.",
            arguments: table_arg(),
            requires_validation: false,
            input_schema: schema_of::<TableArgs>(),
        },
        ToolSpec {
            name: ToolName::ExecuteSelect,
            description: "Run a single read-only SELECT statement. Results are capped; comments, \
                          multiple statements and data-changing keywords are rejected.",
            arguments: vec![
                ArgumentSpec { name: "query", ty: "string", required: true },
                ArgumentSpec { name: "limit", ty: "integer", required: false },
            ],
            requires_validation: true,
            input_schema: schema_of::<ExecuteSelectArgs>(),
        },
    ]
}

/// Runs tool calls against a connection provider
#[derive(Debug, Clone)]
pub struct ToolExecutor<P> {
    provider: P,
    validator: SqlValidator,
    identifiers: IdentifierPolicy,
}

impl<P: ConnectionProvider> ToolExecutor<P> {
    pub const fn new(provider: P, validator: SqlValidator, identifiers: IdentifierPolicy) -> Self {
        Self { provider, validator, identifiers }
    }

    pub const fn provider(&self) -> &P {
        &self.provider
    }

    pub const fn max_rows(&self) -> u64 {
        self.validator.max_rows()
    }

    /// Live catalog of table names
    pub async fn known_tables(&self) -> Result<BTreeSet<String>> {
        self.provider.list_tables().await
    }

    /// Execute one tool call
    pub async fn execute(&self, call: &ToolCall) -> Result<QueryResult> {
        info!(tool = %call.name(), "executing tool");

        let result = match call {
            ToolCall::GetTables => self.get_tables().await,
            ToolCall::DescribeTable { table_name } => self.describe_table(table_name).await,
            ToolCall::GetAllSchemas => self.get_all_schemas().await,
            ToolCall::CountRecords { table_name } => self.count_records(table_name).await,
            ToolCall::ExecuteSelect { query, limit } => self.execute_select(query, *limit).await,
        };

        match &result {
            Ok(r) => debug!(tool = %call.name(), rows = r.row_count, truncated = r.truncated, "tool finished"),
            Err(e) => warn!(tool = %call.name(), error = %e, "tool failed"),
        }
        result
    }

    async fn get_tables(&self) -> Result<QueryResult> {
        let tables = self.known_tables().await?;
        let cap = cap_len(self.max_rows());
        let truncated = tables.len() > cap;
        let names = tables.into_iter().take(cap).map(Value::String).collect();
        Ok(QueryResult::from_columns(vec![("table_name".to_string(), names)], truncated))
    }

    async fn describe_table(&self, requested: &str) -> Result<QueryResult> {
        let table = self.resolve_table(requested).await?;
        let columns = self.provider.describe_columns(&table).await?;

        let cap = cap_len(self.max_rows());
        let truncated = columns.len() > cap;
        let columns = &columns[..columns.len().min(cap)];

        Ok(QueryResult::from_columns(
            vec![
                ("column_name".into(), columns.iter().map(|c| Value::String(c.name.clone())).collect()),
                ("data_type".into(), columns.iter().map(|c| Value::String(c.data_type.clone())).collect()),
                ("nullable".into(), columns.iter().map(|c| Value::Bool(c.nullable)).collect()),
                ("is_key".into(), columns.iter().map(|c| Value::Bool(c.is_key)).collect()),
            ],
            truncated,
        ))
    }

    async fn get_all_schemas(&self) -> Result<QueryResult> {
        let tables = self.known_tables().await?;
        let cap = cap_len(self.max_rows());
        let truncated = tables.len() > cap;

        let mut names = Vec::new();
        let mut counts = Vec::new();
        for table in tables.into_iter().take(cap) {
            let columns = self.provider.describe_columns(&table).await?;
            counts.push(json!(columns.len()));
            names.push(Value::String(table));
        }

        Ok(QueryResult::from_columns(
            vec![("table_name".into(), names), ("column_count".into(), counts)],
            truncated,
        ))
    }

    async fn count_records(&self, requested: &str) -> Result<QueryResult> {
        let table = self.resolve_table(requested).await?;
        let statement = format!(
            "SELECT COUNT(*) AS record_count FROM {}",
            self.provider.quote_style().quote(&table)
        );

        let rows = self.provider.run(&statement, &[]).await?;
        let count = rows
            .rows
            .first()
            .and_then(|row| row.first())
            .and_then(count_value)
            .ok_or_else(|| TalkError::query_failed("COUNT(*) returned no integer"))?;

        Ok(QueryResult::from_columns(vec![("record_count".into(), vec![json!(count)])], false))
    }

    async fn execute_select(&self, query: &str, limit: Option<u64>) -> Result<QueryResult> {
        let validator = match limit {
            Some(limit) => self.validator.capped(limit),
            None => self.validator.clone(),
        };

        let statement = validator.inspect(query);
        let (sql, applied) = match statement.verdict() {
            ValidationVerdict::Accepted { statement, applied_limit } => (statement, applied_limit),
            ValidationVerdict::Rejected { reason } => {
                warn!(%reason, "execute_select rejected before execution");
                return Err(TalkError::validation_rejected(reason));
            }
        };
        let injected = statement.row_limit.is_some_and(|l| l.rewritten);

        let rows = self.provider.run(&sql, &[]).await?;
        Ok(QueryResult::from_row_set(rows, applied, injected))
    }

    /// Map a caller-supplied table name to the catalog's spelling
    ///
    /// Names failing the allow-list are rejected without touching the database.
    async fn resolve_table(&self, requested: &str) -> Result<String> {
        if !self.identifiers.allows(requested) {
            warn!("table name rejected by identifier policy");
            return Err(TalkError::unknown_table(requested));
        }

        let tables = self.known_tables().await?;
        if tables.contains(requested) {
            return Ok(requested.to_string());
        }

        let mut folded = tables.iter().filter(|t| t.eq_ignore_ascii_case(requested));
        match (folded.next(), folded.next()) {
            (Some(table), None) => Ok(table.clone()),
            _ => Err(TalkError::unknown_table(requested)),
        }
    }
}

fn cap_len(cap: u64) -> usize {
    usize::try_from(cap).unwrap_or(usize::MAX)
}

/// COUNT(*) arrives as a number, or as text from MySQL's text protocol
fn count_value(value: &Value) -> Option<u64> {
    value.as_u64().or_else(|| value.as_str().and_then(|s| s.parse().ok()))
}
