//! `SQLite` Connection Provider
//!
//! # Implementation Notes
//! - Uses `rusqlite` (synchronous driver) on the blocking thread pool
//! - Connections are opened with `SQLITE_OPEN_READ_ONLY`; writes fail at the driver
//! - Lock waits bounded by `busy_timeout`, whole calls by `tokio::time::timeout`
//! - BLOB data is Base64-encoded for JSON safety
//! - No schema support (`SQLite` uses a single catalog)

use rusqlite::{Connection, OpenFlags, Row};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::engine::{
    with_timeout, ColumnInfo, ConnectionConfig, ConnectionProvider, RowSet, SqlParam,
};
use crate::error::{Result, TalkError};

/// `SQLite` provider
#[derive(Debug, Clone)]
pub struct SqliteEngine {
    config: ConnectionConfig,
    timeout: Duration,
}

impl SqliteEngine {
    #[must_use]
    pub const fn new(config: ConnectionConfig, timeout: Duration) -> Self {
        Self { config, timeout }
    }

    fn path(&self) -> Result<PathBuf> {
        self.config.require(self.config.file.as_ref(), "file").cloned()
    }

    /// Run `work` against a fresh read-only connection on the blocking pool
    async fn with_connection<T, F>(&self, work: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let path = self.path()?;
        let busy = self.timeout;
        let task = tokio::task::spawn_blocking(move || {
            let conn = open_connection(&path, busy)?;
            work(&conn)
        });

        with_timeout(self.timeout, async {
            task.await.map_err(|e| TalkError::backend_unavailable(format!("sqlite worker failed: {e}")))?
        })
        .await
    }
}

impl ConnectionProvider for SqliteEngine {
    async fn run(&self, statement: &str, params: &[SqlParam]) -> Result<RowSet> {
        let statement = statement.to_string();
        let params = params.to_vec();
        self.with_connection(move |conn| execute_query(conn, &statement, &params)).await
    }

    async fn list_tables(&self) -> Result<BTreeSet<String>> {
        let rows = self
            .run(
                "SELECT name FROM sqlite_master
                 WHERE type = 'table'
                 AND name NOT LIKE 'sqlite_%'
                 ORDER BY name",
                &[],
            )
            .await?;

        Ok(rows
            .rows
            .into_iter()
            .filter_map(|row| row.into_iter().next())
            .filter_map(|value| value.as_str().map(str::to_string))
            .collect())
    }

    async fn describe_columns(&self, table: &str) -> Result<Vec<ColumnInfo>> {
        // pragma_table_info takes the table name as a bound value, never spliced
        let rows = self
            .run(
                "SELECT name, type, \"notnull\", pk FROM pragma_table_info(?1) ORDER BY cid",
                &[SqlParam::from(table)],
            )
            .await?;

        Ok(rows
            .rows
            .into_iter()
            .map(|row| ColumnInfo {
                name: row.first().and_then(|v| v.as_str()).unwrap_or_default().to_string(),
                data_type: row.get(1).and_then(|v| v.as_str()).unwrap_or_default().to_string(),
                nullable: row.get(2).and_then(serde_json::Value::as_i64) == Some(0),
                is_key: row.get(3).and_then(serde_json::Value::as_i64).unwrap_or(0) > 0,
            })
            .collect())
    }
}

/// Open a read-only `SQLite` connection
fn open_connection(path: &Path, busy: Duration) -> Result<Connection> {
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_URI,
    )
    .map_err(|e| TalkError::backend_unavailable(format!("Failed to open SQLite database: {e}")))?;

    conn.busy_timeout(busy)
        .map_err(|e| TalkError::backend_unavailable(format!("Failed to set busy timeout: {e}")))?;

    Ok(conn)
}

/// Execute a statement and collect every row
fn execute_query(conn: &Connection, query: &str, params: &[SqlParam]) -> Result<RowSet> {
    let mut stmt = conn
        .prepare(query)
        .map_err(|e| TalkError::query_failed(format!("Failed to prepare query: {e}")))?;

    let column_names: Vec<String> = stmt.column_names().iter().map(|s| (*s).to_string()).collect();

    let bound: Vec<rusqlite::types::Value> = params
        .iter()
        .map(|param| match param {
            SqlParam::Text(s) => rusqlite::types::Value::Text(s.clone()),
            SqlParam::Integer(i) => rusqlite::types::Value::Integer(*i),
        })
        .collect();

    let rows = stmt
        .query(rusqlite::params_from_iter(bound))
        .map_err(|e| TalkError::query_failed(format!("Failed to execute query: {e}")))?;

    let mut result = RowSet::new(column_names);
    let width = result.columns.len();
    for row in rows.mapped(|row| row_to_json(width, row)) {
        let row = row.map_err(|e| TalkError::query_failed(format!("Failed to fetch row: {e}")))?;
        result.rows.push(row);
    }

    Ok(result)
}

/// Convert a `SQLite` row to a JSON-safe `Vec`
fn row_to_json(width: usize, row: &Row) -> std::result::Result<Vec<serde_json::Value>, rusqlite::Error> {
    (0..width).map(|idx| sqlite_value_to_json(row, idx)).collect()
}

/// Convert `SQLite` value to JSON value
fn sqlite_value_to_json(
    row: &Row,
    idx: usize,
) -> std::result::Result<serde_json::Value, rusqlite::Error> {
    use rusqlite::types::ValueRef;

    Ok(match row.get_ref(idx)? {
        ValueRef::Null => serde_json::Value::Null,
        ValueRef::Integer(i) => serde_json::Value::Number(i.into()),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map_or(serde_json::Value::Null, serde_json::Value::Number), // NaN/Infinity as null
        ValueRef::Text(s) => serde_json::Value::String(String::from_utf8_lossy(s).into_owned()),
        ValueRef::Blob(b) => {
            use base64::Engine;
            serde_json::Value::String(base64::engine::general_purpose::STANDARD.encode(b))
        }
    })
}
