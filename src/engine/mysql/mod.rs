//! `MySQL` Connection Provider
//!
//! # Implementation Notes
//! - Uses `mysql_async` (async driver, requires tokio runtime)
//! - Sessions are made read-only and bounded with `max_execution_time` on connect
//! - Text-protocol results arrive as bytes; UTF-8 becomes a JSON string, anything else
//!   is Base64-encoded
//! - Tables are those of the connected database (`DATABASE()`)
//! - Column names of an empty result set are not reported by the driver

use mysql_async::{prelude::*, Conn, OptsBuilder, Params, Row, Value};
use std::collections::BTreeSet;
use std::time::Duration;

use crate::engine::{
    with_timeout, ColumnInfo, ConnectionConfig, ConnectionProvider, RowSet, SqlParam,
};
use crate::error::{Result, TalkError};
use crate::tools::QuoteStyle;

/// `ER_QUERY_TIMEOUT`: statement interrupted by `max_execution_time`
const QUERY_TIMEOUT_CODE: u16 = 3024;

/// `MySQL` provider
#[derive(Debug, Clone)]
pub struct MySqlEngine {
    config: ConnectionConfig,
    timeout: Duration,
}

impl MySqlEngine {
    #[must_use]
    pub const fn new(config: ConnectionConfig, timeout: Duration) -> Self {
        Self { config, timeout }
    }
}

impl ConnectionProvider for MySqlEngine {
    async fn run(&self, statement: &str, params: &[SqlParam]) -> Result<RowSet> {
        let opts = build_mysql_opts(&self.config, self.timeout)?;

        with_timeout(self.timeout, async {
            let mut conn = Conn::new(opts).await.map_err(|e| {
                TalkError::backend_unavailable(format!("Failed to connect to MySQL: {e}"))
            })?;

            let result = execute_query(&mut conn, statement, params).await;
            let _ = conn.disconnect().await;
            result
        })
        .await
    }

    async fn list_tables(&self) -> Result<BTreeSet<String>> {
        let rows = self
            .run(
                "SELECT table_name FROM information_schema.tables
                 WHERE table_schema = DATABASE()
                 ORDER BY table_name",
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
        let rows = self
            .run(
                "SELECT column_name, data_type, is_nullable, column_key
                 FROM information_schema.columns
                 WHERE table_schema = DATABASE() AND table_name = ?
                 ORDER BY ordinal_position",
                &[SqlParam::from(table)],
            )
            .await?;

        Ok(rows
            .rows
            .into_iter()
            .map(|row| ColumnInfo {
                name: row.first().and_then(|v| v.as_str()).unwrap_or_default().to_string(),
                data_type: row.get(1).and_then(|v| v.as_str()).unwrap_or_default().to_string(),
                nullable: row.get(2).and_then(|v| v.as_str()) == Some("YES"),
                is_key: row.get(3).and_then(|v| v.as_str()) == Some("PRI"),
            })
            .collect())
    }

    fn quote_style(&self) -> QuoteStyle {
        QuoteStyle::Backtick
    }
}

/// Build `MySQL` connection options from `ConnectionConfig`
fn build_mysql_opts(config: &ConnectionConfig, timeout: Duration) -> Result<OptsBuilder> {
    let host = config.require(config.host.as_deref(), "host")?;
    let port = *config.require(config.port.as_ref(), "port")?;
    let user = config.require(config.user.as_deref(), "user")?;
    let password = config.require(config.password.as_deref(), "password")?;
    let database = config.require(config.database.as_deref(), "database")?;

    let opts = OptsBuilder::default()
        .ip_or_hostname(host)
        .tcp_port(port)
        .user(Some(user))
        .pass(Some(password))
        .db_name(Some(database))
        .init(vec![
            "SET SESSION TRANSACTION READ ONLY".to_string(),
            format!("SET SESSION max_execution_time = {}", timeout.as_millis()),
        ]);

    Ok(opts)
}

/// Server-side refusals are query failures, except the execution-time interrupt
fn map_query_error(e: &mysql_async::Error) -> TalkError {
    match e {
        mysql_async::Error::Server(server) if server.code != QUERY_TIMEOUT_CODE => {
            TalkError::query_failed(format!("Failed to execute query: {e}"))
        }
        _ => TalkError::backend_unavailable(format!("MySQL call failed: {e}")),
    }
}

async fn execute_query(conn: &mut Conn, query: &str, params: &[SqlParam]) -> Result<RowSet> {
    let rows: Vec<Row> = if params.is_empty() {
        conn.query(query).await.map_err(|e| map_query_error(&e))?
    } else {
        let values = params
            .iter()
            .map(|param| match param {
                SqlParam::Text(s) => Value::from(s.as_str()),
                SqlParam::Integer(i) => Value::from(*i),
            })
            .collect();
        conn.exec(query, Params::Positional(values)).await.map_err(|e| map_query_error(&e))?
    };

    let columns = rows
        .first()
        .map(|row| row.columns_ref().iter().map(|col| col.name_str().to_string()).collect())
        .unwrap_or_default();

    let mut result = RowSet::new(columns);
    for row in &rows {
        result.rows.push((0..row.len()).map(|idx| mysql_value_to_json(row, idx)).collect());
    }

    Ok(result)
}

/// Convert `MySQL` value to JSON value
fn mysql_value_to_json(row: &Row, idx: usize) -> serde_json::Value {
    let Some(value) = row.as_ref(idx) else {
        return serde_json::Value::Null;
    };

    match value {
        Value::NULL => serde_json::Value::Null,
        Value::Bytes(bytes) => std::str::from_utf8(bytes).map_or_else(
            |_| {
                use base64::Engine;
                serde_json::Value::String(base64::engine::general_purpose::STANDARD.encode(bytes))
            },
            |s| serde_json::Value::String(s.to_string()),
        ),
        Value::Int(i) => serde_json::Value::Number((*i).into()),
        Value::UInt(u) => serde_json::Value::Number((*u).into()),
        Value::Float(f) => serde_json::Number::from_f64(f64::from(*f))
            .map_or(serde_json::Value::Null, serde_json::Value::Number), // NaN/Infinity as null
        Value::Double(d) => serde_json::Number::from_f64(*d)
            .map_or(serde_json::Value::Null, serde_json::Value::Number),
        Value::Date(year, month, day, hour, minute, second, micro) => serde_json::Value::String(
            format!("{year:04}-{month:02}-{day:02}T{hour:02}:{minute:02}:{second:02}.{micro:06}"),
        ),
        Value::Time(is_negative, days, hours, minutes, seconds, micros) => {
            let sign = if *is_negative { "-" } else { "" };
            let total_hours = days * 24 + u32::from(*hours);
            serde_json::Value::String(format!(
                "{sign}{total_hours}:{minutes:02}:{seconds:02}.{micros:06}"
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ConnectionConfig {
        ConnectionConfig::mysql(
            "localhost".to_string(),
            3306,
            "reader".to_string(),
            "secret".to_string(),
            "app".to_string(),
        )
    }

    #[test]
    fn test_build_opts() {
        assert!(build_mysql_opts(&config(), Duration::from_secs(1)).is_ok());
    }

    #[test]
    fn test_missing_fields_are_config_errors() {
        let mut incomplete = config();
        incomplete.user = None;
        let err = build_mysql_opts(&incomplete, Duration::from_secs(1)).unwrap_err();
        assert_eq!(err.error_code(), "CONFIG_ERROR");
    }

    #[tokio::test]
    async fn test_unreachable_server_is_backend_unavailable() {
        let mut unreachable = config();
        unreachable.host = Some("127.0.0.1".to_string());
        unreachable.port = Some(1);
        let engine = MySqlEngine::new(unreachable, Duration::from_secs(2));
        let err = engine.list_tables().await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    #[ignore = "requires a running MySQL server"]
    async fn test_run_select_text_protocol() {
        let mut live = config();
        live.user = Some(std::env::var("TABLETALK_MYSQL_USER").unwrap_or_else(|_| "root".into()));
        live.password =
            Some(std::env::var("TABLETALK_MYSQL_PASSWORD").unwrap_or_else(|_| "root".into()));
        let engine = MySqlEngine::new(live, Duration::from_secs(5));
        let rows = engine.run("SELECT 1 AS one", &[]).await.unwrap();
        assert_eq!(rows.columns, vec!["one"]);
        assert_eq!(rows.rows, vec![vec![serde_json::json!("1")]]);
    }
}
