//! `PostgreSQL` Connection Provider
//!
//! # Implementation Notes
//! - Uses `tokio-postgres` (async driver, requires tokio runtime)
//! - Every session starts with `default_transaction_read_only=on` and a
//!   `statement_timeout`, passed as startup options
//! - JSON/JSONB preserved as nested JSON
//! - BYTEA data is Base64-encoded for JSON safety
//! - NUMERIC is decoded through `rust_decimal` and returned as a string
//! - Arrays become JSON arrays; any other type is read as text or Base64
//! - Only tables of the configured schema (default `public`) are exposed

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use rust_decimal::Decimal;
use serde_json::Value;
use std::collections::BTreeSet;
use std::net::IpAddr;
use std::time::Duration;
use tokio_postgres::error::SqlState;
use tokio_postgres::types::{FromSql, Kind, ToSql, Type};
use tokio_postgres::{Client, Config, NoTls, Row};

use crate::engine::{
    with_timeout, ColumnInfo, ConnectionConfig, ConnectionProvider, RowSet, SqlParam,
};
use crate::error::{Result, TalkError};

const DEFAULT_SCHEMA: &str = "public";

/// `PostgreSQL` provider
#[derive(Debug, Clone)]
pub struct PostgresEngine {
    config: ConnectionConfig,
    timeout: Duration,
}

impl PostgresEngine {
    #[must_use]
    pub const fn new(config: ConnectionConfig, timeout: Duration) -> Self {
        Self { config, timeout }
    }

    fn schema(&self) -> &str {
        self.config.schema.as_deref().unwrap_or(DEFAULT_SCHEMA)
    }

    /// Open a read-only session
    async fn connect(&self) -> Result<Client> {
        let pg_config = build_pg_config(&self.config, self.timeout)?;

        let (client, connection) = pg_config.connect(NoTls).await.map_err(|e| {
            TalkError::backend_unavailable(format!("Failed to connect to PostgreSQL: {e}"))
        })?;

        // Connection errors are not logged to prevent credential leakage
        tokio::spawn(async move {
            let _ = connection.await;
        });

        Ok(client)
    }
}

impl ConnectionProvider for PostgresEngine {
    async fn run(&self, statement: &str, params: &[SqlParam]) -> Result<RowSet> {
        with_timeout(self.timeout, async {
            let client = self.connect().await?;
            execute_query(&client, statement, params).await
        })
        .await
    }

    async fn list_tables(&self) -> Result<BTreeSet<String>> {
        let rows = self
            .run(
                "SELECT table_name::text
                 FROM information_schema.tables
                 WHERE table_schema = $1
                 AND table_type IN ('BASE TABLE', 'VIEW')
                 ORDER BY table_name",
                &[SqlParam::from(self.schema())],
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
                "SELECT c.column_name::text, c.data_type::text, c.is_nullable::text,
                        EXISTS (
                            SELECT 1
                            FROM information_schema.table_constraints tc
                            JOIN information_schema.key_column_usage k
                              ON tc.constraint_name = k.constraint_name
                             AND tc.table_schema = k.table_schema
                             AND tc.table_name = k.table_name
                            WHERE tc.constraint_type = 'PRIMARY KEY'
                              AND tc.table_schema = c.table_schema
                              AND tc.table_name = c.table_name
                              AND k.column_name = c.column_name
                        ) AS is_key
                 FROM information_schema.columns c
                 WHERE c.table_schema = $1 AND c.table_name = $2
                 ORDER BY c.ordinal_position",
                &[SqlParam::from(self.schema()), SqlParam::from(table)],
            )
            .await?;

        Ok(rows
            .rows
            .into_iter()
            .map(|row| ColumnInfo {
                name: row.first().and_then(|v| v.as_str()).unwrap_or_default().to_string(),
                data_type: row.get(1).and_then(|v| v.as_str()).unwrap_or_default().to_string(),
                nullable: row.get(2).and_then(|v| v.as_str()) == Some("YES"),
                is_key: row.get(3).and_then(serde_json::Value::as_bool).unwrap_or(false),
            })
            .collect())
    }
}

/// Build `PostgreSQL` connection config from `ConnectionConfig`
fn build_pg_config(config: &ConnectionConfig, timeout: Duration) -> Result<Config> {
    let host = config.require(config.host.as_deref(), "host")?;
    let port = *config.require(config.port.as_ref(), "port")?;
    let user = config.require(config.user.as_deref(), "user")?;
    let password = config.require(config.password.as_deref(), "password")?;
    let database = config.require(config.database.as_deref(), "database")?;

    let mut pg_config = Config::new();
    pg_config
        .host(host)
        .port(port)
        .user(user)
        .password(password)
        .dbname(database)
        .connect_timeout(timeout)
        .application_name("tabletalk")
        .options(&format!(
            "-c default_transaction_read_only=on -c statement_timeout={}",
            timeout.as_millis()
        ));

    Ok(pg_config)
}

/// Classify a driver error: lost connections and cancelled statements are transient
fn map_query_error(context: &str, e: &tokio_postgres::Error) -> TalkError {
    if e.is_closed() || e.code() == Some(&SqlState::QUERY_CANCELED) {
        TalkError::backend_unavailable(format!("{context}: {e}"))
    } else {
        TalkError::query_failed(format!("{context}: {e}"))
    }
}

async fn execute_query(client: &Client, query: &str, params: &[SqlParam]) -> Result<RowSet> {
    let stmt = client
        .prepare(query)
        .await
        .map_err(|e| map_query_error("Failed to prepare query", &e))?;

    let bound: Vec<&(dyn ToSql + Sync)> = params
        .iter()
        .map(|param| match param {
            SqlParam::Text(s) => s as &(dyn ToSql + Sync),
            SqlParam::Integer(i) => i as &(dyn ToSql + Sync),
        })
        .collect();

    let rows = client
        .query(&stmt, &bound)
        .await
        .map_err(|e| map_query_error("Failed to execute query", &e))?;

    let mut result = RowSet::new(stmt.columns().iter().map(|c| c.name().to_string()).collect());
    for row in &rows {
        result.rows.push(row_to_json(row)?);
    }

    Ok(result)
}

/// Convert a `PostgreSQL` row to a JSON-safe `Vec`
fn row_to_json(row: &Row) -> Result<Vec<Value>> {
    (0..row.len())
        .map(|idx| get::<JsonCell>(row, idx).map(|cell| cell.map_or(Value::Null, |c| c.0)))
        .collect()
}

/// Read one nullable column value
fn get<'a, T: FromSql<'a>>(row: &'a Row, idx: usize) -> Result<Option<T>> {
    row.try_get::<_, Option<T>>(idx).map_err(|e| {
        TalkError::query_failed(format!(
            "Failed to read column '{}' as {}: {e}",
            row.columns()[idx].name(),
            row.columns()[idx].type_().name()
        ))
    })
}

type BoxError = Box<dyn std::error::Error + Sync + Send>;

/// A non-null column value of any type, converted to JSON
///
/// Types without a natural JSON form (NUMERIC, INTERVAL, INET) become strings,
/// unknown binary types are Base64-encoded.
#[derive(Debug, PartialEq)]
struct JsonCell(Value);

impl<'a> FromSql<'a> for JsonCell {
    fn from_sql(ty: &Type, raw: &'a [u8]) -> std::result::Result<Self, BoxError> {
        let number = |f: f64| serde_json::Number::from_f64(f).map_or(Value::Null, Value::Number); // NaN/Infinity as null

        let value = match *ty {
            Type::BOOL => Value::Bool(bool::from_sql(ty, raw)?),
            Type::INT2 => i16::from_sql(ty, raw)?.into(),
            Type::INT4 => i32::from_sql(ty, raw)?.into(),
            Type::INT8 => i64::from_sql(ty, raw)?.into(),
            Type::OID => u32::from_sql(ty, raw)?.into(),
            Type::FLOAT4 => number(f64::from(f32::from_sql(ty, raw)?)),
            Type::FLOAT8 => number(f64::from_sql(ty, raw)?),
            // NaN and values past 28 digits do not fit a Decimal
            Type::NUMERIC => Decimal::from_sql(ty, raw).map_or(Value::Null, |d| Value::String(d.to_string())),
            Type::JSON | Type::JSONB => Value::from_sql(ty, raw)?,
            Type::BYTEA => Value::String(BASE64.encode(raw)),
            Type::TIMESTAMP => Value::String(
                chrono::NaiveDateTime::from_sql(ty, raw)?.format("%Y-%m-%dT%H:%M:%S").to_string(),
            ),
            Type::TIMESTAMPTZ => Value::String(chrono::DateTime::<chrono::Utc>::from_sql(ty, raw)?.to_rfc3339()),
            Type::DATE => Value::String(chrono::NaiveDate::from_sql(ty, raw)?.format("%Y-%m-%d").to_string()),
            Type::TIME => Value::String(chrono::NaiveTime::from_sql(ty, raw)?.format("%H:%M:%S").to_string()),
            Type::UUID => Value::String(uuid::Uuid::from_sql(ty, raw)?.to_string()),
            Type::INTERVAL => Value::String(interval_text(raw)?),
            Type::INET | Type::CIDR => Value::String(inet_text(raw, *ty == Type::CIDR)?),
            _ => match ty.kind() {
                Kind::Array(_) => Value::Array(
                    Vec::<Option<JsonCell>>::from_sql(ty, raw)?
                        .into_iter()
                        .map(|cell| cell.map_or(Value::Null, |c| c.0))
                        .collect(),
                ),
                Kind::Enum(_) => Value::String(String::from_sql(ty, raw)?),
                _ if <String as FromSql>::accepts(ty) || *ty == Type::XML => Value::String(String::from_sql(ty, raw)?),
                _ => Value::String(BASE64.encode(raw)),
            },
        };

        Ok(Self(value))
    }

    fn accepts(_: &Type) -> bool {
        true
    }
}

/// Render an INTERVAL the way `psql` prints it, e.g. `1 year 2 mons 3 days 04:05:06`
fn interval_text(raw: &[u8]) -> std::result::Result<String, BoxError> {
    let raw: [u8; 16] = raw.try_into()?;
    let micros = i64::from_be_bytes(raw[..8].try_into()?);
    let days = i32::from_be_bytes(raw[8..12].try_into()?);
    let months = i32::from_be_bytes(raw[12..].try_into()?);

    let plural = |n: i32, unit: &str| format!("{n} {unit}{}", if n.abs() == 1 { "" } else { "s" });
    let mut parts = Vec::new();
    if months / 12 != 0 {
        parts.push(plural(months / 12, "year"));
    }
    if months % 12 != 0 {
        parts.push(plural(months % 12, "mon"));
    }
    if days != 0 {
        parts.push(plural(days, "day"));
    }
    if micros != 0 || parts.is_empty() {
        let sign = if micros < 0 { "-" } else { "" };
        let total = micros.unsigned_abs();
        let secs = total / 1_000_000;
        let mut time = format!("{sign}{:02}:{:02}:{:02}", secs / 3600, secs / 60 % 60, secs % 60);
        let frac = total % 1_000_000;
        if frac != 0 {
            time.push_str(format!(".{frac:06}").trim_end_matches('0'));
        }
        parts.push(time);
    }

    Ok(parts.join(" "))
}

/// Render an INET or CIDR address; the prefix length is shown for networks only
fn inet_text(raw: &[u8], cidr: bool) -> std::result::Result<String, BoxError> {
    let [family, bits, _, _, addr @ ..] = raw else {
        return Err("truncated inet value".into());
    };
    let (ip, full) = match (family, addr.len()) {
        (2, 4) => (IpAddr::from(<[u8; 4]>::try_from(addr)?), 32),
        (3, 16) => (IpAddr::from(<[u8; 16]>::try_from(addr)?), 128),
        _ => return Err("unknown inet address family".into()),
    };

    Ok(if cidr || *bits != full { format!("{ip}/{bits}") } else { ip.to_string() })
}
