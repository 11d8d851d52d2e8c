//! Test doubles shared by the integration tests
//!
//! - `FakeProvider`: in-memory tables, records every statement it is asked to run
//! - `RecordingGenerator`: records prompts, replies with fixed fragments or fails

#![allow(dead_code)]

use futures::stream::{self, BoxStream, StreamExt};
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tabletalk::generation::PromptContext;
use tabletalk::{
    ColumnInfo, ConnectionProvider, Generator, IdentifierPolicy, Result, RowSet, SqlParam,
    SqlValidator, TalkError, ToolExecutor,
};

#[derive(Debug, Clone, Default)]
pub struct FakeTable {
    pub columns: Vec<ColumnInfo>,
    pub rows: Vec<Vec<Value>>,
}

#[derive(Debug, Default)]
struct Calls {
    statements: Mutex<Vec<String>>,
    catalog_lookups: AtomicUsize,
    describes: AtomicUsize,
}

/// In-memory provider
///
/// Understands the statements the executor and the classifier templates produce:
/// `SELECT COUNT(*) ... FROM <t>` and `SELECT * FROM <t> ... LIMIT n`.
#[derive(Debug, Clone, Default)]
pub struct FakeProvider {
    tables: BTreeMap<String, FakeTable>,
    unavailable: bool,
    calls: Arc<Calls>,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a table with `id INTEGER` (key) and `title TEXT` columns and `rows` rows
    pub fn with_items(self, name: &str, rows: usize) -> Self {
        let columns = vec![column("id", "INTEGER", false, true), column("title", "TEXT", true, false)];
        let rows = (0..rows).map(|i| vec![json!(i + 1), json!(format!("item {}", i + 1))]).collect();
        self.with_table(name, FakeTable { columns, rows })
    }

    pub fn with_table(mut self, name: &str, table: FakeTable) -> Self {
        self.tables.insert(name.to_string(), table);
        self
    }

    /// Every call fails as if the database were down
    pub fn unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }

    /// Statements passed to `run`, in order
    pub fn statements(&self) -> Vec<String> {
        self.calls.statements.lock().unwrap().clone()
    }

    pub fn catalog_lookups(&self) -> usize {
        self.calls.catalog_lookups.load(Ordering::SeqCst)
    }

    pub fn describes(&self) -> usize {
        self.calls.describes.load(Ordering::SeqCst)
    }

    /// Nothing at all reached the database
    pub fn untouched(&self) -> bool {
        self.statements().is_empty() && self.catalog_lookups() == 0 && self.describes() == 0
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable {
            Err(TalkError::backend_unavailable("connection refused (fake)"))
        } else {
            Ok(())
        }
    }

    fn table_in(&self, statement: &str) -> Result<&FakeTable> {
        let upper = statement.to_ascii_uppercase();
        let at = upper.find(" FROM ").ok_or_else(|| TalkError::query_failed("no FROM"))?;
        let name = statement[at + 6..]
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .trim_matches(|c| c == '"' || c == '`');
        self.tables.get(name).ok_or_else(|| TalkError::query_failed(format!("no such table: {name}")))
    }
}

pub fn column(name: &str, data_type: &str, nullable: bool, is_key: bool) -> ColumnInfo {
    ColumnInfo { name: name.to_string(), data_type: data_type.to_string(), nullable, is_key }
}

/// Trailing `LIMIT n` of a statement
fn trailing_limit(statement: &str) -> Option<usize> {
    let words: Vec<&str> = statement.split_whitespace().collect();
    let at = words.iter().rposition(|w| w.eq_ignore_ascii_case("LIMIT"))?;
    words.get(at + 1)?.trim_end_matches(';').parse().ok()
}

impl ConnectionProvider for FakeProvider {
    async fn run(&self, statement: &str, _params: &[SqlParam]) -> Result<RowSet> {
        self.calls.statements.lock().unwrap().push(statement.to_string());
        self.check_available()?;

        let table = self.table_in(statement)?;
        if statement.to_ascii_uppercase().contains("COUNT(*)") {
            return Ok(RowSet { columns: vec!["record_count".into()], rows: vec![vec![json!(table.rows.len())]] });
        }

        let limit = trailing_limit(statement).unwrap_or(usize::MAX);
        Ok(RowSet {
            columns: table.columns.iter().map(|c| c.name.clone()).collect(),
            rows: table.rows.iter().take(limit).cloned().collect(),
        })
    }

    async fn list_tables(&self) -> Result<BTreeSet<String>> {
        self.calls.catalog_lookups.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        Ok(self.tables.keys().cloned().collect())
    }

    async fn describe_columns(&self, table: &str) -> Result<Vec<ColumnInfo>> {
        self.calls.describes.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        Ok(self.tables.get(table).map(|t| t.columns.clone()).unwrap_or_default())
    }
}

/// Executor over `provider` with default validator and identifier policy
pub fn executor(provider: FakeProvider, max_rows: u64) -> ToolExecutor<FakeProvider> {
    ToolExecutor::new(provider, SqlValidator::with_max_rows(max_rows), IdentifierPolicy::default())
}

/// Generator that records prompts
#[derive(Debug, Clone, Default)]
pub struct RecordingGenerator {
    fragments: Vec<String>,
    fail_after: Option<usize>,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl RecordingGenerator {
    pub fn replying(fragments: &[&str]) -> Self {
        Self { fragments: fragments.iter().map(|f| (*f).to_string()).collect(), ..Self::default() }
    }

    /// Emit `n` fragments, then fail
    pub fn failing_after(mut self, n: usize) -> Self {
        self.fail_after = Some(n);
        self
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

impl Generator for RecordingGenerator {
    async fn generate(&self, context: &PromptContext<'_>) -> Result<String> {
        self.prompts.lock().unwrap().push(context.render_prompt());
        match self.fail_after {
            Some(_) => Err(TalkError::generation_failed("model offline (fake)")),
            None => Ok(self.fragments.concat()),
        }
    }

    fn generate_streaming<'a>(&'a self, context: &'a PromptContext<'a>) -> BoxStream<'a, Result<String>> {
        self.prompts.lock().unwrap().push(context.render_prompt());

        let mut items: Vec<Result<String>> = self.fragments.iter().cloned().map(Ok).collect();
        if let Some(n) = self.fail_after {
            items.truncate(n);
            items.push(Err(TalkError::generation_failed("model offline (fake)")));
        }
        stream::iter(items).boxed()
    }
}
