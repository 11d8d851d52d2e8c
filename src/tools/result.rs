//! Columnar query results
//!
//! Every tool returns a [`QueryResult`]. Values are stored per column, in column
//! order, so a result can be handed to the generation backend without row-major
//! JSON objects losing column order.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::engine::RowSet;

/// One named column and its values in row order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultColumn {
    pub name: String,
    pub values: Vec<Value>,
}

/// Result of one tool invocation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub columns: Vec<ResultColumn>,
    pub row_count: usize,
    /// True when the row cap was applied and more rows may exist
    pub truncated: bool,
}

impl QueryResult {
    /// Build from a provider row set, enforcing `cap`
    ///
    /// Rows past the cap are dropped. When `cap_injected` is set (the statement's limit
    /// was added or lowered to the cap), a result that exactly fills the cap is also
    /// reported as truncated.
    #[must_use]
    pub fn from_row_set(rows: RowSet, cap: u64, cap_injected: bool) -> Self {
        let cap = usize::try_from(cap).unwrap_or(usize::MAX);
        let over_cap = rows.rows.len() > cap;
        let kept = rows.rows.len().min(cap);

        let mut columns: Vec<ResultColumn> = rows
            .columns
            .into_iter()
            .map(|name| ResultColumn { name, values: Vec::with_capacity(kept) })
            .collect();

        for row in rows.rows.into_iter().take(kept) {
            for (column, value) in columns.iter_mut().zip(row) {
                column.values.push(value);
            }
        }

        Self { columns, row_count: kept, truncated: over_cap || (cap_injected && kept == cap) }
    }

    /// Build from named columns that already respect the cap
    #[must_use]
    pub fn from_columns(columns: Vec<(String, Vec<Value>)>, truncated: bool) -> Self {
        let row_count = columns.first().map_or(0, |(_, values)| values.len());
        Self {
            columns: columns.into_iter().map(|(name, values)| ResultColumn { name, values }).collect(),
            row_count,
            truncated,
        }
    }

    /// Values of the named column
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&[Value]> {
        self.columns.iter().find(|c| c.name == name).map(|c| c.values.as_slice())
    }

    #[must_use]
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// One row, in column order
    #[must_use]
    pub fn row(&self, index: usize) -> Option<Vec<&Value>> {
        (index < self.row_count)
            .then(|| self.columns.iter().filter_map(|c| c.values.get(index)).collect())
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.row_count == 0
    }
}
