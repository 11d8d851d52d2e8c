//! Identifier policy for table names taken from callers
//!
//! A table name argument must look like a plain SQL identifier before it is even
//! compared against the live catalog. Only the catalog's own spelling is ever
//! placed in a statement, and always quoted.

use regex::Regex;
use std::sync::OnceLock;

/// Longest identifier accepted by default (PostgreSQL's `NAMEDATALEN - 1`)
pub const DEFAULT_MAX_IDENTIFIER_LEN: usize = 63;

const IDENTIFIER_PATTERN: &str = r"^[A-Za-z_][A-Za-z0-9_]*$";

fn pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(IDENTIFIER_PATTERN).ok()).as_ref()
}

/// Whether `name` matches the identifier allow-list, ignoring length
///
/// Fails closed if the pattern cannot be compiled.
#[must_use]
pub fn looks_like_identifier(name: &str) -> bool {
    pattern().is_some_and(|re| re.is_match(name))
}

/// Allow-list applied to table name arguments
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdentifierPolicy {
    pub max_len: usize,
}

impl Default for IdentifierPolicy {
    fn default() -> Self {
        Self { max_len: DEFAULT_MAX_IDENTIFIER_LEN }
    }
}

impl IdentifierPolicy {
    #[must_use]
    pub const fn new(max_len: usize) -> Self {
        Self { max_len }
    }

    #[must_use]
    pub fn allows(&self, name: &str) -> bool {
        !name.is_empty() && name.len() <= self.max_len && looks_like_identifier(name)
    }
}

/// How a dialect quotes identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QuoteStyle {
    /// `"name"` (PostgreSQL, SQLite, ANSI)
    #[default]
    Double,
    /// `` `name` `` (MySQL)
    Backtick,
}

impl QuoteStyle {
    /// Quote an identifier, doubling any embedded quote character
    #[must_use]
    pub fn quote(self, name: &str) -> String {
        let q = match self {
            Self::Double => '"',
            Self::Backtick => '`',
        };
        let escaped = name.replace(q, &format!("{q}{q}"));
        format!("{q}{escaped}{q}")
    }
}
