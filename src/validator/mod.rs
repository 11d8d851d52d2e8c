//! SQL Validation for Caller-Supplied Statements
//!
//! Every statement that reaches a connection provider from caller input passes through
//! this module first. The validator is a pure function: it never touches the database
//! and the same input always yields the same verdict.
//!
//! # Validation Strategy
//! - Tokenize once with a quote-aware scanner ([`scanner`]); structure is never
//!   inferred from text inside string literals or quoted identifiers
//! - The first word must be `SELECT`
//! - Forbidden keywords and comment delimiters are rejected outside quotes
//! - A terminator followed by more content is a stacked statement
//! - Exactly one top-level row limit, never above the configured ceiling
//!
//! # Check Order
//! `not-a-select`, then `forbidden-keyword:<NAME>`, then `stacked-statement`, then
//! `malformed`. The first failing check decides the reason.

pub mod scanner;

use std::collections::BTreeSet;
use std::fmt;

use serde::{Serialize, Serializer};

use crate::error::{Result, TalkError};
use scanner::{ScanError, Token, TokenKind};

/// Default row ceiling for every statement
pub const DEFAULT_MAX_ROWS: u64 = 1000;

/// Keywords rejected anywhere outside quoted text
pub const DEFAULT_FORBIDDEN_KEYWORDS: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "DROP", "ALTER", "CREATE", "TRUNCATE", "GRANT", "REVOKE", "EXEC",
    "EXECUTE", "CALL", "MERGE", "INTO",
];

/// Why a statement was rejected
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    NotASelect,
    /// Carries the keyword in upper case, or the comment delimiter (`--`, `#`, `/*`)
    ForbiddenKeyword(String),
    StackedStatement,
    Malformed,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotASelect => f.write_str("not-a-select"),
            Self::ForbiddenKeyword(keyword) => write!(f, "forbidden-keyword:{keyword}"),
            Self::StackedStatement => f.write_str("stacked-statement"),
            Self::Malformed => f.write_str("malformed"),
        }
    }
}

impl Serialize for RejectReason {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Outcome of validating one statement
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum ValidationVerdict {
    /// Safe to execute as `statement`, which returns at most `applied_limit` rows
    Accepted { statement: String, applied_limit: u64 },
    Rejected { reason: RejectReason },
}

impl ValidationVerdict {
    #[must_use]
    pub const fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }

    /// The rejection reason, if any
    #[must_use]
    pub const fn reason(&self) -> Option<&RejectReason> {
        match self {
            Self::Rejected { reason } => Some(reason),
            Self::Accepted { .. } => None,
        }
    }

    /// Convert into the executable statement and its applied limit
    ///
    /// # Errors
    /// Returns `TalkError::ValidationRejected` for a rejected statement.
    pub fn into_result(self) -> Result<(String, u64)> {
        match self {
            Self::Accepted { statement, applied_limit } => Ok((statement, applied_limit)),
            Self::Rejected { reason } => Err(TalkError::validation_rejected(reason)),
        }
    }
}

/// Row limit detected in, or injected into, a statement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RowLimit {
    /// Value the caller wrote; `None` when absent or `LIMIT ALL`
    pub requested: Option<u64>,
    /// Value the executed statement carries
    pub applied: u64,
    /// True when the validator added or lowered the limit
    pub rewritten: bool,
}

/// Everything the validator learned about a statement
///
/// Produced by [`SqlValidator::inspect`]. `rewritten` is only set when the statement
/// passes every check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Statement {
    pub raw: String,
    /// Code tokens (comments dropped) joined by single spaces, words upper-cased
    pub normalized: String,
    pub leading_verb: Option<String>,
    pub forbidden_hits: Vec<String>,
    pub stacked: bool,
    /// Internal cause for a malformed verdict, for logs only
    pub malformed: Option<&'static str>,
    pub row_limit: Option<RowLimit>,
    pub rewritten: Option<String>,
}

impl Statement {
    /// The verdict implied by this inspection
    #[must_use]
    pub fn verdict(&self) -> ValidationVerdict {
        let reason = if self.leading_verb.as_deref() != Some("SELECT") {
            Some(RejectReason::NotASelect)
        } else if let Some(hit) = self.forbidden_hits.first() {
            Some(RejectReason::ForbiddenKeyword(hit.clone()))
        } else if self.stacked {
            Some(RejectReason::StackedStatement)
        } else if self.malformed.is_some() {
            Some(RejectReason::Malformed)
        } else {
            None
        };

        match (reason, &self.rewritten, self.row_limit) {
            (Some(reason), _, _) => ValidationVerdict::Rejected { reason },
            (None, Some(statement), Some(limit)) => ValidationVerdict::Accepted {
                statement: statement.clone(),
                applied_limit: limit.applied,
            },
            // Unreachable in practice: a statement without problems always gets a plan
            (None, _, _) => ValidationVerdict::Rejected { reason: RejectReason::Malformed },
        }
    }
}

/// Validator configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatorConfig {
    pub max_rows: u64,
    pub forbidden_keywords: Vec<String>,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            max_rows: DEFAULT_MAX_ROWS,
            forbidden_keywords: DEFAULT_FORBIDDEN_KEYWORDS.iter().map(|k| (*k).to_string()).collect(),
        }
    }
}

/// Configured SQL validator
#[derive(Debug, Clone)]
pub struct SqlValidator {
    max_rows: u64,
    forbidden: BTreeSet<String>,
}

impl Default for SqlValidator {
    fn default() -> Self {
        Self::new(ValidatorConfig::default())
    }
}

impl SqlValidator {
    #[must_use]
    pub fn new(config: ValidatorConfig) -> Self {
        Self {
            max_rows: config.max_rows,
            forbidden: config.forbidden_keywords.iter().map(|k| k.trim().to_ascii_uppercase()).collect(),
        }
    }

    /// Default forbidden keywords with a custom row ceiling
    #[must_use]
    pub fn with_max_rows(max_rows: u64) -> Self {
        Self::new(ValidatorConfig { max_rows, ..ValidatorConfig::default() })
    }

    #[must_use]
    pub const fn max_rows(&self) -> u64 {
        self.max_rows
    }

    /// Same keyword list with the ceiling lowered to `max_rows`; never raises it
    #[must_use]
    pub fn capped(&self, max_rows: u64) -> Self {
        Self { max_rows: self.max_rows.min(max_rows), forbidden: self.forbidden.clone() }
    }

    /// Validate a raw statement
    #[must_use]
    pub fn validate(&self, raw: &str) -> ValidationVerdict {
        let statement = self.inspect(raw);
        let verdict = statement.verdict();
        match &verdict {
            ValidationVerdict::Rejected { reason } => {
                tracing::warn!(%reason, cause = statement.malformed, "statement rejected");
            }
            ValidationVerdict::Accepted { applied_limit, .. } => {
                if statement.row_limit.is_some_and(|l| l.rewritten) {
                    tracing::debug!(applied_limit, "row limit enforced by rewrite");
                }
            }
        }
        verdict
    }

    /// Tokenize and analyze a statement without deciding on a verdict
    #[must_use]
    pub fn inspect(&self, raw: &str) -> Statement {
        let trimmed = raw.trim();
        let scan = scanner::scan(trimmed);

        let forbidden_hits: Vec<String> = scan
            .tokens
            .iter()
            .filter_map(|token| match token.kind {
                TokenKind::LineComment if token.text.starts_with('#') => Some("#".to_string()),
                TokenKind::LineComment => Some("--".to_string()),
                TokenKind::BlockComment => Some("/*".to_string()),
                TokenKind::Word => {
                    let upper = token.text.to_ascii_uppercase();
                    self.forbidden.contains(&upper).then_some(upper)
                }
                _ => None,
            })
            .collect();

        let code: Vec<Token<'_>> = scan.tokens.iter().copied().filter(|t| !t.is_comment()).collect();

        let leading_verb = code
            .first()
            .filter(|t| t.kind == TokenKind::Word)
            .map(|t| t.text.to_ascii_uppercase());

        let normalized = code
            .iter()
            .map(|t| if t.kind == TokenKind::Word { t.text.to_ascii_uppercase() } else { t.text.to_string() })
            .collect::<Vec<_>>()
            .join(" ");

        // Everything before the first terminator; anything after it makes a stacked statement
        let terminator = code.iter().position(|t| t.kind == TokenKind::Semicolon);
        let stacked = terminator
            .is_some_and(|at| code[at..].iter().any(|t| t.kind != TokenKind::Semicolon));
        let body_tokens = &code[..terminator.unwrap_or(code.len())];
        let body_end = terminator.map_or(trimmed.len(), |at| code[at].start);

        let plan = plan_limit(body_tokens);
        let malformed = match (scan.error, &plan) {
            (Some(error), _) => Some(describe_scan_error(error)),
            (None, _) if body_tokens.iter().any(|t| t.kind == TokenKind::Dollar) => {
                Some("dollar-quoted string")
            }
            (None, Err(cause)) => Some(*cause),
            (None, Ok(_)) => None,
        };

        let (row_limit, rewritten) = match plan {
            Ok(plan) => {
                let (limit, text) = plan.apply(&trimmed[..body_end], self.max_rows);
                (Some(limit), Some(text))
            }
            Err(_) => (None, None),
        };

        let clean = leading_verb.as_deref() == Some("SELECT")
            && forbidden_hits.is_empty()
            && !stacked
            && malformed.is_none();

        Statement {
            raw: raw.to_string(),
            normalized,
            leading_verb,
            forbidden_hits,
            stacked,
            malformed,
            row_limit: if clean { row_limit } else { None },
            rewritten: if clean { rewritten } else { None },
        }
    }
}

/// Validate with the default forbidden keyword list
#[must_use]
pub fn validate(raw: &str, max_rows: u64) -> ValidationVerdict {
    SqlValidator::with_max_rows(max_rows).validate(raw)
}

const fn describe_scan_error(error: ScanError) -> &'static str {
    match error {
        ScanError::UnterminatedQuote { .. } => "unterminated quote",
        ScanError::UnterminatedComment { .. } => "unterminated comment",
        ScanError::AmbiguousEscape { .. } => "backslash-escaped quote",
    }
}

/// Where the row limit lives, or where one must go
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LimitPlan {
    /// No top-level LIMIT; insert before the byte offset if set, otherwise append
    Missing { insert_at: Option<usize> },
    /// Top-level LIMIT whose count token spans `start..end`
    Found { requested: Option<u64>, start: usize, end: usize },
}

impl LimitPlan {
    /// Produce the executable text for `body` (the statement without terminators)
    fn apply(self, body: &str, max_rows: u64) -> (RowLimit, String) {
        match self {
            Self::Missing { insert_at: Some(at) } => (
                RowLimit { requested: None, applied: max_rows, rewritten: true },
                format!("{}LIMIT {max_rows} {}", &body[..at], &body[at..]),
            ),
            Self::Missing { insert_at: None } => (
                RowLimit { requested: None, applied: max_rows, rewritten: true },
                format!("{} LIMIT {max_rows}", body.trim_end()),
            ),
            Self::Found { requested: Some(n), .. } if n <= max_rows => (
                RowLimit { requested: Some(n), applied: n, rewritten: false },
                body.trim_end().to_string(),
            ),
            Self::Found { requested, start, end } => (
                RowLimit { requested, applied: max_rows, rewritten: true },
                format!("{}{max_rows}{}", &body[..start], &body[end..]).trim_end().to_string(),
            ),
        }
    }
}

/// Locate the single top-level row-limit clause
fn plan_limit(tokens: &[Token<'_>]) -> std::result::Result<LimitPlan, &'static str> {
    let mut depth = 0usize;
    let mut limit_at = None;
    let mut insert_at = None;

    for (i, token) in tokens.iter().enumerate() {
        match token.kind {
            TokenKind::OpenParen => depth += 1,
            TokenKind::CloseParen => {
                depth = depth.checked_sub(1).ok_or("unbalanced parentheses")?;
            }
            TokenKind::Word if depth == 0 => {
                if token.is_word("LIMIT") {
                    if limit_at.is_some() {
                        return Err("more than one top-level LIMIT");
                    }
                    limit_at = Some(i);
                } else if token.is_word("FETCH") {
                    return Err("FETCH row-limit clause");
                } else if insert_at.is_none() && (token.is_word("OFFSET") || token.is_word("FOR")) {
                    insert_at = Some(token.start);
                }
            }
            _ => {}
        }
    }

    if depth != 0 {
        return Err("unbalanced parentheses");
    }

    match limit_at {
        None => Ok(LimitPlan::Missing { insert_at }),
        Some(i) => parse_limit_value(&tokens[i + 1..]),
    }
}

/// Parse `ALL`, `<count>` or MySQL `<offset>, <count>` after `LIMIT`
fn parse_limit_value(rest: &[Token<'_>]) -> std::result::Result<LimitPlan, &'static str> {
    let first = rest.first().ok_or("LIMIT without a value")?;

    if first.is_word("ALL") {
        ensure_clause_ends(&rest[1..])?;
        return Ok(LimitPlan::Found { requested: None, start: first.start, end: first.end });
    }

    if first.kind != TokenKind::Number {
        return Err("LIMIT value is not an integer");
    }

    let (count, tail) = if rest.get(1).is_some_and(|t| t.kind == TokenKind::Comma) {
        first.text.parse::<u64>().map_err(|_| "LIMIT offset is not an integer")?;
        let count = rest
            .get(2)
            .filter(|t| t.kind == TokenKind::Number)
            .ok_or("LIMIT offset without a count")?;
        (count, &rest[3..])
    } else {
        (first, &rest[1..])
    };

    let requested = count.text.parse::<u64>().map_err(|_| "LIMIT value is not an integer")?;
    ensure_clause_ends(tail)?;

    Ok(LimitPlan::Found { requested: Some(requested), start: count.start, end: count.end })
}

/// The count must stand alone: only a keyword (OFFSET, FOR, ...) or the end may follow
fn ensure_clause_ends(tail: &[Token<'_>]) -> std::result::Result<(), &'static str> {
    match tail.first() {
        None => Ok(()),
        Some(token) if token.kind == TokenKind::Word => Ok(()),
        Some(_) => Err("LIMIT value is an expression"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn accepted(sql: &str) -> String {
        match validate(sql, DEFAULT_MAX_ROWS) {
            ValidationVerdict::Accepted { statement, .. } => statement,
            ValidationVerdict::Rejected { reason } => panic!("expected accept, got {reason}"),
        }
    }

    fn rejected(sql: &str) -> String {
        match validate(sql, DEFAULT_MAX_ROWS) {
            ValidationVerdict::Rejected { reason } => reason.to_string(),
            ValidationVerdict::Accepted { statement, .. } => panic!("expected reject, got {statement}"),
        }
    }

    // Leading verb

    #[test]
    fn test_plain_select_gets_limit() {
        insta::assert_snapshot!(accepted("SELECT * FROM web_items"), @"SELECT * FROM web_items LIMIT 1000");
    }

    #[test]
    fn test_not_a_select() {
        assert_eq!(rejected(""), "not-a-select");
        assert_eq!(rejected("   "), "not-a-select");
        assert_eq!(rejected("SHOW TABLES"), "not-a-select");
        assert_eq!(rejected("WITH t AS (SELECT 1) SELECT * FROM t"), "not-a-select");
        assert_eq!(rejected("SELECTED * FROM t"), "not-a-select");
        assert_eq!(rejected("'SELECT' * FROM t"), "not-a-select");
        assert_eq!(rejected("(SELECT 1)"), "not-a-select");
    }

    #[test]
    fn test_write_verbs_are_not_selects() {
        // Verb check runs before the keyword check
        assert_eq!(rejected("DELETE FROM users"), "not-a-select");
        assert_eq!(rejected("DROP TABLE users"), "not-a-select");
    }

    #[test]
    fn test_case_insensitive_verb() {
        insta::assert_snapshot!(accepted("select id from users"), @"select id from users LIMIT 1000");
    }

    // Forbidden keywords

    #[test]
    fn test_forbidden_keyword_outside_literal() {
        assert_eq!(
            rejected("SELECT * FROM users WHERE id IN (SELECT 1); DELETE FROM users"),
            "forbidden-keyword:DELETE"
        );
        assert_eq!(rejected("SELECT * INTO backup FROM users"), "forbidden-keyword:INTO");
        assert_eq!(rejected("select exec from t"), "forbidden-keyword:EXEC");
    }

    #[test]
    fn test_forbidden_keyword_inside_literal_is_fine() {
        insta::assert_snapshot!(
            accepted("select name from users where note = 'please DELETE my data'"),
            @"select name from users where note = 'please DELETE my data' LIMIT 1000"
        );
    }

    #[test]
    fn test_forbidden_keyword_as_quoted_identifier_is_fine() {
        insta::assert_snapshot!(accepted(r#"SELECT "update" FROM t"#), @r#"SELECT "update" FROM t LIMIT 1000"#);
    }

    #[test]
    fn test_keyword_substrings_are_not_hits() {
        insta::assert_snapshot!(
            accepted("SELECT updated_at, created_by FROM audit_log"),
            @"SELECT updated_at, created_by FROM audit_log LIMIT 1000"
        );
    }

    #[test]
    fn test_comments_are_rejected() {
        assert_eq!(rejected("SELECT 1 -- sneaky"), "forbidden-keyword:--");
        assert_eq!(rejected("SELECT /* hi */ 1"), "forbidden-keyword:/*");
        assert_eq!(rejected("-- note\nSELECT 1"), "forbidden-keyword:--");
        assert_eq!(rejected("/* x */ DELETE FROM t"), "not-a-select");
    }

    #[test]
    fn test_hash_comments_are_rejected() {
        assert_eq!(rejected("SELECT 1 #'\nINTO OUTFILE '/tmp/pwn' #'"), "forbidden-keyword:#");
        assert_eq!(rejected("SELECT * FROM big_table #"), "forbidden-keyword:#");
        assert_eq!(rejected("SELECT * FROM t # LIMIT 5"), "forbidden-keyword:#");
        accepted("SELECT '#tag' FROM t");
    }

    #[test]
    fn test_custom_forbidden_list() {
        let validator = SqlValidator::new(ValidatorConfig {
            max_rows: 10,
            forbidden_keywords: vec!["pg_sleep".to_string()],
        });
        assert_eq!(
            validator.validate("SELECT pg_sleep(5)"),
            ValidationVerdict::Rejected { reason: RejectReason::ForbiddenKeyword("PG_SLEEP".into()) }
        );
        assert!(validator.validate("SELECT 1 INTO x").is_accepted());
    }

    // Stacked statements

    #[test]
    fn test_stacked_statement() {
        assert_eq!(rejected("SELECT 1; SELECT 2"), "stacked-statement");
        assert_eq!(rejected("SELECT 1;;SELECT 2"), "stacked-statement");
    }

    #[test]
    fn test_stacked_drop_is_a_forbidden_keyword() {
        assert_eq!(
            rejected("SELECT * FROM web_items; DROP TABLE web_items;"),
            "forbidden-keyword:DROP"
        );
    }

    #[test]
    fn test_trailing_terminators_are_stripped() {
        insta::assert_snapshot!(accepted("SELECT 1;"), @"SELECT 1 LIMIT 1000");
        insta::assert_snapshot!(accepted("SELECT 1 ;; "), @"SELECT 1 LIMIT 1000");
        insta::assert_snapshot!(accepted("SELECT 2 LIMIT 5;"), @"SELECT 2 LIMIT 5");
    }

    #[test]
    fn test_semicolon_in_literal_is_not_a_terminator() {
        insta::assert_snapshot!(accepted("SELECT 'a; b'"), @"SELECT 'a; b' LIMIT 1000");
    }

    // Malformed

    #[test]
    fn test_malformed_quotes() {
        assert_eq!(rejected("SELECT 'unterminated"), "malformed");
        assert_eq!(rejected(r#"SELECT "col FROM t"#), "malformed");
        assert_eq!(rejected(r"SELECT 'a\' ; SELECT 1"), "malformed");
        assert_eq!(rejected("SELECT $$; x $$"), "stacked-statement");
        assert_eq!(rejected("SELECT $$x$$"), "malformed");
    }

    #[test]
    fn test_malformed_limits() {
        assert_eq!(rejected("SELECT * FROM t LIMIT"), "malformed");
        assert_eq!(rejected("SELECT * FROM t LIMIT $1"), "malformed");
        assert_eq!(rejected("SELECT * FROM t LIMIT 10 + 5000"), "malformed");
        assert_eq!(rejected("SELECT * FROM t LIMIT (10)"), "malformed");
        assert_eq!(rejected("SELECT * FROM t LIMIT 1.5"), "malformed");
        assert_eq!(rejected("SELECT * FROM t LIMIT 1 LIMIT 2"), "malformed");
        assert_eq!(rejected("SELECT * FROM t FETCH FIRST 5 ROWS ONLY"), "malformed");
        assert_eq!(rejected("SELECT * FROM t WHERE (a = 1"), "malformed");
        assert_eq!(rejected("SELECT * FROM t WHERE a = 1)"), "malformed");
    }

    // Row limits

    #[test]
    fn test_limit_below_cap_is_kept() {
        assert_eq!(
            validate("SELECT * FROM t LIMIT 10", 1000),
            ValidationVerdict::Accepted { statement: "SELECT * FROM t LIMIT 10".into(), applied_limit: 10 }
        );
    }

    #[test]
    fn test_limit_above_cap_is_lowered() {
        assert_eq!(
            validate("SELECT * FROM t LIMIT 999999", 1000),
            ValidationVerdict::Accepted { statement: "SELECT * FROM t LIMIT 1000".into(), applied_limit: 1000 }
        );
    }

    #[test]
    fn test_capped_only_lowers() {
        let validator = SqlValidator::with_max_rows(100);
        assert_eq!(validator.capped(10).max_rows(), 10);
        assert_eq!(validator.capped(5000).max_rows(), 100);
        assert_eq!(
            validator.capped(10).validate("SELECT * FROM t LIMIT 50"),
            ValidationVerdict::Accepted { statement: "SELECT * FROM t LIMIT 10".into(), applied_limit: 10 }
        );
    }

    #[test]
    fn test_limit_all_is_lowered() {
        insta::assert_snapshot!(accepted("SELECT * FROM t LIMIT ALL"), @"SELECT * FROM t LIMIT 1000");
    }

    #[test]
    fn test_subquery_limit_is_not_top_level() {
        insta::assert_snapshot!(
            accepted("SELECT * FROM (SELECT * FROM t LIMIT 50000) AS sub"),
            @"SELECT * FROM (SELECT * FROM t LIMIT 50000) AS sub LIMIT 1000"
        );
    }

    #[test]
    fn test_limit_inserted_before_offset() {
        insta::assert_snapshot!(
            accepted("SELECT * FROM t ORDER BY id OFFSET 20"),
            @"SELECT * FROM t ORDER BY id LIMIT 1000 OFFSET 20"
        );
    }

    #[test]
    fn test_limit_with_offset_keeps_offset() {
        insta::assert_snapshot!(
            accepted("SELECT * FROM t LIMIT 5000 OFFSET 20"),
            @"SELECT * FROM t LIMIT 1000 OFFSET 20"
        );
    }

    #[test]
    fn test_mysql_offset_count_form() {
        insta::assert_snapshot!(accepted("SELECT * FROM t LIMIT 20, 5000"), @"SELECT * FROM t LIMIT 20, 1000");
        assert_eq!(
            validate("SELECT * FROM t LIMIT 20, 5", 1000),
            ValidationVerdict::Accepted { statement: "SELECT * FROM t LIMIT 20, 5".into(), applied_limit: 5 }
        );
    }

    #[test]
    fn test_limit_keyword_in_literal_is_ignored() {
        insta::assert_snapshot!(
            accepted("SELECT 'LIMIT 999999' AS note"),
            @"SELECT 'LIMIT 999999' AS note LIMIT 1000"
        );
    }

    #[test]
    fn test_exactly_one_limit_clause_in_output() {
        for sql in [
            "SELECT * FROM t",
            "SELECT * FROM t LIMIT 3",
            "SELECT * FROM t LIMIT 123456",
            "select * from t limit all",
            "SELECT * FROM t OFFSET 4",
        ] {
            let validator = SqlValidator::with_max_rows(100);
            let ValidationVerdict::Accepted { statement, applied_limit } = validator.validate(sql) else {
                panic!("rejected: {sql}");
            };
            let plan = plan_limit(&scanner::scan(&statement).tokens).unwrap();
            assert!(matches!(plan, LimitPlan::Found { .. }), "{statement}");
            assert!(applied_limit <= 100);
        }
    }

    // Inspection

    #[test]
    fn test_inspect_reports_everything() {
        let statement = SqlValidator::default().inspect("select a from t; drop table t");
        assert_eq!(statement.leading_verb.as_deref(), Some("SELECT"));
        assert_eq!(statement.forbidden_hits, vec!["DROP".to_string()]);
        assert!(statement.stacked);
        assert_eq!(statement.normalized, "SELECT a FROM t ; DROP TABLE t");
        assert_eq!(statement.rewritten, None);
    }

    #[test]
    fn test_verdict_is_deterministic() {
        let validator = SqlValidator::default();
        let sql = "SELECT * FROM t WHERE x = 'DROP' LIMIT 5000";
        assert_eq!(validator.validate(sql), validator.validate(sql));
    }

    #[test]
    fn test_verdict_serializes() {
        let verdict = validate("DROP TABLE x", 10);
        assert_eq!(
            serde_json::to_value(&verdict).unwrap(),
            serde_json::json!({"verdict": "rejected", "reason": "not-a-select"})
        );
    }

    #[test]
    fn test_into_result() {
        let err = validate("SELECT 1; SELECT 2", 10).into_result().unwrap_err();
        assert_eq!(err, TalkError::validation_rejected(RejectReason::StackedStatement));
        assert_eq!(validate("SELECT 1", 10).into_result().unwrap(), ("SELECT 1 LIMIT 10".to_string(), 10));
    }
}
