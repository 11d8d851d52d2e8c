//! Intent Classification
//!
//! Maps a natural-language utterance to at most one catalog tool using ordered trigger
//! tables. Rules are tried in priority order and the first rule with a matching phrase
//! wins; there is no scoring.
//!
//! # Matching
//! - The utterance is lowercased and split into words (letters, digits, underscore)
//! - A phrase matches when its words appear contiguously in the utterance
//! - Table-requiring tools take the first word that names a known table
//!
//! `execute_select` intents never carry caller text: the statement comes from a
//! [`SelectTemplate`] filled with the catalog's quoted table name.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::debug;

use crate::tools::{QuoteStyle, ToolCall, ToolName};

/// Pre-approved statement shapes for `execute_select` intents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectTemplate {
    /// A few rows in storage order
    #[default]
    Sample,
    /// A few rows, newest first by the leading column
    Recent,
}

impl SelectTemplate {
    /// Render for an already-quoted table name
    #[must_use]
    pub fn render(self, quoted_table: &str) -> String {
        match self {
            Self::Sample => format!("SELECT * FROM {quoted_table} LIMIT 5"),
            Self::Recent => format!("SELECT * FROM {quoted_table} ORDER BY 1 DESC LIMIT 5"),
        }
    }
}

/// One row of a trigger table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerRule {
    pub tool: ToolName,
    pub phrases: Vec<String>,
    /// Statement shape for `execute_select` rules
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<SelectTemplate>,
}

impl TriggerRule {
    fn new(tool: ToolName, phrases: &[&str]) -> Self {
        Self { tool, phrases: phrases.iter().map(|p| (*p).to_string()).collect(), template: None }
    }

    fn with_template(mut self, template: SelectTemplate) -> Self {
        self.template = Some(template);
        self
    }
}

/// Trigger tables, in priority order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifierConfig {
    pub rules: Vec<TriggerRule>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            rules: vec![
                TriggerRule::new(
                    ToolName::GetAllSchemas,
                    &[
                        "most columns",
                        "fewest columns",
                        "least columns",
                        "compare schemas",
                        "compare the schemas",
                        "all schemas",
                        "all the schemas",
                        "every schema",
                        "column counts",
                        "columns per table",
                        "columns each table",
                        "columns of all",
                        "columns of every",
                        "columns of each",
                        "compare columns",
                        "compare the columns",
                        "which table has the most",
                        "which table has the fewest",
                        "widest table",
                        "narrowest table",
                    ],
                ),
                TriggerRule::new(
                    ToolName::GetTables,
                    &[
                        "what tables",
                        "which tables",
                        "list tables",
                        "list the tables",
                        "list all tables",
                        "show tables",
                        "show me the tables",
                        "how many tables",
                        "available tables",
                        "tables",
                    ],
                ),
                TriggerRule::new(
                    ToolName::DescribeTable,
                    &[
                        "structure of",
                        "schema of",
                        "schema for",
                        "columns in",
                        "columns of",
                        "column names",
                        "what columns",
                        "fields in",
                        "describe",
                    ],
                ),
                TriggerRule::new(
                    ToolName::CountRecords,
                    &[
                        "how many records",
                        "how many rows",
                        "how many entries",
                        "number of records",
                        "number of rows",
                        "record count",
                        "row count",
                        "count",
                    ],
                ),
                TriggerRule::new(ToolName::ExecuteSelect, &["recent", "latest", "newest", "last few"])
                    .with_template(SelectTemplate::Recent),
                TriggerRule::new(
                    ToolName::ExecuteSelect,
                    &["show me", "sample", "example rows", "preview", "some data", "some rows"],
                )
                .with_template(SelectTemplate::Sample),
            ],
        }
    }
}

/// Why no tool was chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NoMatchReason {
    OutOfDomain,
    UnknownTableReference,
}

impl fmt::Display for NoMatchReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfDomain => f.write_str("out-of-domain"),
            Self::UnknownTableReference => f.write_str("unknown-table-reference"),
        }
    }
}

/// The classifier's decision for one utterance
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Intent {
    /// Matched tool; `None` means decline
    pub tool: Option<ToolName>,
    pub arguments: BTreeMap<String, String>,
    pub confident: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<NoMatchReason>,
}

impl Intent {
    #[must_use]
    pub const fn none(reason: NoMatchReason) -> Self {
        Self { tool: None, arguments: BTreeMap::new(), confident: false, reason: Some(reason) }
    }

    /// Tool chosen from trigger phrases alone, before its arguments could be resolved
    #[must_use]
    pub const fn routed(tool: ToolName) -> Self {
        Self { tool: Some(tool), arguments: BTreeMap::new(), confident: false, reason: None }
    }

    fn matched(tool: ToolName, arguments: BTreeMap<String, String>) -> Self {
        Self { tool: Some(tool), arguments, confident: true, reason: None }
    }

    #[must_use]
    pub fn argument(&self, name: &str) -> Option<&str> {
        self.arguments.get(name).map(String::as_str)
    }

    /// The tool call this intent asks for, if any
    #[must_use]
    pub fn to_call(&self) -> Option<ToolCall> {
        let table = || self.argument("table_name").map(str::to_string);
        Some(match self.tool? {
            ToolName::GetTables => ToolCall::GetTables,
            ToolName::GetAllSchemas => ToolCall::GetAllSchemas,
            ToolName::DescribeTable => ToolCall::DescribeTable { table_name: table()? },
            ToolName::CountRecords => ToolCall::CountRecords { table_name: table()? },
            ToolName::ExecuteSelect => {
                ToolCall::ExecuteSelect { query: self.argument("query")?.to_string(), limit: None }
            }
        })
    }
}

#[derive(Debug, Clone)]
struct CompiledRule {
    tool: ToolName,
    template: SelectTemplate,
    phrases: Vec<Vec<String>>,
}

/// Rule-based intent classifier
#[derive(Debug, Clone)]
pub struct IntentClassifier {
    rules: Vec<CompiledRule>,
    quote_style: QuoteStyle,
}

impl Default for IntentClassifier {
    fn default() -> Self {
        Self::new(&ClassifierConfig::default())
    }
}

impl IntentClassifier {
    /// Compile trigger tables; phrases with no words are dropped
    #[must_use]
    pub fn new(config: &ClassifierConfig) -> Self {
        let rules = config
            .rules
            .iter()
            .map(|rule| CompiledRule {
                tool: rule.tool,
                template: rule.template.unwrap_or_default(),
                phrases: rule.phrases.iter().map(|p| words(p)).filter(|w| !w.is_empty()).collect(),
            })
            .collect();

        Self { rules, quote_style: QuoteStyle::default() }
    }

    /// Quote table names in synthesized statements for this dialect
    #[must_use]
    pub fn with_quote_style(mut self, quote_style: QuoteStyle) -> Self {
        self.quote_style = quote_style;
        self
    }

    /// The tool whose trigger table matches, without consulting any catalog
    #[must_use]
    pub fn route(&self, utterance: &str) -> Option<ToolName> {
        self.matching_rule(&words(utterance)).map(|rule| rule.tool)
    }

    /// Classify an utterance against the live table catalog
    #[must_use]
    pub fn classify(&self, utterance: &str, known_tables: &BTreeSet<String>) -> Intent {
        let words = words(utterance);

        let Some(rule) = self.matching_rule(&words) else {
            debug!("no trigger phrase matched");
            return Intent::none(NoMatchReason::OutOfDomain);
        };

        if !rule.tool.requires_table() {
            debug!(tool = %rule.tool, "intent classified");
            return Intent::matched(rule.tool, BTreeMap::new());
        }

        let Some(table) = first_known_table(&words, known_tables) else {
            debug!(tool = %rule.tool, "intent needs a table but none was named");
            return Intent::none(NoMatchReason::UnknownTableReference);
        };

        let mut arguments = BTreeMap::new();
        if rule.tool == ToolName::ExecuteSelect {
            arguments.insert("query".to_string(), rule.template.render(&self.quote_style.quote(table)));
        }
        arguments.insert("table_name".to_string(), table.to_string());

        debug!(tool = %rule.tool, table, "intent classified");
        Intent::matched(rule.tool, arguments)
    }

    fn matching_rule(&self, words: &[String]) -> Option<&CompiledRule> {
        self.rules
            .iter()
            .find(|rule| rule.phrases.iter().any(|phrase| contains_phrase(words, phrase)))
    }
}

/// Lowercased words of `text`
fn words(text: &str) -> Vec<String> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn contains_phrase(words: &[String], phrase: &[String]) -> bool {
    words.windows(phrase.len()).any(|window| window == phrase)
}

/// First utterance word naming a table, in the catalog's spelling
fn first_known_table<'a>(words: &[String], known_tables: &'a BTreeSet<String>) -> Option<&'a str> {
    words.iter().find_map(|word| {
        known_tables
            .get(word.as_str())
            .or_else(|| known_tables.iter().find(|t| t.to_lowercase() == *word))
            .map(String::as_str)
    })
}
