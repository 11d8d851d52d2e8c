//! Configuration Management
//!
//! Loads the layered configuration that the validator, tool executor, classifier and
//! generation backend are constructed from. Nothing reads configuration from global
//! state after startup.
//!
//! # Configuration Locations
//! - Local: `.tabletalk/config.json` (per-project)
//! - Global: `<config_dir>/tabletalk/config.json` (per-user, via `dirs`)
//!
//! # Resolution Precedence
//! 1. Environment (`TABLETALK_*`, optionally from a `.env` file)
//! 2. Local config file
//! 3. Global config file
//! 4. Built-in defaults
//!
//! Files are merged key by key, so a local file only needs the keys it changes.
//!
//! # Example
//! ```json
//! {
//!   "connection": { "engine": "postgres", "host": "localhost", "port": 5432,
//!                   "user": "reader", "password_env": "PGPASSWORD", "database": "app" },
//!   "limits": { "max_rows": 500 },
//!   "generation": { "backend": "template" }
//! }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::engine::{ConnectionConfig, DatabaseType};
use crate::error::{Result, TalkError};
use crate::generation::{DEFAULT_MODEL, DEFAULT_OLLAMA_URL, DEFAULT_TEMPERATURE, DEFAULT_TOP_P};
use crate::intent::ClassifierConfig;
use crate::tools::identifier::DEFAULT_MAX_IDENTIFIER_LEN;
use crate::tools::IdentifierPolicy;
use crate::validator::{ValidatorConfig, DEFAULT_FORBIDDEN_KEYWORDS, DEFAULT_MAX_ROWS};

pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Stored connection settings
///
/// Like `ConnectionConfig`, but the password may come from an environment variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredConnection {
    #[serde(flatten)]
    pub config: ConnectionConfig,

    /// Environment variable holding the password
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_env: Option<String>,
}

impl StoredConnection {
    /// Resolve `password_env` into a complete `ConnectionConfig`
    pub fn resolve(&self) -> Result<ConnectionConfig> {
        self.resolve_with(|key| std::env::var(key).ok())
    }

    fn resolve_with(&self, lookup: impl Fn(&str) -> Option<String>) -> Result<ConnectionConfig> {
        let mut config = self.config.clone();

        if let Some(env_var) = &self.password_env {
            let password = lookup(env_var).ok_or_else(|| {
                TalkError::config_error(format!("Environment variable {env_var} not found for password"))
            })?;
            config.password = Some(password);
        }

        Ok(config)
    }

    /// Names of required fields that are unset
    #[must_use]
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let c = &self.config;
        let mut missing = Vec::new();
        match c.engine {
            DatabaseType::SQLite => {
                if c.file.is_none() {
                    missing.push("file");
                }
            }
            DatabaseType::Postgres | DatabaseType::MySQL => {
                if c.host.is_none() {
                    missing.push("host");
                }
                if c.port.is_none() {
                    missing.push("port");
                }
                if c.user.is_none() {
                    missing.push("user");
                }
                if c.password.is_none() && self.password_env.is_none() {
                    missing.push("password");
                }
                if c.database.is_none() {
                    missing.push("database");
                }
            }
        }
        missing
    }
}

/// Row cap and statement timeout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub max_rows: u64,
    pub timeout_ms: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self { max_rows: DEFAULT_MAX_ROWS, timeout_ms: DEFAULT_TIMEOUT_MS }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorSection {
    pub forbidden_keywords: Vec<String>,
}

impl Default for ValidatorSection {
    fn default() -> Self {
        Self { forbidden_keywords: DEFAULT_FORBIDDEN_KEYWORDS.iter().map(|k| (*k).to_string()).collect() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentifierSection {
    pub max_len: usize,
}

impl Default for IdentifierSection {
    fn default() -> Self {
        Self { max_len: DEFAULT_MAX_IDENTIFIER_LEN }
    }
}

/// Which generation backend answers turns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationBackend {
    #[default]
    Ollama,
    Template,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub backend: GenerationBackend,
    pub url: String,
    pub model: String,
    pub temperature: f32,
    pub top_p: f32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            backend: GenerationBackend::default(),
            url: DEFAULT_OLLAMA_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            top_p: DEFAULT_TOP_P,
        }
    }
}

/// Complete configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection: Option<StoredConnection>,
    pub limits: LimitsConfig,
    pub validator: ValidatorSection,
    pub identifiers: IdentifierSection,
    pub classifier: ClassifierConfig,
    pub generation: GenerationConfig,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            connection: None,
            limits: LimitsConfig::default(),
            validator: ValidatorSection::default(),
            identifiers: IdentifierSection::default(),
            classifier: ClassifierConfig::default(),
            generation: GenerationConfig::default(),
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

impl Config {
    /// Load files, `.env` and environment, then validate
    pub fn load() -> Result<Self> {
        // A missing .env file is normal
        let _ = dotenv::dotenv();

        let mut config = load_with_precedence()?;
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `TABLETALK_*` overrides from `lookup`
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(value) = lookup("TABLETALK_MAX_ROWS") {
            self.limits.max_rows = parse_env("TABLETALK_MAX_ROWS", &value)?;
        }
        if let Some(value) = lookup("TABLETALK_TIMEOUT_MS") {
            self.limits.timeout_ms = parse_env("TABLETALK_TIMEOUT_MS", &value)?;
        }
        if let Some(url) = lookup("TABLETALK_OLLAMA_URL") {
            self.generation.url = url;
        }
        if let Some(model) = lookup("TABLETALK_MODEL") {
            self.generation.model = model;
        }
        if let Some(level) = lookup("TABLETALK_LOG") {
            self.log_level = level;
        }
        Ok(())
    }

    /// Reject values no component can work with
    pub fn validate(&self) -> Result<()> {
        if self.limits.max_rows == 0 {
            return Err(TalkError::config_error("limits.max_rows must be at least 1"));
        }
        if self.limits.timeout_ms == 0 {
            return Err(TalkError::config_error("limits.timeout_ms must be at least 1"));
        }
        if self.identifiers.max_len == 0 {
            return Err(TalkError::config_error("identifiers.max_len must be at least 1"));
        }
        if let Some(connection) = &self.connection {
            let missing = connection.missing_fields();
            if !missing.is_empty() {
                return Err(TalkError::config_error(format!(
                    "{} connection is missing: {}",
                    connection.config.engine,
                    missing.join(", ")
                )));
            }
        }
        Ok(())
    }

    /// Connection settings with the password resolved
    pub fn connection_config(&self) -> Result<ConnectionConfig> {
        self.connection
            .as_ref()
            .ok_or_else(|| {
                TalkError::config_error(
                    "No connection configured. Add a \"connection\" section to .tabletalk/config.json",
                )
            })?
            .resolve()
    }

    #[must_use]
    pub fn validator_config(&self) -> ValidatorConfig {
        ValidatorConfig {
            max_rows: self.limits.max_rows,
            forbidden_keywords: self.validator.forbidden_keywords.clone(),
        }
    }

    #[must_use]
    pub const fn identifier_policy(&self) -> IdentifierPolicy {
        IdentifierPolicy::new(self.identifiers.max_len)
    }

    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.limits.timeout_ms)
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| TalkError::config_error(format!("{key} must be a non-negative integer, got '{value}'")))
}

/// Get path to local config file (`.tabletalk/config.json`)
pub fn local_config_path() -> Result<PathBuf> {
    let current_dir = std::env::current_dir().map_err(|e| {
        TalkError::config_error(format!("Could not determine current directory: {e}"))
    })?;

    Ok(current_dir.join(".tabletalk").join("config.json"))
}

/// Get path to global config file (`<config_dir>/tabletalk/config.json`)
pub fn global_config_path() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or_else(|| TalkError::config_error("Could not determine user config directory"))?;

    Ok(config_dir.join("tabletalk").join("config.json"))
}

/// Read one config file as raw JSON; a missing file is an empty object
pub fn load_file(path: &Path) -> Result<Value> {
    if !path.exists() {
        return Ok(Value::Object(serde_json::Map::new()));
    }

    let contents = fs::read_to_string(path)
        .map_err(|e| TalkError::config_error(format!("Could not read config file: {e}")))?;

    let value: Value = serde_json::from_str(&contents).map_err(|e| {
        TalkError::config_error(format!("Invalid config file {}: {e}", path.display()))
    })?;

    if !value.is_object() {
        return Err(TalkError::config_error(format!(
            "Config file {} must contain a JSON object",
            path.display()
        )));
    }
    Ok(value)
}

/// Load global then local config, local keys winning
pub fn load_with_precedence() -> Result<Config> {
    let mut merged = load_file(&global_config_path()?)?;
    merge(&mut merged, load_file(&local_config_path()?)?);
    from_value(merged)
}

/// Deserialize a merged JSON document
pub fn from_value(value: Value) -> Result<Config> {
    serde_json::from_value(value)
        .map_err(|e| TalkError::config_error(format!("Invalid configuration: {e}")))
}

/// Deep-merge `overlay` into `base`; objects merge per key, anything else replaces
fn merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}
