//! Runtime configuration
//!
//! Policies the runtime applies to every instance it constructs. Loaded from
//! TOML (usually a `tessera.toml` next to the application):
//!
//! ```toml
//! id_prefix = "app"
//! read_only_init = "reject"
//! teardown = "abort"
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::value::{Value, ValueMap};

/// How an initial value supplied for a read-only attribute is handled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadOnlyInit {
    /// Drop the value with a warning and keep the default
    #[default]
    Discard,
    /// Fail construction
    Reject,
}

/// How a failing destructor affects the rest of teardown
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TeardownPolicy {
    /// Stop at the first failing destructor
    Abort,
    /// Run every destructor and report the failures together
    #[default]
    Isolate,
}

/// Runtime-wide settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Prefix of every instance guid (`<prefix>_<id>`)
    pub id_prefix: String,
    pub read_only_init: ReadOnlyInit,
    pub teardown: TeardownPolicy,
}

fn default_id_prefix() -> String {
    "tessera".to_string()
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            id_prefix: default_id_prefix(),
            read_only_init: ReadOnlyInit::default(),
            teardown: TeardownPolicy::default(),
        }
    }
}

impl RuntimeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_id_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.id_prefix = prefix.into();
        self
    }

    pub fn with_read_only_init(mut self, policy: ReadOnlyInit) -> Self {
        self.read_only_init = policy;
        self
    }

    pub fn with_teardown(mut self, policy: TeardownPolicy) -> Self {
        self.teardown = policy;
        self
    }

    /// Parse from TOML text; missing keys take their defaults
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Load from a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

/// Convert a TOML table into a construction config
///
/// Datetimes become strings.
pub fn value_map_from_toml(table: &toml::Table) -> ValueMap {
    table
        .iter()
        .map(|(key, value)| (key.clone(), value_from_toml(value)))
        .collect()
}

fn value_from_toml(value: &toml::Value) -> Value {
    match value {
        toml::Value::String(s) => Value::Str(s.clone()),
        toml::Value::Integer(i) => Value::Int(*i),
        toml::Value::Float(f) => Value::Float(*f),
        toml::Value::Boolean(b) => Value::Bool(*b),
        toml::Value::Datetime(d) => Value::Str(d.to_string()),
        toml::Value::Array(items) => Value::List(items.iter().map(value_from_toml).collect()),
        toml::Value::Table(table) => Value::Map(value_map_from_toml(table)),
    }
}

/// Parse TOML text into a construction config
pub fn value_map_from_toml_str(text: &str) -> Result<ValueMap, ConfigError> {
    let table: toml::Table = toml::from_str(text)?;
    Ok(value_map_from_toml(&table))
}
