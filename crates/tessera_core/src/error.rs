//! Error types for tessera_core

use std::io;
use thiserror::Error;

/// Errors raised by attribute declaration and writes
///
/// These are programmer errors: they surface synchronously at the call site
/// and are never retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AttributeError {
    /// Conflicting descriptor flags (`required` together with `readOnly`)
    #[error("attribute `{0}` cannot be both required and read-only")]
    Configuration(String),

    /// A required attribute received no value and has no default
    #[error("required attribute `{0}` has no value")]
    MissingRequired(String),

    /// Write to a read-only or already consumed write-once attribute
    #[error("attribute `{0}` is locked and cannot be written")]
    AccessViolation(String),

    /// A read-only attribute was given an initial value under the strict policy
    #[error("read-only attribute `{0}` cannot take an initial value")]
    ReadOnlyInitialValue(String),
}

/// What kind of dependency a composition referred to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependencyKind {
    Type,
    Capability,
}

impl std::fmt::Display for DependencyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DependencyKind::Type => f.write_str("type"),
            DependencyKind::Capability => f.write_str("capability"),
        }
    }
}

/// Errors raised while composing types and constructing or destroying instances
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ComposeError {
    /// Attribute declaration or write failed
    #[error(transparent)]
    Attribute(#[from] AttributeError),

    /// A parent type or capability name is not registered
    #[error("{kind} `{name}` is not registered")]
    DependencyMissing { kind: DependencyKind, name: String },

    /// Method lookup failed on an instance
    #[error("method `{method}` is not defined on `{type_name}`")]
    UnknownMethod { type_name: String, method: String },

    /// An initializer, destructor or method reported a failure
    #[error("{0}")]
    Failed(String),

    /// One or more destructors failed during teardown
    #[error("teardown of `{instance}` failed in {} destructor(s)", .errors.len())]
    Teardown {
        instance: String,
        errors: Vec<ComposeError>,
    },
}

impl ComposeError {
    /// Build a failure from any message
    pub fn failed(message: impl Into<String>) -> Self {
        ComposeError::Failed(message.into())
    }
}

/// Errors raised while loading runtime configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    /// IO error when reading the file
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// TOML parse error
    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialization error
    #[error("config serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Result type for composition and lifecycle operations
pub type Result<T> = std::result::Result<T, ComposeError>;
