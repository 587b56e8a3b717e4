//! Error types for policy-router
//!
//! Errors are grouped by subsystem. None of them cross the decision façade:
//! the façade converts every failure into a concrete decision (see
//! [`crate::decision::DecisionFacade`]). They surface only from
//! configuration loading, collaborator lookups and the tunnel adapter.

use std::io;

use thiserror::Error;

/// Top-level error type for policy-router
#[derive(Debug, Error)]
pub enum PolicyRouterError {
    /// Configuration errors (file parsing, validation)
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A policy store could not answer a lookup
    #[error("Lookup error: {0}")]
    Lookup(#[from] LookupError),

    /// Rule evaluation aborted
    #[error("Evaluation error: {0}")]
    Evaluation(#[from] EvaluationError),

    /// Tunnel adapter errors
    #[error("Adapter error: {0}")]
    Adapter(#[from] AdapterError),

    /// I/O errors not covered by other categories
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl PolicyRouterError {
    /// Check if this error is recoverable (can retry operation)
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Config(e) => e.is_recoverable(),
            Self::Lookup(e) => e.is_recoverable(),
            Self::Evaluation(_) => false,
            Self::Adapter(e) => e.is_recoverable(),
            Self::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::TimedOut | io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock
            ),
        }
    }
}

/// Configuration-related errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File not found or inaccessible
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },

    /// JSON parsing error
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Validation error (invalid values, missing required fields)
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),

    /// Environment variable error
    #[error("Environment variable error: {name}: {reason}")]
    EnvError { name: String, reason: String },

    /// I/O error while reading config
    #[error("I/O error reading configuration: {0}")]
    IoError(#[from] io::Error),
}

impl ConfigError {
    /// Config errors are generally not recoverable without user intervention
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        false
    }
}

/// A collaborator-owned policy store failed to answer.
///
/// The evaluator treats these as "no rule" at the step that hit them,
/// except for the app status lookup, which has no neutral value.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LookupError {
    /// Store is not loaded yet or has been torn down
    #[error("{store} store unavailable")]
    Unavailable { store: &'static str },

    /// Store answered with something it cannot represent
    #[error("{store} store failed: {reason}")]
    Failed { store: &'static str, reason: String },
}

impl LookupError {
    /// Create a failure for the named store
    pub fn failed(store: &'static str, reason: impl Into<String>) -> Self {
        Self::Failed {
            store,
            reason: reason.into(),
        }
    }

    /// Unavailable stores usually come back after a reload
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

/// Unexpected failure inside the rule evaluator.
///
/// Always resolved as a block by the evaluator.
#[derive(Debug, Error)]
pub enum EvaluationError {
    /// App status could not be read
    #[error("app status lookup failed: {0}")]
    AppStatus(#[from] LookupError),

    /// A rule step panicked
    #[error("rule step {step} panicked: {message}")]
    Panicked { step: &'static str, message: String },
}

/// Tunnel adapter errors
#[derive(Debug, Error)]
pub enum AdapterError {
    /// No adapter is installed (tunnel down or being rebuilt)
    #[error("tunnel adapter not installed")]
    NotInstalled,

    /// Proxy id does not name a known proxy
    #[error("unknown proxy: {0}")]
    UnknownProxy(String),

    /// Adapter rejected the operation
    #[error("adapter operation {op} failed: {reason}")]
    Backend { op: &'static str, reason: String },
}

impl AdapterError {
    /// The adapter may be reinstalled; backend failures are worth one retry
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::NotInstalled | Self::Backend { .. })
    }
}
