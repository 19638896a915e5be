//! Error types for the performance gate

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for the performance gate
pub type Result<T> = std::result::Result<T, Error>;

/// Performance gate errors
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Metrics service unreachable or erroring at the transport level
    #[error("Transport error: {0}")]
    Transport(String),

    /// Service answered, but with `ok: false` or an unexpected payload
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Persisted thresholds record is not a well-formed record
    #[error("Malformed thresholds record {}: {reason}", path.display())]
    MalformedRecord {
        /// Record location
        path: PathBuf,
        /// Parser diagnostic
        reason: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether a read that failed with this error is worth repeating
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Http(_) | Self::Io(_))
    }

    /// Create a malformed-record error
    pub fn malformed(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::MalformedRecord {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
