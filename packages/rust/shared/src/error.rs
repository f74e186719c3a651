//! Error types for the Errbit notifier.
//!
//! Library crates use [`ErrbitError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all notifier operations.
///
/// Only configuration problems and HTTP transport failures ever reach a
/// caller of `notify`; raw socket failures are swallowed by the writer.
#[derive(Debug, thiserror::Error)]
pub enum ErrbitError {
    /// Required key missing or malformed (`api_key`, `host`, filter patterns).
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error while delivering a notice.
    #[error("network error: {0}")]
    Network(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, ErrbitError>;

impl ErrbitError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a network error from any displayable message.
    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network(msg.into())
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error was raised by configuration validation.
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config { .. })
    }
}
