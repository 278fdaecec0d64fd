//! Error types for AssetSync.
//!
//! Library crates use [`AssetSyncError`] via `thiserror`.
//! App crates (cli/server) wrap this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all AssetSync operations.
#[derive(Debug, thiserror::Error)]
pub enum AssetSyncError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// The input CSV does not exist. Aborts the whole run.
    #[error("input file not found: {path:?}")]
    FileNotFound { path: PathBuf },

    /// Bearer token could not be acquired.
    #[error("auth error: {0}")]
    Auth(String),

    /// Transport-level HTTP failure (connect, TLS, body read).
    #[error("network error: {0}")]
    Network(String),

    /// The catalog answered with a non-success status.
    #[error("{context}: HTTP {status}: {body}")]
    Upstream {
        context: String,
        status: u16,
        body: String,
    },

    /// The LLM answered without a usable description.
    #[error("enrichment error: {0}")]
    Enrichment(String),

    /// CSV or JSON decoding error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, AssetSyncError>;

impl AssetSyncError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create an upstream error for a failed catalog call.
    pub fn upstream(context: impl Into<String>, status: u16, body: impl Into<String>) -> Self {
        Self::Upstream {
            context: context.into(),
            status,
            body: body.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error must stop a sync run instead of failing a single row.
    pub fn halts_run(&self) -> bool {
        matches!(self, Self::Auth(_) | Self::FileNotFound { .. })
    }
}
