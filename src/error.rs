//! Error types for the census crate

use std::path::PathBuf;

use thiserror::Error;

/// Broad classification of a failure, used by the driver to decide how to report it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing or malformed tables, impossible budgets, bad arguments
    Config,
    /// Compute backend initialisation, compilation or dispatch failure
    Backend,
    /// Reading or writing tables, frontier chunks, terminals or checkpoints
    Io,
    /// State that contradicts the game's invariants
    DataConsistency,
}

/// Main error type for the census crate
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("invalid configuration: {message}")]
    Config { message: String },

    #[error("malformed {table} table '{path}': {message}")]
    Table {
        table: &'static str,
        path: PathBuf,
        message: String,
    },

    #[error("batch budget too small: {message}")]
    Budget { message: String },

    #[error("compute backend '{backend}' failed: {message}")]
    Backend { backend: String, message: String },

    #[error("failed to {operation} '{path}': {source}")]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid board: {message}")]
    Codec { message: String },

    #[error("checkpoint '{path}' is unreadable: {source}")]
    Checkpoint {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("data consistency violation: {message}")]
    Consistency { message: String },
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Config { .. } | Error::Table { .. } | Error::Budget { .. } => ErrorKind::Config,
            Error::Backend { .. } => ErrorKind::Backend,
            Error::Io { .. } | Error::Checkpoint { .. } => ErrorKind::Io,
            Error::Codec { .. } | Error::Consistency { .. } => ErrorKind::DataConsistency,
        }
    }

    pub(crate) fn config(message: impl Into<String>) -> Self {
        Error::Config { message: message.into() }
    }

    pub(crate) fn codec(message: impl Into<String>) -> Self {
        Error::Codec { message: message.into() }
    }

    pub(crate) fn backend(backend: &str, message: impl Into<String>) -> Self {
        Error::Backend {
            backend: backend.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn io(operation: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            operation,
            path: path.into(),
            source,
        }
    }
}

/// Result type alias for census operations
pub type Result<T> = std::result::Result<T, Error>;
