//! Error types shared by the core and the hosts that back it.

use thiserror::Error;

/// Failure raised by a host collaborator (feature index, metrics pass,
/// history source, edit queue).
///
/// Rejections of a mutation are not errors: they are reported as
/// [`crate::commands::MutationOutcome`] values.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Failed to apply migration {version}: {source}")]
    Migration {
        version: &'static str,
        source: rusqlite::Error,
    },

    #[error("Corrupt feature model: {0}")]
    Corrupt(String),

    #[error("Invalid model: {0}")]
    InvalidModel(String),

    #[error("Edit queue is not accepting work")]
    QueueClosed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type HostResult<T> = Result<T, HostError>;
