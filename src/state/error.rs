//! Ledger errors.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StateError {
    #[error("Cannot open ledger {path}: {source}")]
    Open {
        path: PathBuf,
        source: rusqlite::Error,
    },

    /// Pragmas or a schema step failed; the step's transaction was rolled back.
    #[error("Ledger schema upgrade failed: {0}")]
    Schema(#[from] rusqlite::Error),

    #[error("Ledger schema v{found} was written by a newer photosync (this build knows v{supported})")]
    TooNew { found: i32, supported: i32 },

    #[error("Ledger {operation} failed: {source}")]
    Query {
        operation: &'static str,
        source: rusqlite::Error,
    },

    /// A task panicked while holding the connection.
    #[error("Ledger connection is poisoned")]
    Poisoned,

    #[error("Ledger open task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl StateError {
    /// `map_err` adapter tagging a rusqlite failure with the ledger operation.
    pub fn query(operation: &'static str) -> impl FnOnce(rusqlite::Error) -> Self {
        move |source| Self::Query { operation, source }
    }
}
