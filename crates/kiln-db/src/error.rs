//! Error types for kiln-db

use thiserror::Error;

/// Adapter errors
#[derive(Error, Debug)]
pub enum DbError {
    /// D001: the backend could not be opened or the handle is gone
    #[error("[D001] Cannot connect to database: {0}")]
    ConnectionError(String),

    /// D002: a statement was rejected by the backend
    #[error("[D002] Statement failed: {0}")]
    ExecutionError(String),

    /// D003: introspection target does not exist
    #[error("[D003] Relation not found: {0}")]
    TableNotFound(String),

    /// D004: a seed file could not be loaded
    #[error("[D004] Cannot load seed {0}")]
    SeedError(String),

    /// D005: the adapter does not offer this capability
    #[error("[D005] {adapter} adapter does not support {operation}")]
    Unsupported { adapter: String, operation: String },

    /// D006: a thread panicked while holding the connection
    #[error("[D006] Connection lock poisoned: {0}")]
    MutexPoisoned(String),

    /// D007: begin, commit or rollback failed
    #[error("[D007] Transaction failed: {0}")]
    TransactionError(String),
}

pub type DbResult<T> = Result<T, DbError>;

impl DbError {
    pub(crate) fn unsupported(adapter: &str, operation: &str) -> Self {
        DbError::Unsupported {
            adapter: adapter.to_string(),
            operation: operation.to_string(),
        }
    }
}

impl From<duckdb::Error> for DbError {
    fn from(err: duckdb::Error) -> Self {
        // catalog misses only show up in the message text
        let msg = err.to_string();
        let missing = msg.contains("does not exist")
            || (msg.contains("Catalog Error") && msg.contains("not found"));
        if missing {
            DbError::TableNotFound(msg)
        } else {
            DbError::ExecutionError(msg)
        }
    }
}
