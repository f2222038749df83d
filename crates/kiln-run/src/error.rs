//! Error types for kiln-run

use kiln_core::CoreError;
use kiln_db::DbError;
use thiserror::Error;

/// Node-level execution errors
#[derive(Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Backend error, message passed through verbatim
    #[error(transparent)]
    Db(#[from] DbError),

    /// Model cannot be materialized as declared (R001)
    #[error("[R001] Cannot materialize '{name}': {reason}")]
    Materialization { name: String, reason: String },

    /// Delete-insert failed after the delete ran outside a transaction (R002)
    #[error("[R002] Partial delete-insert on '{table}': rows were deleted but the insert failed: {source}")]
    PartialDeleteInsert {
        table: String,
        #[source]
        source: DbError,
    },

    /// Test node did not pass (R003)
    #[error("[R003] Test '{test}' failed for '{node}': {message}")]
    TestFailed {
        test: String,
        node: String,
        message: String,
    },
}

/// Result type alias for RunError
pub type RunResult<T> = Result<T, RunError>;
