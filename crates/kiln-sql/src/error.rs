//! Error types for kiln-sql

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SqlError {
    /// S001: sqlparser rejected the statement
    #[error("[S001] Cannot parse SQL: {0}")]
    ParseError(String),

    /// S002: nothing to rewrite
    #[error("[S002] SQL is empty")]
    EmptySql,
}

pub type SqlResult<T> = Result<T, SqlError>;
