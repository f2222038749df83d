//! kiln-db - Database adapter contract for Kiln
//!
//! This crate provides the adapter traits the executor talks to and a
//! DuckDB implementation of them.

pub mod duckdb;
pub mod error;
pub mod traits;

pub use duckdb::DuckDbBackend;
pub use error::{DbError, DbResult};
pub use traits::{
    ColumnInfo, Database, DatabaseCore, DatabaseFunction, DatabaseSchema, DatabaseSeed,
    RelationKind, Row, TableInfo, TagAttacher,
};
