//! kiln-test - Data-quality tests for Kiln
//!
//! This crate generates schema tests (unique, not_null, accepted_values, ...)
//! from column metadata and runs test queries against a database.

pub mod generator;
pub mod runner;

pub use generator::{
    generate_column_tests, generate_not_null_test, generate_unique_test, parse_schema_test,
    SchemaTestKind, TestGenError, TestGenResult,
};
pub use runner::{summarize, SqlTestRunner, TestExecutor};
