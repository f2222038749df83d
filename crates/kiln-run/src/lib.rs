//! kiln-run - Execution engine for Kiln
//!
//! Materializes models and functions against a [`kiln_db::Database`] in
//! dependency order, tracks per-model build state and drives the two run
//! modes: best-effort `execute` and fail-fast `build`.

pub mod context;
pub mod error;
pub mod function;
pub mod incremental;
pub mod model;
pub mod orchestrator;
pub mod results;
pub mod seed;
pub mod state;

pub use context::{RunContext, RunOptions};
pub use error::{RunError, RunResult};
pub use incremental::build_merge_sql;
pub use orchestrator::{NodeStatus, NoopObserver, Orchestrator, Outcome, RunObserver};
pub use results::{
    Decision, ExecutionResult, FailedFunction, FailedTable, RunMode, SeedReport, TableSummary,
};
