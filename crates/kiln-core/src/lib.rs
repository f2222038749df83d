//! kiln-core - Core library for Kiln
//!
//! Shared types used across all Kiln crates: project configuration, the
//! compiled manifest, node definitions, metadata resolution, persisted
//! build state and seed discovery.

pub mod checksum;
pub mod config;
pub mod dag;
pub mod error;
pub mod function;
pub mod incremental;
pub mod manifest;
pub mod metadata;
pub mod model;
pub mod node_name;
pub mod seed;
pub mod sql_utils;
pub mod state;
pub mod testing;

pub use checksum::compute_checksum;
pub use config::{Config, DatabaseConfig, DbType, DriftPolicy, Materialization};
pub use dag::DependencyGraph;
pub use error::{CoreError, CoreResult};
pub use function::{FunctionArg, FunctionReturn, FunctionReturnColumn, FunctionType, ParsedFunction};
pub use incremental::{IncrementalConfig, IncrementalStrategy};
pub use manifest::Manifest;
pub use metadata::{
    collect_tags, resolve_incremental_config, resolve_location, resolve_materialization,
    resolve_metadata, validate_columns, ColumnDoc, ColumnMetadata, IncrementalMetadata,
    MetadataBlock, RelationDocs, ResolvedMetadata, TagSet,
};
pub use model::ParsedModel;
pub use node_name::{NodeName, TEST_NODE_PREFIX};
pub use seed::{discover_seeds, Seed, SeedFormat};
pub use state::{ModelState, StateFile, StateOrigin, StateStore, StateUpdate};
pub use testing::{ParsedTest, TestResult, TestSeverity, TestSummary, TestTarget};
