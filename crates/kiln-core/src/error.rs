//! Error types for kiln-core

use thiserror::Error;

/// Core error type for Kiln
#[derive(Error, Debug)]
pub enum CoreError {
    /// E001: Configuration file not found
    #[error("[E001] Config file not found: {path}")]
    ConfigNotFound { path: String },

    /// E002: Invalid configuration value
    #[error("[E002] Invalid config: {message}")]
    ConfigInvalid { message: String },

    /// E003: Manifest file not found
    #[error("[E003] Manifest not found: {path}. Run the compiler before executing.")]
    ManifestNotFound { path: String },

    /// E004: Manifest is internally inconsistent
    #[error("[E004] Invalid manifest: {message}")]
    ManifestInvalid { message: String },

    /// E005: Node is in the execution order but has no parsed definition
    #[error("[E005] Node not found: {name}")]
    NodeNotFound { name: String },

    /// E006: Node has neither resolved nor original SQL
    #[error("[E006] No SQL for node: {name}")]
    NoSql { name: String },

    /// E007: Circular dependency detected
    #[error("[E007] Circular dependency detected: {cycle}")]
    CircularDependency { cycle: String },

    /// E008: Empty name where a non-empty identifier is required
    #[error("[E008] Empty name: {context}")]
    EmptyName { context: String },

    /// E009: Invalid incremental configuration
    #[error("[E009] Invalid incremental config for '{model}': {reason}")]
    IncrementalConfig { model: String, reason: String },

    /// E010: Column metadata failed validation; documentation is skipped
    #[error("[E010] Invalid column metadata for '{name}': {reason}")]
    MetadataValidation { name: String, reason: String },

    /// E011: Declared materialization differs from the recorded one
    #[error("[E011] Materialization drift for '{name}': recorded {recorded}, declared {declared}")]
    MaterializationDrift {
        name: String,
        recorded: String,
        declared: String,
    },

    /// E012: Unknown enum value in config or manifest
    #[error("[E012] Unknown {kind} '{value}'")]
    UnknownValue { kind: &'static str, value: String },

    /// E013: IO error
    #[error("[E013] IO error: {0}")]
    Io(#[from] std::io::Error),

    /// E014: IO error with file path context
    #[error("[E014] Failed to access '{path}': {source}")]
    IoWithPath {
        path: String,
        source: std::io::Error,
    },

    /// E015: YAML parse error
    #[error("[E015] YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    /// E016: JSON serialization/deserialization error
    #[error("[E016] JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for CoreError
pub type CoreResult<T> = Result<T, CoreError>;
