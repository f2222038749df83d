//! Configuration types and parsing for kiln.yml

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Main project configuration from kiln.yml
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Project name
    pub name: String,

    /// Database connection configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Active schema; bare table references are qualified against it
    #[serde(default)]
    pub schema: Option<String>,

    /// Default materialization for models that declare none
    #[serde(default)]
    pub materialization: Materialization,

    /// What to do when a model's declared materialization differs from the recorded one
    #[serde(default)]
    pub drift_policy: DriftPolicy,

    /// Output directory for state and run results
    #[serde(default = "default_target_path")]
    pub target_path: String,

    /// Location of the compiled manifest
    #[serde(default = "default_manifest_path")]
    pub manifest_path: String,

    /// Directories containing seed files
    #[serde(default = "default_seed_paths")]
    pub seed_paths: Vec<String>,

    /// Tags attached to each schema the first time a run touches it
    #[serde(default)]
    pub schema_tags: HashMap<String, BTreeMap<String, String>>,

    /// Maximum number of models executed concurrently in `execute` mode
    #[serde(default = "default_threads")]
    pub threads: usize,
}

/// Database type selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DbType {
    /// DuckDB (default)
    #[default]
    DuckDb,
}

impl std::fmt::Display for DbType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DbType::DuckDb => write!(f, "duckdb"),
        }
    }
}

/// Database connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfig {
    #[serde(rename = "type", default)]
    pub db_type: DbType,

    /// Database path (file-based or :memory:)
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            db_type: DbType::default(),
            path: default_db_path(),
        }
    }
}

/// Materialization kind for models
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Materialization {
    /// Create a table from the query (default)
    #[default]
    Table,
    /// Create a view
    View,
    /// Create a materialized view
    MaterializedView,
    /// Incremental table (only process new/changed data)
    Incremental,
    /// Table backed by files at an external location
    ExternalTable,
}

impl Materialization {
    /// Every kind, in declaration order
    pub const ALL: [Materialization; 5] = [
        Materialization::Table,
        Materialization::View,
        Materialization::MaterializedView,
        Materialization::Incremental,
        Materialization::ExternalTable,
    ];

    /// String form used in config, state and results
    pub fn as_str(&self) -> &'static str {
        match self {
            Materialization::Table => "table",
            Materialization::View => "view",
            Materialization::MaterializedView => "materialized_view",
            Materialization::Incremental => "incremental",
            Materialization::ExternalTable => "external_table",
        }
    }

    /// Whether this kind is backed by a physical table
    pub fn is_table_like(&self) -> bool {
        matches!(
            self,
            Materialization::Table | Materialization::Incremental | Materialization::ExternalTable
        )
    }
}

impl std::fmt::Display for Materialization {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Materialization {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Materialization::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| CoreError::UnknownValue {
                kind: "materialization",
                value: s.to_string(),
            })
    }
}

/// Policy applied when the declared materialization differs from the recorded one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DriftPolicy {
    /// Emit one warning and proceed (default)
    #[default]
    Warn,
    /// Fail the node before any DDL runs
    Error,
    /// Proceed silently
    Ignore,
}

impl std::fmt::Display for DriftPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DriftPolicy::Warn => write!(f, "warn"),
            DriftPolicy::Error => write!(f, "error"),
            DriftPolicy::Ignore => write!(f, "ignore"),
        }
    }
}

impl FromStr for DriftPolicy {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "warn" => Ok(DriftPolicy::Warn),
            "error" => Ok(DriftPolicy::Error),
            "ignore" => Ok(DriftPolicy::Ignore),
            other => Err(CoreError::UnknownValue {
                kind: "drift policy",
                value: other.to_string(),
            }),
        }
    }
}

fn default_target_path() -> String {
    "target".to_string()
}

fn default_manifest_path() -> String {
    "target/manifest.json".to_string()
}

fn default_seed_paths() -> Vec<String> {
    vec!["seeds".to_string()]
}

fn default_threads() -> usize {
    1
}

fn default_db_path() -> String {
    ":memory:".to_string()
}

impl Config {
    /// Load configuration from a file path
    pub fn load(path: &Path) -> CoreResult<Self> {
        if !path.exists() {
            return Err(CoreError::ConfigNotFound {
                path: path.display().to_string(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| CoreError::IoWithPath {
            path: path.display().to_string(),
            source: e,
        })?;
        let config: Config = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a project directory
    /// Looks for kiln.yml or kiln.yaml
    pub fn load_from_dir(dir: &Path) -> CoreResult<Self> {
        let yml_path = dir.join("kiln.yml");
        let yaml_path = dir.join("kiln.yaml");

        if yml_path.exists() {
            Self::load(&yml_path)
        } else if yaml_path.exists() {
            Self::load(&yaml_path)
        } else {
            Err(CoreError::ConfigNotFound {
                path: yml_path.display().to_string(),
            })
        }
    }

    fn validate(&self) -> CoreResult<()> {
        if self.name.is_empty() {
            return Err(CoreError::ConfigInvalid {
                message: "Project name cannot be empty".to_string(),
            });
        }
        if self.threads == 0 {
            return Err(CoreError::ConfigInvalid {
                message: "threads must be at least 1".to_string(),
            });
        }
        if self.schema.as_deref() == Some("") {
            return Err(CoreError::ConfigInvalid {
                message: "schema cannot be an empty string".to_string(),
            });
        }
        Ok(())
    }

    fn path_absolute(path: &str, root: &Path) -> PathBuf {
        let p = Path::new(path);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            root.join(p)
        }
    }

    /// Target directory resolved against the project root
    pub fn target_path_absolute(&self, root: &Path) -> PathBuf {
        Self::path_absolute(&self.target_path, root)
    }

    /// Manifest path resolved against the project root
    pub fn manifest_path_absolute(&self, root: &Path) -> PathBuf {
        Self::path_absolute(&self.manifest_path, root)
    }

    /// State file location inside the target directory
    pub fn state_path_absolute(&self, root: &Path) -> PathBuf {
        self.target_path_absolute(root).join("state.json")
    }

    /// Run results location inside the target directory
    pub fn results_path_absolute(&self, root: &Path) -> PathBuf {
        self.target_path_absolute(root).join("run_results.json")
    }

    /// Seed directories resolved against the project root
    pub fn seed_paths_absolute(&self, root: &Path) -> Vec<PathBuf> {
        self.seed_paths
            .iter()
            .map(|p| Self::path_absolute(p, root))
            .collect()
    }

    /// Database path, with relative file paths resolved against the project root
    pub fn database_path(&self, root: &Path) -> String {
        if self.database.path == ":memory:" {
            return self.database.path.clone();
        }
        Self::path_absolute(&self.database.path, root)
            .display()
            .to_string()
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
