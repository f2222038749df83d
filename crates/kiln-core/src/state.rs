//! Persisted per-node build state
//!
//! Records what each model was last materialized as, so later runs can
//! detect materialization drift and track incremental watermarks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::checksum::{compute_checksum, compute_json_checksum};
use crate::config::Materialization;
use crate::error::{CoreError, CoreResult};
use crate::incremental::IncrementalStrategy;
use crate::metadata::ResolvedMetadata;
use crate::node_name::NodeName;

/// How a state record came to exist
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StateOrigin {
    /// Written after a successful materialization
    #[default]
    Built,
    /// Reconstructed from backend introspection
    Rebuilt,
}

/// Build state of one model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelState {
    pub name: NodeName,

    pub materialization: Materialization,

    /// SHA-256 of the resolved SQL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sql_hash: Option<String>,

    /// SHA-256 of the serialized configuration metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_hash: Option<String>,

    /// Highest `filter_column` value seen by an incremental model
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_processed_value: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<IncrementalStrategy>,

    pub updated_at: DateTime<Utc>,

    #[serde(default)]
    pub origin: StateOrigin,
}

impl ModelState {
    /// Best-effort record for an object found in the backend without state
    pub fn rebuilt(name: NodeName, materialization: Materialization) -> Self {
        Self {
            name,
            materialization,
            sql_hash: None,
            config_hash: None,
            last_processed_value: None,
            strategy: None,
            updated_at: Utc::now(),
            origin: StateOrigin::Rebuilt,
        }
    }
}

/// On-disk state file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateFile {
    pub updated_at: DateTime<Utc>,
    pub models: BTreeMap<NodeName, ModelState>,
}

impl Default for StateFile {
    fn default() -> Self {
        Self {
            updated_at: Utc::now(),
            models: BTreeMap::new(),
        }
    }
}

impl StateFile {
    /// Load state from a file path; a missing file is an empty state
    pub fn load(path: &Path) -> CoreResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| CoreError::IoWithPath {
            path: path.display().to_string(),
            source: e,
        })?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Save state to a file path atomically
    ///
    /// Temp file includes the PID to avoid races from concurrent processes.
    pub fn save(&self, path: &Path) -> CoreResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| CoreError::IoWithPath {
                path: parent.display().to_string(),
                source: e,
            })?;
        }

        let temp_path = path.with_extension(format!("json.{}.tmp", std::process::id()));
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&temp_path, &json).map_err(|e| CoreError::IoWithPath {
            path: temp_path.display().to_string(),
            source: e,
        })?;
        std::fs::rename(&temp_path, path).map_err(|e| {
            let _ = std::fs::remove_file(&temp_path);
            CoreError::IoWithPath {
                path: path.display().to_string(),
                source: e,
            }
        })?;
        Ok(())
    }
}

/// Fields written by [`StateStore::save`]
#[derive(Debug, Clone, Default)]
pub struct StateUpdate {
    pub sql_hash: Option<String>,
    pub config_hash: Option<String>,
    pub last_processed_value: Option<String>,
    pub strategy: Option<IncrementalStrategy>,
}

/// Read/write access to model state, optionally backed by a file.
#[derive(Debug, Default)]
pub struct StateStore {
    path: Option<PathBuf>,
    file: StateFile,
}

impl StateStore {
    /// Open a path-backed store. A missing file starts empty.
    pub fn open(path: impl Into<PathBuf>) -> CoreResult<Self> {
        let path = path.into();
        let file = StateFile::load(&path)?;
        Ok(Self {
            path: Some(path),
            file,
        })
    }

    /// Store that never touches the filesystem
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn get(&self, name: &str) -> Option<&ModelState> {
        self.file.models.get(name)
    }

    /// Overwrite the record for `name` after a successful materialization
    pub fn save(
        &mut self,
        name: &NodeName,
        materialization: Materialization,
        update: StateUpdate,
    ) -> CoreResult<()> {
        let state = ModelState {
            name: name.clone(),
            materialization,
            sql_hash: update.sql_hash,
            config_hash: update.config_hash,
            last_processed_value: update.last_processed_value,
            strategy: update.strategy,
            updated_at: Utc::now(),
            origin: StateOrigin::Built,
        };
        self.put(state)
    }

    /// Insert an already-built record (used for rebuilt state)
    pub fn put(&mut self, state: ModelState) -> CoreResult<()> {
        self.file.models.insert(state.name.clone(), state);
        self.file.updated_at = Utc::now();
        self.flush()
    }

    fn flush(&self) -> CoreResult<()> {
        match &self.path {
            Some(path) => self.file.save(path),
            None => Ok(()),
        }
    }

    /// All records, keyed by node name
    pub fn models(&self) -> &BTreeMap<NodeName, ModelState> {
        &self.file.models
    }
}

/// SHA-256 of the SQL that was materialized
pub fn sql_hash(sql: &str) -> String {
    compute_checksum(sql)
}

/// SHA-256 of a model's configuration metadata.
///
/// Incremental models hash only their incremental-config sub-block so that
/// documentation edits do not register as configuration changes.
pub fn config_hash(resolved: &ResolvedMetadata) -> CoreResult<String> {
    match resolved {
        ResolvedMetadata::Incremental(inc) => compute_json_checksum(&inc.config),
        other => compute_json_checksum(other),
    }
}

#[cfg(test)]
#[path = "state_test.rs"]
mod tests;
