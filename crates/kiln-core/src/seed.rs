//! Seed file discovery
//!
//! Seeds are data files loaded into tables before any model runs. Files
//! directly under a seed root load into a same-named table; files inside a
//! first-level subdirectory load into `<subdir>.<name>`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// File format of a seed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeedFormat {
    Csv,
    Tsv,
    Json,
}

impl SeedFormat {
    /// Format for a file extension, if it is a seed format
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "csv" => Some(SeedFormat::Csv),
            "tsv" => Some(SeedFormat::Tsv),
            "json" => Some(SeedFormat::Json),
            _ => None,
        }
    }
}

impl std::fmt::Display for SeedFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SeedFormat::Csv => write!(f, "csv"),
            SeedFormat::Tsv => write!(f, "tsv"),
            SeedFormat::Json => write!(f, "json"),
        }
    }
}

/// A discovered seed file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Seed {
    /// Table name (file stem)
    pub name: String,

    /// Schema from the first-level subdirectory, if any
    pub schema: Option<String>,

    pub path: PathBuf,

    pub format: SeedFormat,
}

impl Seed {
    /// `schema.name` or bare `name`
    pub fn qualified_name(&self) -> String {
        match &self.schema {
            Some(s) => format!("{}.{}", s, self.name),
            None => self.name.clone(),
        }
    }

    fn from_path(path: PathBuf, schema: Option<String>) -> Option<Self> {
        let format = path
            .extension()
            .and_then(|e| e.to_str())
            .and_then(SeedFormat::from_extension)?;
        let name = path.file_stem()?.to_str()?.to_string();
        if name.is_empty() {
            return None;
        }
        Some(Self {
            name,
            schema,
            path,
            format,
        })
    }
}

/// Discover all seed files under the given roots, sorted by qualified name.
///
/// Missing roots are skipped. Directories nested deeper than one level are
/// ignored with a warning.
pub fn discover_seeds(seed_paths: &[PathBuf]) -> Vec<Seed> {
    let mut seeds = Vec::new();

    for root in seed_paths {
        if !root.is_dir() {
            log::debug!("Seed path {} does not exist, skipping", root.display());
            continue;
        }
        collect_dir(root, None, &mut seeds);
    }

    seeds.sort_by_key(|s| s.qualified_name());
    seeds
}

fn collect_dir(dir: &Path, schema: Option<&str>, seeds: &mut Vec<Seed>) {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            log::warn!("Cannot read seed directory {}: {}", dir.display(), e);
            return;
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            match (schema, path.file_name().and_then(|n| n.to_str())) {
                (None, Some(subdir)) => collect_dir(&path, Some(subdir), seeds),
                _ => log::warn!(
                    "Ignoring nested seed directory {}: only one level of schema directories is supported",
                    path.display()
                ),
            }
        } else if let Some(seed) = Seed::from_path(path, schema.map(str::to_string)) {
            seeds.push(seed);
        }
    }
}

#[cfg(test)]
#[path = "seed_test.rs"]
mod tests;
