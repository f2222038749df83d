//! Shared helpers for the CLI commands

use anyhow::{Context, Result};
use kiln_core::{Config, Manifest, StateStore};
use kiln_db::{Database, DuckDbBackend};
use kiln_run::RunOptions;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::cli::{GlobalArgs, RunArgs};

/// Process exit code carried through `anyhow` without printing anything.
///
/// 1 means the run finished with failures, 2 means the project could not be
/// loaded at all.
#[derive(Debug)]
pub(crate) struct ExitCode(pub(crate) i32);

impl fmt::Display for ExitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "")
    }
}

impl std::error::Error for ExitCode {}

/// Report a configuration problem and turn it into exit code 2
pub(crate) fn config_error(err: anyhow::Error) -> anyhow::Error {
    eprintln!("Error: {:#}", err);
    ExitCode(2).into()
}

/// A loaded project: its root directory and parsed kiln.yml
#[derive(Debug, Clone)]
pub(crate) struct Project {
    pub root: PathBuf,
    pub config: Config,
}

impl Project {
    pub(crate) fn state_path(&self) -> PathBuf {
        self.config.state_path_absolute(&self.root)
    }

    pub(crate) fn results_path(&self) -> PathBuf {
        self.config.results_path_absolute(&self.root)
    }
}

/// Load kiln.yml from `--config` or the project directory
pub(crate) fn load_project(global: &GlobalArgs) -> Result<Project> {
    let root = PathBuf::from(&global.project_dir);
    let config = match &global.config {
        Some(path) => Config::load(Path::new(path))
            .with_context(|| format!("Failed to load config from {}", path)),
        None => Config::load_from_dir(&root)
            .with_context(|| format!("Failed to load project at {}", root.display())),
    }
    .map_err(config_error)?;
    Ok(Project { root, config })
}

pub(crate) fn load_manifest(project: &Project) -> Result<Manifest> {
    let path = project.config.manifest_path_absolute(&project.root);
    Manifest::load(&path)
        .with_context(|| format!("Failed to load manifest {}", path.display()))
        .map_err(config_error)
}

pub(crate) fn open_state(project: &Project) -> Result<StateStore> {
    let path = project.state_path();
    StateStore::open(path.clone())
        .with_context(|| format!("Failed to open state file {}", path.display()))
        .map_err(config_error)
}

/// Connect to `--target` if given, otherwise the configured database
pub(crate) fn create_database_connection(
    project: &Project,
    global: &GlobalArgs,
) -> Result<Arc<dyn Database>> {
    let path = match &global.target {
        Some(target) => target.clone(),
        None => project.config.database_path(&project.root),
    };
    log::info!("Connecting to {} database at {}", project.config.database.db_type, path);
    let db: Arc<dyn Database> =
        Arc::new(DuckDbBackend::new(&path).context("Failed to connect to database")?);
    Ok(db)
}

/// Project config with command-line overrides applied
pub(crate) fn run_options(project: &Project, args: &RunArgs) -> RunOptions {
    let mut options = RunOptions::from_config(&project.config, &project.root);
    if let Some(threads) = args.threads {
        options.threads = threads.max(1);
    }
    if let Some(policy) = args.drift_policy {
        options.drift_policy = policy.into();
    }
    options.full_refresh = args.full_refresh;
    if args.no_seeds {
        options.seed_paths.clear();
    }
    options
}

pub(crate) fn write_json_results<T: Serialize + ?Sized>(path: &Path, data: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).context("Failed to create target directory")?;
    }
    let json = serde_json::to_string_pretty(data).context("Failed to serialize results")?;
    std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

/// Widest cell per column, headers included
pub(crate) fn calculate_column_widths(headers: &[&str], rows: &[Vec<String>]) -> Vec<usize> {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in rows {
        for (w, cell) in widths.iter_mut().zip(row.iter()) {
            *w = (*w).max(cell.chars().count());
        }
    }
    widths
}

fn format_row<S: AsRef<str>>(cells: &[S], widths: &[usize]) -> String {
    cells
        .iter()
        .zip(widths)
        .map(|(cell, &w)| format!("{:<width$}", cell.as_ref(), width = w))
        .collect::<Vec<_>>()
        .join("  ")
        .trim_end()
        .to_string()
}

/// Left-aligned table with a dashed separator under the header
pub(crate) fn print_table(headers: &[&str], rows: &[Vec<String>]) {
    let widths = calculate_column_widths(headers, rows);
    println!("{}", format_row(headers, &widths));
    let separator: Vec<String> = widths.iter().map(|&w| "-".repeat(w)).collect();
    println!("{}", separator.join("  "));
    for row in rows {
        println!("{}", format_row(row.as_slice(), &widths));
    }
}

#[cfg(test)]
#[path = "common_test.rs"]
mod tests;
