//! Per-run state shared by the executors

use kiln_core::{Config, DriftPolicy, Materialization, NodeName, StateStore};
use kiln_db::{Database, DatabaseCore, DatabaseSchema};
use kiln_sql::{build_qualification_map, qualify_table_references, QualifiedRef};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::RunResult;
use crate::orchestrator::{NoopObserver, RunObserver};
use crate::results::ResultRecorder;

/// Knobs for one run, usually derived from the project config
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Schema bare model names are created in and qualified against
    pub active_schema: Option<String>,
    pub default_materialization: Materialization,
    pub drift_policy: DriftPolicy,
    pub schema_tags: HashMap<String, BTreeMap<String, String>>,
    /// Rebuild incremental models from their full query
    pub full_refresh: bool,
    /// Concurrent models in `execute` mode
    pub threads: usize,
    /// Seed directories; empty disables seed loading
    pub seed_paths: Vec<PathBuf>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            active_schema: None,
            default_materialization: Materialization::Table,
            drift_policy: DriftPolicy::Warn,
            schema_tags: HashMap::new(),
            full_refresh: false,
            threads: 1,
            seed_paths: Vec::new(),
        }
    }
}

impl RunOptions {
    pub fn from_config(config: &Config, root: &Path) -> Self {
        Self {
            active_schema: config.schema.clone(),
            default_materialization: config.materialization,
            drift_policy: config.drift_policy,
            schema_tags: config.schema_tags.clone(),
            full_refresh: false,
            threads: config.threads.max(1),
            seed_paths: config.seed_paths_absolute(root),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|p| p.into_inner())
}

/// Everything a run owns: backend handle, state store, result recorder and
/// the processed-schema set. Locks are never held across an await.
pub struct RunContext {
    db: Arc<dyn Database>,
    options: RunOptions,
    qualification: HashMap<String, QualifiedRef>,
    processed_schemas: Mutex<HashSet<String>>,
    state: Mutex<StateStore>,
    recorder: Mutex<ResultRecorder>,
    observer: Arc<dyn RunObserver>,
}

impl RunContext {
    /// `models` are the manifest's model names; bare ones are qualified
    /// against the active schema in every statement the run executes.
    pub fn new<'a, I>(db: Arc<dyn Database>, state: StateStore, options: RunOptions, models: I) -> Self
    where
        I: IntoIterator<Item = &'a NodeName>,
    {
        let qualification = match &options.active_schema {
            Some(schema) => build_qualification_map(models.into_iter().map(|n| n.as_str()), schema),
            None => HashMap::new(),
        };
        Self {
            db,
            options,
            qualification,
            processed_schemas: Mutex::new(HashSet::new()),
            state: Mutex::new(state),
            recorder: Mutex::new(ResultRecorder::default()),
            observer: Arc::new(NoopObserver),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn RunObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn db(&self) -> &dyn Database {
        self.db.as_ref()
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    pub fn observer(&self) -> &dyn RunObserver {
        self.observer.as_ref()
    }

    /// Physical relation name of a node: its own schema, else the active one
    pub fn relation_name(&self, node: &NodeName) -> String {
        match node.schema_or(self.options.active_schema.as_deref()) {
            Some(schema) => format!("{}.{}", schema, node.object()),
            None => node.object().to_string(),
        }
    }

    /// Qualify bare model references in `sql`.
    ///
    /// SQL the parser cannot handle is passed through unchanged; the backend
    /// reports the real error if there is one.
    pub fn qualify(&self, sql: &str) -> String {
        if self.qualification.is_empty() {
            return sql.to_string();
        }
        match qualify_table_references(sql, &self.qualification) {
            Ok(qualified) => qualified,
            Err(e) => {
                log::debug!("Leaving references unqualified: {}", e);
                sql.to_string()
            }
        }
    }

    /// Create `schema` and attach its configured tags, once per run.
    pub async fn ensure_schema(&self, schema: &str) -> RunResult<()> {
        if !lock(&self.processed_schemas).insert(schema.to_string()) {
            return Ok(());
        }

        let result = self.prepare_schema(schema).await;
        if result.is_err() {
            lock(&self.processed_schemas).remove(schema);
        }
        result
    }

    async fn prepare_schema(&self, schema: &str) -> RunResult<()> {
        self.db.create_schema_if_not_exists(schema).await?;
        if let Some(tags) = self.options.schema_tags.get(schema) {
            match self.db.as_tag_attacher() {
                Some(attacher) => attacher.attach_schema_tags(schema, tags).await?,
                None => log::debug!(
                    "{} cannot attach tags, skipping tags for schema {}",
                    self.db.db_type(),
                    schema
                ),
            }
        }
        Ok(())
    }

    pub(crate) fn state(&self) -> MutexGuard<'_, StateStore> {
        lock(&self.state)
    }

    pub(crate) fn recorder(&self) -> MutexGuard<'_, ResultRecorder> {
        lock(&self.recorder)
    }

    /// Log and record a run warning
    pub(crate) fn warn(&self, message: String) {
        log::warn!("{}", message);
        self.recorder().warn(message);
    }

    pub(crate) fn decide(&self, node: &str, decision: String) {
        log::debug!("{}: {}", node, decision);
        self.recorder().decision(node, decision);
    }

    /// Start a fresh run: new recorder, empty processed-schema set
    pub(crate) fn reset(&self) {
        *self.recorder() = ResultRecorder::default();
        lock(&self.processed_schemas).clear();
    }

    pub(crate) fn take_recorder(&self) -> ResultRecorder {
        std::mem::take(&mut *self.recorder())
    }

    pub fn into_state(self) -> StateStore {
        self.state.into_inner().unwrap_or_else(|p| p.into_inner())
    }
}
