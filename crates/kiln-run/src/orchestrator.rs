//! Run orchestration: seeds, then functions, then models in dependency order.
//!
//! `execute` runs every model once and records every failure. `build` runs
//! models one at a time, tests each one right after it is built, and stops
//! at the first failure after marking the failed node's dependents skipped.

use futures::future::join_all;
use kiln_core::{DependencyGraph, Manifest, NodeName, ParsedTest, StateStore, TestResult};
use kiln_db::Database;
use kiln_test::{generate_column_tests, SqlTestRunner, TestExecutor};
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use tokio::sync::Semaphore;

use crate::context::{RunContext, RunOptions};
use crate::error::{RunError, RunResult};
use crate::function::execute_functions;
use crate::model::{execute_model, ModelOutcome};
use crate::results::{ExecutionResult, RunMode};
use crate::seed::load_seeds;

/// Terminal state of one node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeStatus {
    Succeeded,
    Failed,
    Skipped,
}

impl std::fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeStatus::Succeeded => write!(f, "succeeded"),
            NodeStatus::Failed => write!(f, "failed"),
            NodeStatus::Skipped => write!(f, "skipped"),
        }
    }
}

/// Whether a build may start the next node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Continue,
    Abort(String),
}

/// Progress callbacks. Every method defaults to doing nothing.
pub trait RunObserver: Send + Sync {
    /// `nodes` counts the functions and models the run may visit
    fn run_started(&self, _mode: RunMode, _nodes: usize) {}

    fn node_started(&self, _node: &str) {}

    fn node_finished(&self, _node: &str, _status: NodeStatus, _detail: Option<&str>) {}

    fn test_finished(&self, _result: &TestResult) {}

    fn run_finished(&self, _result: &ExecutionResult) {}
}

/// Observer that ignores every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl RunObserver for NoopObserver {}

/// Drives one project's manifest against one backend.
///
/// The orchestrator owns the run context, so per-run state never outlives
/// it. Call [`into_state`](Self::into_state) to get the state store back.
pub struct Orchestrator {
    ctx: RunContext,
    manifest: Manifest,
    graph: DependencyGraph,
    test_executor: Option<Arc<dyn TestExecutor>>,
}

impl Orchestrator {
    pub fn new(
        db: Arc<dyn Database>,
        manifest: Manifest,
        state: StateStore,
        options: RunOptions,
    ) -> RunResult<Self> {
        let graph = manifest.graph()?;
        let ctx = RunContext::new(db, state, options, manifest.models.keys());
        Ok(Self {
            ctx,
            manifest,
            graph,
            test_executor: None,
        })
    }

    pub fn with_observer(mut self, observer: Arc<dyn RunObserver>) -> Self {
        self.ctx = self.ctx.with_observer(observer);
        self
    }

    /// Run tests through `executor` instead of SQL against the backend
    pub fn with_test_executor(mut self, executor: Arc<dyn TestExecutor>) -> Self {
        self.test_executor = Some(executor);
        self
    }

    pub fn context(&self) -> &RunContext {
        &self.ctx
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn into_state(self) -> StateStore {
        self.ctx.into_state()
    }

    /// Run seeds, functions and every model once. Never aborts.
    pub async fn execute(&self) -> ExecutionResult {
        let models = self.start(RunMode::Execute).await;
        execute_functions(&self.ctx, &self.manifest).await;

        let threads = self.ctx.options().threads;
        if threads > 1 && models.len() > 1 {
            self.execute_concurrent(&models, threads).await;
        } else {
            for name in &models {
                self.execute_node(name).await;
            }
        }

        self.finish(RunMode::Execute)
    }

    /// Run seeds, functions, then models sequentially with their tests,
    /// stopping at the first model error or blocking test failure.
    pub async fn build(&self) -> ExecutionResult {
        let models = self.start(RunMode::Build).await;

        let failed_functions = execute_functions(&self.ctx, &self.manifest).await;
        let mut skip: HashSet<NodeName> = HashSet::new();
        for function in &failed_functions {
            skip.extend(self.graph.transitive_dependents(function));
        }

        let sql_runner = SqlTestRunner::new(self.ctx.db());
        let tests: &dyn TestExecutor = match &self.test_executor {
            Some(executor) => executor.as_ref(),
            None => &sql_runner,
        };

        self.warn_untargeted_tests();

        for function in self.manifest.functions_in_order() {
            let name = &function.name;
            if failed_functions.contains(name) {
                continue;
            }
            if let Outcome::Abort(reason) = self.test_function(name, tests).await {
                log::error!("Build aborted: {}", reason);
                self.ctx.recorder().abort(reason);
                return self.finish(RunMode::Build);
            }
        }

        for name in &models {
            if skip.contains(name) {
                self.skip(name);
                continue;
            }
            if let Outcome::Abort(reason) = self.build_node(name, tests).await {
                log::error!("Build aborted: {}", reason);
                self.ctx.recorder().abort(reason);
                break;
            }
        }

        self.finish(RunMode::Build)
    }

    /// Fresh recorder, seeds loaded. Returns the models to run.
    async fn start(&self, mode: RunMode) -> Vec<NodeName> {
        self.ctx.reset();
        let models = self.manifest.model_order();
        log::info!(
            "Starting {} of {} model(s) and {} function(s)",
            mode,
            models.len(),
            self.manifest.functions.len()
        );
        self.ctx
            .observer()
            .run_started(mode, models.len() + self.manifest.functions.len());

        let seed_paths = &self.ctx.options().seed_paths;
        if !seed_paths.is_empty() {
            load_seeds(&self.ctx, seed_paths).await;
        }
        models
    }

    fn finish(&self, mode: RunMode) -> ExecutionResult {
        let run_id = uuid::Uuid::new_v4().to_string();
        let result = self.ctx.take_recorder().finish(mode, run_id);
        log::info!(
            "{} finished: {} executed, {} failed, {} skipped",
            mode,
            result.executed_tables.len(),
            result.failed_tables.len(),
            result.skipped_tables.len()
        );
        self.ctx.observer().run_finished(&result);
        result
    }

    async fn execute_concurrent(&self, models: &[NodeName], threads: usize) {
        // Schemas first, so nodes of one level never race to create one
        let active = self.ctx.options().active_schema.as_deref();
        let schemas: BTreeSet<&str> = models.iter().filter_map(|n| n.schema_or(active)).collect();
        for schema in schemas {
            if let Err(e) = self.ctx.ensure_schema(schema).await {
                log::warn!("Could not create schema {}: {}", schema, e);
            }
        }

        let levels = self.graph.execution_levels(models);
        log::info!(
            "Running {} model(s) in {} level(s) with {} threads",
            models.len(),
            levels.len(),
            threads
        );

        let semaphore = Semaphore::new(threads);
        for level in &levels {
            let runs = level.iter().map(|name| {
                let semaphore = &semaphore;
                async move {
                    let Ok(_permit) = semaphore.acquire().await else {
                        return;
                    };
                    self.execute_node(name).await;
                }
            });
            join_all(runs).await;
        }
    }

    async fn execute_node(&self, name: &NodeName) {
        self.ctx.observer().node_started(name);
        match execute_model(&self.ctx, &self.manifest, name).await {
            Ok(outcome) => self.succeeded(name, outcome),
            Err(e) => self.failed(name, e.to_string()),
        }
    }

    async fn build_node(&self, name: &NodeName, tests: &dyn TestExecutor) -> Outcome {
        self.ctx.observer().node_started(name);
        let outcome = match execute_model(&self.ctx, &self.manifest, name).await {
            Ok(outcome) => outcome,
            Err(e) => return self.abort_at(name, e.to_string()),
        };

        match self.run_tests(name, self.tests_for(name, &outcome), tests).await {
            Some(e) => self.abort_at(name, e.to_string()),
            None => {
                self.succeeded(name, outcome);
                Outcome::Continue
            }
        }
    }

    /// Run the declared tests of a deployed function. A blocking failure
    /// turns the function into a failed one and stops the build.
    async fn test_function(&self, name: &NodeName, tests: &dyn TestExecutor) -> Outcome {
        let declared = self.declared_tests(name);
        if declared.is_empty() {
            return Outcome::Continue;
        }
        let Some(e) = self.run_tests(name, declared, tests).await else {
            return Outcome::Continue;
        };

        let message = e.to_string();
        log::error!("Function {} failed: {}", name, message);
        self.ctx.recorder().function_failed(name, message.clone());
        for dependent in self.sorted_dependents(name) {
            self.skip(&dependent);
        }
        Outcome::Abort(format!("{} failed: {}", name, message))
    }

    /// Run `tests` against `name`, recording every result. Warning-severity
    /// failures become run warnings; the first blocking failure is returned.
    async fn run_tests(
        &self,
        name: &NodeName,
        to_run: Vec<ParsedTest>,
        tests: &dyn TestExecutor,
    ) -> Option<RunError> {
        let mut blocking = None;
        for test in to_run {
            let result = tests.run_test(&test).await;
            self.ctx.observer().test_finished(&result);

            if !result.passed {
                let message = result.message.clone().unwrap_or_default();
                if result.is_blocking() {
                    if blocking.is_none() {
                        blocking = Some(RunError::TestFailed {
                            test: result.test_name.clone(),
                            node: name.to_string(),
                            message,
                        });
                    }
                } else {
                    self.ctx.warn(format!(
                        "Test {} on {} failed with warning severity: {}",
                        result.test_name, name, message
                    ));
                }
            }
            self.ctx.recorder().test(result);
        }
        blocking
    }

    /// Tests whose target is neither a model nor a function never run
    fn warn_untargeted_tests(&self) {
        for test in &self.manifest.tests {
            let target = test.target.node.as_str();
            if !self.manifest.models.contains_key(target) && !self.manifest.is_function(target) {
                self.ctx.warn(format!(
                    "Test {} targets unknown node '{}' and was not run",
                    test.name, target
                ));
            }
        }
    }

    /// Manifest tests of a node, with bare references qualified
    fn declared_tests(&self, name: &NodeName) -> Vec<ParsedTest> {
        self.manifest
            .tests_for(name)
            .into_iter()
            .map(|t| ParsedTest {
                sql: self.ctx.qualify(&t.sql),
                ..t.clone()
            })
            .collect()
    }

    fn sorted_dependents(&self, name: &NodeName) -> Vec<NodeName> {
        let mut dependents: Vec<NodeName> = self
            .graph
            .transitive_dependents(name)
            .into_iter()
            .filter(|n| !n.is_test())
            .collect();
        dependents.sort();
        dependents
    }

    /// Declared tests of the node plus tests generated from its column docs
    fn tests_for(&self, name: &NodeName, outcome: &ModelOutcome) -> Vec<ParsedTest> {
        let mut tests = self.declared_tests(name);

        let Some(docs) = &outcome.docs else {
            return tests;
        };
        match generate_column_tests(name, &outcome.relation, &docs.columns) {
            Ok(generated) => {
                for test in generated {
                    if !tests.iter().any(|t| t.name == test.name) {
                        tests.push(test);
                    }
                }
            }
            Err(e) => self
                .ctx
                .warn(format!("Skipping column tests of {}: {}", name, e)),
        }
        tests
    }

    fn succeeded(&self, name: &NodeName, outcome: ModelOutcome) {
        log::info!("Built {} as {}", outcome.relation, outcome.materialization);
        self.ctx
            .recorder()
            .executed(name, outcome.materialization, outcome.info);
        self.ctx
            .observer()
            .node_finished(name, NodeStatus::Succeeded, None);
    }

    fn failed(&self, name: &NodeName, message: String) {
        log::error!("{} failed: {}", name, message);
        self.ctx.recorder().failed(name, message.clone());
        self.ctx
            .observer()
            .node_finished(name, NodeStatus::Failed, Some(&message));
    }

    fn skip(&self, name: &NodeName) {
        log::info!("Skipping {}: an upstream node failed", name);
        self.ctx.recorder().skipped(name);
        self.ctx
            .observer()
            .node_finished(name, NodeStatus::Skipped, None);
    }

    /// Fail `name`, skip everything downstream of it and stop the build
    fn abort_at(&self, name: &NodeName, message: String) -> Outcome {
        self.failed(name, message.clone());

        for dependent in self.sorted_dependents(name) {
            self.skip(&dependent);
        }

        Outcome::Abort(format!("{} failed: {}", name, message))
    }
}

#[cfg(test)]
#[path = "orchestrator_test.rs"]
mod tests;
