//! Execution results: what a run did, node by node

use chrono::{DateTime, Utc};
use kiln_core::{Materialization, TestResult, TestSummary};
use kiln_db::{ColumnInfo, TableInfo};
use serde::Serialize;
use std::collections::BTreeMap;

/// Which top-level mode produced a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    Execute,
    Build,
}

impl std::fmt::Display for RunMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunMode::Execute => write!(f, "execute"),
            RunMode::Build => write!(f, "build"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedTable {
    pub table: String,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedFunction {
    pub function: String,
    pub error: String,
}

/// Introspected shape of a materialized relation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableSummary {
    pub columns: Vec<ColumnInfo>,
    pub row_count: u64,
}

impl From<TableInfo> for TableSummary {
    fn from(info: TableInfo) -> Self {
        Self {
            columns: info.columns,
            row_count: info.row_count,
        }
    }
}

/// One entry of the incremental decision log
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Decision {
    pub node: String,
    pub decision: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SeedReport {
    pub loaded_tables: Vec<String>,
    pub failed_tables: Vec<FailedTable>,
}

/// Outcome of one run. Immutable once returned by the orchestrator.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    pub run_id: String,
    pub mode: RunMode,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub executed_tables: Vec<String>,
    pub failed_tables: Vec<FailedTable>,
    pub skipped_tables: Vec<String>,
    pub executed_functions: Vec<String>,
    pub failed_functions: Vec<FailedFunction>,
    pub table_info: BTreeMap<String, TableSummary>,
    pub materializations: BTreeMap<String, Materialization>,
    pub warnings: Vec<String>,
    pub decisions: Vec<Decision>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seeds: Option<SeedReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_results: Option<TestSummary>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tests: Vec<TestResult>,
    /// Why a `build` stopped early
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aborted: Option<String>,
}

impl ExecutionResult {
    /// Whether anything failed or the run was aborted
    pub fn has_failures(&self) -> bool {
        self.aborted.is_some()
            || !self.failed_tables.is_empty()
            || !self.failed_functions.is_empty()
            || self
                .seeds
                .as_ref()
                .is_some_and(|s| !s.failed_tables.is_empty())
    }

    pub fn is_failed(&self, table: &str) -> bool {
        self.failed_tables.iter().any(|f| f.table == table)
    }

    pub fn is_executed(&self, table: &str) -> bool {
        self.executed_tables.iter().any(|s| s == table)
    }
}

/// Accumulates a run's result; turned into an [`ExecutionResult`] at the end.
#[derive(Debug)]
pub(crate) struct ResultRecorder {
    started_at: DateTime<Utc>,
    executed_tables: Vec<String>,
    failed_tables: Vec<FailedTable>,
    skipped_tables: Vec<String>,
    executed_functions: Vec<String>,
    failed_functions: Vec<FailedFunction>,
    table_info: BTreeMap<String, TableSummary>,
    materializations: BTreeMap<String, Materialization>,
    warnings: Vec<String>,
    decisions: Vec<Decision>,
    seeds: Option<SeedReport>,
    tests: Vec<TestResult>,
    aborted: Option<String>,
}

impl Default for ResultRecorder {
    fn default() -> Self {
        Self {
            started_at: Utc::now(),
            executed_tables: Vec::new(),
            failed_tables: Vec::new(),
            skipped_tables: Vec::new(),
            executed_functions: Vec::new(),
            failed_functions: Vec::new(),
            table_info: BTreeMap::new(),
            materializations: BTreeMap::new(),
            warnings: Vec::new(),
            decisions: Vec::new(),
            seeds: None,
            tests: Vec::new(),
            aborted: None,
        }
    }
}

impl ResultRecorder {
    pub(crate) fn executed(
        &mut self,
        name: &str,
        materialization: Materialization,
        info: Option<TableSummary>,
    ) {
        self.executed_tables.push(name.to_string());
        self.materializations.insert(name.to_string(), materialization);
        if let Some(info) = info {
            self.table_info.insert(name.to_string(), info);
        }
    }

    pub(crate) fn failed(&mut self, name: &str, error: String) {
        self.failed_tables.push(FailedTable {
            table: name.to_string(),
            error,
        });
    }

    /// Record a skip once, however many failures reach the node
    pub(crate) fn skipped(&mut self, name: &str) {
        if !self.skipped_tables.iter().any(|s| s == name) {
            self.skipped_tables.push(name.to_string());
        }
    }

    pub(crate) fn function_executed(&mut self, name: &str) {
        self.executed_functions.push(name.to_string());
    }

    /// A function that fails after deployment (through a test) leaves the
    /// executed list
    pub(crate) fn function_failed(&mut self, name: &str, error: String) {
        self.executed_functions.retain(|f| f != name);
        self.failed_functions.push(FailedFunction {
            function: name.to_string(),
            error,
        });
    }

    pub(crate) fn warn(&mut self, message: String) {
        self.warnings.push(message);
    }

    pub(crate) fn decision(&mut self, node: &str, decision: String) {
        self.decisions.push(Decision {
            node: node.to_string(),
            decision,
        });
    }

    pub(crate) fn seeds(&mut self, report: SeedReport) {
        self.seeds = Some(report);
    }

    pub(crate) fn test(&mut self, result: TestResult) {
        self.tests.push(result);
    }

    pub(crate) fn abort(&mut self, reason: String) {
        self.aborted = Some(reason);
    }

    pub(crate) fn finish(self, mode: RunMode, run_id: String) -> ExecutionResult {
        let test_results = if mode == RunMode::Build {
            Some(kiln_test::summarize(&self.tests))
        } else {
            None
        };
        ExecutionResult {
            run_id,
            mode,
            started_at: self.started_at,
            finished_at: Utc::now(),
            executed_tables: self.executed_tables,
            failed_tables: self.failed_tables,
            skipped_tables: self.skipped_tables,
            executed_functions: self.executed_functions,
            failed_functions: self.failed_functions,
            table_info: self.table_info,
            materializations: self.materializations,
            warnings: self.warnings,
            decisions: self.decisions,
            seeds: self.seeds,
            test_results,
            tests: self.tests,
            aborted: self.aborted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skip_recorded_once() {
        let mut recorder = ResultRecorder::default();
        recorder.skipped("m2");
        recorder.skipped("m2");
        let result = recorder.finish(RunMode::Build, "r".to_string());
        assert_eq!(result.skipped_tables, vec!["m2".to_string()]);
        assert!(!result.has_failures());
        assert_eq!(result.test_results, Some(TestSummary::default()));
    }

    #[test]
    fn test_failures_detected() {
        let mut recorder = ResultRecorder::default();
        recorder.executed("m1", Materialization::View, None);
        recorder.function_failed("f", "boom".to_string());
        let result = recorder.finish(RunMode::Execute, "r".to_string());
        assert!(result.has_failures());
        assert!(result.is_executed("m1"));
        assert!(result.test_results.is_none());
        assert_eq!(result.materializations["m1"], Materialization::View);
    }

    #[test]
    fn test_serialized_shape() {
        let mut recorder = ResultRecorder::default();
        recorder.failed("m1", "boom".to_string());
        let result = recorder.finish(RunMode::Execute, "r".to_string());
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["mode"], "execute");
        assert_eq!(json["failed_tables"][0]["table"], "m1");
        assert_eq!(json["failed_tables"][0]["error"], "boom");
        assert!(json.get("aborted").is_none());
        assert!(json.get("test_results").is_none());
    }
}
