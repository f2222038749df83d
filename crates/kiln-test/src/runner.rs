//! Test execution

use async_trait::async_trait;
use kiln_core::{ParsedTest, TestResult, TestSummary};
use kiln_db::Database;

/// Number of failing rows quoted in a failure message
const SAMPLE_ROWS: usize = 5;

/// Runs test nodes and reports their results.
///
/// Execution errors are reported as failed results, never as `Err`: a test
/// that cannot run does not pass.
#[async_trait]
pub trait TestExecutor: Send + Sync {
    /// Run a single test
    async fn run_test(&self, test: &ParsedTest) -> TestResult;

    /// Run tests one after another, in order
    async fn run_tests(&self, tests: &[ParsedTest]) -> Vec<TestResult> {
        let mut results = Vec::with_capacity(tests.len());
        for test in tests {
            results.push(self.run_test(test).await);
        }
        results
    }
}

/// Test runner that treats every row returned by the test query as a failure
pub struct SqlTestRunner<'a> {
    db: &'a dyn Database,
}

impl<'a> SqlTestRunner<'a> {
    /// Create a new test runner
    pub fn new(db: &'a dyn Database) -> Self {
        Self { db }
    }

    async fn sample_failures(&self, sql: &str) -> Vec<String> {
        let sample_sql = format!("SELECT * FROM ({}) AS kiln_failures LIMIT {}", sql, SAMPLE_ROWS);
        match self.db.execute_query(&sample_sql).await {
            Ok(rows) => rows
                .into_iter()
                .map(|row| {
                    row.into_iter()
                        .map(|v| v.unwrap_or_else(|| "NULL".to_string()))
                        .collect::<Vec<_>>()
                        .join(", ")
                })
                .collect(),
            Err(e) => {
                log::debug!("Could not sample failing rows: {}", e);
                Vec::new()
            }
        }
    }
}

#[async_trait]
impl<'a> TestExecutor for SqlTestRunner<'a> {
    async fn run_test(&self, test: &ParsedTest) -> TestResult {
        log::debug!("Running {}: {}", test.name, test.sql);

        let (passed, failure_count, message) = match self.db.query_count(&test.sql).await {
            Ok(0) => (true, 0, None),
            Ok(count) => {
                let samples = self.sample_failures(&test.sql).await;
                let mut message = format!("{} failing row(s)", count);
                if !samples.is_empty() {
                    message.push_str(&format!(": ({})", samples.join("), (")));
                }
                (false, count, Some(message))
            }
            Err(e) => (false, 0, Some(e.to_string())),
        };

        TestResult {
            test_name: test.name.to_string(),
            target: test.target.clone(),
            passed,
            severity: test.severity,
            failure_count,
            message,
        }
    }
}

/// Summarize test results
pub fn summarize(results: &[TestResult]) -> TestSummary {
    let mut summary = TestSummary::default();
    for result in results {
        summary.record(result);
    }
    summary
}

#[cfg(test)]
#[path = "runner_test.rs"]
mod tests;
