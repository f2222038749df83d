//! Data-quality test nodes and their results

use serde::{Deserialize, Serialize};

use crate::node_name::NodeName;

/// How a failing test affects the build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TestSeverity {
    /// Failure fails the target node (default)
    #[default]
    Error,
    /// Failure is reported as a warning only
    Warning,
}

impl std::fmt::Display for TestSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TestSeverity::Error => write!(f, "error"),
            TestSeverity::Warning => write!(f, "warning"),
        }
    }
}

/// Node (and optionally column) a test checks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestTarget {
    pub node: NodeName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
}

impl std::fmt::Display for TestTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.column {
            Some(col) => write!(f, "{}.{}", self.node, col),
            None => write!(f, "{}", self.node),
        }
    }
}

/// A test node: a query returning the failing rows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedTest {
    /// Node name, carrying the `test:` prefix
    pub name: NodeName,
    pub target: TestTarget,
    pub sql: String,
    #[serde(default)]
    pub severity: TestSeverity,
}

/// Outcome of running one test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    pub test_name: String,
    pub target: TestTarget,
    pub passed: bool,
    pub severity: TestSeverity,
    pub failure_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl TestResult {
    /// Whether this result fails the target node
    pub fn is_blocking(&self) -> bool {
        !self.passed && self.severity == TestSeverity::Error
    }
}

/// Summary of all tests run in a build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TestSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    /// Failures with `warning` severity
    pub warnings: usize,
}

impl TestSummary {
    /// Count one result
    pub fn record(&mut self, result: &TestResult) {
        self.total += 1;
        if result.passed {
            self.passed += 1;
        } else if result.severity == TestSeverity::Warning {
            self.warnings += 1;
        } else {
            self.failed += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(passed: bool, severity: TestSeverity) -> TestResult {
        TestResult {
            test_name: "test:t".to_string(),
            target: TestTarget {
                node: NodeName::new("orders"),
                column: Some("id".to_string()),
            },
            passed,
            severity,
            failure_count: if passed { 0 } else { 3 },
            message: None,
        }
    }

    #[test]
    fn test_summary_counts() {
        let mut summary = TestSummary::default();
        summary.record(&result(true, TestSeverity::Error));
        summary.record(&result(false, TestSeverity::Error));
        summary.record(&result(false, TestSeverity::Warning));
        assert_eq!(
            summary,
            TestSummary {
                total: 3,
                passed: 1,
                failed: 1,
                warnings: 1
            }
        );
    }

    #[test]
    fn test_blocking() {
        assert!(result(false, TestSeverity::Error).is_blocking());
        assert!(!result(false, TestSeverity::Warning).is_blocking());
        assert!(!result(true, TestSeverity::Error).is_blocking());
    }

    #[test]
    fn test_target_display() {
        assert_eq!(result(true, TestSeverity::Error).target.to_string(), "orders.id");
    }
}
