//! Terminal progress for a run, driven by orchestrator events

use indicatif::{ProgressBar, ProgressStyle};
use kiln_core::TestResult;
use kiln_run::{ExecutionResult, NodeStatus, RunMode, RunObserver};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;

/// Prints one line per finished node above a progress bar
pub(crate) struct ProgressObserver {
    bar: ProgressBar,
    started: Mutex<HashMap<String, Instant>>,
}

impl ProgressObserver {
    pub(crate) fn new() -> Self {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        Self {
            bar,
            started: Mutex::new(HashMap::new()),
        }
    }

    fn elapsed_ms(&self, node: &str) -> u128 {
        self.started
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .remove(node)
            .map(|start| start.elapsed().as_millis())
            .unwrap_or(0)
    }
}

impl RunObserver for ProgressObserver {
    fn run_started(&self, mode: RunMode, nodes: usize) {
        self.bar.set_length(nodes as u64);
        self.bar.set_message(mode.to_string());
    }

    fn node_started(&self, node: &str) {
        self.started
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(node.to_string(), Instant::now());
        self.bar.set_message(node.to_string());
    }

    fn node_finished(&self, node: &str, status: NodeStatus, detail: Option<&str>) {
        let ms = self.elapsed_ms(node);
        let line = match status {
            NodeStatus::Succeeded => format!("  \u{2713} {} [{}ms]", node, ms),
            NodeStatus::Failed => format!(
                "  \u{2717} {} - {} [{}ms]",
                node,
                detail.unwrap_or("failed"),
                ms
            ),
            NodeStatus::Skipped => format!("  - {} (skipped)", node),
        };
        self.bar.println(line);
        self.bar.inc(1);
    }

    fn test_finished(&self, result: &TestResult) {
        let line = if result.passed {
            format!("    \u{2713} {}", result.test_name)
        } else {
            format!(
                "    \u{2717} {} [{}] - {} failing row(s)",
                result.test_name, result.severity, result.failure_count
            )
        };
        self.bar.println(line);
    }

    fn run_finished(&self, _result: &ExecutionResult) {
        self.bar.finish_and_clear();
    }
}
