//! Compiled manifest: the parser/compiler output consumed by the executor

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::dag::DependencyGraph;
use crate::error::{CoreError, CoreResult};
use crate::function::ParsedFunction;
use crate::model::ParsedModel;
use crate::node_name::NodeName;
use crate::testing::ParsedTest;

/// Resolved dependency graph plus every node definition
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Manifest {
    /// Node name -> names it depends on
    #[serde(default)]
    pub dependencies: BTreeMap<NodeName, Vec<NodeName>>,

    /// Topological execution order over models, functions and tests
    pub execution_order: Vec<NodeName>,

    #[serde(default)]
    pub models: BTreeMap<NodeName, ParsedModel>,

    #[serde(default)]
    pub functions: BTreeMap<NodeName, ParsedFunction>,

    #[serde(default)]
    pub tests: Vec<ParsedTest>,
}

impl Manifest {
    /// Load a manifest from a JSON file and validate it
    pub fn load(path: &Path) -> CoreResult<Self> {
        if !path.exists() {
            return Err(CoreError::ManifestNotFound {
                path: path.display().to_string(),
            });
        }
        let content = std::fs::read_to_string(path).map_err(|e| CoreError::IoWithPath {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_json(&content)
    }

    /// Parse and validate a manifest from a JSON string
    pub fn from_json(content: &str) -> CoreResult<Self> {
        let manifest: Manifest = serde_json::from_str(content)?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Build the dependency graph, checking the execution order against it.
    pub fn graph(&self) -> CoreResult<DependencyGraph> {
        let nodes = self
            .execution_order
            .iter()
            .chain(self.models.keys())
            .chain(self.functions.keys())
            .chain(self.tests.iter().map(|t| &t.name));
        let graph = DependencyGraph::build_with_nodes(&self.dependencies, nodes)?;
        graph.check_order(&self.execution_order)?;
        Ok(graph)
    }

    fn validate(&self) -> CoreResult<()> {
        self.graph()?;

        for test in &self.tests {
            if !test.name.is_test() {
                return Err(CoreError::ManifestInvalid {
                    message: format!(
                        "test '{}' must carry the '{}' prefix",
                        test.name,
                        crate::node_name::TEST_NODE_PREFIX
                    ),
                });
            }
        }

        for (key, function) in &self.functions {
            if *key != function.name {
                return Err(CoreError::ManifestInvalid {
                    message: format!(
                        "function key '{}' does not match its name '{}'",
                        key, function.name
                    ),
                });
            }
        }
        Ok(())
    }

    /// Whether `name` refers to a function node
    pub fn is_function(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Functions in execution order
    pub fn functions_in_order(&self) -> Vec<&ParsedFunction> {
        self.execution_order
            .iter()
            .filter_map(|n| self.functions.get(n))
            .collect()
    }

    /// Non-test, non-function nodes in execution order
    pub fn model_order(&self) -> Vec<NodeName> {
        self.execution_order
            .iter()
            .filter(|n| !n.is_test() && !self.is_function(n))
            .cloned()
            .collect()
    }

    /// Tests whose target is `node`, in declaration order
    pub fn tests_for(&self, node: &str) -> Vec<&ParsedTest> {
        self.tests
            .iter()
            .filter(|t| t.target.node == node)
            .collect()
    }
}

#[cfg(test)]
#[path = "manifest_test.rs"]
mod tests;
