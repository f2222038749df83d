//! Dependency graph over manifest nodes

use crate::error::{CoreError, CoreResult};
use crate::node_name::NodeName;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use std::collections::{BTreeMap, HashMap, HashSet};

/// A directed acyclic graph of node dependencies.
///
/// Edges point from a dependency to its dependent.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    graph: DiGraph<NodeName, ()>,
    node_map: HashMap<NodeName, NodeIndex>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node, returning its index
    pub fn add_node(&mut self, name: &NodeName) -> NodeIndex {
        if let Some(&idx) = self.node_map.get(name) {
            return idx;
        }
        let idx = self.graph.add_node(name.clone());
        self.node_map.insert(name.clone(), idx);
        idx
    }

    /// Record that `node` depends on `dependency`
    pub fn add_dependency(&mut self, node: &NodeName, dependency: &NodeName) {
        let node_idx = self.add_node(node);
        let dep_idx = self.add_node(dependency);
        self.graph.update_edge(dep_idx, node_idx, ());
    }

    /// Build the graph from a map of node name -> dependencies.
    ///
    /// Dependencies that are not themselves keys of the map are external
    /// relations and do not become edges.
    pub fn build(dependencies: &BTreeMap<NodeName, Vec<NodeName>>) -> CoreResult<Self> {
        Self::build_with_nodes(dependencies, std::iter::empty())
    }

    /// Build the graph over `nodes` plus every key of `dependencies`.
    ///
    /// A dependency becomes an edge when it names one of those nodes, whether
    /// or not it has its own entry in the map. Anything else is an external
    /// relation.
    pub fn build_with_nodes<'a, I>(
        dependencies: &'a BTreeMap<NodeName, Vec<NodeName>>,
        nodes: I,
    ) -> CoreResult<Self>
    where
        I: IntoIterator<Item = &'a NodeName>,
    {
        let mut graph = Self::new();

        for node in nodes.into_iter().chain(dependencies.keys()) {
            graph.add_node(node);
        }

        for (node, deps) in dependencies {
            for dep in deps {
                if graph.contains(dep) {
                    graph.add_dependency(node, dep);
                }
            }
        }

        graph.validate()?;
        Ok(graph)
    }

    /// Validate the graph has no cycles
    pub fn validate(&self) -> CoreResult<()> {
        match toposort(&self.graph, None) {
            Ok(_) => Ok(()),
            Err(cycle) => Err(CoreError::CircularDependency {
                cycle: self.find_cycle_path(cycle.node_id()),
            }),
        }
    }

    fn find_cycle_path(&self, start: NodeIndex) -> String {
        let mut path: Vec<String> = vec![self.graph[start].to_string()];
        let mut current = start;
        let mut visited = HashSet::new();
        visited.insert(current);

        while let Some(edge) = self.graph.edges(current).next() {
            let target = edge.target();
            path.push(self.graph[target].to_string());

            if target == start || visited.contains(&target) {
                break;
            }

            visited.insert(target);
            current = target;
        }

        path.join(" -> ")
    }

    /// Check that `order` lists every dependency before its dependents.
    ///
    /// Nodes absent from the graph impose no constraint. A node that appears
    /// twice is rejected.
    pub fn check_order(&self, order: &[NodeName]) -> CoreResult<()> {
        let mut position: HashMap<&str, usize> = HashMap::with_capacity(order.len());
        for (i, name) in order.iter().enumerate() {
            if position.insert(name.as_str(), i).is_some() {
                return Err(CoreError::ManifestInvalid {
                    message: format!("'{}' appears more than once in execution_order", name),
                });
            }
        }

        for edge in self.graph.edge_references() {
            let dep = &self.graph[edge.source()];
            let node = &self.graph[edge.target()];
            if let (Some(&dep_pos), Some(&node_pos)) =
                (position.get(dep.as_str()), position.get(node.as_str()))
            {
                if dep_pos > node_pos {
                    return Err(CoreError::ManifestInvalid {
                        message: format!(
                            "execution_order is not topological: '{}' runs before its dependency '{}'",
                            node, dep
                        ),
                    });
                }
            }
        }
        Ok(())
    }

    /// Direct dependencies of a node
    pub fn dependencies(&self, node: &str) -> Vec<NodeName> {
        self.neighbors(node, Direction::Incoming)
    }

    /// Direct dependents of a node
    pub fn dependents(&self, node: &str) -> Vec<NodeName> {
        self.neighbors(node, Direction::Outgoing)
    }

    fn neighbors(&self, node: &str, direction: Direction) -> Vec<NodeName> {
        let Some(&idx) = self.node_map.get(node) else {
            return Vec::new();
        };
        self.graph
            .neighbors_directed(idx, direction)
            .map(|n| self.graph[n].clone())
            .collect()
    }

    /// Every node reachable from `node` through dependent edges
    pub fn transitive_dependents(&self, node: &str) -> HashSet<NodeName> {
        let mut result = HashSet::new();
        let Some(&start) = self.node_map.get(node) else {
            return result;
        };
        let mut stack = vec![start];
        let mut visited = HashSet::new();
        visited.insert(start);
        while let Some(current) = stack.pop() {
            for next in self.graph.neighbors_directed(current, Direction::Outgoing) {
                if visited.insert(next) {
                    result.insert(self.graph[next].clone());
                    stack.push(next);
                }
            }
        }
        result
    }

    /// Group `order` into levels for concurrent execution.
    ///
    /// A node's level is one more than the highest level of its dependencies
    /// that are part of `order`; nodes keep their relative order within a level.
    pub fn execution_levels(&self, order: &[NodeName]) -> Vec<Vec<NodeName>> {
        let in_run: HashSet<&str> = order.iter().map(|n| n.as_str()).collect();
        let mut level_of: HashMap<&str, usize> = HashMap::with_capacity(order.len());
        let mut levels: Vec<Vec<NodeName>> = Vec::new();

        for name in order {
            let level = self
                .dependencies(name)
                .iter()
                .filter(|d| in_run.contains(d.as_str()))
                .filter_map(|d| level_of.get(d.as_str()).map(|l| l + 1))
                .max()
                .unwrap_or(0);
            level_of.insert(name.as_str(), level);
            if levels.len() <= level {
                levels.resize_with(level + 1, Vec::new);
            }
            levels[level].push(name.clone());
        }

        levels
    }

    /// Check if a node exists in the graph
    pub fn contains(&self, node: &str) -> bool {
        self.node_map.contains_key(node)
    }

    pub fn len(&self) -> usize {
        self.node_map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.node_map.is_empty()
    }
}

#[cfg(test)]
#[path = "dag_test.rs"]
mod tests;
