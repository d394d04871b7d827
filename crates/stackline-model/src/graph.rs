//! Start-dependency graph using `petgraph`.
//!
//! Builds a directed acyclic graph from the `depends_on` edges of a
//! task's containers and resolves the order in which they may start.

use std::collections::HashMap;

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use stackline_common::error::{Result, StacklineError};

use crate::container::{ContainerSpec, DependencyCondition};

/// Start-dependency graph of a task's containers.
#[derive(Debug)]
pub struct StartGraph {
    /// Internal petgraph representation.
    graph: DiGraph<String, DependencyCondition>,
    nodes: HashMap<String, NodeIndex>,
}

impl StartGraph {
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            nodes: HashMap::new(),
        }
    }

    /// Builds the graph of `containers`.
    ///
    /// # Errors
    ///
    /// Returns `StacklineError::DanglingReference` if a container depends
    /// on a container that is not in `containers`.
    pub fn from_containers(containers: &[ContainerSpec]) -> Result<Self> {
        let mut graph = Self::new();
        for container in containers {
            let _ = graph.add_container(&container.name);
        }
        for container in containers {
            let dependent = graph.nodes[&container.name];
            for dep in &container.depends_on {
                let Some(&dependency) = graph.nodes.get(&dep.container) else {
                    return Err(StacklineError::DanglingReference {
                        owner: format!("container \"{}\"", container.name),
                        kind: "container",
                        target: dep.container.clone(),
                    });
                };
                graph.add_dependency(dependent, dependency, dep.condition);
            }
        }
        Ok(graph)
    }

    /// Adds a container node, returning the existing node for known names.
    pub fn add_container(&mut self, name: impl Into<String>) -> NodeIndex {
        let name = name.into();
        if let Some(&idx) = self.nodes.get(&name) {
            return idx;
        }
        let idx = self.graph.add_node(name.clone());
        let _ = self.nodes.insert(name, idx);
        idx
    }

    /// Adds a dependency edge: `dependent` waits for `dependency`.
    ///
    /// The graph edge points from `dependency` to `dependent`
    /// so that topological sort yields dependencies first.
    pub fn add_dependency(
        &mut self,
        dependent: NodeIndex,
        dependency: NodeIndex,
        condition: DependencyCondition,
    ) {
        let _ = self.graph.add_edge(dependency, dependent, condition);
    }

    /// Returns the container names in an order where every container
    /// comes after the containers it depends on.
    ///
    /// # Errors
    ///
    /// Returns an error if the graph contains cycles.
    pub fn resolve_order(&self) -> Result<Vec<String>> {
        match petgraph::algo::toposort(&self.graph, None) {
            Ok(indices) => Ok(indices
                .iter()
                .filter_map(|&idx| self.graph.node_weight(idx).cloned())
                .collect()),
            Err(cycle) => Err(StacklineError::Config {
                message: format!(
                    "cyclic start dependency involving container \"{}\"",
                    self.graph[cycle.node_id()]
                ),
            }),
        }
    }

    /// Direct dependencies of `name` with their conditions.
    #[must_use]
    pub fn dependencies_of(&self, name: &str) -> Vec<(String, DependencyCondition)> {
        let Some(&idx) = self.nodes.get(name) else {
            return Vec::new();
        };
        let mut deps: Vec<(String, DependencyCondition)> = self
            .graph
            .edges_directed(idx, petgraph::Direction::Incoming)
            .map(|e| (self.graph[e.source()].clone(), *e.weight()))
            .collect();
        deps.sort_by(|a, b| a.0.cmp(&b.0));
        deps
    }
}

impl Default for StartGraph {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use stackline_common::types::LogicalId;

    use super::*;
    use crate::container::{ContainerDependency, ImageRef};
    use crate::logs::LogConfiguration;

    fn container(name: &str, deps: &[(&str, DependencyCondition)]) -> ContainerSpec {
        let mut spec = ContainerSpec::new(
            name,
            ImageRef::Uri {
                uri: "busybox".into(),
            },
            LogConfiguration::new(LogicalId::new("Logs"), name),
        );
        spec.depends_on = deps
            .iter()
            .map(|(c, condition)| ContainerDependency {
                container: (*c).into(),
                condition: *condition,
            })
            .collect();
        spec
    }

    #[test]
    fn empty_graph_resolves_to_empty() {
        let graph = StartGraph::new();
        let order = graph.resolve_order().expect("should resolve");
        assert!(order.is_empty());
    }

    #[test]
    fn single_node_resolves() {
        let mut graph = StartGraph::new();
        let _ = graph.add_container("app");
        let order = graph.resolve_order().expect("should resolve");
        assert_eq!(order, vec!["app"]);
    }

    #[test]
    fn init_before_main() {
        let containers = vec![
            container("main", &[("init", DependencyCondition::Success)]),
            container("sidecar", &[]),
            container("init", &[]),
        ];
        let graph = StartGraph::from_containers(&containers).expect("graph");
        let order = graph.resolve_order().expect("should resolve");
        let pos = |name: &str| order.iter().position(|n| n == name).expect(name);
        assert!(pos("init") < pos("main"), "init should come before main: {order:?}");
        assert_eq!(order.len(), 3);
        assert!(graph.dependencies_of("sidecar").is_empty());
    }

    #[test]
    fn diamond_dependency() {
        let containers = vec![
            container(
                "a",
                &[("b", DependencyCondition::Start), ("c", DependencyCondition::Start)],
            ),
            container("b", &[("d", DependencyCondition::Success)]),
            container("c", &[("d", DependencyCondition::Success)]),
            container("d", &[]),
        ];
        let graph = StartGraph::from_containers(&containers).expect("graph");
        let order = graph.resolve_order().expect("should resolve");
        let pos = |name: &str| order.iter().position(|n| n == name).expect(name);
        assert!(pos("d") < pos("b"));
        assert!(pos("d") < pos("c"));
        assert!(pos("b") < pos("a"));
        assert!(pos("c") < pos("a"));
        assert_eq!(graph.dependencies_of("a").len(), 2);
    }

    #[test]
    fn dependencies_carry_conditions() {
        let containers = vec![
            container("main", &[("init", DependencyCondition::Success)]),
            container("init", &[]),
        ];
        let graph = StartGraph::from_containers(&containers).expect("graph");
        assert_eq!(
            graph.dependencies_of("main"),
            vec![("init".to_string(), DependencyCondition::Success)]
        );
        assert!(graph.dependencies_of("init").is_empty());
        assert!(graph.dependencies_of("ghost").is_empty());
    }

    #[test]
    fn cycle_detection() {
        let containers = vec![
            container("a", &[("b", DependencyCondition::Start)]),
            container("b", &[("a", DependencyCondition::Start)]),
        ];
        let graph = StartGraph::from_containers(&containers).expect("graph");
        let msg = graph.resolve_order().unwrap_err().to_string();
        assert!(msg.contains("cyclic"), "got: {msg}");
    }

    #[test]
    fn unknown_dependency_is_dangling() {
        let containers = vec![container("main", &[("ghost", DependencyCondition::Success)])];
        let err = StartGraph::from_containers(&containers).unwrap_err();
        assert!(matches!(err, StacklineError::DanglingReference { .. }), "got: {err}");
    }
}
