//! Deployment order of stacks using `petgraph`.
//!
//! Every import is an edge from the producing stack to the consuming
//! stack, so topological order deploys producers first.

use std::collections::{BTreeSet, HashMap};

use petgraph::graph::{DiGraph, NodeIndex};
use stackline_common::error::{Result, StacklineError};
use stackline_common::types::StackId;

use crate::app::App;

/// Import graph of an app's stacks.
#[derive(Debug)]
pub struct StackGraph {
    graph: DiGraph<StackId, ()>,
    nodes: HashMap<StackId, NodeIndex>,
}

impl StackGraph {
    /// Builds the graph of every stack in `app`.
    ///
    /// # Errors
    ///
    /// Returns `StacklineError::CrossStack` if a stack imports from a stack
    /// `app` does not contain, or a resource its producer does not declare.
    pub fn from_app(app: &App) -> Result<Self> {
        let mut graph = DiGraph::new();
        let mut nodes = HashMap::new();
        for stack in app.stacks() {
            let idx = graph.add_node(stack.id().clone());
            let _ = nodes.insert(stack.id().clone(), idx);
        }
        for stack in app.stacks() {
            let consumer = nodes[stack.id()];
            for import in stack.imports() {
                let Some(producer) = app.stack(&import.stack) else {
                    return Err(StacklineError::CrossStack {
                        message: format!(
                            "stack \"{}\" imports {import} from unknown stack \"{}\"",
                            stack.id(),
                            import.stack
                        ),
                    });
                };
                if producer.resource(&import.logical_id).is_none() {
                    return Err(StacklineError::CrossStack {
                        message: format!(
                            "stack \"{}\" imports {import}, which \"{}\" does not declare",
                            stack.id(),
                            import.stack
                        ),
                    });
                }
                let _ = graph.update_edge(nodes[&import.stack], consumer, ());
            }
        }
        Ok(Self { graph, nodes })
    }

    /// Stack names, producers before their consumers.
    ///
    /// # Errors
    ///
    /// Returns `StacklineError::CrossStack` if the imports form a cycle.
    pub fn deploy_order(&self) -> Result<Vec<StackId>> {
        match petgraph::algo::toposort(&self.graph, None) {
            Ok(indices) => Ok(indices.iter().map(|&idx| self.graph[idx].clone()).collect()),
            Err(cycle) => Err(StacklineError::CrossStack {
                message: format!(
                    "cyclic cross-stack reference involving stack \"{}\"",
                    self.graph[cycle.node_id()]
                ),
            }),
        }
    }

    /// Stacks `id` imports from.
    #[must_use]
    pub fn producers_of(&self, id: &StackId) -> BTreeSet<StackId> {
        self.nodes.get(id).map_or_else(BTreeSet::new, |&idx| {
            self.graph
                .neighbors_directed(idx, petgraph::Direction::Incoming)
                .map(|n| self.graph[n].clone())
                .collect()
        })
    }
}
