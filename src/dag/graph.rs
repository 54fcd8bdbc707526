// src/dag/graph.rs

use std::collections::HashMap;

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::config::model::ConfigFile;

/// Internal node structure: stores immediate deps and dependents.
#[derive(Debug, Clone)]
struct DagNode {
    /// Tasks that must succeed before this one can run.
    deps: Vec<String>,
    /// Tasks that wait on this one.
    dependents: Vec<String>,
}

/// In-memory adjacency keyed by task name.
///
/// Acyclicity and the single start/end shape are checked in
/// `config::validate`; this only keeps what the scheduler needs.
#[derive(Debug, Clone)]
pub struct DagGraph {
    nodes: HashMap<String, DagNode>,
}

impl DagGraph {
    /// Build a DAG from a validated [`ConfigFile`].
    pub fn from_config(cfg: &ConfigFile) -> Self {
        let mut nodes: HashMap<String, DagNode> = HashMap::new();

        for (name, task) in cfg.task.iter() {
            nodes.insert(
                name.clone(),
                DagNode {
                    deps: task.after.clone(),
                    dependents: Vec::new(),
                },
            );
        }

        // BTreeMap iteration keeps `dependents` in name order.
        for (name, task) in cfg.task.iter() {
            for dep in task.after.iter() {
                if let Some(dep_node) = nodes.get_mut(dep) {
                    dep_node.dependents.push(name.clone());
                }
            }
        }

        Self { nodes }
    }

    /// Return all task names.
    pub fn tasks(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(|s| s.as_str())
    }

    /// Immediate dependencies of a task (the tasks listed in its `after`).
    pub fn dependencies_of(&self, name: &str) -> &[String] {
        self.nodes
            .get(name)
            .map(|n| n.deps.as_slice())
            .unwrap_or(&[])
    }

    /// Immediate dependents of a task (tasks that list this one in their `after`).
    pub fn dependents_of(&self, name: &str) -> &[String] {
        self.nodes
            .get(name)
            .map(|n| n.dependents.as_slice())
            .unwrap_or(&[])
    }

    /// Task names in a dependency-respecting order.
    ///
    /// Used for dry-run output. Returns `None` only if the graph has a cycle,
    /// which a validated config never does.
    pub fn topological_order(&self) -> Option<Vec<&str>> {
        let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
        let mut names: Vec<&str> = self.tasks().collect();
        names.sort_unstable();
        for name in &names {
            graph.add_node(*name);
        }
        for name in &names {
            for dep in self.dependencies_of(name) {
                graph.add_edge(dep.as_str(), *name, ());
            }
        }
        toposort(&graph, None).ok()
    }
}
