use std::fmt;

use petgraph::algo::{tarjan_scc, toposort};

use crate::graph::registry::{NodeId, Registry};

/// Returns `true` if the dependency graph contains a cycle.
pub fn has_cycle(registry: &Registry) -> bool {
    toposort(registry.graph(), None).is_err()
}

/// Every dependency cycle, as node names in registration order.
///
/// Each strongly connected component with more than one node is a cycle, as
/// is a single node that depends on itself.
pub fn find_cycles(registry: &Registry) -> Vec<Vec<String>> {
    let graph = registry.graph();
    let mut components: Vec<Vec<NodeId>> = tarjan_scc(graph)
        .into_iter()
        .filter(|scc| scc.len() > 1 || graph.contains_edge(scc[0], scc[0]))
        .map(|mut scc| {
            scc.sort();
            scc
        })
        .collect();
    components.sort_by_key(|scc| scc[0]);

    components
        .into_iter()
        .map(|scc| {
            scc.into_iter()
                .map(|id| registry.node(id).name().to_owned())
                .collect()
        })
        .collect()
}

/// A dependency edge that could not be satisfied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnmetEdge {
    pub dependency: String,
    pub property_key: String,
}

/// A pending node and the edges holding it back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockedNode {
    pub name: String,
    pub unmet: Vec<UnmetEdge>,
}

impl fmt::Display for LockedNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let edges: Vec<String> = self
            .unmet
            .iter()
            .map(|e| format!("{} {}", e.dependency, e.property_key))
            .collect();
        write!(f, "{} {{ {} }}", self.name, edges.join(", "))
    }
}

/// Why the scheduler could not make progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockReport {
    pub locked: Vec<LockedNode>,
    pub cycles: Vec<Vec<String>>,
}

impl LockReport {
    /// Multi-line description used as the error detail.
    pub fn describe(&self) -> String {
        let mut lines: Vec<String> = self.locked.iter().map(|n| format!("- {n}")).collect();
        for cycle in &self.cycles {
            let mut path = cycle.clone();
            if let Some(first) = cycle.first() {
                path.push(first.clone());
            }
            lines.push(format!("cycle: {}", path.join(" -> ")));
        }
        lines.join("\n")
    }
}

/// Describe every pending node with its unfinished dependencies.
pub fn lock_report(registry: &Registry, pending: &[NodeId]) -> LockReport {
    let locked = pending
        .iter()
        .map(|&id| LockedNode {
            name: registry.node(id).name().to_owned(),
            unmet: registry
                .dependencies(id)
                .into_iter()
                .filter(|(dep, _)| !registry.node(*dep).is_finished())
                .map(|(dep, edge)| UnmetEdge {
                    dependency: registry.node(dep).name().to_owned(),
                    property_key: edge.property_key.clone(),
                })
                .collect(),
        })
        .collect();

    LockReport {
        locked,
        cycles: find_cycles(registry),
    }
}
