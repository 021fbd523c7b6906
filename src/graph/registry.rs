use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use tracing::debug;

use crate::graph::builder::UnitBuilder;
use crate::model::identity::Identity;
use crate::model::node::{DependencyEdge, HookEntry, HookType, SpecEntry, TestNode};
use crate::model::unit::{Callable, TestUnit};

/// Index of a node in the registry. Indices follow registration order.
pub type NodeId = NodeIndex;

type Resolver = Box<dyn FnOnce() -> Vec<Identity> + Send>;

enum Deferred {
    Dependencies { node: NodeId, resolve: Resolver },
    Dependents { node: NodeId, resolve: Resolver },
}

/// All registered test units and their dependency edges.
///
/// Edges point from a dependency to its dependent, so the incoming edges of
/// a node are its dependencies and the outgoing edges are its dependents.
/// One `add_edge` records both sides.
pub struct Registry {
    graph: DiGraph<TestNode, DependencyEdge>,
    index: HashMap<TypeId, NodeId>,
    deferred: Vec<Deferred>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            index: HashMap::new(),
            deferred: Vec::new(),
        }
    }

    /// Start (or continue) registering the unit type `T`.
    pub fn unit<T: TestUnit + Default>(&mut self) -> UnitBuilder<'_, T> {
        let node = self.get_or_create(Identity::of::<T>());
        UnitBuilder::new(self, node)
    }

    /// Return the node for `identity`, creating an empty one on first use.
    pub fn get_or_create(&mut self, identity: Identity) -> NodeId {
        if let Some(&id) = self.index.get(&identity.type_id()) {
            return id;
        }
        let id = self.graph.add_node(TestNode::new(identity));
        self.index.insert(identity.type_id(), id);
        debug!(target: "dagspec::registry", unit = identity.name(), "node created");
        id
    }

    pub fn find(&self, identity: Identity) -> Option<NodeId> {
        self.index.get(&identity.type_id()).copied()
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// # Panics
    ///
    /// Panics if `id` was not handed out by this registry.
    pub fn node(&self, id: NodeId) -> &TestNode {
        &self.graph[id]
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut TestNode {
        &mut self.graph[id]
    }

    /// Node ids in registration order.
    pub fn node_ids(&self) -> Vec<NodeId> {
        self.graph.node_indices().collect()
    }

    pub(crate) fn graph(&self) -> &DiGraph<TestNode, DependencyEdge> {
        &self.graph
    }

    pub(crate) fn declare_spec(
        &mut self,
        id: NodeId,
        key: &str,
        timeout: Option<Duration>,
        callable: Callable,
    ) -> Result<(), ConfigError> {
        let node = &mut self.graph[id];
        if node.has_hook(key) {
            return Err(ConfigError::new(
                ConfigErrorKind::HookSpecConflict,
                node.name(),
                key,
            ));
        }
        if node.has_spec(key) {
            return Err(ConfigError::new(
                ConfigErrorKind::DuplicateSpec,
                node.name(),
                key,
            ));
        }
        node.specs.push(SpecEntry {
            key: key.to_owned(),
            timeout,
            callable,
        });
        Ok(())
    }

    pub(crate) fn declare_hook(
        &mut self,
        id: NodeId,
        key: &str,
        hook_type: HookType,
        timeout: Option<Duration>,
        callable: Callable,
    ) -> Result<(), ConfigError> {
        let node = &mut self.graph[id];
        if node.has_spec(key) {
            return Err(ConfigError::new(
                ConfigErrorKind::HookSpecConflict,
                node.name(),
                key,
            ));
        }
        if node.has_hook(key) {
            return Err(ConfigError::new(
                ConfigErrorKind::DuplicateHook,
                node.name(),
                key,
            ));
        }
        node.hooks.push(HookEntry {
            key: key.to_owned(),
            hook_type,
            timeout,
            callable,
        });
        Ok(())
    }

    /// Record that `id` needs `dependency` finished first, injected under
    /// `property_key`.
    pub(crate) fn declare_dependency(&mut self, id: NodeId, property_key: &str, dependency: NodeId) {
        debug!(
            target: "dagspec::registry",
            unit = self.graph[id].name(),
            dependency = self.graph[dependency].name(),
            key = property_key,
            "dependency declared"
        );
        self.graph.add_edge(
            dependency,
            id,
            DependencyEdge {
                property_key: property_key.to_owned(),
            },
        );
    }

    /// Dependencies computed when the registry is sealed.
    pub(crate) fn defer_dependencies<F>(&mut self, id: NodeId, resolve: F)
    where
        F: FnOnce() -> Vec<Identity> + Send + 'static,
    {
        self.deferred.push(Deferred::Dependencies {
            node: id,
            resolve: Box::new(resolve),
        });
    }

    /// Dependents computed when the registry is sealed.
    pub(crate) fn defer_dependents<F>(&mut self, id: NodeId, resolve: F)
    where
        F: FnOnce() -> Vec<Identity> + Send + 'static,
    {
        self.deferred.push(Deferred::Dependents {
            node: id,
            resolve: Box::new(resolve),
        });
    }

    /// Declare each identity as a dependency of `id`, keyed by its name.
    pub(crate) fn declare_dependencies(&mut self, id: NodeId, dependencies: Vec<Identity>) {
        for identity in dependencies {
            let dependency = self.get_or_create(identity);
            self.declare_dependency(id, &identity.property_key(), dependency);
        }
    }

    /// Declare `id` as a dependency of each identity, keyed by `id`'s name.
    pub(crate) fn declare_dependents(&mut self, id: NodeId, dependents: Vec<Identity>) {
        let key = self.graph[id].identity().property_key();
        for identity in dependents {
            let dependent = self.get_or_create(identity);
            self.declare_dependency(dependent, &key, id);
        }
    }

    /// Skip a spec statically. Reasons accumulate with `", "`.
    pub(crate) fn declare_skip(&mut self, id: NodeId, key: &str, reason: &str) {
        self.graph[id].add_skip(key, reason);
    }

    /// Skip every spec of the unit.
    pub(crate) fn declare_class_skip(&mut self, id: NodeId, reason: &str) {
        self.graph[id].set_class_skip(reason);
    }

    /// Resolve deferred declarations. Called by the runner before the first
    /// node is scheduled; calling it again is a no-op.
    pub fn seal(&mut self) {
        for deferred in std::mem::take(&mut self.deferred) {
            match deferred {
                Deferred::Dependencies { node, resolve } => {
                    self.declare_dependencies(node, resolve());
                }
                Deferred::Dependents { node, resolve } => {
                    self.declare_dependents(node, resolve());
                }
            }
        }
    }

    pub fn has_deferred(&self) -> bool {
        !self.deferred.is_empty()
    }

    /// Dependencies of `id` in declaration order.
    pub fn dependencies(&self, id: NodeId) -> Vec<(NodeId, &DependencyEdge)> {
        let mut edges: Vec<_> = self
            .graph
            .edges_directed(id, Direction::Incoming)
            .collect();
        edges.sort_by_key(|e| e.id());
        edges.into_iter().map(|e| (e.source(), e.weight())).collect()
    }

    /// Dependents of `id` in declaration order.
    pub fn dependents(&self, id: NodeId) -> Vec<NodeId> {
        let mut edges: Vec<_> = self
            .graph
            .edges_directed(id, Direction::Outgoing)
            .collect();
        edges.sort_by_key(|e| e.id());
        edges.into_iter().map(|e| e.target()).collect()
    }

    pub fn dependencies_finished(&self, id: NodeId) -> bool {
        self.graph
            .neighbors_directed(id, Direction::Incoming)
            .all(|dep| self.graph[dep].is_finished())
    }

    pub fn has_unfinished_dependents(&self, id: NodeId) -> bool {
        self.graph
            .neighbors_directed(id, Direction::Outgoing)
            .any(|dependent| !self.graph[dependent].is_finished())
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("nodes", &self.graph.node_count())
            .field("edges", &self.graph.edge_count())
            .field("deferred", &self.deferred.len())
            .finish()
    }
}

/// Conflicting or duplicate registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError {
    pub kind: ConfigErrorKind,
    pub message: String,
    pub unit: String,
    pub key: String,
}

impl ConfigError {
    fn new(kind: ConfigErrorKind, unit: &str, key: &str) -> Self {
        let message = match kind {
            ConfigErrorKind::HookSpecConflict => {
                format!("{unit}.{key} cannot be both a hook and a spec")
            }
            ConfigErrorKind::DuplicateSpec => format!("{unit}.{key} is already a spec"),
            ConfigErrorKind::DuplicateHook => format!("{unit}.{key} is already a hook"),
        };
        Self {
            kind,
            message,
            unit: unit.to_owned(),
            key: key.to_owned(),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for ConfigError {}

/// Classification of registration errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigErrorKind {
    /// The key is registered as a hook and a spec.
    HookSpecConflict,
    /// The key is registered as a spec twice.
    DuplicateSpec,
    /// The key is registered as a hook twice.
    DuplicateHook,
}

impl fmt::Display for ConfigErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HookSpecConflict => write!(f, "hook/spec conflict"),
            Self::DuplicateSpec => write!(f, "duplicate spec"),
            Self::DuplicateHook => write!(f, "duplicate hook"),
        }
    }
}
