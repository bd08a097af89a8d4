//! Registry of managed kinds and their reference graph.
//!
//! Each registered kind declares which kinds it may reference. The registry
//! uses that graph to extract references from stored objects and to order
//! kinds for teardown so that referencing kinds go before the kinds they
//! reference.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::fmt;

use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};

use crate::error::{ClusterError, ReconcileError};
use crate::object::{DynamicObject, ObjectRef, ResourceSpec};

/// Scope and references read from a stored object.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SpecFacts {
    /// Scope the object belongs to.
    pub scope: Option<String>,
    /// Objects the object references.
    pub references: Vec<ObjectRef>,
}

type FactsFn = fn(&DynamicObject) -> Result<SpecFacts, ClusterError>;

#[derive(Clone, Copy)]
struct KindEntry {
    referenced: &'static [&'static str],
    facts: FactsFn,
}

fn facts_of<S: ResourceSpec>(object: &DynamicObject) -> Result<SpecFacts, ClusterError> {
    let spec: S = serde_json::from_value(object.spec.clone()).map_err(|err| ClusterError::Codec {
        kind: S::KIND.to_owned(),
        message: err.to_string(),
    })?;
    Ok(SpecFacts {
        scope: spec.scope().map(str::to_owned),
        references: spec.references(),
    })
}

/// Kinds known to the operator.
#[derive(Clone, Default)]
pub struct KindRegistry {
    entries: BTreeMap<&'static str, KindEntry>,
}

impl fmt::Debug for KindRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KindRegistry")
            .field("kinds", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl KindRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a kind by its spec type.
    #[must_use]
    pub fn register<S: ResourceSpec>(mut self) -> Self {
        self.entries.insert(
            S::KIND,
            KindEntry {
                referenced: S::REFERENCED_KINDS,
                facts: facts_of::<S>,
            },
        );
        self
    }

    /// Registered kinds in name order.
    pub fn kinds(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.keys().copied()
    }

    /// Returns `true` when the kind is registered.
    #[must_use]
    pub fn contains(&self, kind: &str) -> bool {
        self.entries.contains_key(kind)
    }

    /// Kinds `kind` may reference; empty for unregistered kinds.
    #[must_use]
    pub fn referenced_kinds(&self, kind: &str) -> &'static [&'static str] {
        match self.entries.get(kind) {
            Some(entry) => entry.referenced,
            None => &[],
        }
    }

    /// Registered kinds that may reference `kind`.
    #[must_use]
    pub fn referencing_kinds(&self, kind: &str) -> Vec<&'static str> {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.referenced.iter().any(|r| *r == kind))
            .map(|(name, _)| *name)
            .collect()
    }

    /// Reads scope and references from a stored object.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::UnknownKind`] for unregistered kinds and
    /// propagates decoding failures.
    pub fn facts(&self, object: &DynamicObject) -> Result<SpecFacts, ReconcileError> {
        let entry = self
            .entries
            .get(object.kind.as_str())
            .ok_or_else(|| ReconcileError::UnknownKind {
                kind: object.kind.clone(),
            })?;
        Ok((entry.facts)(object)?)
    }

    /// Orders kinds so that every kind precedes the kinds it references.
    ///
    /// Ties break by kind name. References to unregistered kinds are
    /// ignored.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::DependencyCycle`] when kinds reference each
    /// other in a loop.
    pub fn deletion_order(&self) -> Result<Vec<&'static str>, ReconcileError> {
        let mut graph: DiGraph<&'static str, ()> = DiGraph::new();
        let mut index: HashMap<&'static str, NodeIndex> = HashMap::with_capacity(self.entries.len());
        for kind in self.entries.keys().copied() {
            index.insert(kind, graph.add_node(kind));
        }
        for (kind, entry) in &self.entries {
            let Some(&from) = index.get(kind) else {
                continue;
            };
            for referenced in entry.referenced {
                if let Some(&to) = index.get(referenced) {
                    graph.add_edge(from, to, ());
                }
            }
        }

        let mut in_degree: HashMap<NodeIndex, usize> = graph
            .node_indices()
            .map(|node| {
                (
                    node,
                    graph.neighbors_directed(node, Direction::Incoming).count(),
                )
            })
            .collect();
        let mut ready: BTreeSet<&'static str> = graph
            .node_indices()
            .filter(|node| in_degree.get(node).copied().unwrap_or(0) == 0)
            .filter_map(|node| graph.node_weight(node).copied())
            .collect();

        let mut order = Vec::with_capacity(graph.node_count());
        let mut pending: VecDeque<&'static str> = VecDeque::new();
        while let Some(kind) = ready.pop_first() {
            order.push(kind);
            let Some(&node) = index.get(kind) else {
                continue;
            };
            for next in graph.neighbors_directed(node, Direction::Outgoing) {
                if let Some(degree) = in_degree.get_mut(&next) {
                    *degree = degree.saturating_sub(1);
                    if *degree == 0 {
                        if let Some(name) = graph.node_weight(next) {
                            pending.push_back(*name);
                        }
                    }
                }
            }
            ready.extend(pending.drain(..));
        }

        if order.len() != graph.node_count() {
            let stuck: Vec<&str> = self
                .entries
                .keys()
                .copied()
                .filter(|kind| !order.contains(kind))
                .collect();
            return Err(ReconcileError::DependencyCycle {
                kinds: stuck.join(", "),
            });
        }
        Ok(order)
    }
}
