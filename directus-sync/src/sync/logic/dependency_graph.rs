//! Dependency graph logic for ordering entity creation
//!
//! This module provides functions to:
//! - Build a dependency graph by scanning entities for the ids of other
//!   entities in the same batch
//! - Perform a layered topological sort (Kahn's algorithm) with sorted,
//!   reproducible groups
//! - Report cycles instead of dropping nodes

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde_json::Value;

use crate::sync::types::{EntityCollection, entity_id, id_key};

/// Dependency graph over a batch of nodes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyGraph<K: Ord> {
    /// Adjacency list: node -> nodes it depends on
    pub dependencies: BTreeMap<K, BTreeSet<K>>,
}

impl<K: Ord> Default for DependencyGraph<K> {
    fn default() -> Self {
        Self {
            dependencies: BTreeMap::new(),
        }
    }
}

impl<K: Ord + Clone + fmt::Display> DependencyGraph<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node without dependencies (no-op if already present)
    pub fn add_node(&mut self, node: K) {
        self.dependencies.entry(node).or_default();
    }

    /// Record that `node` can only be created after `depends_on`.
    /// Both ends become nodes; self-references are ignored.
    pub fn add_dependency(&mut self, node: K, depends_on: K) {
        if node == depends_on {
            self.add_node(node);
            return;
        }
        self.add_node(depends_on.clone());
        self.dependencies.entry(node).or_default().insert(depends_on);
    }

    pub fn contains(&self, node: &K) -> bool {
        self.dependencies.contains_key(node)
    }

    pub fn len(&self) -> usize {
        self.dependencies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dependencies.is_empty()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &K> {
        self.dependencies.keys()
    }

    pub fn dependencies_of(&self, node: &K) -> Option<&BTreeSet<K>> {
        self.dependencies.get(node)
    }

    pub fn edge_count(&self) -> usize {
        self.dependencies.values().map(BTreeSet::len).sum()
    }

    /// Reverse adjacency: node -> nodes that depend on it
    pub fn dependents(&self) -> BTreeMap<K, BTreeSet<K>> {
        let mut dependents: BTreeMap<K, BTreeSet<K>> = BTreeMap::new();
        for (node, deps) in &self.dependencies {
            dependents.entry(node.clone()).or_default();
            for dep in deps {
                dependents
                    .entry(dep.clone())
                    .or_default()
                    .insert(node.clone());
            }
        }
        dependents
    }

    /// Layered topological sort.
    ///
    /// Each group holds every node whose dependencies all sit in earlier
    /// groups, sorted. Fails with a cycle error when some nodes can never
    /// become ready.
    pub fn sequence(&self) -> Result<Vec<Vec<K>>, SequenceError> {
        let dependents = self.dependents();

        let mut remaining: BTreeMap<K, usize> = self
            .dependencies
            .iter()
            .map(|(node, deps)| (node.clone(), deps.len()))
            .collect();

        let mut groups = Vec::new();
        let mut current: Vec<K> = remaining
            .iter()
            .filter(|(_, count)| **count == 0)
            .map(|(node, _)| node.clone())
            .collect();

        while !current.is_empty() {
            let mut next = BTreeSet::new();

            for node in &current {
                remaining.remove(node);
                if let Some(children) = dependents.get(node) {
                    for child in children {
                        if let Some(count) = remaining.get_mut(child) {
                            *count -= 1;
                            if *count == 0 {
                                next.insert(child.clone());
                            }
                        }
                    }
                }
            }

            groups.push(current);
            current = next.into_iter().collect();
        }

        if !remaining.is_empty() {
            return Err(SequenceError::Cycle(CycleError {
                nodes: remaining.keys().map(|k| k.to_string()).collect(),
            }));
        }

        self.verify_permutation(groups.iter().flatten())?;

        Ok(groups)
    }

    /// Flat insert order (dependencies before dependents)
    pub fn insert_order(&self) -> Result<Vec<K>, SequenceError> {
        Ok(self.sequence()?.into_iter().flatten().collect())
    }

    fn verify_permutation<'a>(
        &'a self,
        ordered: impl Iterator<Item = &'a K>,
    ) -> Result<(), SequenceError> {
        let mut seen = BTreeSet::new();
        let mut duplicated = Vec::new();
        for node in ordered {
            if !seen.insert(node) {
                duplicated.push(node.to_string());
            }
        }

        let missing: Vec<String> = self
            .dependencies
            .keys()
            .filter(|node| !seen.contains(node))
            .map(|node| node.to_string())
            .collect();

        if missing.is_empty() && duplicated.is_empty() {
            Ok(())
        } else {
            Err(SequenceError::Mismatch {
                missing,
                duplicated,
            })
        }
    }
}

/// Build a dependency graph over a batch of entities.
///
/// An entity depends on every other batch member whose id appears as a
/// string or number anywhere in its fields, nested objects and arrays included.
/// References to ids outside the batch are ignored.
pub fn build_graph(entities: &EntityCollection, id_field: &str) -> DependencyGraph<String> {
    let members: BTreeMap<String, &String> = entities
        .iter()
        .map(|(key, entity)| (entity_id(entity, id_field).unwrap_or_else(|| key.clone()), key))
        .collect();

    let mut graph = DependencyGraph::new();

    for (key, entity) in entities {
        graph.add_node(key.clone());

        let mut references = Vec::new();
        for value in entity.values() {
            collect_scalars(value, &mut references);
        }

        for reference in references {
            if let Some(target) = members.get(&reference) {
                graph.add_dependency(key.clone(), (*target).clone());
            }
        }
    }

    graph
}

fn collect_scalars(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(_) | Value::Number(_) => out.extend(id_key(value)),
        Value::Array(items) => items.iter().for_each(|item| collect_scalars(item, out)),
        Value::Object(map) => map.values().for_each(|item| collect_scalars(item, out)),
        Value::Null | Value::Bool(_) => {}
    }
}

/// Error when a cycle is detected in the dependency graph
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleError {
    /// Nodes that could not be ordered (the cycle and everything behind it)
    pub nodes: Vec<String>,
}

impl fmt::Display for CycleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Circular dependency detected involving: {}", self.nodes.join(", "))
    }
}

impl std::error::Error for CycleError {}

/// Error produced while sequencing a graph
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SequenceError {
    Cycle(CycleError),
    /// The ordered output does not cover the node set exactly
    Mismatch {
        missing: Vec<String>,
        duplicated: Vec<String>,
    },
}

impl fmt::Display for SequenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SequenceError::Cycle(err) => write!(f, "{}", err),
            SequenceError::Mismatch {
                missing,
                duplicated,
            } => write!(
                f,
                "Sequenced order does not match the graph (missing: [{}], duplicated: [{}])",
                missing.join(", "),
                duplicated.join(", ")
            ),
        }
    }
}

impl std::error::Error for SequenceError {}
