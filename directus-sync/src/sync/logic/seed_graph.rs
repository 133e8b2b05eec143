//! Row-level dependency ordering for seeding collection data
//!
//! This module provides functions to:
//! - Read primary and foreign keys from a collection's field definitions
//! - Build a graph over `(collection, primary key)` rows
//! - Sequence rows so referenced rows are written first

use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value;

use super::dependency_graph::{DependencyGraph, SequenceError};
use crate::sync::types::{Entity, id_key};

/// Primary key and foreign keys of one collection
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectionTopology {
    pub primary_key: Option<String>,
    /// Field name -> referenced table
    pub foreign_keys: BTreeMap<String, String>,
}

impl CollectionTopology {
    /// Build from the `/fields/<collection>` response
    pub fn from_fields(fields: &[Value]) -> Self {
        let mut topology = Self::default();

        for field in fields {
            let (Some(name), Some(schema)) = (
                field.get("field").and_then(Value::as_str),
                field.get("schema").filter(|s| s.is_object()),
            ) else {
                continue;
            };

            if topology.primary_key.is_none()
                && schema.get("is_primary_key").and_then(Value::as_bool) == Some(true)
            {
                topology.primary_key = Some(name.to_string());
            }

            let table = schema.get("foreign_key_table").and_then(Value::as_str);
            let column = schema.get("foreign_key_column").and_then(Value::as_str);
            if let (Some(table), Some(_)) = (table, column) {
                topology
                    .foreign_keys
                    .insert(name.to_string(), table.to_string());
            }
        }

        topology
    }
}

/// Node of the seed graph
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RowKey {
    pub collection: String,
    pub key: String,
}

impl RowKey {
    pub fn new(collection: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            key: key.into(),
        }
    }
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.collection, self.key)
    }
}

/// Ordered rows to write
#[derive(Debug, Clone, Default)]
pub struct SeedPlan {
    pub groups: Vec<Vec<RowKey>>,
    pub rows: BTreeMap<RowKey, Entity>,
    /// Collections without a known primary key
    pub skipped_collections: Vec<String>,
    /// Rows without a primary key value
    pub skipped_rows: usize,
}

impl SeedPlan {
    /// Rows in write order. Referenced rows that are not part of the data
    /// (already in the database, or in another data set) yield `None`.
    pub fn ordered(&self) -> impl Iterator<Item = (&RowKey, Option<&Entity>)> {
        self.groups
            .iter()
            .flatten()
            .map(|key| (key, self.rows.get(key)))
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

/// Build the row graph and sequence it
pub fn plan_seed(
    data: &BTreeMap<String, Vec<Entity>>,
    topology: &BTreeMap<String, CollectionTopology>,
) -> Result<SeedPlan, SequenceError> {
    let mut graph = DependencyGraph::new();
    let mut plan = SeedPlan::default();

    for (collection, rows) in data {
        let Some(topo) = topology.get(collection) else {
            plan.skipped_collections.push(collection.clone());
            continue;
        };
        let Some(pkey) = &topo.primary_key else {
            plan.skipped_collections.push(collection.clone());
            continue;
        };

        for row in rows {
            let Some(key) = row.get(pkey).and_then(id_key) else {
                plan.skipped_rows += 1;
                continue;
            };
            let node = RowKey::new(collection, key);
            graph.add_node(node.clone());

            for (field, table) in &topo.foreign_keys {
                if let Some(target) = row.get(field).and_then(id_key) {
                    graph.add_dependency(node.clone(), RowKey::new(table, target));
                }
            }

            plan.rows.insert(node, row.clone());
        }
    }

    plan.groups = graph.sequence()?;
    Ok(plan)
}
