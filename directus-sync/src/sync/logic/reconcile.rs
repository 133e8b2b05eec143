//! Set reconciliation between a desired and an existing collection
//!
//! This module provides functions to:
//! - Strip ignored fields before comparing
//! - Classify every id into new, updated, deleted or unchanged
//! - Describe field-level differences for reporting

use std::collections::BTreeSet;

use serde_json::Value;

use crate::sync::types::{Classification, Entity, EntityCollection};

/// Copy of an entity without the given fields
pub fn strip_fields<S: AsRef<str>>(entity: &Entity, ignored: &[S]) -> Entity {
    entity
        .iter()
        .filter(|(key, _)| !ignored.iter().any(|i| i.as_ref() == key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// Copy of a collection with ignored fields stripped from every entity
pub fn strip_collection<S: AsRef<str>>(
    collection: &EntityCollection,
    ignored: &[S],
) -> EntityCollection {
    collection
        .iter()
        .map(|(id, entity)| (id.clone(), strip_fields(entity, ignored)))
        .collect()
}

/// Field-level difference between two versions of an entity
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldDiff {
    /// Fields only present in the new version
    pub added: BTreeSet<String>,
    /// Fields only present in the old version
    pub removed: BTreeSet<String>,
    /// Fields present in both with different values
    pub changed: BTreeSet<String>,
}

impl FieldDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }

    /// One-line summary, e.g. "+icon ~name -color"
    pub fn summary(&self) -> String {
        let added = self.added.iter().map(|f| format!("+{}", f));
        let changed = self.changed.iter().map(|f| format!("~{}", f));
        let removed = self.removed.iter().map(|f| format!("-{}", f));
        added.chain(changed).chain(removed).collect::<Vec<_>>().join(" ")
    }
}

/// Compare two entities field by field (`new` against `old`)
pub fn dict_diff(new: &Entity, old: &Entity) -> FieldDiff {
    let mut diff = FieldDiff::default();

    for (key, value) in new {
        match old.get(key) {
            None => {
                diff.added.insert(key.clone());
            }
            Some(previous) if !values_equal(previous, value) => {
                diff.changed.insert(key.clone());
            }
            Some(_) => {}
        }
    }

    for key in old.keys() {
        if !new.contains_key(key) {
            diff.removed.insert(key.clone());
        }
    }

    diff
}

/// Value equality that treats `1` and `1.0` as the same number
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            x == y || x.as_f64().is_some_and(|f| y.as_f64() == Some(f))
        }
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(a, b)| values_equal(a, b))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x.iter()
                    .all(|(key, value)| y.get(key).is_some_and(|other| values_equal(value, other)))
        }
        _ => a == b,
    }
}

/// Classify every id of `desired ∪ existing` after stripping ignored fields
pub fn reconcile<S: AsRef<str>>(
    desired: &EntityCollection,
    existing: &EntityCollection,
    ignored_fields: &[S],
) -> Classification {
    let mut classification = Classification::default();

    for (id, wanted) in desired {
        match existing.get(id) {
            None => {
                classification.new.insert(id.clone());
            }
            Some(current) => {
                let wanted = strip_fields(wanted, ignored_fields);
                let current = strip_fields(current, ignored_fields);
                if dict_diff(&wanted, &current).is_empty() {
                    classification.unchanged.insert(id.clone());
                } else {
                    classification.updated.insert(id.clone());
                }
            }
        }
    }

    for id in existing.keys() {
        if !desired.contains_key(id) {
            classification.deleted.insert(id.clone());
        }
    }

    classification
}
