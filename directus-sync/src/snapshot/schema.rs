//! Schema snapshot split into one file per collection
//!
//! A Directus schema snapshot is one large document with flat `collections`,
//! `fields` and `relations` lists. On disk it is kept as a header file plus
//! one bundle per collection so that diffs stay readable.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::SnapshotError;

/// Stem of the file holding the snapshot header
pub const HEADER_FILE: &str = "_snapshot";

const COLLECTIONS: &str = "collections";
const FIELDS: &str = "fields";
const RELATIONS: &str = "relations";

/// Everything that belongs to one collection
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollectionBundle {
    /// The collection record; fields of a table without one have none
    #[serde(default)]
    pub collection: Option<Value>,
    #[serde(default)]
    pub fields: Vec<Value>,
    #[serde(default)]
    pub relations: Vec<Value>,
}

/// A snapshot grouped by collection
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UnpackedSchema {
    /// Top-level keys other than the three lists (version, vendor, ...)
    pub header: Map<String, Value>,
    pub collections: BTreeMap<String, CollectionBundle>,
}

fn owner(item: &Value) -> String {
    item.get("collection")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn sort_key(item: &Value) -> (String, String) {
    let field = item
        .get("field")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    (owner(item), field)
}

fn list(snapshot: &Value, key: &str) -> Vec<Value> {
    snapshot
        .get(key)
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

impl UnpackedSchema {
    /// Group the flat snapshot lists by collection
    pub fn unpack(snapshot: &Value) -> Self {
        let header = snapshot
            .as_object()
            .map(|map| {
                map.iter()
                    .filter(|(key, _)| ![COLLECTIONS, FIELDS, RELATIONS].contains(&key.as_str()))
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect()
            })
            .unwrap_or_default();

        let mut collections: BTreeMap<String, CollectionBundle> = BTreeMap::new();
        for item in list(snapshot, COLLECTIONS) {
            let key = owner(&item);
            collections.entry(key).or_default().collection = Some(item);
        }
        for item in list(snapshot, FIELDS) {
            collections.entry(owner(&item)).or_default().fields.push(item);
        }
        for item in list(snapshot, RELATIONS) {
            collections.entry(owner(&item)).or_default().relations.push(item);
        }

        Self {
            header,
            collections,
        }
    }

    /// Rebuild the flat snapshot, normalized
    pub fn pack(&self) -> Value {
        let mut snapshot = self.header.clone();
        let mut collections = Vec::new();
        let mut fields = Vec::new();
        let mut relations = Vec::new();

        for bundle in self.collections.values() {
            collections.extend(bundle.collection.iter().cloned());
            fields.extend(bundle.fields.iter().cloned());
            relations.extend(bundle.relations.iter().cloned());
        }

        snapshot.insert(COLLECTIONS.to_string(), Value::Array(collections));
        snapshot.insert(FIELDS.to_string(), Value::Array(fields));
        snapshot.insert(RELATIONS.to_string(), Value::Array(relations));
        normalize(Value::Object(snapshot))
    }

    /// Same header, no collections. Applying it drops every user table.
    pub fn empty_like(&self) -> Self {
        Self {
            header: self.header.clone(),
            collections: BTreeMap::new(),
        }
    }

    /// One value per file stem: the header plus one bundle per collection
    pub fn to_files(&self) -> BTreeMap<String, Value> {
        let mut files = BTreeMap::new();
        files.insert(HEADER_FILE.to_string(), Value::Object(self.header.clone()));
        for (name, bundle) in &self.collections {
            // Serializing a plain struct of Values cannot fail
            if let Ok(value) = serde_json::to_value(bundle) {
                files.insert(name.clone(), value);
            }
        }
        files
    }
}

/// Sort the three lists so that equal schemas compare equal
pub fn normalize(mut snapshot: Value) -> Value {
    if let Some(map) = snapshot.as_object_mut() {
        if let Some(Value::Array(items)) = map.get_mut(COLLECTIONS) {
            items.sort_by_key(owner);
        }
        for key in [FIELDS, RELATIONS] {
            if let Some(Value::Array(items)) = map.get_mut(key) {
                items.sort_by_key(sort_key);
            }
        }
    }
    snapshot
}

/// Rebuild an unpacked schema from `(stem, path, value)` file entries
pub fn from_files(files: Vec<(String, PathBuf, Value)>) -> Result<UnpackedSchema, SnapshotError> {
    let mut schema = UnpackedSchema::default();

    for (stem, path, value) in files {
        if stem == HEADER_FILE {
            match value {
                Value::Object(header) => schema.header = header,
                Value::Null => {}
                _ => return Err(SnapshotError::NotAnObject { path }),
            }
            continue;
        }

        let bundle: CollectionBundle =
            serde_json::from_value(value).map_err(|e| SnapshotError::Parse {
                path: path.clone(),
                message: e.to_string(),
            })?;
        let name = bundle
            .collection
            .as_ref()
            .map(owner)
            .or_else(|| bundle.fields.first().map(owner))
            .or_else(|| bundle.relations.first().map(owner))
            .unwrap_or(stem);
        schema.collections.insert(name, bundle);
    }

    Ok(schema)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{export_named, load_named};
    use proptest::prelude::*;
    use serde_json::json;

    fn snapshot() -> Value {
        json!({
            "version": 1,
            "directus": "10.8.3",
            "vendor": "postgres",
            "collections": [
                {"collection": "pages", "meta": {"icon": "article"}, "schema": {"name": "pages"}},
                {"collection": "articles", "meta": {}, "schema": {"name": "articles"}}
            ],
            "fields": [
                {"collection": "pages", "field": "title", "type": "string"},
                {"collection": "articles", "field": "title", "type": "string"},
                {"collection": "articles", "field": "author", "type": "uuid"},
                {"collection": "legacy", "field": "id", "type": "integer"}
            ],
            "relations": [
                {"collection": "articles", "field": "author", "related_collection": "directus_users"}
            ]
        })
    }

    #[test]
    fn test_unpack_groups_by_collection() {
        let unpacked = UnpackedSchema::unpack(&snapshot());

        assert_eq!(unpacked.header["vendor"], json!("postgres"));
        assert!(!unpacked.header.contains_key("fields"));
        assert_eq!(
            unpacked.collections.keys().collect::<Vec<_>>(),
            vec!["articles", "legacy", "pages"]
        );

        let articles = &unpacked.collections["articles"];
        assert_eq!(articles.fields.len(), 2);
        assert_eq!(articles.relations.len(), 1);
        assert!(unpacked.collections["legacy"].collection.is_none());
    }

    #[test]
    fn test_pack_restores_normalized_snapshot() {
        let original = snapshot();
        let packed = UnpackedSchema::unpack(&original).pack();
        assert_eq!(packed, normalize(original));
    }

    #[test]
    fn test_files_round_trip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let unpacked = UnpackedSchema::unpack(&snapshot());

        export_named(&unpacked.to_files(), dir.path()).unwrap();
        assert!(dir.path().join("_snapshot.yaml").exists());
        assert!(dir.path().join("articles.yaml").exists());

        let restored = from_files(load_named(dir.path()).unwrap()).unwrap();
        assert_eq!(restored, unpacked);
    }

    #[test]
    fn test_empty_like_keeps_header() {
        let empty = UnpackedSchema::unpack(&snapshot()).empty_like();
        let packed = empty.pack();

        assert_eq!(packed["version"], json!(1));
        assert_eq!(packed["collections"], json!([]));
        assert_eq!(packed["fields"], json!([]));
    }

    fn table_name() -> impl Strategy<Value = String> {
        prop_oneof![
            "[a-z]{1,6}",
            "[a-z]{1,6}".prop_map(|name| format!("directus_{}", name)),
        ]
    }

    /// Snapshots with unique collections; fields and relations may point at
    /// tables that have no collection record
    fn snapshot_strategy() -> impl Strategy<Value = Value> {
        (
            prop::collection::btree_map("[a-z]{1,8}", any::<u16>(), 0..4),
            prop::collection::btree_set(table_name(), 0..6),
            prop::collection::vec((table_name(), "[a-z]{1,6}", "[a-z]{3,8}"), 0..12),
            prop::collection::vec((table_name(), "[a-z]{1,6}", table_name()), 0..6),
        )
            .prop_map(|(extra, tables, fields, relations)| {
                let mut header: Map<String, Value> = extra
                    .into_iter()
                    .filter(|(key, _)| ![COLLECTIONS, FIELDS, RELATIONS].contains(&key.as_str()))
                    .map(|(key, value)| (key, json!(value)))
                    .collect();
                header.insert("version".to_string(), json!(1));
                header.insert(
                    COLLECTIONS.to_string(),
                    tables
                        .into_iter()
                        .rev()
                        .map(|table| json!({"collection": table, "meta": null}))
                        .collect(),
                );
                header.insert(
                    FIELDS.to_string(),
                    fields
                        .into_iter()
                        .map(|(table, field, kind)| {
                            json!({"collection": table, "field": field, "type": kind})
                        })
                        .collect(),
                );
                header.insert(
                    RELATIONS.to_string(),
                    relations
                        .into_iter()
                        .map(|(table, field, related)| {
                            json!({"collection": table, "field": field, "related_collection": related})
                        })
                        .collect(),
                );
                Value::Object(header)
            })
    }

    proptest! {
        #[test]
        fn prop_pack_inverts_unpack(snapshot in snapshot_strategy()) {
            let packed = UnpackedSchema::unpack(&snapshot).pack();
            prop_assert_eq!(packed, normalize(snapshot));
        }
    }
}
