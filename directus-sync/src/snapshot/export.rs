//! Writing remote state to snapshot files
//!
//! Files are only rewritten when their content changes, so an export of an
//! unchanged instance leaves the git working tree clean.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;

use super::{SnapshotError, clean, file_stem, load_data, write_data};
use crate::sync::logic::report_builder::{EntityTypeSummary, StatusCounts};
use crate::sync::types::{ChangeStatus, Entity};

const EXTENSION: &str = "yaml";

/// Per-status file counts of one exported directory
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExportCounts {
    pub new: usize,
    pub modified: usize,
    pub deleted: usize,
    pub unchanged: usize,
}

impl ExportCounts {
    fn add(&mut self, status: ChangeStatus) {
        match status {
            ChangeStatus::New => self.new += 1,
            ChangeStatus::Modified => self.modified += 1,
            ChangeStatus::Deleted => self.deleted += 1,
            ChangeStatus::Unchanged | ChangeStatus::Retained => self.unchanged += 1,
        }
    }

    pub fn summary(&self, name: &str, label: &str) -> EntityTypeSummary {
        EntityTypeSummary::new(
            name,
            label,
            StatusCounts {
                new: self.new,
                updated: self.modified,
                deleted: self.deleted,
                unchanged: self.unchanged,
                retained: 0,
            },
        )
    }
}

fn file_path(dir: &Path, stem: &str) -> PathBuf {
    dir.join(format!("{}.{}", clean(stem), EXTENSION))
}

/// Write one value to `dir/<name>.yaml` unless the file already holds it
pub fn export_one(value: &Value, dir: &Path, name: &str) -> Result<ChangeStatus, SnapshotError> {
    let path = file_path(dir, name);

    let status = if path.exists() {
        if &load_data(&path)? == value {
            return Ok(ChangeStatus::Unchanged);
        }
        ChangeStatus::Modified
    } else {
        ChangeStatus::New
    };

    write_data(value, &path)?;
    Ok(status)
}

/// Make `dir` hold exactly one file per named value.
///
/// New and modified files are written, unchanged files are left alone and
/// files with no matching name are removed.
pub fn export_named(
    items: &BTreeMap<String, Value>,
    dir: &Path,
) -> Result<ExportCounts, SnapshotError> {
    let mut counts = ExportCounts::default();

    let existing: BTreeMap<String, PathBuf> = load_named_paths(dir)?;
    let mut written = Vec::new();

    for (name, value) in items {
        let status = export_one(value, dir, name)?;
        counts.add(status);
        written.push(file_path(dir, name));
    }

    for (stem, path) in existing {
        if !written.contains(&path) {
            log::warn!("{} :: Removing {}", dir.display(), stem);
            std::fs::remove_file(&path).map_err(|e| SnapshotError::Io {
                path: path.clone(),
                source: e,
            })?;
            counts.add(ChangeStatus::Deleted);
        }
    }

    Ok(counts)
}

fn load_named_paths(dir: &Path) -> Result<BTreeMap<String, PathBuf>, SnapshotError> {
    if !dir.is_dir() {
        return Ok(BTreeMap::new());
    }
    Ok(super::list_files(dir)?
        .into_iter()
        .filter_map(|path| {
            let stem = path.file_stem()?.to_str()?.to_string();
            Some((stem, path))
        })
        .collect())
}

/// Export entities to `dir`, one file each, named from `keys`.
///
/// Entities whose names collide get a numeric suffix.
pub fn export_dir(
    entities: &[Entity],
    dir: &Path,
    keys: &[&str],
) -> Result<ExportCounts, SnapshotError> {
    let mut items = BTreeMap::new();

    for entity in entities {
        let stem = file_stem(entity, keys);
        let mut name = stem.clone();
        let mut n = 2;
        while items.contains_key(&name) {
            name = format!("{}-{}", stem, n);
            n += 1;
        }
        items.insert(name, Value::Object(entity.clone()));
    }

    export_named(&items, dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entity(value: Value) -> Entity {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_export_one_states() {
        let dir = tempfile::tempdir().unwrap();
        let settings = json!({"project_name": "Demo"});

        assert_eq!(export_one(&settings, dir.path(), "settings").unwrap(), ChangeStatus::New);
        assert_eq!(
            export_one(&settings, dir.path(), "settings").unwrap(),
            ChangeStatus::Unchanged
        );
        assert_eq!(
            export_one(&json!({"project_name": "Other"}), dir.path(), "settings").unwrap(),
            ChangeStatus::Modified
        );
    }

    #[test]
    fn test_export_dir_reconciles_files() {
        let dir = tempfile::tempdir().unwrap();
        let flows = dir.path().join("flows");

        let first = vec![
            entity(json!({"id": "f1", "name": "Signup"})),
            entity(json!({"id": "f2", "name": "Digest"})),
        ];
        let counts = export_dir(&first, &flows, &["name", "id"]).unwrap();
        assert_eq!(counts, ExportCounts { new: 2, ..Default::default() });
        assert!(flows.join("Signup-f1.yaml").exists());

        let second = vec![
            entity(json!({"id": "f1", "name": "Signup"})),
            entity(json!({"id": "f3", "name": "Cleanup / nightly"})),
        ];
        let counts = export_dir(&second, &flows, &["name", "id"]).unwrap();
        assert_eq!(
            counts,
            ExportCounts {
                new: 1,
                modified: 0,
                deleted: 1,
                unchanged: 1
            }
        );
        assert!(!flows.join("Digest-f2.yaml").exists());
        assert!(flows.join("Cleanup nightly-f3.yaml").exists());
    }

    #[test]
    fn test_colliding_names_get_suffix() {
        let dir = tempfile::tempdir().unwrap();
        let entities = vec![
            entity(json!({"name": "Same"})),
            entity(json!({"name": "Same", "color": "red"})),
        ];

        let counts = export_dir(&entities, dir.path(), &["name", "id"]).unwrap();

        assert_eq!(counts.new, 2);
        assert!(dir.path().join("Same-None.yaml").exists());
        assert!(dir.path().join("Same-None-2.yaml").exists());
    }

    #[test]
    fn test_named_files_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let items = BTreeMap::from([
            ("_snapshot".to_string(), json!({"version": 1})),
            ("articles".to_string(), json!({"collection": "articles"})),
        ]);

        export_named(&items, dir.path()).unwrap();
        let read: BTreeMap<String, Value> = crate::snapshot::load_named(dir.path())
            .unwrap()
            .into_iter()
            .map(|(stem, _, value)| (stem, value))
            .collect();
        assert_eq!(read, items);
    }
}
