//! Local snapshot I/O
//!
//! This module provides functions to:
//! - Read and write YAML, JSON and CSV files by extension
//! - Load a directory of entity files into an id-keyed collection
//! - Build file names from entity description fields
//! - Load a whole snapshot directory before any network call

pub mod export;
pub mod schema;

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

use crate::sync::types::{
    Entity, EntityCollection, EntityKind, SyncGroup, entity_id, lookup_path, value_label,
};

pub use export::{ExportCounts, export_dir, export_named, export_one};
pub use schema::{CollectionBundle, UnpackedSchema};

/// File holding the settings singleton
pub const SETTINGS_FILE: &str = "settings.yaml";
/// Directory holding the unpacked schema
pub const SCHEMA_DIR: &str = "schema";
/// Directory holding collection data
pub const DATA_DIR: &str = "data";

/// Errors raised while reading or writing snapshot files
#[derive(Debug)]
pub enum SnapshotError {
    UnsupportedFormat { path: PathBuf },
    Io { path: PathBuf, source: std::io::Error },
    Parse { path: PathBuf, message: String },
    Serialize { path: PathBuf, message: String },
    MissingId { path: PathBuf, id_field: String },
    NotAnObject { path: PathBuf },
}

impl SnapshotError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    fn parse(path: &Path, message: impl fmt::Display) -> Self {
        Self::Parse {
            path: path.to_path_buf(),
            message: message.to_string(),
        }
    }

    fn serialize(path: &Path, message: impl fmt::Display) -> Self {
        Self::Serialize {
            path: path.to_path_buf(),
            message: message.to_string(),
        }
    }
}

impl fmt::Display for SnapshotError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedFormat { path } => write!(
                f,
                "Unsupported file format: {} (supported: csv, json, yaml/yml)",
                path.display()
            ),
            Self::Io { path, source } => write!(f, "{}: {}", path.display(), source),
            Self::Parse { path, message } => {
                write!(f, "Failed to parse {}: {}", path.display(), message)
            }
            Self::Serialize { path, message } => {
                write!(f, "Failed to write {}: {}", path.display(), message)
            }
            Self::MissingId { path, id_field } => {
                write!(f, "{} has no '{}' field", path.display(), id_field)
            }
            Self::NotAnObject { path } => {
                write!(f, "{} does not contain an object", path.display())
            }
        }
    }
}

impl std::error::Error for SnapshotError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Supported file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum DataFormat {
    Yaml,
    Json,
    Csv,
}

impl DataFormat {
    pub fn from_path(path: &Path) -> Result<Self, SnapshotError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("yaml") | Some("yml") => Ok(Self::Yaml),
            Some("json") => Ok(Self::Json),
            Some("csv") => Ok(Self::Csv),
            _ => Err(SnapshotError::UnsupportedFormat {
                path: path.to_path_buf(),
            }),
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Yaml => "yaml",
            Self::Json => "json",
            Self::Csv => "csv",
        }
    }
}

/// Read one file, picking the parser from its extension.
///
/// CSV rows become objects of strings.
pub fn load_data(path: &Path) -> Result<Value, SnapshotError> {
    let format = DataFormat::from_path(path)?;
    log::debug!("Reading {:?} {}", format, path.display());

    match format {
        DataFormat::Yaml => {
            let text = std::fs::read_to_string(path).map_err(|e| SnapshotError::io(path, e))?;
            if text.trim().is_empty() {
                return Ok(Value::Null);
            }
            serde_yaml::from_str(&text).map_err(|e| SnapshotError::parse(path, e))
        }
        DataFormat::Json => {
            let text = std::fs::read_to_string(path).map_err(|e| SnapshotError::io(path, e))?;
            serde_json::from_str(&text).map_err(|e| SnapshotError::parse(path, e))
        }
        DataFormat::Csv => {
            let mut reader = csv::Reader::from_path(path).map_err(|e| SnapshotError::parse(path, e))?;
            let headers = reader
                .headers()
                .map_err(|e| SnapshotError::parse(path, e))?
                .clone();

            let mut rows = Vec::new();
            for record in reader.records() {
                let record = record.map_err(|e| SnapshotError::parse(path, e))?;
                let row: Map<String, Value> = headers
                    .iter()
                    .zip(record.iter())
                    .map(|(h, v)| (h.to_string(), Value::String(v.to_string())))
                    .collect();
                rows.push(Value::Object(row));
            }
            Ok(Value::Array(rows))
        }
    }
}

/// Write a value, picking the format from the extension. Parent
/// directories are created.
///
/// CSV needs an array of objects; the header comes from the first row.
pub fn write_data(value: &Value, path: &Path) -> Result<(), SnapshotError> {
    let format = DataFormat::from_path(path)?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| SnapshotError::io(parent, e))?;
    }

    let text = match format {
        DataFormat::Yaml => {
            serde_yaml::to_string(value).map_err(|e| SnapshotError::serialize(path, e))?
        }
        DataFormat::Json => {
            let mut text = serde_json::to_string_pretty(value)
                .map_err(|e| SnapshotError::serialize(path, e))?;
            text.push('\n');
            text
        }
        DataFormat::Csv => to_csv(value, path)?,
    };

    std::fs::write(path, text).map_err(|e| SnapshotError::io(path, e))?;
    log::debug!("Wrote {:?} to {}", format, path.display());
    Ok(())
}

fn to_csv(value: &Value, path: &Path) -> Result<String, SnapshotError> {
    let rows = value
        .as_array()
        .ok_or_else(|| SnapshotError::serialize(path, "csv output needs a list of rows"))?;

    let mut writer = csv::Writer::from_writer(Vec::new());
    if let Some(first) = rows.first().and_then(Value::as_object) {
        let header: Vec<&String> = first.keys().collect();
        writer
            .write_record(&header)
            .map_err(|e| SnapshotError::serialize(path, e))?;

        for row in rows {
            let row = row
                .as_object()
                .ok_or_else(|| SnapshotError::serialize(path, "csv rows must be objects"))?;
            let record: Vec<String> = header
                .iter()
                .map(|key| match row.get(key.as_str()) {
                    None | Some(Value::Null) => String::new(),
                    Some(Value::String(s)) => s.clone(),
                    Some(other) => other.to_string(),
                })
                .collect();
            writer
                .write_record(&record)
                .map_err(|e| SnapshotError::serialize(path, e))?;
        }
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| SnapshotError::serialize(path, e))?;
    String::from_utf8(bytes).map_err(|e| SnapshotError::serialize(path, e))
}

/// Data files of a directory, sorted, hidden files skipped.
/// A missing directory has no files.
pub fn list_files(dir: &Path) -> Result<Vec<PathBuf>, SnapshotError> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(|e| SnapshotError::io(dir, e))? {
        let path = entry.map_err(|e| SnapshotError::io(dir, e))?.path();
        let hidden = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with('.'));
        if path.is_file() && !hidden {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Load a file or every file of a directory, with the path each value came from
pub fn load_entries(path: &Path) -> Result<Vec<(PathBuf, Value)>, SnapshotError> {
    if path.is_file() {
        return Ok(vec![(path.to_path_buf(), load_data(path)?)]);
    }

    list_files(path)?
        .into_iter()
        .map(|file| load_data(&file).map(|value| (file, value)))
        .collect()
}

/// Load a file (a list is flattened) or every file of a directory
pub fn load_dir(path: &Path) -> Result<Vec<Value>, SnapshotError> {
    let mut values = Vec::new();
    for (_, value) in load_entries(path)? {
        match value {
            Value::Array(items) => values.extend(items),
            Value::Null => {}
            other => values.push(other),
        }
    }
    Ok(values)
}

/// Load a directory of entity files keyed by id
pub fn load_collection(dir: &Path, id_field: &str) -> Result<EntityCollection, SnapshotError> {
    let mut collection = EntityCollection::new();

    for (path, value) in load_entries(dir)? {
        let items = match value {
            Value::Array(items) => items,
            Value::Null => Vec::new(),
            other => vec![other],
        };
        for item in items {
            let Value::Object(entity) = item else {
                return Err(SnapshotError::NotAnObject { path });
            };
            let Some(id) = entity_id(&entity, id_field) else {
                return Err(SnapshotError::MissingId {
                    path,
                    id_field: id_field.to_string(),
                });
            };
            if collection.insert(id.clone(), entity).is_some() {
                log::warn!("{}: duplicate id {}, keeping the last one", path.display(), id);
            }
        }
    }

    Ok(collection)
}

/// Load a single object file (e.g. `settings.yaml`). `None` when missing.
pub fn load_object(path: &Path) -> Result<Option<Entity>, SnapshotError> {
    if !path.exists() {
        return Ok(None);
    }
    match load_data(path)? {
        Value::Object(map) => Ok(Some(map)),
        Value::Null => Ok(None),
        _ => Err(SnapshotError::NotAnObject {
            path: path.to_path_buf(),
        }),
    }
}

static UNSAFE_CHARS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\s*[^-\s_A-Za-z0-9.]+\s*").expect("file name pattern is valid")
});

/// Replace runs of characters that do not belong in a file name by a space
pub fn clean(name: &str) -> String {
    UNSAFE_CHARS.replace_all(name, " ").into_owned()
}

/// File stem of an entity: description key values joined with `-`
pub fn file_stem(entity: &Entity, keys: &[&str]) -> String {
    let joined = keys
        .iter()
        .map(|key| value_label(lookup_path(entity, key)))
        .collect::<Vec<_>>()
        .join("-");
    clean(&joined)
}

/// Everything `apply` needs from disk, loaded up front
#[derive(Debug, Clone, Default)]
pub struct LocalSnapshot {
    pub settings: Option<Entity>,
    pub schema: Option<Value>,
    pub entities: Vec<(EntityKind, EntityCollection)>,
}

impl LocalSnapshot {
    /// Load the selected groups of a snapshot directory
    pub fn load(dir: &Path, groups: &BTreeSet<SyncGroup>) -> Result<Self, SnapshotError> {
        let selected = |group: SyncGroup| groups.is_empty() || groups.contains(&group);
        let mut snapshot = Self::default();

        if selected(SyncGroup::Settings) {
            snapshot.settings = load_object(&dir.join(SETTINGS_FILE))?;
        }

        if selected(SyncGroup::Schema) {
            let schema_dir = dir.join(SCHEMA_DIR);
            if schema_dir.is_dir() {
                let unpacked = schema::from_files(load_named(&schema_dir)?)?;
                snapshot.schema = Some(unpacked.pack());
            }
        }

        for kind in EntityKind::APPLY_ORDER {
            if selected(kind.group()) {
                let spec = kind.spec();
                let collection = load_collection(&dir.join(kind.name()), &spec.id_field)?;
                snapshot.entities.push((kind, collection));
            }
        }

        Ok(snapshot)
    }
}

/// Load every file of a directory keyed by file stem
pub fn load_named(dir: &Path) -> Result<Vec<(String, PathBuf, Value)>, SnapshotError> {
    load_entries(dir)?
        .into_iter()
        .map(|(path, value)| {
            let stem = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or_default()
                .to_string();
            Ok((stem, path, value))
        })
        .collect()
}
