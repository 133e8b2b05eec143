//! Schema diff interpretation
//!
//! This module provides functions to:
//! - Model the hierarchical diff returned by `POST /schema/diff`
//! - Classify each collection, field and relation entry as created,
//!   deleted or modified
//! - Drop deletions of tables Directus never managed
//! - Find the deletions that need an explicit confirmation

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Prefix of collections owned by Directus itself
pub const SYSTEM_COLLECTION_PREFIX: &str = "directus_";

/// Kind of a diff node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiffKind {
    /// Newly added value
    #[serde(rename = "N")]
    New,
    /// Removed value
    #[serde(rename = "D")]
    Delete,
    /// Edited value
    #[serde(rename = "E")]
    Edit,
    /// Change inside an array
    #[serde(rename = "A")]
    Array,
}

impl DiffKind {
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::New => "+",
            Self::Delete => "-",
            Self::Edit => "~",
            Self::Array => "*",
        }
    }
}

/// Keep explicit `null` as `Some(Value::Null)` so it survives a round-trip
fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

/// One node of a structural diff
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffNode {
    pub kind: DiffKind,
    /// Keys/indices from the entry root; empty for the root itself
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub path: Vec<Value>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub lhs: Option<Value>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub rhs: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item: Option<Box<DiffNode>>,
}

impl DiffNode {
    pub fn is_root(&self) -> bool {
        self.path.is_empty()
    }

    /// Dotted path, e.g. `meta.note` or `schema.default_value`
    pub fn path_label(&self) -> String {
        self.path
            .iter()
            .map(|segment| match segment {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect::<Vec<_>>()
            .join(".")
    }

    /// One-line description of the change, used in reports
    pub fn describe(&self) -> String {
        let path = self.path_label();
        match self.kind {
            DiffKind::Edit => format!(
                "~ {}: {} -> {}",
                path,
                short(self.lhs.as_ref()),
                short(self.rhs.as_ref())
            ),
            DiffKind::New => format!("+ {}: {}", path, short(self.rhs.as_ref())),
            DiffKind::Delete => format!("- {}: {}", path, short(self.lhs.as_ref())),
            DiffKind::Array => match &self.item {
                Some(item) => format!("* {}[{}] {}", path, self.index.unwrap_or(0), item.describe()),
                None => format!("* {}", path),
            },
        }
    }
}

fn short(value: Option<&Value>) -> String {
    const MAX: usize = 60;
    let text = match value {
        None => "none".to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    };
    if text.chars().count() > MAX {
        let cut: String = text.chars().take(MAX).collect();
        format!("{}…", cut)
    } else {
        text
    }
}

fn root_kind(nodes: &[DiffNode]) -> Option<DiffKind> {
    nodes.iter().find(|n| n.is_root()).map(|n| n.kind)
}

/// Diff of one collection record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionDiff {
    pub collection: String,
    pub diff: Vec<DiffNode>,
}

/// Diff of one field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDiffEntry {
    pub collection: String,
    pub field: String,
    pub diff: Vec<DiffNode>,
}

/// Diff of one relation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationDiff {
    pub collection: String,
    pub field: String,
    #[serde(default)]
    pub related_collection: Option<String>,
    pub diff: Vec<DiffNode>,
}

/// The three categories of a schema diff
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaDiff {
    #[serde(default)]
    pub collections: Vec<CollectionDiff>,
    #[serde(default)]
    pub fields: Vec<FieldDiffEntry>,
    #[serde(default)]
    pub relations: Vec<RelationDiff>,
}

impl SchemaDiff {
    pub fn is_empty(&self) -> bool {
        self.collections.is_empty() && self.fields.is_empty() && self.relations.is_empty()
    }
}

/// Response of `POST /schema/diff`, sent back unchanged (or sanitized) to apply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaDiffEnvelope {
    pub hash: String,
    pub diff: SchemaDiff,
}

/// Classification of one diff entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Created,
    Deleted,
    Modified,
}

impl ChangeKind {
    fn from_nodes(nodes: &[DiffNode]) -> Self {
        match root_kind(nodes) {
            Some(DiffKind::New) => Self::Created,
            Some(DiffKind::Delete) => Self::Deleted,
            _ => Self::Modified,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Created => "🌱",
            Self::Deleted => "🗑 ",
            Self::Modified => "🔧",
        }
    }
}

/// One interpreted diff entry
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangeEntry {
    /// `collection`, `collection.field` or `collection.field -> related`
    pub name: String,
    pub collection: String,
    pub kind: ChangeKind,
    /// Node descriptions of a modification
    pub details: Vec<String>,
}

impl ChangeEntry {
    fn new(name: String, collection: &str, nodes: &[DiffNode]) -> Self {
        let kind = ChangeKind::from_nodes(nodes);
        let details = match kind {
            ChangeKind::Modified => nodes.iter().map(DiffNode::describe).collect(),
            _ => Vec::new(),
        };
        Self {
            name,
            collection: collection.to_string(),
            kind,
            details,
        }
    }
}

/// Created / deleted / modified entries of one category, input order kept
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CategoryReport {
    pub created: Vec<ChangeEntry>,
    pub deleted: Vec<ChangeEntry>,
    pub modified: Vec<ChangeEntry>,
}

impl CategoryReport {
    fn push(&mut self, entry: ChangeEntry) {
        match entry.kind {
            ChangeKind::Created => self.created.push(entry),
            ChangeKind::Deleted => self.deleted.push(entry),
            ChangeKind::Modified => self.modified.push(entry),
        }
    }

    pub fn of_kind(&self, kind: ChangeKind) -> &[ChangeEntry] {
        match kind {
            ChangeKind::Created => &self.created,
            ChangeKind::Deleted => &self.deleted,
            ChangeKind::Modified => &self.modified,
        }
    }

    pub fn len(&self) -> usize {
        self.created.len() + self.deleted.len() + self.modified.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn entries(&self) -> impl Iterator<Item = &ChangeEntry> {
        self.created
            .iter()
            .chain(self.modified.iter())
            .chain(self.deleted.iter())
    }
}

/// Interpreted schema diff
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SchemaDiffReport {
    pub collections: CategoryReport,
    pub fields: CategoryReport,
    pub relations: CategoryReport,
}

impl SchemaDiffReport {
    pub fn is_empty(&self) -> bool {
        self.collections.is_empty() && self.fields.is_empty() && self.relations.is_empty()
    }

    pub fn categories(&self) -> [(&'static str, &CategoryReport); 3] {
        [
            ("Collections", &self.collections),
            ("Fields", &self.fields),
            ("Relations", &self.relations),
        ]
    }

    /// Every deleted entry across categories
    pub fn deletions(&self) -> impl Iterator<Item = &ChangeEntry> {
        self.collections
            .deleted
            .iter()
            .chain(self.fields.deleted.iter())
            .chain(self.relations.deleted.iter())
    }
}

/// Classify every entry by its root node
pub fn interpret(diff: &SchemaDiff) -> SchemaDiffReport {
    let mut report = SchemaDiffReport::default();

    for entry in &diff.collections {
        report.collections.push(ChangeEntry::new(
            entry.collection.clone(),
            &entry.collection,
            &entry.diff,
        ));
    }

    for entry in &diff.fields {
        report.fields.push(ChangeEntry::new(
            format!("{}.{}", entry.collection, entry.field),
            &entry.collection,
            &entry.diff,
        ));
    }

    for entry in &diff.relations {
        let name = match &entry.related_collection {
            Some(related) => format!("{}.{} -> {}", entry.collection, entry.field, related),
            None => format!("{}.{}", entry.collection, entry.field),
        };
        report
            .relations
            .push(ChangeEntry::new(name, &entry.collection, &entry.diff));
    }

    report
}

/// Whether a collection deletion concerns a collection with Directus metadata.
///
/// Tables created outside Directus have `meta: null` and would be dropped
/// from the database by applying the diff.
pub fn is_managed_collection(entry: &CollectionDiff) -> bool {
    entry
        .diff
        .iter()
        .find(|n| n.is_root())
        .and_then(|n| n.lhs.as_ref())
        .and_then(|lhs| lhs.get("meta"))
        .is_some_and(|meta| !meta.is_null())
}

/// Diff with unowned deletions removed
#[derive(Debug, Clone, PartialEq)]
pub struct Sanitized {
    pub diff: SchemaDiff,
    /// Names of the dropped collection deletions
    pub dropped: Vec<String>,
}

/// Drop deletions of collections for which `is_owned` is false, together
/// with the field and relation deletions of those collections
pub fn sanitize(diff: SchemaDiff, is_owned: impl Fn(&CollectionDiff) -> bool) -> Sanitized {
    let unowned: BTreeSet<String> = diff
        .collections
        .iter()
        .filter(|c| root_kind(&c.diff) == Some(DiffKind::Delete) && !is_owned(c))
        .map(|c| c.collection.clone())
        .collect();

    if unowned.is_empty() {
        return Sanitized {
            diff,
            dropped: Vec::new(),
        };
    }

    let dropped_delete = |collection: &str, nodes: &[DiffNode]| {
        unowned.contains(collection) && root_kind(nodes) == Some(DiffKind::Delete)
    };

    let SchemaDiff {
        collections,
        fields,
        relations,
    } = diff;

    let diff = SchemaDiff {
        collections: collections
            .into_iter()
            .filter(|c| !dropped_delete(&c.collection, &c.diff))
            .collect(),
        fields: fields
            .into_iter()
            .filter(|f| !dropped_delete(&f.collection, &f.diff))
            .collect(),
        relations: relations
            .into_iter()
            .filter(|r| !dropped_delete(&r.collection, &r.diff))
            .collect(),
    };

    Sanitized {
        diff,
        dropped: unowned.into_iter().collect(),
    }
}

pub fn is_system_collection(collection: &str) -> bool {
    collection.starts_with(SYSTEM_COLLECTION_PREFIX)
}

/// Names of deleted entries on collections that are not protected
pub fn destructive_targets(
    report: &SchemaDiffReport,
    protected: impl Fn(&str) -> bool,
) -> Vec<String> {
    report
        .deletions()
        .filter(|entry| !protected(&entry.collection))
        .map(|entry| entry.name.clone())
        .collect()
}

impl fmt::Display for SchemaDiffReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (label, category) in self.categories() {
            if category.is_empty() {
                continue;
            }
            writeln!(f, "{}:", label)?;
            for entry in category.entries() {
                writeln!(f, "  {} {}", entry.kind.symbol(), entry.name)?;
                for detail in &entry.details {
                    writeln!(f, "      {}", detail)?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_diff() -> SchemaDiff {
        serde_json::from_value(json!({
            "collections": [
                {"collection": "articles", "diff": [{"kind": "N", "rhs": {"collection": "articles"}}]},
                {"collection": "legacy", "diff": [{"kind": "D", "lhs": {"collection": "legacy", "meta": null}}]},
                {"collection": "old_posts", "diff": [{"kind": "D", "lhs": {"collection": "old_posts", "meta": {"icon": "box"}}}]},
                {"collection": "pages", "diff": [{"kind": "E", "path": ["meta", "note"], "lhs": "a", "rhs": "b"}]}
            ],
            "fields": [
                {"collection": "articles", "field": "title", "diff": [{"kind": "N", "rhs": {"field": "title"}}]},
                {"collection": "legacy", "field": "code", "diff": [{"kind": "D", "lhs": {"field": "code"}}]},
                {"collection": "pages", "field": "body", "diff": [{"kind": "E", "path": ["schema", "max_length"], "lhs": 255, "rhs": null}]}
            ],
            "relations": [
                {"collection": "legacy", "field": "owner", "related_collection": "directus_users",
                 "diff": [{"kind": "D", "lhs": {"field": "owner"}}]}
            ]
        }))
        .unwrap()
    }

    #[test]
    fn test_interpret_classifies_by_root_node() {
        let report = interpret(&sample_diff());

        let names = |entries: &[ChangeEntry]| {
            entries.iter().map(|e| e.name.clone()).collect::<Vec<_>>()
        };

        assert_eq!(names(&report.collections.created), vec!["articles"]);
        assert_eq!(names(&report.collections.deleted), vec!["legacy", "old_posts"]);
        assert_eq!(names(&report.collections.modified), vec!["pages"]);
        assert_eq!(names(&report.fields.created), vec!["articles.title"]);
        assert_eq!(names(&report.fields.modified), vec!["pages.body"]);
        assert_eq!(
            names(&report.relations.deleted),
            vec!["legacy.owner -> directus_users"]
        );
        assert_eq!(report.collections.modified[0].details, vec!["~ meta.note: a -> b"]);
    }

    #[test]
    fn test_explicit_null_is_preserved() {
        let diff = sample_diff();
        let node = &diff.fields[2].diff[0];
        assert_eq!(node.rhs, Some(Value::Null));
        assert_eq!(diff.collections[0].diff[0].lhs, None);

        let round_trip: SchemaDiff =
            serde_json::from_value(serde_json::to_value(&diff).unwrap()).unwrap();
        assert_eq!(round_trip, diff);
    }

    #[test]
    fn test_sanitize_drops_unmanaged_collection_deletes() {
        let sanitized = sanitize(sample_diff(), is_managed_collection);

        assert_eq!(sanitized.dropped, vec!["legacy".to_string()]);
        let report = interpret(&sanitized.diff);
        assert!(report.deletions().all(|e| e.collection != "legacy"));
        assert_eq!(report.collections.deleted.len(), 1);
        assert_eq!(report.collections.deleted[0].name, "old_posts");
        assert!(report.relations.is_empty());
        assert_eq!(report.fields.len(), 2);
    }

    #[test]
    fn test_sanitize_keeps_diff_without_unowned_deletes() {
        let diff = SchemaDiff {
            collections: vec![CollectionDiff {
                collection: "a".to_string(),
                diff: vec![DiffNode {
                    kind: DiffKind::New,
                    path: vec![],
                    lhs: None,
                    rhs: Some(json!({})),
                    index: None,
                    item: None,
                }],
            }],
            ..Default::default()
        };

        let sanitized = sanitize(diff.clone(), is_managed_collection);
        assert!(sanitized.dropped.is_empty());
        assert_eq!(sanitized.diff, diff);
    }

    #[test]
    fn test_destructive_targets_skip_protected() {
        let mut diff = sample_diff();
        diff.fields.push(FieldDiffEntry {
            collection: "directus_users".to_string(),
            field: "custom".to_string(),
            diff: vec![DiffNode {
                kind: DiffKind::Delete,
                path: vec![],
                lhs: Some(json!({})),
                rhs: None,
                index: None,
                item: None,
            }],
        });

        let report = interpret(&sanitize(diff, is_managed_collection).diff);
        let targets = destructive_targets(&report, is_system_collection);

        assert_eq!(targets, vec!["old_posts".to_string()]);
    }

    #[test]
    fn test_array_node_describes_item() {
        let node: DiffNode = serde_json::from_value(json!({
            "kind": "A", "path": ["meta", "options", "choices"], "index": 2,
            "item": {"kind": "N", "rhs": "gold"}
        }))
        .unwrap();

        assert_eq!(node.describe(), "* meta.options.choices[2] + : gold");
    }

    #[test]
    fn test_report_display_lists_categories() {
        let text = interpret(&sample_diff()).to_string();
        assert!(text.starts_with("Collections:\n"));
        assert!(text.contains("🌱 articles"));
        assert!(text.contains("Fields:"));
    }
}
