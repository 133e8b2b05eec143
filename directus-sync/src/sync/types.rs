//! Core data types for reconciling Directus configuration
//!
//! These types define the data model shared by the reconciler, the
//! dependency grapher and the apply executor: entities as dynamic JSON
//! objects, id-keyed collections, the four-way classification and the
//! per-type specification of how an entity kind is synced.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

/// One remote-managed configuration object (flow, role, panel, ...)
pub type Entity = Map<String, Value>;

/// Entities of one type keyed by their canonical id
pub type EntityCollection = BTreeMap<String, Entity>;

/// Predicate marking entities that must never be deleted
pub type ProtectedPredicate = Arc<dyn Fn(&Entity) -> bool + Send + Sync>;

/// Field holding the stable identifier of an entity
pub const DEFAULT_ID_FIELD: &str = "id";

/// Fields stripped from every entity before comparison and before sending.
/// These describe who created an entity on a given instance and never carry
/// across environments.
pub const ALWAYS_IGNORED_FIELDS: &[&str] = &["user_created"];

/// Canonical string key for an id value.
///
/// String ids are used as-is and numeric ids are rendered in decimal, so
/// `1` and `"1"` collide on purpose: Directus accepts both on its routes.
pub fn id_key(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Id of an entity, if it carries one
pub fn entity_id(entity: &Entity, id_field: &str) -> Option<String> {
    entity.get(id_field).and_then(id_key)
}

/// Key entities by id. Entities without an id are returned separately.
pub fn collect_by_id(
    entities: impl IntoIterator<Item = Entity>,
    id_field: &str,
) -> (EntityCollection, Vec<Entity>) {
    let mut keyed = EntityCollection::new();
    let mut unkeyed = Vec::new();

    for entity in entities {
        match entity_id(&entity, id_field) {
            Some(id) => {
                keyed.insert(id, entity);
            }
            None => unkeyed.push(entity),
        }
    }

    (keyed, unkeyed)
}

/// Resolve a dotted path (`schema.name`) inside an entity
pub fn lookup_path<'a>(entity: &'a Entity, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let first = segments.next()?;
    let mut current = entity.get(first)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Render a value the way it appears in file names and report lines
pub fn value_label(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => "None".to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Four-way partition of an id space
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    /// Desired but not present remotely
    pub new: BTreeSet<String>,
    /// Present on both sides with differing fields
    pub updated: BTreeSet<String>,
    /// Present remotely but not desired
    pub deleted: BTreeSet<String>,
    /// Present on both sides and equal
    pub unchanged: BTreeSet<String>,
}

impl Classification {
    /// Check if any create, update or delete is needed
    pub fn has_changes(&self) -> bool {
        !self.new.is_empty() || !self.updated.is_empty() || !self.deleted.is_empty()
    }

    /// Number of ids across all four classes
    pub fn total(&self) -> usize {
        self.new.len() + self.updated.len() + self.deleted.len() + self.unchanged.len()
    }

    /// Status of a single id, if it was classified
    pub fn status_of(&self, id: &str) -> Option<ChangeStatus> {
        if self.new.contains(id) {
            Some(ChangeStatus::New)
        } else if self.updated.contains(id) {
            Some(ChangeStatus::Modified)
        } else if self.deleted.contains(id) {
            Some(ChangeStatus::Deleted)
        } else if self.unchanged.contains(id) {
            Some(ChangeStatus::Unchanged)
        } else {
            None
        }
    }
}

/// Status of one entity (or file) after reconciliation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeStatus {
    New,
    Modified,
    Deleted,
    Unchanged,
    /// Missing from the desired state but kept (deletes disabled or protected)
    Retained,
}

impl ChangeStatus {
    pub fn label(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Modified => "modified",
            Self::Deleted => "deleted",
            Self::Unchanged => "unchanged",
            Self::Retained => "retained",
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Self::New => "🌱",
            Self::Modified => "🔧",
            Self::Deleted => "🗑 ",
            Self::Unchanged => "🌲",
            Self::Retained => "🔒",
        }
    }
}

/// Groups selectable with `--only`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, clap::ValueEnum)]
pub enum SyncGroup {
    Settings,
    Schema,
    Folders,
    Flows,
    Dashboards,
    Webhooks,
    Presets,
    Roles,
}

/// Addressable entity collections managed through the REST API
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Folders,
    Flows,
    Operations,
    Dashboards,
    Panels,
    Webhooks,
    Presets,
    Roles,
    Permissions,
}

impl EntityKind {
    /// Order in which kinds are applied (referenced kinds first)
    pub const APPLY_ORDER: [EntityKind; 9] = [
        EntityKind::Folders,
        EntityKind::Flows,
        EntityKind::Operations,
        EntityKind::Dashboards,
        EntityKind::Panels,
        EntityKind::Webhooks,
        EntityKind::Presets,
        EntityKind::Roles,
        EntityKind::Permissions,
    ];

    /// Collection name, also used as route and directory name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Folders => "folders",
            Self::Flows => "flows",
            Self::Operations => "operations",
            Self::Dashboards => "dashboards",
            Self::Panels => "panels",
            Self::Webhooks => "webhooks",
            Self::Presets => "presets",
            Self::Roles => "roles",
            Self::Permissions => "permissions",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Folders => "Folders",
            Self::Flows => "Flows",
            Self::Operations => "Operations",
            Self::Dashboards => "Dashboards",
            Self::Panels => "Panels",
            Self::Webhooks => "Webhooks",
            Self::Presets => "Presets",
            Self::Roles => "Roles",
            Self::Permissions => "Permissions",
        }
    }

    pub fn route(&self) -> String {
        format!("/{}", self.name())
    }

    /// Relational alias fields that the API returns but rejects on write
    pub fn forbidden_keys(&self) -> &'static [&'static str] {
        match self {
            Self::Flows => &["operations"],
            Self::Dashboards => &["panels"],
            Self::Roles => &["users"],
            _ => &[],
        }
    }

    /// Fields used to name files and describe entities in reports
    pub fn description_keys(&self) -> &'static [&'static str] {
        match self {
            Self::Presets => &["bookmark", "collection", "id"],
            Self::Permissions => &["role", "action", "collection", "id"],
            _ => &["name", "id"],
        }
    }

    /// Entities of this kind that must survive deletion
    pub fn is_protected(&self, entity: &Entity) -> bool {
        match self {
            Self::Roles => entity.get("admin_access") == Some(&Value::Bool(true)),
            _ => false,
        }
    }

    /// Whether a fetched entity belongs in the exported snapshot
    pub fn should_export(&self, entity: &Entity) -> bool {
        match self {
            Self::Permissions => {
                entity.get("system") != Some(&Value::Bool(true)) && entity.contains_key("id")
            }
            _ => true,
        }
    }

    pub fn group(&self) -> SyncGroup {
        match self {
            Self::Folders => SyncGroup::Folders,
            Self::Flows | Self::Operations => SyncGroup::Flows,
            Self::Dashboards | Self::Panels => SyncGroup::Dashboards,
            Self::Webhooks => SyncGroup::Webhooks,
            Self::Presets => SyncGroup::Presets,
            Self::Roles | Self::Permissions => SyncGroup::Roles,
        }
    }

    /// Build the sync specification for this kind
    pub fn spec(&self) -> EntitySpec {
        let kind = *self;
        EntitySpec::new(self.name(), self.route())
            .with_forbidden_keys(self.forbidden_keys())
            .with_description_keys(self.description_keys())
            .with_protected(move |entity| kind.is_protected(entity))
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How one entity type is reconciled against the remote store
#[derive(Clone)]
pub struct EntitySpec {
    /// Entity type name used in logs and reports (e.g. "flows")
    pub name: String,
    /// REST route of the collection (e.g. "/flows")
    pub route: String,
    /// Field holding the entity id
    pub id_field: String,
    /// Fields removed from desired entities before comparing and sending
    pub forbidden_keys: Vec<String>,
    /// Fields (dotted paths allowed) describing an entity to humans
    pub description_keys: Vec<String>,
    /// Entities matching this predicate are never deleted
    pub protected: ProtectedPredicate,
}

impl EntitySpec {
    /// Create a spec with the default id field and no protection
    pub fn new(name: impl Into<String>, route: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            route: route.into(),
            id_field: DEFAULT_ID_FIELD.to_string(),
            forbidden_keys: Vec::new(),
            description_keys: vec!["name".to_string(), DEFAULT_ID_FIELD.to_string()],
            protected: Arc::new(|_| false),
        }
    }

    pub fn with_id_field(mut self, id_field: impl Into<String>) -> Self {
        self.id_field = id_field.into();
        self
    }

    pub fn with_forbidden_keys(mut self, keys: &[&str]) -> Self {
        self.forbidden_keys = keys.iter().map(|k| k.to_string()).collect();
        self
    }

    pub fn with_description_keys(mut self, keys: &[&str]) -> Self {
        self.description_keys = keys.iter().map(|k| k.to_string()).collect();
        self
    }

    pub fn with_protected(
        mut self,
        predicate: impl Fn(&Entity) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.protected = Arc::new(predicate);
        self
    }

    pub fn is_protected(&self, entity: &Entity) -> bool {
        (self.protected)(entity)
    }

    /// Human-readable descriptor, e.g. "Notify on signup-3f2a..."
    pub fn describe(&self, entity: &Entity) -> String {
        self.description_keys
            .iter()
            .map(|key| value_label(lookup_path(entity, key)))
            .collect::<Vec<_>>()
            .join("-")
    }
}

impl fmt::Debug for EntitySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntitySpec")
            .field("name", &self.name)
            .field("route", &self.route)
            .field("id_field", &self.id_field)
            .field("forbidden_keys", &self.forbidden_keys)
            .field("description_keys", &self.description_keys)
            .finish_non_exhaustive()
    }
}
