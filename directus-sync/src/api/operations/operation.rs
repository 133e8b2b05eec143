//! Mutation requests sent to Directus

use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Route of the schema apply endpoint
pub const SCHEMA_APPLY_ROUTE: &str = "/schema/apply";

/// Represents a single mutation that can be executed against Directus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operation {
    /// Create one record
    Create {
        /// Collection route (e.g. "/flows", "/items/articles")
        route: String,
        data: Value,
    },
    /// Update one record by key
    Update {
        route: String,
        id: String,
        data: Value,
    },
    /// Delete several records in one request; the body is the list of keys
    Delete { route: String, ids: Vec<String> },
    /// Patch a singleton such as `/settings`
    PatchSingleton { route: String, data: Value },
    /// Apply a schema diff returned by `/schema/diff`
    SchemaApply { diff: Value },
}

impl Operation {
    pub fn create(route: impl Into<String>, data: Value) -> Self {
        Self::Create {
            route: route.into(),
            data,
        }
    }

    pub fn update(route: impl Into<String>, id: impl Into<String>, data: Value) -> Self {
        Self::Update {
            route: route.into(),
            id: id.into(),
            data,
        }
    }

    pub fn delete(route: impl Into<String>, ids: Vec<String>) -> Self {
        Self::Delete {
            route: route.into(),
            ids,
        }
    }

    pub fn patch_singleton(route: impl Into<String>, data: Value) -> Self {
        Self::PatchSingleton {
            route: route.into(),
            data,
        }
    }

    pub fn schema_apply(diff: Value) -> Self {
        Self::SchemaApply { diff }
    }

    /// Collection route this operation targets
    pub fn route(&self) -> &str {
        match self {
            Self::Create { route, .. }
            | Self::Update { route, .. }
            | Self::Delete { route, .. }
            | Self::PatchSingleton { route, .. } => route,
            Self::SchemaApply { .. } => SCHEMA_APPLY_ROUTE,
        }
    }

    /// Request path, with the record key url-encoded for updates
    pub fn path(&self) -> String {
        match self {
            Self::Update { route, id, .. } => format!("{}/{}", route, urlencoding::encode(id)),
            other => other.route().to_string(),
        }
    }

    /// Get the HTTP method for this operation
    pub fn http_method(&self) -> Method {
        match self {
            Self::Create { .. } | Self::SchemaApply { .. } => Method::POST,
            Self::Update { .. } | Self::PatchSingleton { .. } => Method::PATCH,
            Self::Delete { .. } => Method::DELETE,
        }
    }

    /// Get the operation type as a string
    pub fn operation_type(&self) -> &'static str {
        match self {
            Self::Create { .. } => "create",
            Self::Update { .. } => "update",
            Self::Delete { .. } => "delete",
            Self::PatchSingleton { .. } => "patch",
            Self::SchemaApply { .. } => "schema_apply",
        }
    }

    /// JSON request body
    pub fn body(&self) -> Value {
        match self {
            Self::Create { data, .. }
            | Self::Update { data, .. }
            | Self::PatchSingleton { data, .. } => data.clone(),
            Self::Delete { ids, .. } => Value::from(ids.clone()),
            Self::SchemaApply { diff } => diff.clone(),
        }
    }
}
