//! Remote store abstractions used by the executors
//!
//! The apply executor only talks to these traits. `DirectusClient`
//! implements them over HTTP; tests use in-memory stores.

use async_trait::async_trait;
use serde_json::Value;

use crate::sync::logic::schema_diff::SchemaDiffEnvelope;
use crate::sync::types::{Entity, EntitySpec};

/// CRUD primitives for one addressable entity collection
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Read every entity of the type
    async fn fetch(&self, spec: &EntitySpec) -> anyhow::Result<Vec<Entity>>;

    /// Create one entity under `id`
    async fn create(&self, spec: &EntitySpec, id: &str, entity: &Entity) -> anyhow::Result<()>;

    /// Replace the fields of an existing entity. `prior` is the remote version.
    async fn update(
        &self,
        spec: &EntitySpec,
        id: &str,
        entity: &Entity,
        prior: &Entity,
    ) -> anyhow::Result<()>;

    /// Delete a batch of entities. `priors` are the remote versions, same order as `ids`.
    async fn delete(&self, spec: &EntitySpec, ids: &[String], priors: &[&Entity])
    -> anyhow::Result<()>;
}

/// Schema snapshot endpoints
#[async_trait]
pub trait SchemaStore: Send + Sync {
    /// Current schema snapshot of the instance
    async fn snapshot(&self) -> anyhow::Result<Value>;

    /// Diff a desired snapshot against the instance. `None` when already in sync.
    async fn diff(&self, snapshot: &Value, force: bool)
    -> anyhow::Result<Option<SchemaDiffEnvelope>>;

    /// Apply a (possibly sanitized) diff
    async fn apply_diff(&self, envelope: &SchemaDiffEnvelope) -> anyhow::Result<()>;
}

/// Project settings singleton
#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn fetch_settings(&self) -> anyhow::Result<Entity>;

    async fn patch_settings(&self, changes: &Entity) -> anyhow::Result<()>;
}
