//! In-memory stores used by the executor tests

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use anyhow::bail;
use async_trait::async_trait;
use serde_json::Value;

use crate::sync::logic::schema_diff::SchemaDiffEnvelope;
use crate::sync::store::{EntityStore, SchemaStore, SettingsStore};
use crate::sync::types::{Entity, EntityCollection, EntitySpec, entity_id};

#[derive(Default)]
struct State {
    collections: BTreeMap<String, EntityCollection>,
    settings: Entity,
    log: Vec<String>,
    fail_fetch: BTreeSet<String>,
    /// id -> number of create attempts that still fail
    create_failures: BTreeMap<String, usize>,
    update_failures: BTreeSet<String>,
    delete_failures: BTreeSet<String>,
    schema_diff: Option<SchemaDiffEnvelope>,
    applied_diffs: Vec<SchemaDiffEnvelope>,
}

/// Entity, schema and settings store backed by maps
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a collection with entities keyed by `id`
    pub fn with_entities(self, route: &str, entities: Vec<Value>) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            let collection = state.collections.entry(route.to_string()).or_default();
            for value in entities {
                let entity = value.as_object().cloned().unwrap();
                let id = entity_id(&entity, "id").unwrap();
                collection.insert(id, entity);
            }
        }
        self
    }

    pub fn with_settings(self, settings: Value) -> Self {
        self.state.lock().unwrap().settings = settings.as_object().cloned().unwrap();
        self
    }

    pub fn with_schema_diff(self, envelope: SchemaDiffEnvelope) -> Self {
        self.state.lock().unwrap().schema_diff = Some(envelope);
        self
    }

    pub fn fail_fetch(self, route: &str) -> Self {
        self.state.lock().unwrap().fail_fetch.insert(route.to_string());
        self
    }

    /// Make the next `times` creations of `id` fail
    pub fn fail_create(self, id: &str, times: usize) -> Self {
        self.state
            .lock()
            .unwrap()
            .create_failures
            .insert(id.to_string(), times);
        self
    }

    pub fn fail_update(self, id: &str) -> Self {
        self.state.lock().unwrap().update_failures.insert(id.to_string());
        self
    }

    pub fn fail_delete(self, id: &str) -> Self {
        self.state.lock().unwrap().delete_failures.insert(id.to_string());
        self
    }

    pub fn entities(&self, route: &str) -> EntityCollection {
        self.state
            .lock()
            .unwrap()
            .collections
            .get(route)
            .cloned()
            .unwrap_or_default()
    }

    pub fn settings(&self) -> Entity {
        self.state.lock().unwrap().settings.clone()
    }

    /// Mutations in call order, e.g. `create:/flows:f1`
    pub fn log(&self) -> Vec<String> {
        self.state.lock().unwrap().log.clone()
    }

    pub fn mutations(&self) -> usize {
        self.log().len()
    }

    pub fn applied_diffs(&self) -> Vec<SchemaDiffEnvelope> {
        self.state.lock().unwrap().applied_diffs.clone()
    }
}

#[async_trait]
impl EntityStore for MemoryStore {
    async fn fetch(&self, spec: &EntitySpec) -> anyhow::Result<Vec<Entity>> {
        let state = self.state.lock().unwrap();
        if state.fail_fetch.contains(&spec.route) {
            bail!("GET {} failed with 503", spec.route);
        }
        Ok(state
            .collections
            .get(&spec.route)
            .map(|c| c.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn create(&self, spec: &EntitySpec, id: &str, entity: &Entity) -> anyhow::Result<()> {
        let mut state = self.state.lock().unwrap();
        state.log.push(format!("create:{}:{}", spec.route, id));
        if let Some(remaining) = state.create_failures.get_mut(id) {
            if *remaining > 0 {
                *remaining -= 1;
                bail!("POST {} failed with 400", spec.route);
            }
        }
        let collection = state.collections.entry(spec.route.clone()).or_default();
        if collection.contains_key(id) {
            bail!("POST {} failed with 409: duplicate id {}", spec.route, id);
        }
        collection.insert(id.to_string(), entity.clone());
        Ok(())
    }

    async fn update(
        &self,
        spec: &EntitySpec,
        id: &str,
        entity: &Entity,
        _prior: &Entity,
    ) -> anyhow::Result<()> {
        let mut state = self.state.lock().unwrap();
        state.log.push(format!("update:{}:{}", spec.route, id));
        if state.update_failures.contains(id) {
            bail!("PATCH {}/{} failed with 403", spec.route, id);
        }
        state
            .collections
            .entry(spec.route.clone())
            .or_default()
            .insert(id.to_string(), entity.clone());
        Ok(())
    }

    async fn delete(
        &self,
        spec: &EntitySpec,
        ids: &[String],
        _priors: &[&Entity],
    ) -> anyhow::Result<()> {
        let mut state = self.state.lock().unwrap();
        state
            .log
            .push(format!("delete:{}:{}", spec.route, ids.join(",")));
        if ids.iter().any(|id| state.delete_failures.contains(id)) {
            bail!("DELETE {} failed with 403", spec.route);
        }
        let collection = state.collections.entry(spec.route.clone()).or_default();
        for id in ids {
            collection.remove(id);
        }
        Ok(())
    }
}

#[async_trait]
impl SchemaStore for MemoryStore {
    async fn snapshot(&self) -> anyhow::Result<Value> {
        Ok(serde_json::json!({"version": 1, "collections": [], "fields": [], "relations": []}))
    }

    async fn diff(
        &self,
        _snapshot: &Value,
        _force: bool,
    ) -> anyhow::Result<Option<SchemaDiffEnvelope>> {
        Ok(self.state.lock().unwrap().schema_diff.clone())
    }

    async fn apply_diff(&self, envelope: &SchemaDiffEnvelope) -> anyhow::Result<()> {
        let mut state = self.state.lock().unwrap();
        state.log.push("schema:apply".to_string());
        state.applied_diffs.push(envelope.clone());
        Ok(())
    }
}

#[async_trait]
impl SettingsStore for MemoryStore {
    async fn fetch_settings(&self) -> anyhow::Result<Entity> {
        Ok(self.state.lock().unwrap().settings.clone())
    }

    async fn patch_settings(&self, changes: &Entity) -> anyhow::Result<()> {
        let mut state = self.state.lock().unwrap();
        state.log.push("settings:patch".to_string());
        for (key, value) in changes {
            state.settings.insert(key.clone(), value.clone());
        }
        Ok(())
    }
}
