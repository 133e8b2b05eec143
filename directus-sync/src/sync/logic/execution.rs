//! Apply executor for one entity type
//!
//! Drives a desired collection into the remote store in phases:
//! 1. Fetch the remote collection
//! 2. Reconcile desired against existing
//! 3. Sequence the new entities by their references
//! 4. Create (every id once, then failed ids once more)
//! 5. Update, sorted by id
//! 6. Delete, gated by `allow_delete` and the protected predicate

use std::collections::{BTreeMap, BTreeSet};

use crate::sync::error::{ApplyError, OperationFailure, OperationKind};
use crate::sync::logic::dependency_graph::build_graph;
use crate::sync::logic::reconcile::{FieldDiff, dict_diff, reconcile, strip_fields};
use crate::sync::store::EntityStore;
use crate::sync::types::{
    ALWAYS_IGNORED_FIELDS, ChangeStatus, Classification, EntityCollection, EntitySpec,
    collect_by_id,
};

/// Per-run apply settings shared by every entity type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyOptions {
    /// Fields stripped before comparing and sending
    pub ignored_fields: Vec<String>,
    /// Whether entities missing locally are deleted remotely
    pub allow_delete: bool,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        Self {
            ignored_fields: ALWAYS_IGNORED_FIELDS.iter().map(|f| f.to_string()).collect(),
            allow_delete: true,
        }
    }
}

impl ApplyOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add ignored fields (`user_created` is always kept)
    pub fn ignore_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for field in fields {
            let field = field.into();
            if !self.ignored_fields.contains(&field) {
                self.ignored_fields.push(field);
            }
        }
        self
    }

    pub fn allow_delete(mut self, allow: bool) -> Self {
        self.allow_delete = allow;
        self
    }
}

/// Everything the executor would do, computed without mutating
#[derive(Debug, Clone)]
pub struct ApplyPlan {
    pub entity_type: String,
    pub classification: Classification,
    /// Layered creation order of the new ids
    pub create_groups: Vec<Vec<String>>,
    /// Desired entities with ignored and forbidden fields removed
    pub desired: EntityCollection,
    /// Remote entities as fetched
    pub existing: EntityCollection,
    /// Field-level changes of every updated id
    pub changes: BTreeMap<String, FieldDiff>,
    /// Ids that will be deleted
    pub deletions: Vec<String>,
    /// Ids missing locally that are kept
    pub retained: Vec<String>,
    /// Human-readable descriptor per id
    pub descriptors: BTreeMap<String, String>,
}

impl ApplyPlan {
    /// Flat creation order
    pub fn create_order(&self) -> impl Iterator<Item = &String> {
        self.create_groups.iter().flatten()
    }

    pub fn has_changes(&self) -> bool {
        !self.classification.new.is_empty()
            || !self.classification.updated.is_empty()
            || !self.deletions.is_empty()
    }
}

/// Result of applying one entity type
#[derive(Debug, Clone)]
pub struct ApplyOutcome {
    pub entity_type: String,
    /// Classification with `deleted` narrowed to ids actually sent for deletion
    pub classification: Classification,
    pub retained: BTreeSet<String>,
    /// Ids whose creation needed the second attempt
    pub retried: Vec<String>,
    pub failures: Vec<OperationFailure>,
    /// Human-readable descriptor per id
    pub descriptors: BTreeMap<String, String>,
}

impl ApplyOutcome {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Descriptors of every id with the given status
    pub fn described(&self, status: ChangeStatus) -> Vec<&str> {
        let ids = match status {
            ChangeStatus::New => &self.classification.new,
            ChangeStatus::Modified => &self.classification.updated,
            ChangeStatus::Deleted => &self.classification.deleted,
            ChangeStatus::Unchanged => &self.classification.unchanged,
            ChangeStatus::Retained => &self.retained,
        };
        ids.iter()
            .filter_map(|id| self.descriptors.get(id).map(String::as_str))
            .collect()
    }

    /// Turn collected failures into an error
    pub fn into_result(self) -> Result<Self, ApplyError> {
        if self.failures.is_empty() {
            Ok(self)
        } else {
            Err(ApplyError::Operations {
                entity_type: self.entity_type,
                failures: self.failures,
            })
        }
    }
}

/// Applies desired collections through an [`EntityStore`]
pub struct ApplyExecutor<'a, S: EntityStore + ?Sized> {
    store: &'a S,
    options: ApplyOptions,
}

impl<'a, S: EntityStore + ?Sized> ApplyExecutor<'a, S> {
    pub fn new(store: &'a S, options: ApplyOptions) -> Self {
        Self { store, options }
    }

    pub fn options(&self) -> &ApplyOptions {
        &self.options
    }

    /// Fetch, reconcile and sequence without mutating the store
    pub async fn plan(
        &self,
        spec: &EntitySpec,
        desired: &EntityCollection,
    ) -> Result<ApplyPlan, ApplyError> {
        let fetched = self
            .store
            .fetch(spec)
            .await
            .map_err(|e| ApplyError::Fetch {
                entity_type: spec.name.clone(),
                message: format!("{:#}", e),
            })?;

        let (existing, unkeyed) = collect_by_id(fetched, &spec.id_field);
        if !unkeyed.is_empty() {
            log::warn!(
                "{}: ignoring {} remote entities without '{}'",
                spec.name,
                unkeyed.len(),
                spec.id_field
            );
        }

        let stripped_fields: Vec<&str> = self
            .options
            .ignored_fields
            .iter()
            .map(String::as_str)
            .chain(spec.forbidden_keys.iter().map(String::as_str))
            .collect();

        let desired: EntityCollection = desired
            .iter()
            .map(|(id, entity)| (id.clone(), strip_fields(entity, &stripped_fields)))
            .collect();

        let classification = reconcile(&desired, &existing, &stripped_fields);

        let changes = classification
            .updated
            .iter()
            .map(|id| {
                let diff = dict_diff(
                    &desired[id],
                    &strip_fields(&existing[id], &stripped_fields),
                );
                (id.clone(), diff)
            })
            .collect();

        let new_batch: EntityCollection = classification
            .new
            .iter()
            .map(|id| (id.clone(), desired[id].clone()))
            .collect();
        let create_groups = build_graph(&new_batch, &spec.id_field)
            .sequence()
            .map_err(|error| ApplyError::Sequence {
                entity_type: spec.name.clone(),
                error,
            })?;

        let mut deletions = Vec::new();
        let mut retained = Vec::new();
        for id in &classification.deleted {
            if self.options.allow_delete && !spec.is_protected(&existing[id]) {
                deletions.push(id.clone());
            } else {
                retained.push(id.clone());
            }
        }

        let descriptors = existing
            .iter()
            .chain(desired.iter())
            .map(|(id, entity)| (id.clone(), spec.describe(entity)))
            .collect();

        Ok(ApplyPlan {
            entity_type: spec.name.clone(),
            classification,
            create_groups,
            desired,
            existing,
            changes,
            deletions,
            retained,
            descriptors,
        })
    }

    /// Bring the remote collection in line with `desired`
    pub async fn apply(
        &self,
        spec: &EntitySpec,
        desired: &EntityCollection,
    ) -> Result<ApplyOutcome, ApplyError> {
        let plan = self.plan(spec, desired).await?;
        log::debug!(
            "{}: {} new, {} updated, {} to delete, {} retained",
            spec.name,
            plan.classification.new.len(),
            plan.classification.updated.len(),
            plan.deletions.len(),
            plan.retained.len()
        );

        let mut failures = Vec::new();
        let retried = self.create_all(spec, &plan, &mut failures).await;
        self.update_all(spec, &plan, &mut failures).await;
        self.delete_all(spec, &plan, &mut failures).await;

        Ok(build_outcome(plan, retried, failures))
    }

    /// Two-phase creation: all ids in order, then the failed ones again
    async fn create_all(
        &self,
        spec: &EntitySpec,
        plan: &ApplyPlan,
        failures: &mut Vec<OperationFailure>,
    ) -> Vec<String> {
        let mut failed = Vec::new();
        for id in plan.create_order() {
            if let Err(e) = self.store.create(spec, id, &plan.desired[id]).await {
                log::warn!("{}: create {} failed, will retry: {:#}", spec.name, id, e);
                failed.push(id.clone());
            }
        }

        for id in &failed {
            match self.store.create(spec, id, &plan.desired[id]).await {
                Ok(()) => log::info!("{}: created {} on retry", spec.name, id),
                Err(e) => {
                    log::error!("{}: create {} failed: {:#}", spec.name, id, e);
                    failures.push(OperationFailure {
                        entity_type: spec.name.clone(),
                        operation: OperationKind::Create,
                        ids: vec![id.clone()],
                        message: format!("{:#}", e),
                    });
                }
            }
        }

        failed
    }

    async fn update_all(
        &self,
        spec: &EntitySpec,
        plan: &ApplyPlan,
        failures: &mut Vec<OperationFailure>,
    ) {
        for id in &plan.classification.updated {
            if let Some(diff) = plan.changes.get(id) {
                log::debug!("{}: update {} ({})", spec.name, id, diff.summary());
            }
            if let Err(e) = self
                .store
                .update(spec, id, &plan.desired[id], &plan.existing[id])
                .await
            {
                log::error!("{}: update {} failed: {:#}", spec.name, id, e);
                failures.push(OperationFailure {
                    entity_type: spec.name.clone(),
                    operation: OperationKind::Update,
                    ids: vec![id.clone()],
                    message: format!("{:#}", e),
                });
            }
        }
    }

    async fn delete_all(
        &self,
        spec: &EntitySpec,
        plan: &ApplyPlan,
        failures: &mut Vec<OperationFailure>,
    ) {
        for id in &plan.retained {
            log::info!(
                "{}: keeping {} ({})",
                spec.name,
                id,
                spec.describe(&plan.existing[id])
            );
        }

        if plan.deletions.is_empty() {
            return;
        }

        let priors: Vec<_> = plan.deletions.iter().map(|id| &plan.existing[id]).collect();
        for prior in &priors {
            log::warn!("{}: deleting {}", spec.name, spec.describe(prior));
        }

        if let Err(e) = self.store.delete(spec, &plan.deletions, &priors).await {
            log::error!("{}: delete failed: {:#}", spec.name, e);
            failures.push(OperationFailure {
                entity_type: spec.name.clone(),
                operation: OperationKind::Delete,
                ids: plan.deletions.clone(),
                message: format!("{:#}", e),
            });
        }
    }
}

fn build_outcome(
    plan: ApplyPlan,
    retried: Vec<String>,
    failures: Vec<OperationFailure>,
) -> ApplyOutcome {
    let mut classification = plan.classification;
    classification.deleted = plan.deletions.into_iter().collect();

    ApplyOutcome {
        entity_type: plan.entity_type,
        classification,
        retained: plan.retained.into_iter().collect(),
        retried,
        failures,
        descriptors: plan.descriptors,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::memory::MemoryStore;
    use crate::sync::types::{Entity, EntityKind};
    use serde_json::{Value, json};

    fn desired(items: Vec<Value>) -> EntityCollection {
        items
            .into_iter()
            .map(|v| {
                let entity: Entity = v.as_object().cloned().unwrap();
                (crate::sync::types::entity_id(&entity, "id").unwrap(), entity)
            })
            .collect()
    }

    fn ids(set: &BTreeSet<String>) -> Vec<&str> {
        set.iter().map(String::as_str).collect()
    }

    #[tokio::test]
    async fn test_creates_referenced_entity_first() {
        let store = MemoryStore::new();
        let spec = EntityKind::Operations.spec();
        let executor = ApplyExecutor::new(&store, ApplyOptions::default());

        let outcome = executor
            .apply(
                &spec,
                &desired(vec![
                    json!({"id": "id2", "name": "second", "resolve": "id1"}),
                    json!({"id": "id1", "name": "first"}),
                ]),
            )
            .await
            .unwrap();

        assert!(outcome.is_success());
        assert_eq!(
            store.log(),
            vec!["create:/operations:id1", "create:/operations:id2"]
        );
    }

    #[tokio::test]
    async fn test_deletes_missing_and_keeps_unchanged() {
        let store = MemoryStore::new().with_entities(
            "/flows",
            vec![
                json!({"id": "a", "name": "keep"}),
                json!({"id": "b", "name": "drop"}),
            ],
        );
        let spec = EntityKind::Flows.spec();
        let executor = ApplyExecutor::new(&store, ApplyOptions::default());

        let outcome = executor
            .apply(&spec, &desired(vec![json!({"id": "a", "name": "keep"})]))
            .await
            .unwrap();

        assert_eq!(ids(&outcome.classification.unchanged), vec!["a"]);
        assert_eq!(ids(&outcome.classification.deleted), vec!["b"]);
        assert_eq!(store.log(), vec!["delete:/flows:b"]);
        assert_eq!(outcome.described(ChangeStatus::Deleted), vec!["drop-b"]);
    }

    #[tokio::test]
    async fn test_admin_role_is_never_deleted() {
        let store = MemoryStore::new().with_entities(
            "/roles",
            vec![
                json!({"id": "admin", "name": "Administrator", "admin_access": true}),
                json!({"id": "editor", "name": "Editor", "admin_access": false}),
            ],
        );
        let spec = EntityKind::Roles.spec();
        let executor = ApplyExecutor::new(&store, ApplyOptions::default());

        let outcome = executor.apply(&spec, &EntityCollection::new()).await.unwrap();

        assert_eq!(ids(&outcome.classification.deleted), vec!["editor"]);
        assert_eq!(ids(&outcome.retained), vec!["admin"]);
        assert!(store.entities("/roles").contains_key("admin"));
        assert!(!store.entities("/roles").contains_key("editor"));
    }

    #[tokio::test]
    async fn test_allow_delete_false_retains_everything() {
        let store =
            MemoryStore::new().with_entities("/webhooks", vec![json!({"id": 1, "name": "hook"})]);
        let spec = EntityKind::Webhooks.spec();
        let executor = ApplyExecutor::new(&store, ApplyOptions::new().allow_delete(false));

        let outcome = executor.apply(&spec, &EntityCollection::new()).await.unwrap();

        assert!(outcome.classification.deleted.is_empty());
        assert_eq!(ids(&outcome.retained), vec!["1"]);
        assert_eq!(store.mutations(), 0);
    }

    #[tokio::test]
    async fn test_failed_create_is_retried_once() {
        let store = MemoryStore::new().fail_create("p1", 1);
        let spec = EntityKind::Panels.spec();
        let executor = ApplyExecutor::new(&store, ApplyOptions::default());

        let outcome = executor
            .apply(
                &spec,
                &desired(vec![json!({"id": "p1"}), json!({"id": "p2"})]),
            )
            .await
            .unwrap();

        assert!(outcome.is_success());
        assert_eq!(outcome.retried, vec!["p1".to_string()]);
        assert_eq!(
            store.log(),
            vec![
                "create:/panels:p1",
                "create:/panels:p2",
                "create:/panels:p1"
            ]
        );
    }

    #[tokio::test]
    async fn test_second_create_failure_is_reported_and_siblings_continue() {
        let store = MemoryStore::new()
            .with_entities("/panels", vec![json!({"id": "p9", "name": "old"})])
            .fail_create("p1", 2);
        let spec = EntityKind::Panels.spec();
        let executor = ApplyExecutor::new(&store, ApplyOptions::default());

        let outcome = executor
            .apply(
                &spec,
                &desired(vec![
                    json!({"id": "p1"}),
                    json!({"id": "p2"}),
                    json!({"id": "p9", "name": "new"}),
                ]),
            )
            .await
            .unwrap();

        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].operation, OperationKind::Create);
        assert_eq!(outcome.failures[0].ids, vec!["p1".to_string()]);
        assert!(store.entities("/panels").contains_key("p2"));
        assert_eq!(store.entities("/panels")["p9"]["name"], json!("new"));

        let err = outcome.into_result().unwrap_err();
        assert!(matches!(err, ApplyError::Operations { .. }));
    }

    #[tokio::test]
    async fn test_fetch_failure_aborts_without_mutation() {
        let store = MemoryStore::new().fail_fetch("/flows");
        let spec = EntityKind::Flows.spec();
        let executor = ApplyExecutor::new(&store, ApplyOptions::default());

        let err = executor
            .apply(&spec, &desired(vec![json!({"id": "f1"})]))
            .await
            .unwrap_err();

        assert!(matches!(err, ApplyError::Fetch { .. }));
        assert_eq!(store.mutations(), 0);
    }

    #[tokio::test]
    async fn test_cycle_aborts_before_any_creation() {
        let store = MemoryStore::new();
        let spec = EntityKind::Operations.spec();
        let executor = ApplyExecutor::new(&store, ApplyOptions::default());

        let err = executor
            .apply(
                &spec,
                &desired(vec![
                    json!({"id": "a", "resolve": "b"}),
                    json!({"id": "b", "resolve": "a"}),
                ]),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, ApplyError::Sequence { .. }));
        assert_eq!(store.mutations(), 0);
    }

    #[tokio::test]
    async fn test_second_apply_is_a_no_op() {
        let store = MemoryStore::new().with_entities(
            "/dashboards",
            vec![json!({"id": "d0", "name": "stale"})],
        );
        let spec = EntityKind::Dashboards.spec();
        let executor = ApplyExecutor::new(&store, ApplyOptions::default());
        let wanted = desired(vec![
            json!({"id": "d1", "name": "Main"}),
            json!({"id": "d2", "name": "Ops", "icon": "bolt"}),
        ]);

        executor.apply(&spec, &wanted).await.unwrap();
        let mutations = store.mutations();
        let second = executor.apply(&spec, &wanted).await.unwrap();

        assert!(!second.classification.has_changes());
        assert_eq!(ids(&second.classification.unchanged), vec!["d1", "d2"]);
        assert_eq!(store.mutations(), mutations);
    }

    #[tokio::test]
    async fn test_forbidden_and_ignored_fields_are_not_sent() {
        let store = MemoryStore::new().with_entities(
            "/flows",
            vec![json!({"id": "f1", "name": "x", "operations": ["o1"], "user_created": "u1"})],
        );
        let spec = EntityKind::Flows.spec();
        let executor = ApplyExecutor::new(&store, ApplyOptions::default());

        let outcome = executor
            .apply(
                &spec,
                &desired(vec![
                    json!({"id": "f1", "name": "x", "operations": ["o2"], "user_created": "u2"}),
                    json!({"id": "f2", "name": "y", "operations": [], "user_created": "u2"}),
                ]),
            )
            .await
            .unwrap();

        assert!(outcome.classification.unchanged.contains("f1"));
        let created = &store.entities("/flows")["f2"];
        assert!(!created.contains_key("operations"));
        assert!(!created.contains_key("user_created"));
    }

    #[tokio::test]
    async fn test_update_failure_does_not_stop_pass() {
        let store = MemoryStore::new()
            .with_entities(
                "/presets",
                vec![json!({"id": 1, "layout": "tabular"}), json!({"id": 2, "layout": "tabular"})],
            )
            .fail_update("1");
        let spec = EntityKind::Presets.spec();
        let executor = ApplyExecutor::new(&store, ApplyOptions::default());

        let outcome = executor
            .apply(
                &spec,
                &desired(vec![json!({"id": 1, "layout": "cards"}), json!({"id": 2, "layout": "cards"})]),
            )
            .await
            .unwrap();

        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].operation, OperationKind::Update);
        assert_eq!(store.log(), vec!["update:/presets:1", "update:/presets:2"]);
    }

    #[tokio::test]
    async fn test_plan_does_not_mutate() {
        let store = MemoryStore::new().with_entities("/folders", vec![json!({"id": "old"})]);
        let spec = EntityKind::Folders.spec();
        let executor = ApplyExecutor::new(&store, ApplyOptions::default());

        let plan = executor
            .plan(
                &spec,
                &desired(vec![json!({"id": "child", "parent": "root"}), json!({"id": "root"})]),
            )
            .await
            .unwrap();

        assert_eq!(
            plan.create_order().collect::<Vec<_>>(),
            vec!["root", "child"]
        );
        assert_eq!(plan.deletions, vec!["old".to_string()]);
        assert!(plan.has_changes());
        assert_eq!(store.mutations(), 0);
    }

    #[test]
    fn test_options_always_ignore_user_created() {
        let options = ApplyOptions::new().ignore_fields(["date_updated", "user_created"]);
        assert_eq!(
            options.ignored_fields,
            vec!["user_created".to_string(), "date_updated".to_string()]
        );
        assert!(options.allow_delete);
    }
}
