//! Schema sync: diff, sanitize, report, confirm, apply

use serde_json::Value;

use crate::sync::confirm::Confirm;
use crate::sync::error::ApplyError;
use crate::sync::logic::report_builder::{EntityTypeSummary, StatusCounts};
use crate::sync::logic::schema_diff::{
    ChangeKind, SYSTEM_COLLECTION_PREFIX, SchemaDiffEnvelope, SchemaDiffReport, destructive_targets,
    interpret, is_managed_collection, sanitize,
};
use crate::sync::store::SchemaStore;
use crate::sync::types::ChangeStatus;

/// How schema differences are applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaOptions {
    /// Ask Directus to diff even across versions
    pub force: bool,
    /// Require confirmation before deleting collections, fields or relations
    pub confirm_destructive: bool,
    /// Collections whose deletion never needs confirmation (prefix match)
    pub protected_prefixes: Vec<String>,
}

impl Default for SchemaOptions {
    fn default() -> Self {
        Self {
            force: false,
            confirm_destructive: true,
            protected_prefixes: vec![SYSTEM_COLLECTION_PREFIX.to_string()],
        }
    }
}

impl SchemaOptions {
    pub fn is_protected(&self, collection: &str) -> bool {
        self.protected_prefixes
            .iter()
            .any(|prefix| collection.starts_with(prefix.as_str()))
    }
}

/// What the schema step found and did
#[derive(Debug, Clone, Default)]
pub struct SchemaOutcome {
    pub report: SchemaDiffReport,
    /// Unmanaged collections whose deletion was dropped from the diff
    pub dropped: Vec<String>,
    pub applied: bool,
}

impl SchemaOutcome {
    pub fn summary(&self) -> EntityTypeSummary {
        let categories = self.report.categories();
        let count = |kind: ChangeKind| -> usize {
            categories.iter().map(|(_, c)| c.of_kind(kind).len()).sum()
        };
        let counts = StatusCounts {
            new: count(ChangeKind::Created),
            updated: count(ChangeKind::Modified),
            deleted: count(ChangeKind::Deleted),
            ..StatusCounts::default()
        };

        let mut summary = EntityTypeSummary::new("schema", "Schema", counts);
        for (status, kind) in [
            (ChangeStatus::New, ChangeKind::Created),
            (ChangeStatus::Modified, ChangeKind::Modified),
            (ChangeStatus::Deleted, ChangeKind::Deleted),
        ] {
            let names: Vec<String> = categories
                .iter()
                .flat_map(|(_, c)| c.of_kind(kind))
                .map(|entry| entry.name.clone())
                .collect();
            if !names.is_empty() {
                summary.descriptors.insert(status, names);
            }
        }
        summary
    }
}

/// Diff `snapshot` against the instance and apply the sanitized result.
///
/// With `dry_run` nothing is applied and no confirmation is asked.
pub async fn sync_schema<S: SchemaStore + ?Sized>(
    store: &S,
    snapshot: &Value,
    options: &SchemaOptions,
    confirm: &dyn Confirm,
    dry_run: bool,
) -> Result<SchemaOutcome, ApplyError> {
    let envelope = store
        .diff(snapshot, options.force)
        .await
        .map_err(|e| ApplyError::Schema {
            message: format!("{:#}", e),
        })?;

    let Some(SchemaDiffEnvelope { hash, diff }) = envelope else {
        log::info!("schema: already in sync");
        return Ok(SchemaOutcome::default());
    };

    let sanitized = sanitize(diff, is_managed_collection);
    for name in &sanitized.dropped {
        log::warn!(
            "schema: not deleting '{}', it has no Directus metadata",
            name
        );
    }

    let mut outcome = SchemaOutcome {
        report: interpret(&sanitized.diff),
        dropped: sanitized.dropped,
        applied: false,
    };

    if sanitized.diff.is_empty() || dry_run {
        return Ok(outcome);
    }

    let targets = destructive_targets(&outcome.report, |c| options.is_protected(c));
    if options.confirm_destructive && !targets.is_empty() {
        let prompt = format!(
            "Apply {} destructive schema change(s): {}?",
            targets.len(),
            targets.join(", ")
        );
        let accepted = confirm.confirm(&prompt).map_err(|e| ApplyError::Schema {
            message: format!("{:#}", e),
        })?;
        if !accepted {
            return Err(ApplyError::DestructiveChangeRejected {
                entity_type: "schema".to_string(),
            });
        }
    }

    store
        .apply_diff(&SchemaDiffEnvelope {
            hash,
            diff: sanitized.diff,
        })
        .await
        .map_err(|e| ApplyError::Schema {
            message: format!("{:#}", e),
        })?;

    outcome.applied = true;
    Ok(outcome)
}
