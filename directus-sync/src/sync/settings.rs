//! Project settings singleton sync

use crate::sync::logic::reconcile::{FieldDiff, dict_diff, strip_fields};
use crate::sync::logic::report_builder::{EntityTypeSummary, StatusCounts};
use crate::sync::store::SettingsStore;
use crate::sync::types::{ChangeStatus, Entity};

/// Result of syncing the settings singleton
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettingsOutcome {
    /// Differences between local and remote settings
    pub diff: FieldDiff,
    /// Whether a PATCH was sent
    pub patched: bool,
}

impl SettingsOutcome {
    pub fn status(&self) -> ChangeStatus {
        if self.patched || self.has_pending_changes() {
            ChangeStatus::Modified
        } else {
            ChangeStatus::Unchanged
        }
    }

    fn has_pending_changes(&self) -> bool {
        !self.diff.added.is_empty() || !self.diff.changed.is_empty()
    }

    pub fn summary(&self) -> EntityTypeSummary {
        let mut counts = StatusCounts::default();
        match self.status() {
            ChangeStatus::Modified => counts.updated = 1,
            _ => counts.unchanged = 1,
        }
        let mut summary = EntityTypeSummary::new("settings", "Settings", counts);
        if counts.updated > 0 {
            summary
                .descriptors
                .insert(ChangeStatus::Modified, vec![self.diff.summary()]);
        }
        summary
    }
}

/// Fields of `desired` that are missing or different remotely
pub fn settings_changes(desired: &Entity, existing: &Entity, ignored: &[String]) -> (Entity, FieldDiff) {
    let desired = strip_fields(desired, ignored);
    let existing = strip_fields(existing, ignored);
    let diff = dict_diff(&desired, &existing);

    let changes = desired
        .into_iter()
        .filter(|(key, _)| diff.added.contains(key) || diff.changed.contains(key))
        .collect();

    (changes, diff)
}

/// PATCH the settings when any desired field differs. Remote-only fields are
/// left alone.
pub async fn apply_settings<S: SettingsStore + ?Sized>(
    store: &S,
    desired: &Entity,
    ignored: &[String],
    dry_run: bool,
) -> anyhow::Result<SettingsOutcome> {
    let existing = store.fetch_settings().await?;
    let (changes, diff) = settings_changes(desired, &existing, ignored);

    if changes.is_empty() {
        log::debug!("settings: unchanged");
        return Ok(SettingsOutcome {
            diff,
            patched: false,
        });
    }

    if dry_run {
        return Ok(SettingsOutcome {
            diff,
            patched: false,
        });
    }

    log::info!("settings: updating {}", diff.summary());
    store.patch_settings(&changes).await?;
    Ok(SettingsOutcome {
        diff,
        patched: true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::memory::MemoryStore;
    use serde_json::{Value, json};

    fn entity(value: Value) -> Entity {
        value.as_object().cloned().unwrap()
    }

    fn ignored() -> Vec<String> {
        vec!["user_created".to_string()]
    }

    #[tokio::test]
    async fn test_patches_only_differing_fields() {
        let store = MemoryStore::new().with_settings(json!({
            "id": 1, "project_name": "Old", "project_color": "#000", "mapbox_key": "secret"
        }));

        let outcome = apply_settings(
            &store,
            &entity(json!({"id": 1, "project_name": "New", "project_color": "#000", "default_language": "en"})),
            &ignored(),
            false,
        )
        .await
        .unwrap();

        assert!(outcome.patched);
        assert_eq!(outcome.status(), ChangeStatus::Modified);
        assert_eq!(store.log(), vec!["settings:patch"]);
        let settings = store.settings();
        assert_eq!(settings["project_name"], json!("New"));
        assert_eq!(settings["default_language"], json!("en"));
        assert_eq!(settings["mapbox_key"], json!("secret"));
    }

    #[tokio::test]
    async fn test_equal_settings_are_not_patched() {
        let store = MemoryStore::new().with_settings(json!({"id": 1, "project_name": "Same"}));

        let outcome = apply_settings(
            &store,
            &entity(json!({"id": 1, "project_name": "Same", "user_created": "x"})),
            &ignored(),
            false,
        )
        .await
        .unwrap();

        assert!(!outcome.patched);
        assert_eq!(outcome.status(), ChangeStatus::Unchanged);
        assert_eq!(store.mutations(), 0);
        assert_eq!(outcome.summary().counts.unchanged, 1);
    }

    #[tokio::test]
    async fn test_dry_run_reports_without_patching() {
        let store = MemoryStore::new().with_settings(json!({"project_name": "Old"}));

        let outcome = apply_settings(
            &store,
            &entity(json!({"project_name": "New"})),
            &ignored(),
            true,
        )
        .await
        .unwrap();

        assert!(!outcome.patched);
        assert_eq!(outcome.status(), ChangeStatus::Modified);
        assert_eq!(outcome.summary().counts.updated, 1);
        assert_eq!(store.mutations(), 0);
    }
}
