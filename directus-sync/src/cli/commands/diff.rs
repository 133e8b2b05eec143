//! `diff`: report what `apply` would change

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Args;

use super::{is_selected, selected_groups};
use crate::cli::session;
use crate::config::Config;
use crate::snapshot::LocalSnapshot;
use crate::sync::logic::report_builder::{ConsoleSink, EntityTypeSummary, ReportSink, banner};
use crate::sync::types::SyncGroup;
use crate::sync::{
    ApplyExecutor, ApplyOptions, DesiredType, EntityStore, FixedAnswer, SchemaOptions, SchemaStore,
    SettingsStore, apply_settings, plan_types, sync_schema,
};

#[derive(Args, Debug, Clone)]
pub struct DiffArgs {
    /// Snapshot directory (default: the configured export dir)
    #[arg(long)]
    pub src_dir: Option<PathBuf>,

    /// Only diff these groups
    #[arg(long, value_enum, value_delimiter = ',')]
    pub only: Vec<SyncGroup>,

    /// Diff the schema even across Directus versions
    #[arg(long)]
    pub force: bool,
}

pub async fn run(args: DiffArgs, config: &Config) -> Result<()> {
    let src_dir = args.src_dir.clone().unwrap_or_else(|| config.export_dir.clone());
    let groups = selected_groups(&args.only);

    let snapshot = LocalSnapshot::load(&src_dir, &groups)
        .with_context(|| format!("Failed to load snapshot from {}", src_dir.display()))?;
    if snapshot.schema.is_none() && is_selected(&groups, SyncGroup::Schema) {
        log::info!("No schema in {}, skipping schema", src_dir.display());
    }

    let client = session::connect(config).await?;
    let mut console = ConsoleSink::new(true);
    let mut schema_options = config.schema_options();
    schema_options.force |= args.force;

    let failed = diff_snapshot(
        &client,
        snapshot,
        config.apply_options(),
        &schema_options,
        &mut console,
    )
    .await;

    if failed > 0 {
        bail!("{} part(s) could not be diffed", failed);
    }
    Ok(())
}

/// Dry-run every part of the snapshot, returning how many parts failed
pub async fn diff_snapshot<S>(
    store: &S,
    snapshot: LocalSnapshot,
    options: ApplyOptions,
    schema_options: &SchemaOptions,
    sink: &mut dyn ReportSink,
) -> usize
where
    S: EntityStore + SchemaStore + SettingsStore + ?Sized,
{
    let mut failed = 0;

    if let Some(settings) = &snapshot.settings {
        log::info!("{}", banner("Settings"));
        let summary = match apply_settings(store, settings, &options.ignored_fields, true).await {
            Ok(outcome) => outcome.summary(),
            Err(e) => EntityTypeSummary::errored("settings", "Settings", format!("{:#}", e)),
        };
        if !summary.is_success() {
            failed += 1;
        }
        sink.record(&summary);
    }

    if let Some(schema) = &snapshot.schema {
        log::info!("{}", banner("Schema"));
        match sync_schema(store, schema, schema_options, &FixedAnswer(false), true).await {
            Ok(outcome) => {
                if outcome.report.is_empty() {
                    log::info!("Schema is in sync.");
                } else {
                    log::info!("{}", outcome.report);
                }
                for name in &outcome.dropped {
                    log::info!("    (not deleting unmanaged table {})", name);
                }
            }
            Err(e) => {
                failed += 1;
                sink.record(&EntityTypeSummary::failed("schema", "Schema", &e));
            }
        }
    }

    if !snapshot.entities.is_empty() {
        log::info!("{}", banner("Entities"));
        let desired: Vec<DesiredType> = snapshot
            .entities
            .into_iter()
            .map(|(kind, entities)| DesiredType::new(kind, entities))
            .collect();
        let executor = ApplyExecutor::new(store, options);
        failed += plan_types(&executor, &desired, sink).await;
    }

    failed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::memory::MemoryStore;
    use crate::sync::types::{EntityKind, collect_by_id};
    use serde_json::json;

    fn flows(items: Vec<serde_json::Value>) -> LocalSnapshot {
        let entities = items.into_iter().filter_map(|v| v.as_object().cloned());
        let (flows, _) = collect_by_id(entities, "id");
        LocalSnapshot {
            entities: vec![(EntityKind::Flows, flows)],
            ..LocalSnapshot::default()
        }
    }

    #[tokio::test]
    async fn test_failed_fetch_is_counted() {
        let store = MemoryStore::new().fail_fetch("/flows");
        let mut console = ConsoleSink::new(false);

        let failed = diff_snapshot(
            &store,
            flows(vec![json!({"id": "f1"})]),
            ApplyOptions::default(),
            &SchemaOptions::default(),
            &mut console,
        )
        .await;

        assert_eq!(failed, 1);
    }

    #[tokio::test]
    async fn test_diff_changes_nothing() {
        let store = MemoryStore::new().with_entities("/flows", vec![json!({"id": "old"})]);
        let mut console = ConsoleSink::new(false);

        let failed = diff_snapshot(
            &store,
            flows(vec![json!({"id": "f1"})]),
            ApplyOptions::default(),
            &SchemaOptions::default(),
            &mut console,
        )
        .await;

        assert_eq!(failed, 0);
        assert!(store.log().is_empty());
        assert!(store.entities("/flows").contains_key("old"));
    }
}
