//! `seed`: import `data/*` files, referenced rows first

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::Args;
use serde_json::Value;

use crate::api::items_route;
use crate::cli::session;
use crate::config::Config;
use crate::snapshot::{DATA_DIR, list_files, load_dir};
use crate::sync::EntityStore;
use crate::sync::logic::report_builder::{ConsoleSink, EntityTypeSummary, ReportSink, StatusCounts};
use crate::sync::logic::seed_graph::{CollectionTopology, SeedPlan, plan_seed};
use crate::sync::types::{Entity, EntitySpec};

#[derive(Args, Debug, Clone)]
pub struct SeedArgs {
    /// Snapshot directory holding `data/` (default: the configured export dir)
    #[arg(long)]
    pub src_dir: Option<PathBuf>,
}

/// Rows per collection, keyed by file stem
pub fn load_seed_data(dir: &Path) -> Result<BTreeMap<String, Vec<Entity>>> {
    let mut data = BTreeMap::new();

    for path in list_files(dir)? {
        let Some(collection) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        let mut rows = Vec::new();
        for value in load_dir(&path)? {
            match value {
                Value::Object(row) => rows.push(row),
                other => log::warn!("{}: skipping non-object row {}", path.display(), other),
            }
        }
        data.entry(collection.to_string())
            .or_insert_with(Vec::new)
            .extend(rows);
    }

    Ok(data)
}

/// What happened to the seeded rows
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeedCounts {
    pub created: usize,
    pub updated: usize,
    pub failed: Vec<String>,
}

/// Write rows in plan order; a row that cannot be created is updated instead
pub async fn seed_rows<S: EntityStore + ?Sized>(store: &S, plan: &SeedPlan) -> SeedCounts {
    let mut counts = SeedCounts::default();

    for (key, row) in plan.ordered() {
        let Some(row) = row else {
            continue;
        };
        let spec = EntitySpec::new(&key.collection, items_route(&key.collection));

        if let Err(e) = store.create(&spec, &key.key, row).await {
            log::debug!("{}: create failed ({:#}), updating", key, e);
            match store.update(&spec, &key.key, row, row).await {
                Ok(()) => counts.updated += 1,
                Err(e) => {
                    log::error!("{}: {:#}", key, e);
                    counts.failed.push(key.to_string());
                }
            }
        } else {
            counts.created += 1;
        }
    }

    counts
}

pub async fn run(args: SeedArgs, config: &Config) -> Result<()> {
    let src_dir = args.src_dir.clone().unwrap_or_else(|| config.export_dir.clone());
    let data_dir = src_dir.join(DATA_DIR);
    let data = load_seed_data(&data_dir)
        .with_context(|| format!("Failed to load data from {}", data_dir.display()))?;
    if data.is_empty() {
        log::info!("No data files in {}", data_dir.display());
        return Ok(());
    }

    let client = session::connect(config).await?;

    let mut topology = BTreeMap::new();
    for collection in data.keys() {
        let fields = client.fields(collection).await?;
        topology.insert(collection.clone(), CollectionTopology::from_fields(&fields));
    }

    let plan = plan_seed(&data, &topology).context("Failed to order rows")?;
    for collection in &plan.skipped_collections {
        log::warn!("{}: no primary key found, skipping", collection);
    }
    if plan.skipped_rows > 0 {
        log::warn!("Skipping {} row(s) without a primary key", plan.skipped_rows);
    }
    log::info!("Seeding {} rows in {} groups", plan.row_count(), plan.groups.len());

    let counts = seed_rows(&client, &plan).await;
    ConsoleSink::new(false).record(&EntityTypeSummary::new(
        "data",
        "Data",
        StatusCounts {
            new: counts.created,
            updated: counts.updated,
            ..StatusCounts::default()
        },
    ));

    if !counts.failed.is_empty() {
        bail!("{} row(s) failed: {}", counts.failed.len(), counts.failed.join(", "));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::write_data;
    use crate::sync::memory::MemoryStore;
    use serde_json::json;

    fn topology() -> BTreeMap<String, CollectionTopology> {
        BTreeMap::from([
            (
                "authors".to_string(),
                CollectionTopology::from_fields(&[json!({"field": "id", "schema": {"is_primary_key": true}})]),
            ),
            (
                "articles".to_string(),
                CollectionTopology::from_fields(&[
                    json!({"field": "id", "schema": {"is_primary_key": true}}),
                    json!({"field": "author", "schema": {"foreign_key_table": "authors", "foreign_key_column": "id"}}),
                ]),
            ),
        ])
    }

    #[test]
    fn test_load_seed_data_by_stem() {
        let dir = tempfile::tempdir().unwrap();
        write_data(&json!([{"id": 1}, {"id": 2}]), &dir.path().join("authors.json")).unwrap();
        write_data(&json!([{"id": "a", "author": "1"}]), &dir.path().join("articles.csv")).unwrap();

        let data = load_seed_data(dir.path()).unwrap();
        assert_eq!(data["authors"].len(), 2);
        assert_eq!(data["articles"][0]["author"], json!("1"));
    }

    #[tokio::test]
    async fn test_referenced_rows_are_created_first() {
        let data = BTreeMap::from([
            (
                "articles".to_string(),
                vec![json!({"id": "a1", "author": 1}).as_object().cloned().unwrap()],
            ),
            (
                "authors".to_string(),
                vec![json!({"id": 1, "name": "Ada"}).as_object().cloned().unwrap()],
            ),
        ]);
        let plan = plan_seed(&data, &topology()).unwrap();
        let store = MemoryStore::new();

        let counts = seed_rows(&store, &plan).await;

        assert_eq!(counts.created, 2);
        assert_eq!(
            store.log(),
            vec!["create:/items/authors:1", "create:/items/articles:a1"]
        );
    }

    #[tokio::test]
    async fn test_existing_rows_are_updated() {
        let data = BTreeMap::from([(
            "authors".to_string(),
            vec![json!({"id": 1, "name": "Ada"}).as_object().cloned().unwrap()],
        )]);
        let plan = plan_seed(&data, &topology()).unwrap();
        let store = MemoryStore::new().with_entities("/items/authors", vec![json!({"id": 1})]);

        let counts = seed_rows(&store, &plan).await;

        assert_eq!(counts.created, 0);
        assert_eq!(counts.updated, 1);
        assert_eq!(store.entities("/items/authors")["1"]["name"], json!("Ada"));
    }
}
