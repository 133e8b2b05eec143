//! `export`: write the instance configuration to a snapshot directory

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::Args;
use serde_json::Value;

use super::{is_selected, selected_groups, selected_kinds, sinks};
use crate::api::DirectusClient;
use crate::cli::session;
use crate::config::Config;
use crate::snapshot::{
    ExportCounts, SCHEMA_DIR, UnpackedSchema, export_dir, export_named, export_one,
};
use crate::sync::{EntityStore, SchemaStore, SettingsStore};
use crate::sync::logic::report_builder::{
    ConsoleSink, EntityTypeSummary, ReportSink, StatusCounts, SyncReport, banner,
};
use crate::sync::types::{ChangeStatus, EntityKind, SyncGroup};

/// Directory and file name keys of exported extensions
const EXTENSIONS_DIR: &str = "extensions";
const EXTENSION_KEYS: &[&str] = &["schema.name", "schema.type"];

#[derive(Args, Debug, Clone)]
pub struct ExportArgs {
    /// Output directory (default: the configured export dir)
    #[arg(long)]
    pub out_dir: Option<PathBuf>,

    /// Only export these groups
    #[arg(long, value_enum, value_delimiter = ',')]
    pub only: Vec<SyncGroup>,

    /// Write a JSON report to this path
    #[arg(long)]
    pub report: Option<PathBuf>,
}

pub async fn run(args: ExportArgs, config: &Config) -> Result<()> {
    let out_dir = args.out_dir.clone().unwrap_or_else(|| config.export_dir.clone());
    let groups = selected_groups(&args.only);

    let client = session::connect(config).await?;
    log::info!("Exporting {} to {}", client.url(), out_dir.display());

    let mut report = SyncReport::new("export", client.url());
    let mut console = ConsoleSink::new(false);
    let mut failed = 0;

    let mut record = |summary: EntityTypeSummary| {
        if !summary.is_success() {
            failed += 1;
        }
        sinks(&mut console, &mut report).record(&summary);
    };

    if is_selected(&groups, SyncGroup::Settings) {
        record(export_settings(&client, &out_dir).await);
    }

    if is_selected(&groups, SyncGroup::Schema) {
        log::info!("{}", banner("Schema"));
        record(export_schema(&client, &out_dir).await);
    }

    log::info!("{}", banner("Entities"));
    for kind in selected_kinds(&groups) {
        record(export_kind(&client, kind, &out_dir).await);
    }

    if groups.is_empty() {
        record(export_extensions(&client, &out_dir).await);
    }

    report.finish();
    if let Some(path) = &args.report {
        report.write_json(path)?;
    }
    if failed > 0 {
        bail!("{} part(s) failed to export: {}", failed, report.failed_types().join(", "));
    }
    Ok(())
}

fn single(name: &str, label: &str, status: ChangeStatus) -> EntityTypeSummary {
    let mut counts = StatusCounts::default();
    match status {
        ChangeStatus::New => counts.new = 1,
        ChangeStatus::Modified => counts.updated = 1,
        _ => counts.unchanged = 1,
    }
    EntityTypeSummary::new(name, label, counts)
}

async fn export_settings(client: &DirectusClient, out_dir: &Path) -> EntityTypeSummary {
    let result = async {
        let settings = client.fetch_settings().await?;
        let status = export_one(&Value::Object(settings), out_dir, "settings")?;
        anyhow::Ok(status)
    }
    .await;

    match result {
        Ok(status) => single("settings", "Settings", status),
        Err(e) => EntityTypeSummary::errored("settings", "Settings", format!("{:#}", e)),
    }
}

async fn export_schema(client: &DirectusClient, out_dir: &Path) -> EntityTypeSummary {
    let result = async {
        let snapshot = client.snapshot().await?;
        let unpacked = UnpackedSchema::unpack(&snapshot);
        let counts = export_named(&unpacked.to_files(), &out_dir.join(SCHEMA_DIR))
            .context("Failed to write schema files")?;
        anyhow::Ok(counts)
    }
    .await;

    to_summary("schema", "Schema", result)
}

async fn export_kind(client: &DirectusClient, kind: EntityKind, out_dir: &Path) -> EntityTypeSummary {
    let result = async {
        let spec = kind.spec();
        let entities: Vec<_> = client
            .fetch(&spec)
            .await?
            .into_iter()
            .filter(|entity| kind.should_export(entity))
            .collect();
        let counts = export_dir(&entities, &out_dir.join(kind.name()), kind.description_keys())
            .with_context(|| format!("Failed to write {}", kind.name()))?;
        anyhow::Ok(counts)
    }
    .await;

    to_summary(kind.name(), kind.label(), result)
}

async fn export_extensions(client: &DirectusClient, out_dir: &Path) -> EntityTypeSummary {
    let result = async {
        let extensions = client.extensions().await?;
        let counts = export_dir(&extensions, &out_dir.join(EXTENSIONS_DIR), EXTENSION_KEYS)?;
        anyhow::Ok(counts)
    }
    .await;

    to_summary(EXTENSIONS_DIR, "Extensions", result)
}

fn to_summary(name: &str, label: &str, result: Result<ExportCounts>) -> EntityTypeSummary {
    match result {
        Ok(counts) => counts.summary(name, label),
        Err(e) => {
            log::error!("{}: {:#}", name, e);
            EntityTypeSummary::errored(name, label, format!("{:#}", e))
        }
    }
}
