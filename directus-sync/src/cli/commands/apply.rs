//! `apply`: push a snapshot directory to the instance

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Args;

use super::{is_selected, selected_groups, sinks};
use crate::cli::session;
use crate::config::Config;
use crate::snapshot::LocalSnapshot;
use crate::sync::logic::report_builder::{
    ConsoleSink, EntityTypeSummary, ReportSink, SyncReport, banner,
};
use crate::sync::types::SyncGroup;
use crate::sync::{
    ApplyExecutor, Confirm, DesiredType, FixedAnswer, PromptConfirm, apply_settings, apply_types,
    sync_schema,
};

#[derive(Args, Debug, Clone)]
pub struct ApplyArgs {
    /// Snapshot directory (default: the configured export dir)
    #[arg(long)]
    pub src_dir: Option<PathBuf>,

    /// Only apply these groups
    #[arg(long, value_enum, value_delimiter = ',')]
    pub only: Vec<SyncGroup>,

    /// Diff the schema even across Directus versions
    #[arg(long)]
    pub force: bool,

    /// Do not ask before destructive schema changes
    #[arg(short, long)]
    pub yes: bool,

    /// Never delete remote entities missing from the snapshot
    #[arg(long)]
    pub no_delete: bool,

    /// Write a JSON report to this path
    #[arg(long)]
    pub report: Option<PathBuf>,
}

pub async fn run(args: ApplyArgs, config: &Config, verbose: bool) -> Result<()> {
    let src_dir = args.src_dir.clone().unwrap_or_else(|| config.export_dir.clone());
    let groups = selected_groups(&args.only);

    // Everything is read from disk before the first request
    let snapshot = LocalSnapshot::load(&src_dir, &groups)
        .with_context(|| format!("Failed to load snapshot from {}", src_dir.display()))?;
    log::info!("Applying {} to {}", src_dir.display(), config.url);

    let client = session::connect(config).await?;
    let mut report = SyncReport::new("apply", client.url());
    let mut console = ConsoleSink::new(verbose);

    let confirm: Box<dyn Confirm> = if args.yes {
        Box::new(FixedAnswer(true))
    } else {
        Box::new(PromptConfirm)
    };

    let mut options = config.apply_options();
    if args.no_delete {
        options = options.allow_delete(false);
    }
    let mut schema_options = config.schema_options();
    schema_options.force |= args.force;

    let mut failed = 0;

    if let Some(settings) = &snapshot.settings {
        log::info!("{}", banner("Settings"));
        let summary = match apply_settings(&client, settings, &options.ignored_fields, false).await {
            Ok(outcome) => outcome.summary(),
            Err(e) => EntityTypeSummary::errored("settings", "Settings", format!("{:#}", e)),
        };
        if !summary.is_success() {
            failed += 1;
        }
        sinks(&mut console, &mut report).record(&summary);
    } else if is_selected(&groups, SyncGroup::Settings) {
        log::info!("No settings file in {}, skipping settings", src_dir.display());
    }

    if let Some(schema) = &snapshot.schema {
        log::info!("{}", banner("Schema"));
        let summary =
            match sync_schema(&client, schema, &schema_options, confirm.as_ref(), false).await {
                Ok(outcome) => {
                    if !outcome.report.is_empty() {
                        log::info!("{}", outcome.report);
                    }
                    report.schema = Some(outcome.report.clone());
                    report.dropped_schema_deletions = outcome.dropped.clone();
                    outcome.summary()
                }
                Err(e) => EntityTypeSummary::failed("schema", "Schema", &e),
            };
        if !summary.is_success() {
            failed += 1;
        }
        sinks(&mut console, &mut report).record(&summary);
    }

    if !snapshot.entities.is_empty() {
        log::info!("{}", banner("Entities"));
        let desired: Vec<DesiredType> = snapshot
            .entities
            .into_iter()
            .map(|(kind, entities)| DesiredType::new(kind, entities))
            .collect();
        let executor = ApplyExecutor::new(&client, options);
        let mut sink = sinks(&mut console, &mut report);
        failed += apply_types(&executor, &desired, &mut sink).await;
    }

    report.finish();
    if let Some(path) = &args.report {
        report.write_json(path)?;
    }

    if failed > 0 {
        bail!(
            "{} part(s) failed to apply: {}",
            failed,
            report.failed_types().join(", ")
        );
    }
    log::info!("Done.");
    Ok(())
}
