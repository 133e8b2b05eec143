//! `wipe`: remove every managed table, flow, dashboard, webhook and role

use anyhow::{Context, Result, bail};
use clap::Args;

use super::sinks;
use crate::cli::session;
use crate::config::Config;
use crate::snapshot::UnpackedSchema;
use crate::sync::logic::report_builder::{ConsoleSink, EntityTypeSummary, ReportSink, SyncReport, banner};
use crate::sync::types::EntityKind;
use crate::sync::{
    ApplyExecutor, Confirm, DesiredType, FixedAnswer, PromptConfirm, SchemaOptions, SchemaStore,
    apply_types, sync_schema,
};

/// Asked in turn; any "no" stops the wipe
pub const QUESTIONS: [&str; 3] = [
    "Are you sure you want to delete all of the flows, operations, webhooks, and roles?",
    "Really? you really sure?",
    "I mean your funeral... last chance!",
];

#[derive(Args, Debug, Clone)]
pub struct WipeArgs {
    /// Answer yes to every question
    #[arg(short, long)]
    pub yes: bool,
}

/// Whether every question was answered yes
pub fn confirmed(confirm: &dyn Confirm) -> Result<bool> {
    for question in QUESTIONS {
        if !confirm.confirm(question)? {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Kinds in deletion order: dependents before what they reference
pub fn wipe_order() -> Vec<DesiredType> {
    EntityKind::APPLY_ORDER
        .into_iter()
        .rev()
        .map(DesiredType::empty)
        .collect()
}

pub async fn run(args: WipeArgs, config: &Config) -> Result<()> {
    let confirm: Box<dyn Confirm> = if args.yes {
        Box::new(FixedAnswer(true))
    } else {
        Box::new(PromptConfirm)
    };
    if !confirmed(confirm.as_ref())? {
        log::info!("Phew. Nothing was deleted.");
        return Ok(());
    }

    let client = session::connect(config).await?;
    let mut report = SyncReport::new("wipe", client.url());
    let mut console = ConsoleSink::new(false);
    let mut failed = 0;

    log::info!("{}", banner("Schema"));
    let current = client
        .snapshot()
        .await
        .context("Failed to read the current schema")?;
    let empty = UnpackedSchema::unpack(&current).empty_like().pack();
    let options = SchemaOptions {
        confirm_destructive: false,
        ..config.schema_options()
    };
    let summary = match sync_schema(&client, &empty, &options, &FixedAnswer(true), false).await {
        Ok(outcome) => outcome.summary(),
        Err(e) => EntityTypeSummary::failed("schema", "Schema", &e),
    };
    if !summary.is_success() {
        failed += 1;
    }
    sinks(&mut console, &mut report).record(&summary);

    log::info!("{}", banner("Entities"));
    let executor = ApplyExecutor::new(&client, config.apply_options().allow_delete(true));
    failed += apply_types(&executor, &wipe_order(), &mut sinks(&mut console, &mut report)).await;

    if failed > 0 {
        bail!("{} part(s) could not be wiped: {}", failed, report.failed_types().join(", "));
    }
    Ok(())
}
