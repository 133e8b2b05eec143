//! `data`: export collection items to `data/<collection>.<ext>`

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use serde_json::Value;

use crate::cli::session;
use crate::config::Config;
use crate::snapshot::{DATA_DIR, DataFormat, write_data};
use crate::sync::logic::schema_diff::is_system_collection;
use crate::sync::types::Entity;

#[derive(Args, Debug, Clone)]
pub struct DataArgs {
    /// Collections to export (default: every user collection)
    pub collections: Vec<String>,

    /// Output directory (default: the configured export dir)
    #[arg(long)]
    pub out_dir: Option<PathBuf>,

    #[arg(long, value_enum, default_value = "json")]
    pub format: DataFormat,
}

/// Collections with Directus metadata that are not system collections
pub fn user_collections(collections: &[Entity]) -> Vec<String> {
    collections
        .iter()
        .filter(|c| c.get("meta").is_some_and(|meta| !meta.is_null()))
        .filter_map(|c| c.get("collection").and_then(Value::as_str))
        .filter(|name| !is_system_collection(name))
        .map(str::to_string)
        .collect()
}

/// Remove bookkeeping fields from exported items
pub fn drop_fields(items: Vec<Entity>, fields: &[String]) -> Vec<Value> {
    items
        .into_iter()
        .map(|mut item| {
            for field in fields {
                item.remove(field);
            }
            Value::Object(item)
        })
        .collect()
}

pub async fn run(args: DataArgs, config: &Config) -> Result<()> {
    let out_dir = args
        .out_dir
        .clone()
        .unwrap_or_else(|| config.export_dir.clone())
        .join(DATA_DIR);
    let client = session::connect(config).await?;

    let collections = if args.collections.is_empty() {
        user_collections(&client.collections().await?)
    } else {
        args.collections.clone()
    };

    for collection in &collections {
        if let Some(count) = client.count(collection).await? {
            log::info!("{}: {} items", collection, count);
        }
        let items = client
            .items(collection)
            .await
            .with_context(|| format!("Failed to read items of {}", collection))?;
        let rows = drop_fields(items, &config.data.drop_fields);

        let path = out_dir.join(format!("{}.{}", collection, args.format.extension()));
        log::info!("Writing {} items to {}", rows.len(), path.display());
        write_data(&Value::Array(rows), &path)?;
    }

    Ok(())
}
