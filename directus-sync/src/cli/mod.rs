//! Command line interface
//!
//! Global flags override the config file and environment; every subcommand
//! lives in `commands/`.

pub mod commands;
pub mod session;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::config::Config;
use commands::{ApplyArgs, DataArgs, DiffArgs, ExportArgs, SeedArgs, WipeArgs};

#[derive(Parser, Debug)]
#[command(name = "directus-sync", version, about)]
pub struct Cli {
    /// Config file (default: ~/.config/directus-sync/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Directus URL (env: DIRECTUS_URL)
    #[arg(long, global = true)]
    pub url: Option<String>,

    /// Login email (env: DIRECTUS_EMAIL)
    #[arg(long, global = true)]
    pub email: Option<String>,

    /// Login password (env: DIRECTUS_PASSWORD); prompted when missing
    #[arg(long, global = true)]
    pub password: Option<String>,

    /// Static access token (env: DIRECTUS_TOKEN)
    #[arg(long, global = true)]
    pub token: Option<String>,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// More logging (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Apply a snapshot directory to the instance
    Apply(ApplyArgs),
    /// Show what apply would change, without changing anything
    Diff(DiffArgs),
    /// Export the instance configuration to a snapshot directory
    Export(ExportArgs),
    /// Delete all schema, flows, dashboards, webhooks and roles
    Wipe(WipeArgs),
    /// Export collection items
    Data(DataArgs),
    /// Import collection items in dependency order
    Seed(SeedArgs),
}

impl Cli {
    /// Config file, then environment, then flags
    pub fn resolve_config(&self) -> Result<Config> {
        let mut config = Config::load(self.config.as_deref()).context("Failed to load config")?;
        config.apply_process_env();

        if let Some(url) = &self.url {
            config.url = url.clone();
        }
        if let Some(email) = &self.email {
            config.email = Some(email.clone());
        }
        if let Some(password) = &self.password {
            config.password = Some(password.clone());
        }
        if let Some(token) = &self.token {
            config.token = Some(token.clone());
        }
        Ok(config)
    }
}

pub async fn run(cli: Cli) -> Result<()> {
    let config = cli.resolve_config()?;
    let verbose = cli.verbose > 0;

    match cli.command {
        Commands::Apply(args) => commands::apply::run(args, &config, verbose).await,
        Commands::Diff(args) => commands::diff::run(args, &config).await,
        Commands::Export(args) => commands::export::run(args, &config).await,
        Commands::Wipe(args) => commands::wipe::run(args, &config).await,
        Commands::Data(args) => commands::data::run(args, &config).await,
        Commands::Seed(args) => commands::seed::run(args, &config).await,
    }
}
