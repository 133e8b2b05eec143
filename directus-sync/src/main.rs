use clap::Parser;
use log::LevelFilter;

use directus_sync::cli::{self, Cli};

fn init_logging(verbose: u8) {
    let default_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level));
    builder.format_timestamp(None).format_target(false);

    match verbose {
        0 => {}
        1 => {
            builder.filter_module("directus_sync", LevelFilter::Debug);
        }
        _ => {
            builder.filter_level(LevelFilter::Trace);
        }
    }
    builder.init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_logging(cli.verbose);
    if cli.no_color {
        colored::control::set_override(false);
    }

    if let Err(e) = cli::run(cli).await {
        log::error!("{:#}", e);
        std::process::exit(1);
    }
}
