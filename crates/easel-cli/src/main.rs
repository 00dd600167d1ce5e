mod error;
mod execute;
mod keepalive;
mod logging;
mod session;
mod socket;
mod supervisor;
#[cfg(test)]
mod testing;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use easel_contracts::config::DEFAULT_CONFIG_PATH;
use easel_contracts::{load_config, ModelCatalog};
use easel_engine::HttpBackend;
use tracing::info;

use crate::logging::LogFormat;
use crate::session::Session;
use crate::supervisor::Supervisor;

#[derive(Debug, Parser)]
#[command(
    name = "easel-worker",
    version,
    about = "Image-generation worker for the easel orchestration server"
)]
struct Cli {
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
    #[arg(long, default_value = "info")]
    log_level: String,
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
    /// Validate the config, print the model advertisement, and exit.
    #[arg(long)]
    check: bool,
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("easel-worker error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    logging::init(&cli.log_level, cli.log_format)?;

    let config = load_config(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    let catalog = ModelCatalog::new(config.models.clone());

    if cli.check {
        println!("{}", serde_json::to_string_pretty(&catalog.advertisement())?);
        return Ok(0);
    }

    let backend = HttpBackend::new(&config.api, catalog.clone()).context("building backend client")?;
    info!(
        server = %config.server.url(),
        api = %config.api.base_url(),
        models = catalog.len(),
        "starting worker"
    );

    let supervisor = Supervisor::new(config.server.retry_delay());
    let mut session = Session::new(config.server, catalog, Arc::new(backend));
    supervisor.run_forever(&mut session)
}
