//! AyuSync - Curation command line
//!
//! Runs one lifecycle, release or lookup operation against the configured
//! PostgreSQL database and prints the result as JSON on stdout.

mod cli;
mod commands;

use std::process::ExitCode;

use anyhow::Context;
use ayusync_curation::{logging, metrics, state::AppState, Config};
use clap::Parser;

use crate::cli::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    // Load configuration first to get logging settings
    let config = Config::load().context("Failed to load configuration")?;

    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {e}"))?;

    let _logging_guard =
        logging::init_logging(&config.logging).context("Failed to initialize logging")?;

    tracing::debug!(
        version = env!("CARGO_PKG_VERSION"),
        command = ?cli.command,
        "Starting AyuSync"
    );

    let input = commands::load_input(&cli.command)?;

    let state = AppState::new(config)
        .await
        .context("Failed to initialize application state")?;

    let exit = match commands::run(&state, &cli.command, input).await {
        Ok(value) => {
            println!("{}", serde_json::to_string_pretty(&value)?);
            ExitCode::SUCCESS
        }
        Err(e) => {
            println!("{}", serde_json::to_string_pretty(&e.outcome())?);
            ExitCode::FAILURE
        }
    };

    if cli.print_metrics {
        eprintln!("{}", metrics::render()?);
    }

    Ok(exit)
}
