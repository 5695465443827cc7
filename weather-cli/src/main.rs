//! Binary crate for the `weather` command-line tool.
//!
//! This crate focuses on:
//! - Parsing CLI arguments
//! - Serving the HTTP API and running the daily scrape
//! - Interactive configuration
//! - Human-friendly output formatting

use clap::Parser;
use tracing_subscriber::EnvFilter;
use weather_core::Config;

mod cli;
mod server;

/// `RUST_LOG` wins over the configured level.
fn init_logging(default_level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cmd = cli::Cli::parse();

    // `configure` must work even when the current file does not validate.
    let config = match cmd.command {
        cli::Command::Configure => Config::default(),
        _ => Config::load()?,
    };
    init_logging(&config.logging.level);

    cmd.run(config).await
}
