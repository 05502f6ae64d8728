//! PresenceKit: multi-device presence tracking
//!
//! Command-line entry point: loads configuration, sets up logging, and
//! dispatches to a subcommand.

use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt};

use presencekit_core::config::AppConfig;
use presencekit_core::config::logging::LoggingConfig;

mod binding;
mod commands;

use commands::Cli;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let env = cli
        .env
        .clone()
        .or_else(|| std::env::var("PRESENCEKIT_ENV").ok());

    let config = match AppConfig::load(&cli.config, env.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    init_logging(&config.logging);
    tracing::debug!(path = %cli.config, env = ?env, "Configuration loaded");

    if let Err(e) = cli.execute(config).await {
        tracing::error!("Command failed: {}", e);
        std::process::exit(1);
    }
}

/// Initialize tracing/logging
fn init_logging(config: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    match config.format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .init();
        }
        _ => {
            fmt()
                .pretty()
                .with_env_filter(filter)
                .with_target(true)
                .init();
        }
    }
}
