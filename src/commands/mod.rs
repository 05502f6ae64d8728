//! CLI command definitions and dispatch.

pub mod config;
pub mod simulate;

use clap::{Parser, Subcommand};

use presencekit_core::config::AppConfig;
use presencekit_core::error::AppError;

/// PresenceKit: multi-device presence tracking
#[derive(Debug, Parser)]
#[command(name = "presencekit", version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (extension optional)
    #[arg(short, long, default_value = "config/default")]
    pub config: String,

    /// Environment overlay loaded from `config/{env}` (falls back to PRESENCEKIT_ENV)
    #[arg(short, long)]
    pub env: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run several simulated devices for one identity on an in-memory backend
    Simulate(simulate::SimulateArgs),
    /// Configuration inspection
    Config(config::ConfigArgs),
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(&self, config: AppConfig) -> Result<(), AppError> {
        match &self.command {
            Commands::Simulate(args) => simulate::execute(args, config).await,
            Commands::Config(args) => config::execute(args, &config),
        }
    }
}
