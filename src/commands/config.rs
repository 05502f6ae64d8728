//! Configuration inspection commands.

use clap::{Args, Subcommand};

use presencekit_core::config::AppConfig;
use presencekit_core::error::AppError;

/// Arguments for config commands
#[derive(Debug, Args)]
pub struct ConfigArgs {
    /// Config subcommand
    #[command(subcommand)]
    pub command: ConfigCommand,
}

/// Config subcommands
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the effective configuration as JSON
    Show,
    /// Validate the configuration and print a summary
    Validate,
}

/// Execute config commands
pub fn execute(args: &ConfigArgs, config: &AppConfig) -> Result<(), AppError> {
    match &args.command {
        ConfigCommand::Show => {
            println!("{}", serde_json::to_string_pretty(config)?);
        }
        ConfigCommand::Validate => {
            // Loading already validated it.
            let presence = &config.presence;
            let geo = &presence.geolocation;
            println!("Configuration is valid");
            println!("  Session TTL: {}", describe_ttl(presence.session_ttl_ms));
            println!("  Location refresh: every {}ms", presence.update_interval_ms);
            if geo.enabled {
                println!(
                    "  Geolocation: {} (consent {})",
                    geo.strategy,
                    if geo.require_consent { "required" } else { "not required" }
                );
            } else {
                println!("  Geolocation: disabled");
            }
            println!("  Guard throttle: {}ms", config.auth.validation_throttle_ms);
        }
    }

    Ok(())
}

fn describe_ttl(ttl_ms: u64) -> String {
    if ttl_ms == 0 {
        "disabled".to_string()
    } else {
        format!("{ttl_ms}ms")
    }
}
