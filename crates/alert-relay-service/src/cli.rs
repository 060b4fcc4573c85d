//! Command-line interface

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[cfg(test)]
#[path = "cli_tests.rs"]
mod tests;

/// Alert Relay - stream alerts fanned out to chat and automation
#[derive(Debug, Parser)]
#[command(name = "alert-relay")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Relays EventSub alerts to chat and an automation host")]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "ALERT_RELAY_CONFIG_FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Force JSON log output
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Subcommand to execute (defaults to `serve`)
    #[command(subcommand)]
    pub command: Option<Commands>,
}

impl Cli {
    pub fn command(&self) -> Commands {
        self.command.clone().unwrap_or(Commands::Serve)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Commands {
    /// Run the callback server, sinks and chat responder
    Serve,

    /// Register the EventSub webhook subscriptions
    Subscribe,

    /// Load and validate configuration, then exit
    CheckConfig {
        /// Print the resolved configuration (secrets redacted)
        #[arg(short, long)]
        show: bool,
    },
}
