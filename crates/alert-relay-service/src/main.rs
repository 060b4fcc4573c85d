//! # Alert Relay Service
//!
//! Binary entry point for the alert relay.
//!
//! This executable:
//! - Loads layered configuration (system file, local file, `--config`, environment)
//! - Initializes structured logging
//! - Runs the selected subcommand (`serve` by default)
//!
//! Exit codes: 1 bind failure, 2 server failure, 3 configuration error,
//! 4 subscription bootstrap failure, 5 anything else.

mod cli;
mod commands;
mod logging;
mod pipeline;

use alert_relay_api::ServiceConfig;
use clap::Parser;
use cli::Cli;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Logging needs the config's level, so a load failure is reported after
    // a default subscriber is installed.
    let loaded = ServiceConfig::load(cli.config.as_deref());
    let logging = loaded
        .as_ref()
        .map(|config| config.logging.clone())
        .unwrap_or_default();
    logging::init_tracing(&logging, cli.json_logs);

    let config = match loaded {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Failed to load configuration");
            std::process::exit(3);
        }
    };

    let command = cli.command();
    info!(command = ?command, "Starting alert relay");

    if let Err(e) = commands::run(command, config).await {
        error!("Command failed: {:#}", e);
        std::process::exit(commands::exit_code(&e));
    }
}
