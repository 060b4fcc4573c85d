//! Subcommand implementations and exit code mapping

use crate::cli::Commands;
use crate::pipeline::Pipeline;
use alert_relay_api::{
    bind, create_router, serve as serve_http, shutdown_signal, AppState, ConfigError, ServiceConfig,
    ServiceError,
};
use alert_relay_core::bootstrap::{BootstrapError, EventSubBootstrapper, TopicOutcome};
use std::time::Duration;
use tracing::{info, warn};

#[cfg(test)]
#[path = "commands_tests.rs"]
mod tests;

/// Failures specific to a subcommand
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("{failed} of {total} subscriptions failed")]
    SubscriptionsFailed { failed: usize, total: usize },
}

pub async fn run(command: Commands, config: ServiceConfig) -> anyhow::Result<()> {
    match command {
        Commands::Serve => serve(config).await?,
        Commands::Subscribe => subscribe(&config).await?,
        Commands::CheckConfig { show } => check_config(&config, show)?,
    }
    Ok(())
}

/// Run the relay until SIGINT/SIGTERM, then drain the sinks.
pub async fn serve(config: ServiceConfig) -> Result<(), ServiceError> {
    config.validate()?;

    let listener = bind(&config.server).await?;
    let pipeline = Pipeline::start(&config)?;
    info!(sinks = ?pipeline.sink_names(), "Pipeline started");

    let state = AppState::for_eventsub(config.clone(), pipeline.queue())?;
    let served = serve_http(listener, create_router(state), shutdown_signal()).await;

    let report = pipeline
        .shutdown(Duration::from_secs(config.server.shutdown_timeout_seconds))
        .await;
    if !report.abandoned.is_empty() {
        warn!(abandoned = ?report.abandoned, "Some sinks stopped with events still queued");
    }

    served
}

/// Register every default topic and report each outcome.
pub async fn subscribe(config: &ServiceConfig) -> anyhow::Result<()> {
    let bootstrapper = EventSubBootstrapper::new(config.bootstrap_config())?;
    let outcomes = bootstrapper.subscribe_all().await?;

    for line in outcome_lines(&outcomes) {
        println!("{}", line);
    }

    let failed = outcomes.iter().filter(|o| o.result.is_err()).count();
    if failed > 0 {
        return Err(CommandError::SubscriptionsFailed {
            failed,
            total: outcomes.len(),
        }
        .into());
    }
    Ok(())
}

pub fn outcome_lines(outcomes: &[TopicOutcome]) -> Vec<String> {
    outcomes
        .iter()
        .map(|outcome| match &outcome.result {
            Ok(created) => format!("ok     {} ({}, {})", outcome.topic, created.id, created.status),
            Err(e) => format!("failed {}: {}", outcome.topic, e),
        })
        .collect()
}

/// Validate configuration and optionally print it with secrets redacted.
pub fn check_config(config: &ServiceConfig, show: bool) -> Result<(), ConfigError> {
    config.validate()?;
    if show {
        println!("{:#?}", config);
    }
    println!("Configuration OK");
    Ok(())
}

/// Process exit code for a failed command.
pub fn exit_code(error: &anyhow::Error) -> i32 {
    if let Some(service) = error.downcast_ref::<ServiceError>() {
        return match service {
            ServiceError::BindFailed { .. } => 1,
            ServiceError::ServerFailed { .. } => 2,
            ServiceError::Configuration(_) => 3,
        };
    }
    if error.downcast_ref::<ConfigError>().is_some() {
        return 3;
    }
    if error.downcast_ref::<BootstrapError>().is_some()
        || error.downcast_ref::<CommandError>().is_some()
    {
        return 4;
    }
    5
}
