//! Tracing subscriber setup

use alert_relay_api::config::LoggingConfig;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const CRATES: [&str; 4] = [
    "alert_relay_service",
    "alert_relay_api",
    "alert_relay_core",
    "tower_http",
];

/// Filter used when `RUST_LOG` is unset.
pub fn default_directives(level: &str) -> String {
    CRATES
        .iter()
        .map(|target| format!("{}={}", target, level))
        .collect::<Vec<_>>()
        .join(",")
}

/// Install the global subscriber. `RUST_LOG` takes precedence over `config.level`.
pub fn init_tracing(config: &LoggingConfig, force_json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(&config.level)));
    let registry = tracing_subscriber::registry().with(filter);

    if config.json_format || force_json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}
