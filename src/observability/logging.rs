//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber
//! - Derive the filter from `RUST_LOG` or the configured level
//!
//! # Design Decisions
//! - `RUST_LOG` wins over the config file when set
//! - `debug = true` raises this crate to debug without touching dependencies

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::ObservabilityConfig;

/// Build the filter directive used when `RUST_LOG` is unset.
pub fn default_directive(config: &ObservabilityConfig) -> String {
    let crate_level = if config.debug { "debug" } else { config.log_level.as_str() };
    format!("{},teeproxy={},tower_http={}", config.log_level, crate_level, crate_level)
}

/// Install the global subscriber. Safe to call once per process.
pub fn init_logging(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(config)));

    if let Err(e) = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
    {
        eprintln!("Failed to install tracing subscriber: {}", e);
    }
}
