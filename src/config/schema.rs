//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the tee proxy.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the tee proxy.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TeeConfig {
    /// Listener configuration (bind address, limits).
    pub listener: ListenerConfig,

    /// Production backend. Its responses are relayed to the client.
    pub primary: BackendConfig,

    /// Shadow backend. Its responses are discarded after session correlation.
    pub shadow: BackendConfig,

    /// Session affinity settings.
    pub session: SessionConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl Default for TeeConfig {
    fn default() -> Self {
        Self {
            listener: ListenerConfig::default(),
            primary: BackendConfig::primary(),
            shadow: BackendConfig::shadow(),
            session: SessionConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8888").
    pub bind_address: String,

    /// Maximum concurrent client connections (backpressure).
    pub max_connections: usize,

    /// Largest inbound body that will be duplicated.
    pub max_body_bytes: usize,

    /// Seconds open client connections get to finish after shutdown.
    pub drain_timeout_secs: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8888".to_string(),
            max_connections: 10_000,
            max_body_bytes: 16 * 1024 * 1024,
            drain_timeout_secs: 10,
        }
    }
}

/// A single upstream target.
///
/// A backend section in a config file must name both fields; omitting the
/// whole section selects the role's default.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackendConfig {
    /// Backend address as `host:port` (e.g., "localhost:8080").
    pub address: String,

    /// Connection establishment timeout in seconds.
    pub timeout_secs: u64,
}

impl BackendConfig {
    /// Default production target.
    pub fn primary() -> Self {
        Self {
            address: "localhost:8080".to_string(),
            timeout_secs: 3,
        }
    }

    /// Default shadow target.
    pub fn shadow() -> Self {
        Self {
            address: "localhost:8081".to_string(),
            timeout_secs: 1,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Session affinity configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Cookie that carries the session identifier on both backends.
    pub cookie_name: String,

    /// Lifetime of a primary -> shadow session mapping in seconds.
    pub ttl_secs: u64,

    /// Interval between expiry sweeps in seconds.
    pub sweep_interval_secs: u64,
}

impl SessionConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: "PHPSESSID".to_string(),
            ttl_secs: 24 * 60 * 60,
            sweep_interval_secs: 60 * 60,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log shadow-path failures that are otherwise dropped silently.
    pub debug: bool,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            debug: false,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
