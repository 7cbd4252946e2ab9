//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate address shapes (`host:port`) for listener and both backends
//! - Validate value ranges (timeouts > 0, limits > 0, session durations bounded)
//! - Reject a shadow target that points at the primary
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: TeeConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use thiserror::Error;

use crate::config::schema::TeeConfig;

/// Upper bound for session lifetimes and sweep intervals: ten years.
pub const MAX_SESSION_SECS: u64 = 10 * 365 * 24 * 60 * 60;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field}: '{value}' is not a host:port address")]
    InvalidAddress { field: &'static str, value: String },

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("{field} must be at most {max}")]
    TooLarge { field: &'static str, max: u64 },

    #[error("session.cookie_name '{0}' is not a valid cookie name")]
    InvalidCookieName(String),

    #[error("primary and shadow both point at '{0}'")]
    SameTarget(String),
}

/// Validate a configuration, collecting every problem found.
pub fn validate_config(config: &TeeConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    for (field, value) in [
        ("listener.bind_address", &config.listener.bind_address),
        ("primary.address", &config.primary.address),
        ("shadow.address", &config.shadow.address),
    ] {
        if !is_host_port(value) {
            errors.push(ValidationError::InvalidAddress {
                field,
                value: value.clone(),
            });
        }
    }

    if config.primary.address.eq_ignore_ascii_case(&config.shadow.address) {
        errors.push(ValidationError::SameTarget(config.primary.address.clone()));
    }

    let non_zero = [
        ("listener.max_connections", config.listener.max_connections as u64),
        ("listener.max_body_bytes", config.listener.max_body_bytes as u64),
        ("primary.timeout_secs", config.primary.timeout_secs),
        ("shadow.timeout_secs", config.shadow.timeout_secs),
        ("session.ttl_secs", config.session.ttl_secs),
        ("session.sweep_interval_secs", config.session.sweep_interval_secs),
    ];
    for (field, value) in non_zero {
        if value == 0 {
            errors.push(ValidationError::Zero(field));
        }
    }

    for (field, value) in [
        ("session.ttl_secs", config.session.ttl_secs),
        ("session.sweep_interval_secs", config.session.sweep_interval_secs),
    ] {
        if value > MAX_SESSION_SECS {
            errors.push(ValidationError::TooLarge {
                field,
                max: MAX_SESSION_SECS,
            });
        }
    }

    if !is_token(&config.session.cookie_name) {
        errors.push(ValidationError::InvalidCookieName(
            config.session.cookie_name.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// `host:port` with a numeric port. The host part may be empty (":8888"),
/// a name, an IPv4 literal or a bracketed IPv6 literal.
fn is_host_port(value: &str) -> bool {
    match value.rsplit_once(':') {
        Some((host, port)) => {
            port.parse::<u16>().is_ok() && (!host.contains(':') || host.starts_with('['))
        }
        None => false,
    }
}

/// RFC 7230 token characters, which is what a cookie name must consist of.
fn is_token(name: &str) -> bool {
    !name.is_empty()
        && name.bytes().all(|b| {
            b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b)
        })
}
