//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! defaults
//!     → config file (TOML, optional) via loader.rs
//!     → command-line overrides (main.rs)
//!     → validation.rs (semantic checks)
//!     → TeeConfig (validated, immutable)
//!     → handed to TeeServer at startup
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All sections have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, read_config, ConfigError};
pub use schema::{BackendConfig, ListenerConfig, ObservabilityConfig, SessionConfig, TeeConfig};
pub use validation::{validate_config, ValidationError};
