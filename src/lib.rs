//! Traffic-duplicating reverse proxy library.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod session;
pub mod tee;

pub use config::TeeConfig;
pub use http::TeeServer;
pub use lifecycle::Shutdown;
pub use session::SessionCache;
pub use tee::TeeHandler;
