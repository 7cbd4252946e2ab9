//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (hyper HTTP/1.1 connection, trace layer)
//!     → tee handler
//!         → request.rs (drain body once, build primary + shadow copies)
//!         → [net::dispatch per backend]
//!         → response.rs (relay primary status, headers, body)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::{duplicate, DuplicatedRequest, DuplicationError};
pub use response::BackendResponse;
pub use server::TeeServer;
