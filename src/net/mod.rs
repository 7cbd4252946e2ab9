//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop, connection limits)
//!     → connection.rs (lifecycle tracking)
//!     → Hand off to HTTP layer
//!
//! Outgoing request (primary or shadow)
//!     → dispatch.rs (fresh connection, write, read, close)
//! ```
//!
//! # Design Decisions
//! - Bounded accept queue prevents resource exhaustion
//! - Each client connection tracked for graceful shutdown
//! - Outbound connections are never reused

pub mod connection;
pub mod dispatch;
pub mod listener;

pub use dispatch::{dispatch, DispatchError, Target};
pub use listener::{Listener, ListenerError};
