//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (main.rs):
//!     Parse flags → Load config → Validate → Bind listener → Serve
//!
//! Shutdown (shutdown.rs, signals.rs):
//!     SIGTERM/SIGINT → Stop accepting → Drain client connections → Exit
//! ```
//!
//! # Design Decisions
//! - Detached shadow dispatches are not drained; they belong to the process,
//!   not to any client connection

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
