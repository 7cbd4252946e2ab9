//! Session affinity subsystem.
//!
//! # Data Flow
//! ```text
//! inbound request
//!     → cookie.rs (find designated session cookie)
//!     → cache.rs lookup (primary token → shadow token)
//!     → cookie.rs (rewrite shadow copy's Cookie header on hit)
//!
//! shadow response
//!     → cookie.rs (find shadow's session cookie)
//!     → cache.rs insert (primary token → shadow token)
//! ```
//!
//! # Design Decisions
//! - Best-effort correlation: concurrent writers race, last write wins
//! - The cache is the only state shared between requests

pub mod cache;
pub mod cookie;

pub use cache::SessionCache;
