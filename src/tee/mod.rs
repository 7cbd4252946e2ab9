//! Traffic duplication subsystem.
//!
//! # Data Flow
//! ```text
//! inbound request
//!     → http::request::duplicate (primary copy, shadow copy)
//!     → session affinity lookup, shadow cookie rewrite
//!     → net::dispatch to primary (awaited)
//!     → primary response relayed to client
//!     → shadow.rs: net::dispatch to shadow (detached)
//!         → session cache update
//! ```
//!
//! # Design Decisions
//! - The shadow path can never delay or fail the client response
//! - Primary failures abort the client connection without a response

pub mod handler;
pub(crate) mod shadow;

use thiserror::Error;

use crate::http::request::DuplicationError;
use crate::net::dispatch::DispatchError;

pub use handler::TeeHandler;

/// Why a client request was aborted.
#[derive(Debug, Error)]
pub enum TeeError {
    #[error("request duplication failed: {0}")]
    Duplication(#[from] DuplicationError),

    #[error("primary dispatch failed: {0}")]
    Primary(#[from] DispatchError),
}
