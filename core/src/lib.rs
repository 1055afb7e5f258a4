// SPDX-License-Identifier: MIT OR Apache-2.0

//! RPS Core - Match Rules and Session Snapshots
//!
//! This crate provides the pure, transport-agnostic part of the game:
//! - The `Move` value type and its wire payload
//! - The fixed rock > scissors > paper > rock relation
//! - Session phases and the `MatchState` snapshot with its derived flags
//! - Discovery constants shared by every peer of the application

#![deny(unsafe_code)]
#![deny(clippy::all)]

pub mod discovery;
pub mod hand;
pub mod state;
pub mod wire;

use thiserror::Error;

pub use discovery::{discovery_info, intent_matches, DiscoveryInfo, INTENT_KEY, SERVICE_TYPE};
pub use hand::{Move, Outcome};
pub use state::{MatchState, SessionPhase};

/// Errors raised while encoding or decoding a move payload
#[derive(Debug, Error)]
pub enum WireError {
    /// The payload could not be produced
    #[error("Failed to encode move payload: {0}")]
    Encode(#[source] serde_json::Error),

    /// The payload is not a valid move record
    #[error("Malformed move payload ({len} bytes): {source}")]
    Decode {
        /// Size of the rejected payload
        len: usize,
        /// Underlying parser error
        #[source]
        source: serde_json::Error,
    },
}

/// Error returned when parsing a move name fails
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Unknown move '{0}', expected rock, paper or scissors")]
pub struct ParseMoveError(pub String);
