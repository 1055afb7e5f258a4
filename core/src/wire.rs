// SPDX-License-Identifier: MIT OR Apache-2.0

//! Move payload sent once per round
//!
//! A payload is a self-contained JSON record with a single `hand` field,
//! e.g. `{"hand":"rock"}`. There is no envelope, version or sequence number.

use crate::{Move, WireError};
use serde::{Deserialize, Serialize};

/// The record exchanged between peers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct MovePayload {
    hand: Move,
}

impl Move {
    /// Serialize this move into a wire payload
    pub fn to_payload(&self) -> Result<Vec<u8>, WireError> {
        serde_json::to_vec(&MovePayload { hand: *self }).map_err(WireError::Encode)
    }

    /// Decode a wire payload received from the peer
    pub fn from_payload(data: &[u8]) -> Result<Move, WireError> {
        serde_json::from_slice::<MovePayload>(data)
            .map(|payload| payload.hand)
            .map_err(|source| {
                tracing::debug!("Rejected {} byte move payload", data.len());
                WireError::Decode {
                    len: data.len(),
                    source,
                }
            })
    }
}
