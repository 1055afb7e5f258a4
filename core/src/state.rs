// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session phases and the per-update match snapshot

use crate::{Move, Outcome};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Connection lifecycle of a session
///
/// Transitions only move forward: idle -> hosting|joining -> connected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionPhase {
    /// Nothing started yet
    #[default]
    Idle,
    /// Advertising and waiting for an invitation
    Hosting,
    /// Scanning for an advertised host
    Joining,
    /// Exactly one peer connected
    Connected,
}

impl SessionPhase {
    /// True while a host or join attempt is in flight
    pub fn is_connecting(&self) -> bool {
        matches!(self, SessionPhase::Hosting | SessionPhase::Joining)
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionPhase::Idle => "idle",
            SessionPhase::Hosting => "hosting",
            SessionPhase::Joining => "joining",
            SessionPhase::Connected => "connected",
        };
        f.write_str(name)
    }
}

/// Snapshot of a session and the current round
///
/// Every presentation flag is derived from the three stored fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MatchState {
    /// Connection lifecycle phase
    pub phase: SessionPhase,
    /// Move submitted by the local player this round
    pub local_move: Move,
    /// Move received from the peer this round
    pub remote_move: Move,
}

impl MatchState {
    /// Fresh state: idle, both moves unset
    pub fn new() -> Self {
        Self::default()
    }

    /// A host or join attempt is in progress
    pub fn connecting(&self) -> bool {
        self.phase.is_connecting()
    }

    /// The local player already picked a move this round
    pub fn lock_input(&self) -> bool {
        self.local_move.is_set()
    }

    /// The opponent has picked but the local player has not
    pub fn hint_remote_move(&self) -> bool {
        self.remote_move.is_set() && !self.local_move.is_set()
    }

    /// Both moves of the round are known
    pub fn resolved(&self) -> bool {
        self.local_move.is_set() && self.remote_move.is_set()
    }

    /// Whether the result should be displayed; same as `resolved`
    pub fn show_result(&self) -> bool {
        self.resolved()
    }

    /// Local player won the resolved round. A draw counts as not won.
    pub fn won(&self) -> bool {
        self.resolved() && self.local_move.beats(self.remote_move)
    }

    /// Draw-aware result, `None` until resolved
    pub fn outcome(&self) -> Option<Outcome> {
        self.local_move.against(self.remote_move)
    }

    /// Clear both moves for the next round; the phase is left alone
    pub fn start_new_game(&mut self) {
        self.local_move = Move::Unset;
        self.remote_move = Move::Unset;
    }
}
