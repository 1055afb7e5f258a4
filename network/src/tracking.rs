// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bookkeeping for outstanding probe and invite requests of the swarm node
//!
//! Generic over the request id so it can be exercised without a swarm.

use libp2p::PeerId;
use std::collections::{HashMap, HashSet};
use std::hash::Hash;

/// What an invite reply means for the local node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum InviteResolution {
    Connected(PeerId),
    Rejected(PeerId),
    Ignored,
}

/// The current invite plus the ones whose deadline passed
///
/// A host may accept an invite after our deadline fired. It has committed
/// to us by then, so an accepted reply to an abandoned invite is still
/// adopted as long as we have no session peer.
#[derive(Debug)]
pub(crate) struct InviteTracker<I> {
    pending: Option<(I, PeerId)>,
    abandoned: Vec<(I, PeerId)>,
}

impl<I> Default for InviteTracker<I> {
    fn default() -> Self {
        Self {
            pending: None,
            abandoned: Vec::new(),
        }
    }
}

impl<I: Copy + PartialEq> InviteTracker<I> {
    pub fn start(&mut self, id: I, peer: PeerId) {
        if let Some(previous) = self.pending.replace((id, peer)) {
            self.abandoned.push(previous);
        }
    }

    /// Deadline of `id` passed; returns the peer if it was still pending
    pub fn expire(&mut self, id: I) -> Option<PeerId> {
        match self.pending {
            Some((pending, peer)) if pending == id => {
                self.pending = None;
                self.abandoned.push((id, peer));
                Some(peer)
            }
            _ => None,
        }
    }

    pub fn on_reply(&mut self, id: I, accepted: bool, in_session: bool) -> InviteResolution {
        if let Some((pending, peer)) = self.pending {
            if pending == id {
                self.pending = None;
                return if accepted {
                    InviteResolution::Connected(peer)
                } else {
                    InviteResolution::Rejected(peer)
                };
            }
        }

        let Some(index) = self.abandoned.iter().position(|(abandoned, _)| *abandoned == id) else {
            return InviteResolution::Ignored;
        };
        let (_, peer) = self.abandoned.swap_remove(index);

        if accepted && !in_session {
            // Whatever we are waiting on now loses to the committed host
            if let Some(superseded) = self.pending.take() {
                self.abandoned.push(superseded);
            }
            InviteResolution::Connected(peer)
        } else {
            InviteResolution::Ignored
        }
    }

    /// Outbound failure of `id`; returns the peer if it was the pending invite
    pub fn on_failure(&mut self, id: I) -> Option<PeerId> {
        self.abandoned.retain(|(abandoned, _)| *abandoned != id);
        match self.pending {
            Some((pending, peer)) if pending == id => {
                self.pending = None;
                Some(peer)
            }
            _ => None,
        }
    }

    #[cfg(test)]
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
}

/// Probes in flight and the peers already probed during the current scan
#[derive(Debug)]
pub(crate) struct ProbeTracker<I> {
    probed: HashSet<PeerId>,
    in_flight: HashMap<I, PeerId>,
}

impl<I> Default for ProbeTracker<I> {
    fn default() -> Self {
        Self {
            probed: HashSet::new(),
            in_flight: HashMap::new(),
        }
    }
}

impl<I: Copy + Eq + Hash> ProbeTracker<I> {
    /// Start of a new scan: every known peer may be probed again
    pub fn reset(&mut self) {
        self.probed.clear();
    }

    /// Claim `peer` for probing; false if it was probed already
    pub fn claim(&mut self, peer: PeerId) -> bool {
        self.probed.insert(peer)
    }

    pub fn sent(&mut self, id: I, peer: PeerId) {
        self.in_flight.insert(id, peer);
    }

    /// Reply to `id`; returns the probed peer if `id` was a probe
    pub fn on_reply(&mut self, id: I) -> Option<PeerId> {
        self.in_flight.remove(&id)
    }

    /// Probe `id` failed. A retryable failure releases the peer so it
    /// can be claimed again.
    pub fn on_failure(&mut self, id: I, retryable: bool) -> Option<PeerId> {
        let peer = self.in_flight.remove(&id)?;
        if retryable {
            self.probed.remove(&peer);
        }
        Some(peer)
    }

    /// Allow `peer` to be claimed again
    pub fn release(&mut self, peer: PeerId) {
        self.probed.remove(&peer);
    }
}
