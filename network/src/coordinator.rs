// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session protocol state machine
//!
//! `SessionCoordinator` owns the `MatchState`, the transport and the (at
//! most one) session peer. It is not thread-safe on purpose: a single
//! owner calls it, see `session::spawn_session`. Every mutation of the
//! state is followed by exactly one snapshot sent to the observer.
//!
//! Phase transitions:
//!
//! ```text
//! idle -> hosting -> connected
//! idle -> joining -> connected
//! ```
//!
//! An invitation does not change the phase. Only `PeerConnected` does, so
//! the host sees a single notification for invitation + connection.

use crate::config::{DecodePolicy, SessionConfig};
use crate::transport::{Transport, TransportError, TransportEvent};
use libp2p::PeerId;
use rps_core::{discovery_info, intent_matches, DiscoveryInfo, MatchState, Move, SessionPhase, WireError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Errors produced by session operations
#[derive(Debug, Error)]
pub enum SessionError {
    /// Operation not allowed in the current phase; nothing was changed
    #[error("Cannot {operation} while {phase}")]
    InvalidState {
        operation: &'static str,
        phase: SessionPhase,
    },

    /// `submit_move` was called with the unset sentinel
    #[error("Cannot submit an unset move")]
    UnsetMove,

    /// A move was submitted without a connected peer
    #[error("No connected peer to send the move to")]
    NotConnected,

    /// A payload could not be encoded or a peer payload could not be decoded
    #[error(transparent)]
    Wire(#[from] WireError),

    /// The transport refused a command
    #[error("Transport failure: {0}")]
    Transport(#[from] TransportError),

    /// The session task ended after a fatal error
    #[error("Session aborted: {0}")]
    Aborted(String),

    /// The session task is gone
    #[error("Session closed")]
    SessionClosed,
}

impl SessionError {
    /// Fatal errors end the session; the rest leave it usable
    pub fn is_fatal(&self) -> bool {
        !matches!(self, SessionError::InvalidState { .. } | SessionError::UnsetMove)
    }
}

/// The slice of `SessionConfig` the coordinator needs
#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    pub intent_key: String,
    pub connect_timeout: Duration,
    pub decode_failure: DecodePolicy,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self::from(&SessionConfig::default())
    }
}

impl From<&SessionConfig> for CoordinatorSettings {
    fn from(config: &SessionConfig) -> Self {
        Self {
            intent_key: config.intent_key.clone(),
            connect_timeout: config.connect_timeout,
            decode_failure: config.decode_failure,
        }
    }
}

pub struct SessionCoordinator<T> {
    transport: T,
    settings: CoordinatorSettings,
    state: MatchState,
    /// The connected peer, once `PeerConnected` arrived
    peer: Option<PeerId>,
    /// Peer we invited (joining) or accepted (hosting) but which is not connected yet
    pending_peer: Option<PeerId>,
    observer: mpsc::UnboundedSender<MatchState>,
}

impl<T: Transport> SessionCoordinator<T> {
    /// Create a coordinator in the idle phase together with its snapshot stream
    pub fn new(transport: T, settings: CoordinatorSettings) -> (Self, mpsc::UnboundedReceiver<MatchState>) {
        let (observer, snapshots) = mpsc::unbounded_channel();

        let coordinator = Self {
            transport,
            settings,
            state: MatchState::new(),
            peer: None,
            pending_peer: None,
            observer,
        };

        (coordinator, snapshots)
    }

    /// Current snapshot
    pub fn state(&self) -> MatchState {
        self.state
    }

    /// The connected peer, if any
    pub fn peer(&self) -> Option<PeerId> {
        self.peer
    }

    pub fn local_peer_id(&self) -> PeerId {
        self.transport.local_peer_id()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Start advertising and wait for one peer to join
    pub fn host(&mut self) -> Result<(), SessionError> {
        self.require_idle("host")?;

        self.state.phase = SessionPhase::Hosting;
        self.notify();

        self.transport.advertise(discovery_info(&self.settings.intent_key))?;
        info!("Started advertising peer");
        Ok(())
    }

    /// Start scanning for an advertised host
    pub fn join(&mut self) -> Result<(), SessionError> {
        self.require_idle("join")?;

        self.state.phase = SessionPhase::Joining;
        self.notify();

        self.transport.scan(&self.settings.intent_key)?;
        info!("Started looking for peers");
        Ok(())
    }

    /// Record the local move for this round and send it to the peer
    ///
    /// A delivery failure is logged only; the move stays recorded.
    pub fn submit_move(&mut self, mv: Move) -> Result<(), SessionError> {
        if !mv.is_set() {
            return Err(SessionError::UnsetMove);
        }
        if self.peer.is_none() {
            error!(phase = %self.state.phase, "Move submitted without a connected peer");
            return Err(SessionError::NotConnected);
        }

        let payload = mv.to_payload()?;
        self.state.local_move = mv;

        if let Err(e) = self.transport.send(payload) {
            warn!("Unable to send move with error {}", e);
        }

        self.notify();
        Ok(())
    }

    /// Clear both moves for the next round
    pub fn start_new_game(&mut self) {
        self.state.start_new_game();
        self.notify();
    }

    /// Process one event from the transport
    pub fn handle_event(&mut self, event: TransportEvent) -> Result<(), SessionError> {
        match event {
            TransportEvent::PeerDiscovered { peer, info } => self.on_peer_discovered(peer, &info),
            TransportEvent::ConnectionInvitation { peer } => self.on_connection_invitation(peer),
            TransportEvent::PeerConnected { peer } => {
                self.on_peer_connected(peer);
                Ok(())
            }
            TransportEvent::ConnectRejected { peer } => {
                info!(%peer, "Peer declined the session");
                self.on_connect_abandoned(peer)
            }
            TransportEvent::ConnectTimedOut { peer } => {
                debug!(%peer, "Connect attempt timed out");
                self.on_connect_abandoned(peer)
            }
            TransportEvent::DataReceived { peer, payload } => self.on_data_received(peer, &payload),
            TransportEvent::SendFailed { peer, reason } => {
                warn!(peer = ?peer, "Unable to deliver data: {}", reason);
                Ok(())
            }
        }
    }

    fn on_peer_discovered(&mut self, peer: PeerId, info: &DiscoveryInfo) -> Result<(), SessionError> {
        info!(%peer, "Found peer");

        if self.state.phase != SessionPhase::Joining {
            debug!(phase = %self.state.phase, "Not joining, ignoring discovered peer");
            return Ok(());
        }
        if !intent_matches(info, &self.settings.intent_key) {
            debug!(%peer, "Peer does not carry our intent, ignoring");
            return Ok(());
        }
        if self.pending_peer.is_some() {
            debug!(%peer, "Connect attempt already in flight");
            return Ok(());
        }

        match self.transport.connect(peer, self.settings.connect_timeout) {
            Ok(()) => {
                self.pending_peer = Some(peer);
                self.transport.stop_scanning();
                info!(%peer, "Invited peer");
                Ok(())
            }
            Err(TransportError::NodeStopped) => Err(TransportError::NodeStopped.into()),
            Err(e) => {
                warn!(%peer, "Unable to invite peer: {}", e);
                Ok(())
            }
        }
    }

    fn on_connection_invitation(&mut self, peer: PeerId) -> Result<(), SessionError> {
        info!(%peer, "Did receive invitation");

        if self.state.phase != SessionPhase::Hosting || self.pending_peer.is_some() {
            warn!(%peer, phase = %self.state.phase, "Declining invitation");
            self.transport.decline_invitation(peer);
            return Ok(());
        }

        match self.transport.accept_invitation(peer) {
            Ok(()) => {
                self.pending_peer = Some(peer);
                self.transport.stop_advertising();
                self.transport.stop_scanning();
                Ok(())
            }
            Err(TransportError::NodeStopped) => Err(TransportError::NodeStopped.into()),
            Err(e) => {
                warn!(%peer, "Unable to accept invitation: {}", e);
                Ok(())
            }
        }
    }

    fn on_peer_connected(&mut self, peer: PeerId) {
        if let Some(existing) = self.peer {
            warn!(%peer, %existing, "Already connected, ignoring second peer");
            return;
        }

        self.peer = Some(peer);
        self.pending_peer = None;
        self.state.phase = SessionPhase::Connected;
        self.notify();
        info!(%peer, "Connected");
    }

    fn on_connect_abandoned(&mut self, peer: PeerId) -> Result<(), SessionError> {
        if self.pending_peer != Some(peer) || self.peer.is_some() {
            return Ok(());
        }
        self.pending_peer = None;

        if self.state.phase == SessionPhase::Joining {
            // Keep looking; the phase and snapshot stay as they are
            self.transport.scan(&self.settings.intent_key)?;
            debug!("Resumed scanning");
        }
        Ok(())
    }

    fn on_data_received(&mut self, peer: PeerId, payload: &[u8]) -> Result<(), SessionError> {
        debug!(%peer, "Received {} bytes", payload.len());

        if self.peer != Some(peer) {
            warn!(%peer, "Dropping data from a peer outside the session");
            return Ok(());
        }

        match Move::from_payload(payload) {
            Ok(mv) => {
                self.state.remote_move = mv;
                self.notify();
                Ok(())
            }
            Err(e) => match self.settings.decode_failure {
                DecodePolicy::Ignore => {
                    warn!(%peer, "Ignoring payload: {}", e);
                    Ok(())
                }
                DecodePolicy::Fatal => {
                    error!(%peer, "Malformed payload: {}", e);
                    Err(e.into())
                }
            },
        }
    }

    fn require_idle(&self, operation: &'static str) -> Result<(), SessionError> {
        if self.state.phase != SessionPhase::Idle {
            error!("Unexpected current state {}", self.state.phase);
            return Err(SessionError::InvalidState {
                operation,
                phase: self.state.phase,
            });
        }
        Ok(())
    }

    fn notify(&self) {
        if self.observer.send(self.state).is_err() {
            debug!("No observer for state update");
        }
    }
}
