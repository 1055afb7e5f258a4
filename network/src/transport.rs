// SPDX-License-Identifier: MIT OR Apache-2.0

//! Transport contract consumed by the session coordinator
//!
//! Commands are non-blocking. Anything that completes later (discovery,
//! invitations, connection, inbound data, delivery failures) is reported
//! as a `TransportEvent` on the receiver handed out with the transport.

use libp2p::PeerId;
use rps_core::DiscoveryInfo;
use std::time::Duration;
use thiserror::Error;

/// Errors a transport reports synchronously
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// No session peer to deliver to
    #[error("No connected peer")]
    NotConnected,

    /// No pending invitation from this peer
    #[error("No pending invitation from {0}")]
    NoInvitation(PeerId),

    /// The peer is unknown to the transport
    #[error("Unknown peer {0}")]
    UnknownPeer(PeerId),

    /// The background network task is gone
    #[error("Network node stopped")]
    NodeStopped,
}

/// Asynchronous notifications from the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// An advertising peer was found while scanning
    PeerDiscovered { peer: PeerId, info: DiscoveryInfo },
    /// A peer asks to join while we advertise
    ConnectionInvitation { peer: PeerId },
    /// The session connection with `peer` is established
    PeerConnected { peer: PeerId },
    /// The host declined our connect request
    ConnectRejected { peer: PeerId },
    /// Our connect request got no answer in time and was abandoned
    ConnectTimedOut { peer: PeerId },
    /// Raw bytes from the session peer
    DataReceived { peer: PeerId, payload: Vec<u8> },
    /// A payload could not be delivered
    SendFailed { peer: Option<PeerId>, reason: String },
}

/// Primitives a concrete networking stack supplies
///
/// Exactly one active peer connection is supported.
pub trait Transport: Send {
    /// Our own identity on the network
    fn local_peer_id(&self) -> PeerId;

    /// Start answering scans with `info`
    fn advertise(&mut self, info: DiscoveryInfo) -> Result<(), TransportError>;

    fn stop_advertising(&mut self);

    /// Start reporting peers whose discovery info contains `intent_key`
    fn scan(&mut self, intent_key: &str) -> Result<(), TransportError>;

    fn stop_scanning(&mut self);

    /// Ask `peer` for a session; gives up silently after `timeout`
    fn connect(&mut self, peer: PeerId, timeout: Duration) -> Result<(), TransportError>;

    /// Accept a pending invitation, making `peer` the session peer
    fn accept_invitation(&mut self, peer: PeerId) -> Result<(), TransportError>;

    fn decline_invitation(&mut self, peer: PeerId);

    /// Send `payload` to the session peer, at most once
    fn send(&mut self, payload: Vec<u8>) -> Result<(), TransportError>;
}
