// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-process transport
//!
//! All endpoints created from one `MemoryNetwork` can see each other.
//! Commands take effect immediately and their events are queued on the
//! endpoints' channels, so whole sessions run without sockets.

use crate::transport::{Transport, TransportError, TransportEvent};
use libp2p::PeerId;
use parking_lot::Mutex;
use rps_core::{intent_matches, DiscoveryInfo};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

struct Endpoint {
    events: mpsc::UnboundedSender<TransportEvent>,
    advertising: Option<DiscoveryInfo>,
    scanning: Option<String>,
    invitations: HashSet<PeerId>,
    session_peer: Option<PeerId>,
    fail_sends: bool,
}

impl Endpoint {
    fn emit(&self, event: TransportEvent) {
        if self.events.send(event).is_err() {
            debug!("Memory endpoint receiver dropped");
        }
    }
}

#[derive(Default)]
struct Hub {
    endpoints: HashMap<PeerId, Endpoint>,
}

/// Shared hub connecting in-memory endpoints
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    hub: Arc<Mutex<Hub>>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new endpoint with a random peer id
    pub fn endpoint(&self) -> (MemoryTransport, mpsc::UnboundedReceiver<TransportEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let id = PeerId::random();

        self.hub.lock().endpoints.insert(
            id,
            Endpoint {
                events,
                advertising: None,
                scanning: None,
                invitations: HashSet::new(),
                session_peer: None,
                fail_sends: false,
            },
        );

        let transport = MemoryTransport {
            id,
            network: self.clone(),
        };
        (transport, rx)
    }

    /// Make every send from `peer` fail with a `SendFailed` event
    pub fn set_fail_sends(&self, peer: PeerId, fail: bool) {
        if let Some(endpoint) = self.hub.lock().endpoints.get_mut(&peer) {
            endpoint.fail_sends = fail;
        }
    }

    /// Session peer of `peer` as seen by the hub
    pub fn session_peer(&self, peer: PeerId) -> Option<PeerId> {
        self.hub.lock().endpoints.get(&peer).and_then(|e| e.session_peer)
    }

    pub fn is_advertising(&self, peer: PeerId) -> bool {
        self.hub
            .lock()
            .endpoints
            .get(&peer)
            .map_or(false, |e| e.advertising.is_some())
    }

    pub fn is_scanning(&self, peer: PeerId) -> bool {
        self.hub
            .lock()
            .endpoints
            .get(&peer)
            .map_or(false, |e| e.scanning.is_some())
    }
}

/// One endpoint on a `MemoryNetwork`
pub struct MemoryTransport {
    id: PeerId,
    network: MemoryNetwork,
}

impl Drop for MemoryTransport {
    fn drop(&mut self) {
        // Dropping the sender closes the endpoint's event stream
        self.network.hub.lock().endpoints.remove(&self.id);
    }
}

impl Transport for MemoryTransport {
    fn local_peer_id(&self) -> PeerId {
        self.id
    }

    fn advertise(&mut self, info: DiscoveryInfo) -> Result<(), TransportError> {
        let mut hub = self.network.hub.lock();

        for (peer, endpoint) in hub.endpoints.iter() {
            if *peer == self.id {
                continue;
            }
            if let Some(key) = &endpoint.scanning {
                if intent_matches(&info, key) {
                    endpoint.emit(TransportEvent::PeerDiscovered {
                        peer: self.id,
                        info: info.clone(),
                    });
                }
            }
        }

        let me = hub.endpoints.get_mut(&self.id).ok_or(TransportError::NodeStopped)?;
        me.advertising = Some(info);
        Ok(())
    }

    fn stop_advertising(&mut self) {
        if let Some(me) = self.network.hub.lock().endpoints.get_mut(&self.id) {
            me.advertising = None;
        }
    }

    fn scan(&mut self, intent_key: &str) -> Result<(), TransportError> {
        let mut hub = self.network.hub.lock();

        let found: Vec<(PeerId, DiscoveryInfo)> = hub
            .endpoints
            .iter()
            .filter(|(peer, _)| **peer != self.id)
            .filter_map(|(peer, endpoint)| {
                endpoint
                    .advertising
                    .as_ref()
                    .filter(|info| intent_matches(info, intent_key))
                    .map(|info| (*peer, info.clone()))
            })
            .collect();

        let me = hub.endpoints.get_mut(&self.id).ok_or(TransportError::NodeStopped)?;
        me.scanning = Some(intent_key.to_string());
        for (peer, info) in found {
            me.emit(TransportEvent::PeerDiscovered { peer, info });
        }
        Ok(())
    }

    fn stop_scanning(&mut self) {
        if let Some(me) = self.network.hub.lock().endpoints.get_mut(&self.id) {
            me.scanning = None;
        }
    }

    fn connect(&mut self, peer: PeerId, _timeout: Duration) -> Result<(), TransportError> {
        let mut hub = self.network.hub.lock();

        let target = hub.endpoints.get_mut(&peer).ok_or(TransportError::UnknownPeer(peer))?;
        if target.advertising.is_some() {
            target.invitations.insert(self.id);
            target.emit(TransportEvent::ConnectionInvitation { peer: self.id });
        } else if let Some(me) = hub.endpoints.get(&self.id) {
            me.emit(TransportEvent::ConnectRejected { peer });
        }
        Ok(())
    }

    fn accept_invitation(&mut self, peer: PeerId) -> Result<(), TransportError> {
        let mut hub = self.network.hub.lock();

        let me = hub.endpoints.get_mut(&self.id).ok_or(TransportError::NodeStopped)?;
        if !me.invitations.remove(&peer) {
            return Err(TransportError::NoInvitation(peer));
        }
        me.session_peer = Some(peer);
        me.emit(TransportEvent::PeerConnected { peer });

        let other = hub.endpoints.get_mut(&peer).ok_or(TransportError::UnknownPeer(peer))?;
        other.session_peer = Some(self.id);
        other.emit(TransportEvent::PeerConnected { peer: self.id });
        Ok(())
    }

    fn decline_invitation(&mut self, peer: PeerId) {
        let mut hub = self.network.hub.lock();

        let had_invitation = hub
            .endpoints
            .get_mut(&self.id)
            .map_or(false, |me| me.invitations.remove(&peer));
        if !had_invitation {
            return;
        }
        if let Some(other) = hub.endpoints.get(&peer) {
            other.emit(TransportEvent::ConnectRejected { peer: self.id });
        }
    }

    fn send(&mut self, payload: Vec<u8>) -> Result<(), TransportError> {
        let hub = self.network.hub.lock();

        let me = hub.endpoints.get(&self.id).ok_or(TransportError::NodeStopped)?;
        let peer = me.session_peer.ok_or(TransportError::NotConnected)?;

        if me.fail_sends {
            me.emit(TransportEvent::SendFailed {
                peer: Some(peer),
                reason: "simulated delivery failure".to_string(),
            });
            return Ok(());
        }

        match hub.endpoints.get(&peer) {
            Some(other) => other.emit(TransportEvent::DataReceived { peer: self.id, payload }),
            None => me.emit(TransportEvent::SendFailed {
                peer: Some(peer),
                reason: "peer left the network".to_string(),
            }),
        }
        Ok(())
    }
}
