// SPDX-License-Identifier: MIT OR Apache-2.0

//! libp2p transport: mDNS discovery plus a request/response session protocol
//!
//! mDNS only tells us that some libp2p node is on the LAN. While scanning,
//! every newly seen node is probed; its reply carries the discovery info
//! it advertises (empty when it is not hosting). Nodes that fail the probe
//! or do not advertise our intent yet are probed again after a short delay.
//! Connecting is an `Invite` request answered once the host's coordinator
//! decides, and moves travel as `Data` requests answered with `Ack`.
//!
//! The swarm runs in its own task. `SwarmTransport` only queues commands.

use crate::config::SessionConfig;
use crate::tracking::{InviteResolution, InviteTracker, ProbeTracker};
use crate::transport::{Transport, TransportError, TransportEvent};
use anyhow::{anyhow, Context, Result};
use futures::StreamExt;
use libp2p::{
    identity::Keypair,
    mdns, noise,
    request_response::{self, OutboundFailure, OutboundRequestId, ProtocolSupport, ResponseChannel},
    swarm::{NetworkBehaviour, SwarmEvent},
    tcp, yamux, Multiaddr, PeerId, StreamProtocol, Swarm, SwarmBuilder,
};
use rps_core::{intent_matches, DiscoveryInfo};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn, Instrument};

/// Delay before a node is probed again
const PROBE_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Requests exchanged on the session protocol
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionRequest {
    /// Ask a node what it advertises
    Probe,
    /// Ask a host for the session
    Invite,
    /// Opaque payload for the session peer
    Data(Vec<u8>),
}

/// Responses on the session protocol
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionResponse {
    /// Discovery info, empty unless advertising
    Advertisement(DiscoveryInfo),
    InviteReply { accepted: bool },
    Ack,
}

/// Network behaviour for a session node
#[derive(NetworkBehaviour)]
#[behaviour(to_swarm = "NodeEvent")]
pub struct SessionBehaviour {
    /// mDNS for local network discovery
    pub mdns: mdns::tokio::Behaviour,

    /// Probe, invite and data exchange
    pub session: request_response::cbor::Behaviour<SessionRequest, SessionResponse>,
}

#[derive(Debug)]
pub enum NodeEvent {
    Mdns(mdns::Event),
    Session(request_response::Event<SessionRequest, SessionResponse>),
}

impl From<mdns::Event> for NodeEvent {
    fn from(event: mdns::Event) -> Self {
        NodeEvent::Mdns(event)
    }
}

impl From<request_response::Event<SessionRequest, SessionResponse>> for NodeEvent {
    fn from(event: request_response::Event<SessionRequest, SessionResponse>) -> Self {
        NodeEvent::Session(event)
    }
}

impl SessionBehaviour {
    pub fn new(keypair: &Keypair, protocol: StreamProtocol, request_timeout: Duration) -> std::io::Result<Self> {
        let peer_id = keypair.public().to_peer_id();

        let session = request_response::cbor::Behaviour::new(
            [(protocol, ProtocolSupport::Full)],
            request_response::Config::default().with_request_timeout(request_timeout),
        );

        Ok(Self {
            mdns: mdns::tokio::Behaviour::new(mdns::Config::default(), peer_id)?,
            session,
        })
    }
}

#[derive(Debug)]
enum NodeCommand {
    Advertise(DiscoveryInfo),
    StopAdvertising,
    Scan(String),
    StopScanning,
    Connect { peer: PeerId, timeout: Duration },
    Accept(PeerId),
    Decline(PeerId),
    Send(Vec<u8>),
}

/// `Transport` handle backed by a libp2p swarm task
pub struct SwarmTransport {
    peer_id: PeerId,
    commands: mpsc::UnboundedSender<NodeCommand>,
}

impl SwarmTransport {
    /// Build the swarm, start listening and spawn its task
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(config: &SessionConfig) -> Result<(Self, mpsc::UnboundedReceiver<TransportEvent>)> {
        let keypair = Keypair::generate_ed25519();
        let peer_id = PeerId::from(keypair.public());
        info!("Creating session node with peer ID: {}", peer_id);

        let protocol = StreamProtocol::try_from_owned(config.protocol_name())
            .map_err(|e| anyhow!("Invalid protocol name {}: {}", config.protocol_name(), e))?;
        let request_timeout = config.request_timeout;
        let idle_timeout = config.idle_connection_timeout;

        let mut swarm = SwarmBuilder::with_existing_identity(keypair)
            .with_tokio()
            .with_tcp(
                tcp::Config::default(),
                noise::Config::new,
                yamux::Config::default,
            )?
            .with_behaviour(|key| -> Result<SessionBehaviour, Box<dyn std::error::Error + Send + Sync>> {
                Ok(SessionBehaviour::new(key, protocol, request_timeout)?)
            })?
            .with_swarm_config(|c| c.with_idle_connection_timeout(idle_timeout))
            .build();

        let listen_addr: Multiaddr = config
            .listen_addr
            .parse()
            .with_context(|| format!("Invalid listen address: {}", config.listen_addr))?;
        swarm
            .listen_on(listen_addr)
            .context("Failed to start listening")?;

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (deadline_tx, deadline_rx) = mpsc::unbounded_channel();
        let (retry_tx, retry_rx) = mpsc::unbounded_channel();

        let node = Node {
            swarm,
            commands: commands_rx,
            events: events_tx,
            deadline_tx,
            deadlines: deadline_rx,
            retry_tx,
            retries: retry_rx,
            advertising: None,
            scanning: None,
            discovered: HashSet::new(),
            probes: ProbeTracker::default(),
            invites: InviteTracker::default(),
            invitations: HashMap::new(),
            session_peer: None,
            sends: HashMap::new(),
        };

        let span = tracing::info_span!("node", %peer_id);
        tokio::spawn(node.run().instrument(span));

        Ok((
            Self {
                peer_id,
                commands: commands_tx,
            },
            events_rx,
        ))
    }

    fn command(&self, command: NodeCommand) -> Result<(), TransportError> {
        self.commands
            .send(command)
            .map_err(|_| TransportError::NodeStopped)
    }
}

impl Transport for SwarmTransport {
    fn local_peer_id(&self) -> PeerId {
        self.peer_id
    }

    fn advertise(&mut self, info: DiscoveryInfo) -> Result<(), TransportError> {
        self.command(NodeCommand::Advertise(info))
    }

    fn stop_advertising(&mut self) {
        let _ = self.command(NodeCommand::StopAdvertising);
    }

    fn scan(&mut self, intent_key: &str) -> Result<(), TransportError> {
        self.command(NodeCommand::Scan(intent_key.to_string()))
    }

    fn stop_scanning(&mut self) {
        let _ = self.command(NodeCommand::StopScanning);
    }

    fn connect(&mut self, peer: PeerId, timeout: Duration) -> Result<(), TransportError> {
        self.command(NodeCommand::Connect { peer, timeout })
    }

    fn accept_invitation(&mut self, peer: PeerId) -> Result<(), TransportError> {
        self.command(NodeCommand::Accept(peer))
    }

    fn decline_invitation(&mut self, peer: PeerId) {
        let _ = self.command(NodeCommand::Decline(peer));
    }

    fn send(&mut self, payload: Vec<u8>) -> Result<(), TransportError> {
        self.command(NodeCommand::Send(payload))
    }
}

struct Node {
    swarm: Swarm<SessionBehaviour>,
    commands: mpsc::UnboundedReceiver<NodeCommand>,
    events: mpsc::UnboundedSender<TransportEvent>,
    /// Connect attempts whose time is up
    deadline_tx: mpsc::UnboundedSender<OutboundRequestId>,
    deadlines: mpsc::UnboundedReceiver<OutboundRequestId>,
    /// Peers due for another probe
    retry_tx: mpsc::UnboundedSender<PeerId>,
    retries: mpsc::UnboundedReceiver<PeerId>,
    advertising: Option<DiscoveryInfo>,
    /// Intent key while scanning
    scanning: Option<String>,
    /// Nodes currently known through mDNS
    discovered: HashSet<PeerId>,
    probes: ProbeTracker<OutboundRequestId>,
    invites: InviteTracker<OutboundRequestId>,
    invitations: HashMap<PeerId, ResponseChannel<SessionResponse>>,
    session_peer: Option<PeerId>,
    sends: HashMap<OutboundRequestId, PeerId>,
}

impl Node {
    async fn run(mut self) {
        loop {
            tokio::select! {
                event = self.swarm.select_next_some() => self.handle_swarm_event(event),

                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => {
                        info!("Transport handle dropped, stopping node");
                        break;
                    }
                },

                Some(request_id) = self.deadlines.recv() => self.handle_deadline(request_id),

                Some(peer) = self.retries.recv() => self.handle_retry(peer),
            }
        }
    }

    fn emit(&self, event: TransportEvent) {
        if self.events.send(event).is_err() {
            debug!("Transport event receiver dropped");
        }
    }

    fn handle_command(&mut self, command: NodeCommand) {
        match command {
            NodeCommand::Advertise(info) => {
                info!("Advertising {:?}", info);
                self.advertising = Some(info);
            }
            NodeCommand::StopAdvertising => {
                self.advertising = None;
            }
            NodeCommand::Scan(intent_key) => {
                info!("Scanning for '{}'", intent_key);
                self.scanning = Some(intent_key);
                self.probes.reset();
                let known: Vec<PeerId> = self.discovered.iter().copied().collect();
                for peer in known {
                    self.probe(peer);
                }
            }
            NodeCommand::StopScanning => {
                self.scanning = None;
            }
            NodeCommand::Connect { peer, timeout } => {
                let request_id = self
                    .swarm
                    .behaviour_mut()
                    .session
                    .send_request(&peer, SessionRequest::Invite);
                self.invites.start(request_id, peer);

                let deadline_tx = self.deadline_tx.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(timeout).await;
                    let _ = deadline_tx.send(request_id);
                });
                debug!(%peer, "Sent invite");
            }
            NodeCommand::Accept(peer) => self.accept(peer),
            NodeCommand::Decline(peer) => {
                if let Some(channel) = self.invitations.remove(&peer) {
                    self.reply(channel, SessionResponse::InviteReply { accepted: false });
                }
            }
            NodeCommand::Send(payload) => match self.session_peer {
                Some(peer) => {
                    debug!(%peer, "Sending {} bytes", payload.len());
                    let request_id = self
                        .swarm
                        .behaviour_mut()
                        .session
                        .send_request(&peer, SessionRequest::Data(payload));
                    self.sends.insert(request_id, peer);
                }
                None => self.emit(TransportEvent::SendFailed {
                    peer: None,
                    reason: "no session peer".to_string(),
                }),
            },
        }
    }

    fn accept(&mut self, peer: PeerId) {
        let Some(channel) = self.invitations.remove(&peer) else {
            warn!(%peer, "No pending invitation to accept");
            return;
        };

        if self
            .swarm
            .behaviour_mut()
            .session
            .send_response(channel, SessionResponse::InviteReply { accepted: true })
            .is_err()
        {
            warn!(%peer, "Invitee went away before the reply");
            return;
        }

        self.session_peer = Some(peer);
        self.emit(TransportEvent::PeerConnected { peer });

        // Single peer sessions: everyone else still waiting is turned away
        let others: Vec<PeerId> = self.invitations.keys().copied().collect();
        for other in others {
            if let Some(channel) = self.invitations.remove(&other) {
                self.reply(channel, SessionResponse::InviteReply { accepted: false });
            }
        }
    }

    fn handle_deadline(&mut self, request_id: OutboundRequestId) {
        if let Some(peer) = self.invites.expire(request_id) {
            info!(%peer, "Connect attempt abandoned");
            self.emit(TransportEvent::ConnectTimedOut { peer });
        }
    }

    fn probe(&mut self, peer: PeerId) {
        if !self.probes.claim(peer) {
            return;
        }
        let request_id = self
            .swarm
            .behaviour_mut()
            .session
            .send_request(&peer, SessionRequest::Probe);
        self.probes.sent(request_id, peer);
        debug!(%peer, "Probing");
    }

    /// Probe `peer` again after `PROBE_RETRY_DELAY`
    fn schedule_retry(&self, peer: PeerId) {
        let retry_tx = self.retry_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(PROBE_RETRY_DELAY).await;
            let _ = retry_tx.send(peer);
        });
    }

    fn handle_retry(&mut self, peer: PeerId) {
        if self.scanning.is_some() && self.session_peer.is_none() && self.discovered.contains(&peer) {
            self.probe(peer);
        }
    }

    fn reply(&mut self, channel: ResponseChannel<SessionResponse>, response: SessionResponse) {
        if self
            .swarm
            .behaviour_mut()
            .session
            .send_response(channel, response)
            .is_err()
        {
            debug!("Response dropped, peer went away");
        }
    }

    fn handle_swarm_event(&mut self, event: SwarmEvent<NodeEvent>) {
        match event {
            SwarmEvent::NewListenAddr { address, .. } => {
                info!("Listening on {}", address);
            }
            SwarmEvent::Behaviour(NodeEvent::Mdns(event)) => self.handle_mdns_event(event),
            SwarmEvent::Behaviour(NodeEvent::Session(event)) => self.handle_session_event(event),
            SwarmEvent::ConnectionEstablished { peer_id, .. } => {
                debug!("Connection established with {}", peer_id);
            }
            SwarmEvent::ConnectionClosed { peer_id, .. } => {
                if self.session_peer == Some(peer_id) {
                    warn!("Connection to session peer {} closed", peer_id);
                }
            }
            SwarmEvent::OutgoingConnectionError { peer_id, error, .. } => {
                debug!("Outgoing connection to {:?} failed: {}", peer_id, error);
            }
            _ => {}
        }
    }

    fn handle_mdns_event(&mut self, event: mdns::Event) {
        match event {
            mdns::Event::Discovered(peers) => {
                for (peer, addr) in peers {
                    if self.discovered.insert(peer) {
                        info!("Discovered local peer {} at {}", peer, addr);
                    }
                    if self.scanning.is_some() {
                        self.probe(peer);
                    }
                }
            }
            mdns::Event::Expired(peers) => {
                for (peer, _) in peers {
                    if self.discovered.remove(&peer) {
                        debug!("mDNS peer expired: {}", peer);
                    }
                }
            }
        }
    }

    fn handle_session_event(&mut self, event: request_response::Event<SessionRequest, SessionResponse>) {
        match event {
            request_response::Event::Message { peer, message, .. } => match message {
                request_response::Message::Request { request, channel, .. } => {
                    self.handle_request(peer, request, channel)
                }
                request_response::Message::Response { request_id, response } => {
                    self.handle_response(peer, request_id, response)
                }
            },
            request_response::Event::OutboundFailure { peer, request_id, error, .. } => {
                self.handle_outbound_failure(peer, request_id, error)
            }
            request_response::Event::InboundFailure { peer, error, .. } => {
                debug!(%peer, "Inbound request failed: {}", error);
            }
            request_response::Event::ResponseSent { .. } => {}
        }
    }

    fn handle_request(&mut self, peer: PeerId, request: SessionRequest, channel: ResponseChannel<SessionResponse>) {
        match request {
            SessionRequest::Probe => {
                let info = self.advertising.clone().unwrap_or_default();
                self.reply(channel, SessionResponse::Advertisement(info));
            }
            SessionRequest::Invite => {
                if self.advertising.is_some() && self.session_peer.is_none() {
                    self.invitations.insert(peer, channel);
                    self.emit(TransportEvent::ConnectionInvitation { peer });
                } else {
                    debug!(%peer, "Not hosting, turning invite away");
                    self.reply(channel, SessionResponse::InviteReply { accepted: false });
                }
            }
            SessionRequest::Data(payload) => {
                self.reply(channel, SessionResponse::Ack);
                if self.session_peer == Some(peer) {
                    self.emit(TransportEvent::DataReceived { peer, payload });
                } else {
                    warn!(%peer, "Dropping data from a peer outside the session");
                }
            }
        }
    }

    fn handle_response(&mut self, peer: PeerId, request_id: OutboundRequestId, response: SessionResponse) {
        match response {
            SessionResponse::Advertisement(info) => {
                if self.probes.on_reply(request_id).is_none() {
                    return;
                }
                let wanted = self.scanning.as_deref().map(|intent_key| intent_matches(&info, intent_key));
                match wanted {
                    Some(true) => self.emit(TransportEvent::PeerDiscovered { peer, info }),
                    Some(false) => {
                        // Not hosting (yet); look again later
                        debug!(%peer, "Peer is not advertising our intent");
                        self.probes.release(peer);
                        self.schedule_retry(peer);
                    }
                    None => {}
                }
            }
            SessionResponse::InviteReply { accepted } => {
                match self.invites.on_reply(request_id, accepted, self.session_peer.is_some()) {
                    InviteResolution::Connected(peer) => {
                        self.session_peer = Some(peer);
                        self.scanning = None;
                        self.emit(TransportEvent::PeerConnected { peer });
                    }
                    InviteResolution::Rejected(peer) => {
                        self.emit(TransportEvent::ConnectRejected { peer });
                    }
                    InviteResolution::Ignored => debug!(%peer, "Ignoring reply to an abandoned invite"),
                }
            }
            SessionResponse::Ack => {
                if self.sends.remove(&request_id).is_some() {
                    debug!(%peer, "Payload acknowledged");
                }
            }
        }
    }

    fn handle_outbound_failure(&mut self, peer: PeerId, request_id: OutboundRequestId, error: OutboundFailure) {
        // A node that does not speak our protocol will not start to
        let retryable = !matches!(error, OutboundFailure::UnsupportedProtocols);
        if self.probes.on_failure(request_id, retryable).is_some() {
            debug!(%peer, "Probe failed: {}", error);
            if retryable && self.scanning.is_some() {
                self.schedule_retry(peer);
            }
            return;
        }

        if let Some(peer) = self.invites.on_failure(request_id) {
            warn!(%peer, "Invite failed: {}", error);
            let event = match error {
                OutboundFailure::Timeout => TransportEvent::ConnectTimedOut { peer },
                _ => TransportEvent::ConnectRejected { peer },
            };
            self.emit(event);
            return;
        }

        if self.sends.remove(&request_id).is_some() {
            self.emit(TransportEvent::SendFailed {
                peer: Some(peer),
                reason: error.to_string(),
            });
        }
    }
}
