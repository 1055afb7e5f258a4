// SPDX-License-Identifier: MIT OR Apache-2.0

//! RPS Network - peer-to-peer session layer
//!
//! This crate provides the session protocol between exactly two peers:
//! - A `Transport` contract (advertise, scan, connect, send, receive)
//! - The `SessionCoordinator` state machine driving discovery, connection
//!   and the one-move-per-round exchange
//! - A session driver task that serializes user intents and transport
//!   events through a single writer
//! - A libp2p transport (mDNS + request/response) and an in-memory one

#![deny(unsafe_code)]

pub mod config;
pub mod coordinator;
pub mod memory;
pub mod session;
pub mod swarm;
mod tracking;
pub mod transport;

pub use config::{load_config, load_or_default, DecodePolicy, SessionConfig};
pub use coordinator::{CoordinatorSettings, SessionCoordinator, SessionError};
pub use memory::{MemoryNetwork, MemoryTransport};
pub use session::{spawn_session, SessionHandle};
pub use swarm::SwarmTransport;
pub use transport::{Transport, TransportError, TransportEvent};

pub use libp2p::PeerId;
