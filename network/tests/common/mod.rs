// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common utilities for session integration tests

#![allow(dead_code)]

use anyhow::{anyhow, Result};
use parking_lot::Mutex;
use rps_core::{DiscoveryInfo, MatchState};
use rps_network::{PeerId, Transport, TransportError};
use std::sync::{Arc, Once};
use std::time::Duration;
use tokio::sync::mpsc;

static INIT_LOGGING: Once = Once::new();

/// Install a test subscriber; quiet unless RUST_LOG is set
pub fn init_logging() {
    INIT_LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    });
}

/// A transport command seen by the fake
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Advertise(DiscoveryInfo),
    StopAdvertising,
    Scan(String),
    StopScanning,
    Connect(PeerId, Duration),
    Accept(PeerId),
    Decline(PeerId),
    Send(Vec<u8>),
}

/// Fake transport that records every command and never emits events
#[derive(Clone)]
pub struct RecordingTransport {
    pub id: PeerId,
    calls: Arc<Mutex<Vec<Call>>>,
    fail_sends: Arc<Mutex<bool>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self {
            id: PeerId::random(),
            calls: Arc::new(Mutex::new(Vec::new())),
            fail_sends: Arc::new(Mutex::new(false)),
        }
    }

    /// Recorded commands so far
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn clear(&self) {
        self.calls.lock().clear();
    }

    pub fn set_fail_sends(&self, fail: bool) {
        *self.fail_sends.lock() = fail;
    }

    fn record(&self, call: Call) {
        self.calls.lock().push(call);
    }
}

impl Transport for RecordingTransport {
    fn local_peer_id(&self) -> PeerId {
        self.id
    }

    fn advertise(&mut self, info: DiscoveryInfo) -> Result<(), TransportError> {
        self.record(Call::Advertise(info));
        Ok(())
    }

    fn stop_advertising(&mut self) {
        self.record(Call::StopAdvertising);
    }

    fn scan(&mut self, intent_key: &str) -> Result<(), TransportError> {
        self.record(Call::Scan(intent_key.to_string()));
        Ok(())
    }

    fn stop_scanning(&mut self) {
        self.record(Call::StopScanning);
    }

    fn connect(&mut self, peer: PeerId, timeout: Duration) -> Result<(), TransportError> {
        self.record(Call::Connect(peer, timeout));
        Ok(())
    }

    fn accept_invitation(&mut self, peer: PeerId) -> Result<(), TransportError> {
        self.record(Call::Accept(peer));
        Ok(())
    }

    fn decline_invitation(&mut self, peer: PeerId) {
        self.record(Call::Decline(peer));
    }

    fn send(&mut self, payload: Vec<u8>) -> Result<(), TransportError> {
        self.record(Call::Send(payload));
        if *self.fail_sends.lock() {
            return Err(TransportError::NotConnected);
        }
        Ok(())
    }
}

/// Everything queued on a snapshot stream right now
pub fn drain(rx: &mut mpsc::UnboundedReceiver<MatchState>) -> Vec<MatchState> {
    let mut out = Vec::new();
    while let Ok(state) = rx.try_recv() {
        out.push(state);
    }
    out
}

/// Wait up to ten seconds for a snapshot matching `pred`
pub async fn wait_for<F>(rx: &mut mpsc::UnboundedReceiver<MatchState>, pred: F) -> Result<MatchState>
where
    F: Fn(&MatchState) -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let state = tokio::time::timeout_at(deadline, rx.recv())
            .await
            .map_err(|_| anyhow!("Timed out waiting for state"))?
            .ok_or_else(|| anyhow!("Snapshot stream closed"))?;
        if pred(&state) {
            return Ok(state);
        }
    }
}
