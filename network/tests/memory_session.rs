// SPDX-License-Identifier: MIT OR Apache-2.0

//! Two full sessions talking over the in-memory transport

use anyhow::Result;
use rps_core::{discovery_info, Move, SessionPhase, INTENT_KEY};
use rps_network::{
    spawn_session, CoordinatorSettings, DecodePolicy, MemoryNetwork, SessionError, Transport,
    TransportEvent,
};
use std::time::Duration;

mod common;
use common::{init_logging, wait_for};

#[tokio::test]
async fn test_two_players_play_rounds() -> Result<()> {
    init_logging();
    let network = MemoryNetwork::new();

    let (host_transport, host_events) = network.endpoint();
    let (guest_transport, guest_events) = network.endpoint();
    let host_id = host_transport.local_peer_id();
    let guest_id = guest_transport.local_peer_id();

    let (host, mut host_states, host_task) =
        spawn_session(host_transport, host_events, CoordinatorSettings::default());
    let (guest, mut guest_states, guest_task) =
        spawn_session(guest_transport, guest_events, CoordinatorSettings::default());

    host.host().await?;
    guest.join().await?;

    wait_for(&mut host_states, |s| s.phase == SessionPhase::Connected).await?;
    wait_for(&mut guest_states, |s| s.phase == SessionPhase::Connected).await?;
    assert_eq!(network.session_peer(host_id), Some(guest_id));
    assert!(!network.is_advertising(host_id));
    assert!(!network.is_scanning(guest_id));

    // Round one: rock beats scissors
    host.submit_move(Move::Rock).await?;
    guest.submit_move(Move::Scissors).await?;

    let host_final = wait_for(&mut host_states, |s| s.resolved()).await?;
    let guest_final = wait_for(&mut guest_states, |s| s.resolved()).await?;
    assert!(host_final.won());
    assert!(!guest_final.won());
    assert_eq!(host_final.remote_move, Move::Scissors);
    assert_eq!(guest_final.remote_move, Move::Rock);

    // Round two: a draw
    host.start_new_game().await?;
    guest.start_new_game().await?;
    assert_eq!(host.snapshot().await?.local_move, Move::Unset);

    guest.submit_move(Move::Paper).await?;
    let hinted = wait_for(&mut host_states, |s| s.remote_move == Move::Paper).await?;
    assert!(hinted.hint_remote_move());

    host.submit_move(Move::Paper).await?;
    let host_final = wait_for(&mut host_states, |s| s.resolved()).await?;
    let guest_final = wait_for(&mut guest_states, |s| s.resolved()).await?;
    assert!(!host_final.won());
    assert!(!guest_final.won());

    drop(host);
    drop(guest);
    host_task.await??;
    guest_task.await??;
    Ok(())
}

#[tokio::test]
async fn test_invalid_state_keeps_session_alive() -> Result<()> {
    init_logging();
    let network = MemoryNetwork::new();
    let (transport, events) = network.endpoint();
    let (handle, _states, _task) = spawn_session(transport, events, CoordinatorSettings::default());

    handle.join().await?;
    let err = handle.host().await.unwrap_err();
    assert!(matches!(err, SessionError::InvalidState { operation: "host", phase: SessionPhase::Joining }));

    let err = handle.submit_move(Move::Unset).await.unwrap_err();
    assert!(matches!(err, SessionError::UnsetMove));

    assert_eq!(handle.snapshot().await?.phase, SessionPhase::Joining);
    assert!(!handle.is_closed());
    Ok(())
}

#[tokio::test]
async fn test_move_without_peer_ends_session() -> Result<()> {
    init_logging();
    let network = MemoryNetwork::new();
    let (transport, events) = network.endpoint();
    let (handle, _states, task) = spawn_session(transport, events, CoordinatorSettings::default());

    handle.host().await?;
    let err = handle.submit_move(Move::Rock).await.unwrap_err();
    assert!(matches!(err, SessionError::NotConnected));

    let result = tokio::time::timeout(Duration::from_secs(5), task).await??;
    assert!(matches!(result, Err(SessionError::Aborted(_))));
    assert!(matches!(handle.snapshot().await, Err(SessionError::SessionClosed)));
    Ok(())
}

#[tokio::test]
async fn test_malformed_payload_fatal_policy_ends_session() -> Result<()> {
    init_logging();
    let network = MemoryNetwork::new();
    let (host_transport, host_events) = network.endpoint();
    let host_id = host_transport.local_peer_id();

    let settings = CoordinatorSettings {
        decode_failure: DecodePolicy::Fatal,
        ..CoordinatorSettings::default()
    };
    let (host, mut host_states, host_task) = spawn_session(host_transport, host_events, settings);
    host.host().await?;

    // A raw endpoint plays the guest so it can send garbage
    let (mut guest, mut guest_events) = network.endpoint();
    guest.connect(host_id, Duration::from_secs(2))?;
    assert_eq!(
        guest_events.recv().await,
        Some(TransportEvent::PeerConnected { peer: host_id })
    );
    wait_for(&mut host_states, |s| s.phase == SessionPhase::Connected).await?;

    guest.send(b"{\"hand\":\"spock\"}".to_vec())?;

    let result = tokio::time::timeout(Duration::from_secs(5), host_task).await??;
    assert!(matches!(result, Err(SessionError::Wire(_))));
    Ok(())
}

#[tokio::test]
async fn test_malformed_payload_ignored_by_default() -> Result<()> {
    init_logging();
    let network = MemoryNetwork::new();
    let (host_transport, host_events) = network.endpoint();
    let host_id = host_transport.local_peer_id();

    let (host, mut host_states, _host_task) =
        spawn_session(host_transport, host_events, CoordinatorSettings::default());
    host.host().await?;

    let (mut guest, mut guest_events) = network.endpoint();
    guest.connect(host_id, Duration::from_secs(2))?;
    assert!(matches!(guest_events.recv().await, Some(TransportEvent::PeerConnected { .. })));
    wait_for(&mut host_states, |s| s.phase == SessionPhase::Connected).await?;

    guest.send(b"garbage".to_vec())?;
    guest.send(Move::Scissors.to_payload()?)?;

    let state = wait_for(&mut host_states, |s| s.remote_move.is_set()).await?;
    assert_eq!(state.remote_move, Move::Scissors);
    assert!(!host.is_closed());
    Ok(())
}

#[tokio::test]
async fn test_busy_host_declines_second_guest() -> Result<()> {
    init_logging();
    let network = MemoryNetwork::new();
    let (host_transport, host_events) = network.endpoint();
    let host_id = host_transport.local_peer_id();

    let (host, mut host_states, _host_task) =
        spawn_session(host_transport, host_events, CoordinatorSettings::default());
    host.host().await?;

    let (mut first, mut first_events) = network.endpoint();
    let (mut second, mut second_events) = network.endpoint();

    // The second guest catches the advertisement before the host is taken
    second.scan(INTENT_KEY)?;
    assert_eq!(
        second_events.recv().await,
        Some(TransportEvent::PeerDiscovered { peer: host_id, info: discovery_info(INTENT_KEY) })
    );

    first.connect(host_id, Duration::from_secs(2))?;
    assert!(matches!(first_events.recv().await, Some(TransportEvent::PeerConnected { .. })));
    wait_for(&mut host_states, |s| s.phase == SessionPhase::Connected).await?;

    // Host is no longer advertising, so the invite is refused
    second.connect(host_id, Duration::from_secs(2))?;
    assert_eq!(
        second_events.recv().await,
        Some(TransportEvent::ConnectRejected { peer: host_id })
    );
    Ok(())
}
