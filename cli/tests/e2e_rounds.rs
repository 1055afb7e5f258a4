// End-to-end test: 2 players, scripted hands, auto-restart between rounds
use anyhow::{anyhow, Result};
use rps_cli::{render_state, RestartTimer};
use rps_core::{MatchState, Move, SessionPhase};
use rps_network::{spawn_session, CoordinatorSettings, MemoryNetwork};
use tokio::sync::mpsc;
use tokio::time::{timeout, Duration};

async fn next_where<F>(states: &mut mpsc::UnboundedReceiver<MatchState>, pred: F) -> Result<MatchState>
where
    F: Fn(&MatchState) -> bool,
{
    loop {
        let state = timeout(Duration::from_secs(10), states.recv())
            .await?
            .ok_or_else(|| anyhow!("session ended"))?;
        if pred(&state) {
            return Ok(state);
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_e2e_scripted_rounds() -> Result<()> {
    let rounds = [
        (Move::Rock, Move::Scissors, "You win!", "You lose."),
        (Move::Paper, Move::Scissors, "You lose.", "You win!"),
        (Move::Scissors, Move::Scissors, "Draw.", "Draw."),
    ];

    let network = MemoryNetwork::new();
    let (host_transport, host_events) = network.endpoint();
    let (guest_transport, guest_events) = network.endpoint();
    let (host, mut host_states, _) = spawn_session(host_transport, host_events, CoordinatorSettings::default());
    let (guest, mut guest_states, _) = spawn_session(guest_transport, guest_events, CoordinatorSettings::default());

    host.host().await?;
    guest.join().await?;
    let connected = next_where(&mut host_states, |s| s.phase == SessionPhase::Connected).await?;
    assert!(render_state(&connected).contains("Opponent: thinking..."));
    next_where(&mut guest_states, |s| s.phase == SessionPhase::Connected).await?;

    let mut host_restart = RestartTimer::new(host.clone(), Duration::from_secs(3));
    let mut guest_restart = RestartTimer::new(guest.clone(), Duration::from_secs(3));

    for (host_move, guest_move, host_text, guest_text) in rounds {
        guest.submit_move(guest_move).await?;
        let hinted = next_where(&mut host_states, |s| s.remote_move.is_set()).await?;
        assert!(render_state(&hinted).contains("Opponent: ready"));

        host.submit_move(host_move).await?;
        let host_state = next_where(&mut host_states, |s| s.resolved()).await?;
        let guest_state = next_where(&mut guest_states, |s| s.resolved()).await?;
        assert!(render_state(&host_state).contains(host_text));
        assert!(render_state(&guest_state).contains(guest_text));

        // Both sides see the same round from opposite ends
        assert_eq!(host_state.local_move, guest_state.remote_move);
        assert_eq!(host_state.remote_move, guest_state.local_move);

        host_restart.on_snapshot(&host_state);
        guest_restart.on_snapshot(&guest_state);
        next_where(&mut host_states, |s| !s.resolved() && !s.lock_input()).await?;
        next_where(&mut guest_states, |s| !s.resolved() && !s.lock_input()).await?;
    }

    assert_eq!(host.snapshot().await?, MatchState { phase: SessionPhase::Connected, ..MatchState::new() });
    Ok(())
}
