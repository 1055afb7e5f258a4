// SPDX-License-Identifier: MIT OR Apache-2.0

//! RPS CLI - Command-line front end
//!
//! Hosts or joins a session on the local network and plays rounds typed
//! on stdin. `--role demo` plays two in-process sessions against each
//! other with random moves, no network needed.

use anyhow::{anyhow, Context, Result};
use clap::{Parser, ValueEnum};
use rand::seq::SliceRandom;
use rps_cli::{parse_input, render_state, Input, RestartTimer};
use rps_core::{MatchState, Move, Outcome, SessionPhase};
use rps_network::{
    load_or_default, spawn_session, CoordinatorSettings, MemoryNetwork, SessionConfig, SessionError,
    SwarmTransport, Transport,
};
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::AsyncBufReadExt;
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{debug, info};
use tracing_error::ErrorLayer;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Command-line arguments
#[derive(Parser, Debug)]
#[clap(
    name = "rps-cli",
    about = "Peer-to-peer rock paper scissors",
    version
)]
struct Args {
    /// The role of this instance
    #[clap(short, long, value_enum)]
    role: Role,

    /// Config file (TOML); defaults to the platform config directory
    #[clap(short, long)]
    config: Option<PathBuf>,

    /// Seconds a result stays on screen before the next round starts
    #[clap(long, default_value = "3")]
    restart_delay: f64,

    /// Rounds to play in demo mode
    #[clap(long, default_value = "3")]
    rounds: u32,

    /// Enable debug logging
    #[clap(long)]
    debug: bool,
}

/// Role of this instance
#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
enum Role {
    /// Advertise and wait for an opponent
    Host,
    /// Look for a host and join it
    Join,
    /// Two local players with random moves
    Demo,
}

fn init_logging(debug: bool) -> Result<()> {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(ErrorLayer::default())
        .try_init()
        .context("Failed to install tracing subscriber")
}

/// Main entry point
#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if let Err(e) = init_logging(args.debug) {
        eprintln!("Warning: Failed to initialize logging: {}", e);
    }

    if !args.restart_delay.is_finite() || args.restart_delay < 0.0 {
        return Err(anyhow!("Invalid restart delay: {}", args.restart_delay));
    }
    let restart_delay = Duration::from_secs_f64(args.restart_delay);

    match args.role {
        Role::Host | Role::Join => {
            let config = load_or_default(args.config.as_deref())?;
            run_interactive(args.role == Role::Host, &config, restart_delay).await
        }
        Role::Demo => run_demo(args.rounds, restart_delay).await,
    }
}

/// Play over the local network, reading moves from stdin
async fn run_interactive(hosting: bool, config: &SessionConfig, restart_delay: Duration) -> Result<()> {
    let (transport, events) = SwarmTransport::spawn(config).context("Failed to start network node")?;
    println!("Local peer: {}", transport.local_peer_id());

    let (session, mut states, mut task) = spawn_session(transport, events, CoordinatorSettings::from(config));
    if hosting {
        session.host().await?;
    } else {
        session.join().await?;
    }

    let mut restart = RestartTimer::new(session.clone(), restart_delay);
    let mut current = MatchState::new();
    let mut stdin_lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            _ = signal::ctrl_c() => {
                println!("\nReceived Ctrl+C, shutting down...");
                break;
            }

            state = states.recv() => {
                let Some(state) = state else { break };
                current = state;
                restart.on_snapshot(&state);

                print!("{}", render_state(&state));
                if state.show_result() {
                    println!("Next round in {:?} (or type 'new')", restart.delay());
                }
            }

            result = stdin_lines.next_line() => {
                let line = match result {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(e) => {
                        eprintln!("Error reading input: {}", e);
                        continue;
                    }
                };

                match parse_input(&line) {
                    Ok(Input::Quit) => break,
                    Ok(Input::NewGame) => session.start_new_game().await?,
                    Ok(Input::Play(mv)) => {
                        if current.phase != SessionPhase::Connected {
                            println!("Not connected yet");
                        } else if current.lock_input() {
                            println!("Already played {} this round", current.local_move);
                        } else {
                            match session.submit_move(mv).await {
                                Ok(()) => {}
                                Err(e) if !e.is_fatal() => eprintln!("{}", e),
                                Err(e) => return Err(e.into()),
                            }
                        }
                    }
                    Err(e) => eprintln!("{}", e),
                }
            }

            result = &mut task => {
                return match result {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(e)) => Err(e).context("Session ended"),
                    Err(e) => Err(e).context("Session task failed"),
                };
            }
        }
    }

    restart.cancel();
    Ok(())
}

/// Two sessions over the in-memory transport playing random moves
async fn run_demo(rounds: u32, restart_delay: Duration) -> Result<()> {
    let network = MemoryNetwork::new();
    let (host_transport, host_events) = network.endpoint();
    let (guest_transport, guest_events) = network.endpoint();

    let (host, mut host_states, _host_task) =
        spawn_session(host_transport, host_events, CoordinatorSettings::default());
    let (guest, mut guest_states, _guest_task) =
        spawn_session(guest_transport, guest_events, CoordinatorSettings::default());

    host.host().await?;
    guest.join().await?;
    next_state(&mut host_states, |s| s.phase == SessionPhase::Connected).await?;
    next_state(&mut guest_states, |s| s.phase == SessionPhase::Connected).await?;
    info!("Demo players connected");

    let mut host_restart = RestartTimer::new(host.clone(), restart_delay);
    let mut guest_restart = RestartTimer::new(guest.clone(), restart_delay);
    let (mut host_wins, mut guest_wins, mut draws) = (0u32, 0u32, 0u32);

    for round in 1..=rounds {
        let (host_move, guest_move) = (random_move(), random_move());
        debug!(round, %host_move, %guest_move, "Playing round");

        host.submit_move(host_move).await?;
        guest.submit_move(guest_move).await?;

        let host_state = next_state(&mut host_states, |s| s.resolved()).await?;
        let guest_state = next_state(&mut guest_states, |s| s.resolved()).await?;

        println!("Round {} - host", round);
        print!("{}", render_state(&host_state));
        match host_state.outcome() {
            Some(Outcome::Win) => host_wins += 1,
            Some(Outcome::Lose) => guest_wins += 1,
            _ => draws += 1,
        }

        if round == rounds {
            break;
        }

        host_restart.on_snapshot(&host_state);
        guest_restart.on_snapshot(&guest_state);
        next_state(&mut host_states, |s| !s.lock_input()).await?;
        next_state(&mut guest_states, |s| !s.lock_input()).await?;
    }

    println!(
        "Final score: host {} - guest {} ({} draws)",
        host_wins, guest_wins, draws
    );
    Ok(())
}

fn random_move() -> Move {
    *Move::PLAYABLE
        .choose(&mut rand::thread_rng())
        .unwrap_or(&Move::Rock)
}

async fn next_state<F>(states: &mut mpsc::UnboundedReceiver<MatchState>, pred: F) -> Result<MatchState>
where
    F: Fn(&MatchState) -> bool,
{
    loop {
        let state = states.recv().await.ok_or(SessionError::SessionClosed)?;
        if pred(&state) {
            return Ok(state);
        }
    }
}
