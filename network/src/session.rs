// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session driver task
//!
//! The coordinator lives inside one tokio task. User intents arrive as
//! commands from any number of `SessionHandle`s and transport events
//! arrive on their own channel; both are drained by a single `select!`
//! loop, so no two handlers ever interleave.

use crate::coordinator::{CoordinatorSettings, SessionCoordinator, SessionError};
use crate::transport::{Transport, TransportEvent};
use rps_core::{MatchState, Move};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{error, info, warn, Instrument};

type Reply = oneshot::Sender<Result<(), SessionError>>;

#[derive(Debug)]
enum Command {
    Host(Reply),
    Join(Reply),
    SubmitMove(Move, Reply),
    StartNewGame(Reply),
    Snapshot(oneshot::Sender<MatchState>),
}

/// Cloneable handle used by the presentation layer
#[derive(Debug, Clone)]
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<Command>,
}

impl SessionHandle {
    /// Start hosting; fails with `InvalidState` unless idle
    pub async fn host(&self) -> Result<(), SessionError> {
        self.request(Command::Host).await
    }

    /// Start joining; fails with `InvalidState` unless idle
    pub async fn join(&self) -> Result<(), SessionError> {
        self.request(Command::Join).await
    }

    pub async fn submit_move(&self, mv: Move) -> Result<(), SessionError> {
        self.request(|reply| Command::SubmitMove(mv, reply)).await
    }

    pub async fn start_new_game(&self) -> Result<(), SessionError> {
        self.request(Command::StartNewGame).await
    }

    /// Current state without waiting for a notification
    pub async fn snapshot(&self) -> Result<MatchState, SessionError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(Command::Snapshot(tx))
            .map_err(|_| SessionError::SessionClosed)?;
        rx.await.map_err(|_| SessionError::SessionClosed)
    }

    /// Whether the session task is still running
    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }

    async fn request<F>(&self, make: F) -> Result<(), SessionError>
    where
        F: FnOnce(Reply) -> Command,
    {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(make(tx))
            .map_err(|_| SessionError::SessionClosed)?;
        rx.await.map_err(|_| SessionError::SessionClosed)?
    }
}

/// Move a coordinator over `transport` into its own task
///
/// Returns the command handle, the ordered snapshot stream and the task
/// handle. The task ends when every handle is dropped, when the transport
/// event stream closes, or with an error after a fatal failure.
pub fn spawn_session<T>(
    transport: T,
    events: mpsc::UnboundedReceiver<TransportEvent>,
    settings: CoordinatorSettings,
) -> (
    SessionHandle,
    mpsc::UnboundedReceiver<MatchState>,
    JoinHandle<Result<(), SessionError>>,
)
where
    T: Transport + 'static,
{
    let (coordinator, snapshots) = SessionCoordinator::new(transport, settings);
    let (commands_tx, commands_rx) = mpsc::unbounded_channel();

    let span = tracing::info_span!("session", peer_id = %coordinator.local_peer_id());
    let task = tokio::spawn(run(coordinator, events, commands_rx).instrument(span));

    (SessionHandle { commands: commands_tx }, snapshots, task)
}

async fn run<T: Transport>(
    mut coordinator: SessionCoordinator<T>,
    mut events: mpsc::UnboundedReceiver<TransportEvent>,
    mut commands: mpsc::UnboundedReceiver<Command>,
) -> Result<(), SessionError> {
    info!("Session started");

    loop {
        tokio::select! {
            command = commands.recv() => {
                let Some(command) = command else {
                    info!("All session handles dropped, stopping");
                    return Ok(());
                };
                apply(&mut coordinator, command)?;
            }

            event = events.recv() => {
                let Some(event) = event else {
                    warn!("Transport event stream closed, stopping");
                    return Ok(());
                };
                if let Err(e) = coordinator.handle_event(event) {
                    if e.is_fatal() {
                        error!("Fatal session error: {}", e);
                        return Err(e);
                    }
                    warn!("Session error: {}", e);
                }
            }
        }
    }
}

/// Run one user command and reply to its caller
fn apply<T: Transport>(coordinator: &mut SessionCoordinator<T>, command: Command) -> Result<(), SessionError> {
    let (result, reply) = match command {
        Command::Host(reply) => (coordinator.host(), reply),
        Command::Join(reply) => (coordinator.join(), reply),
        Command::SubmitMove(mv, reply) => (coordinator.submit_move(mv), reply),
        Command::StartNewGame(reply) => {
            coordinator.start_new_game();
            (Ok(()), reply)
        }
        Command::Snapshot(reply) => {
            let _ = reply.send(coordinator.state());
            return Ok(());
        }
    };

    let fatal = match &result {
        Err(e) if e.is_fatal() => Some(e.to_string()),
        _ => None,
    };

    // The caller may have stopped waiting
    let _ = reply.send(result);

    match fatal {
        Some(reason) => {
            error!("Fatal session error: {}", reason);
            Err(SessionError::Aborted(reason))
        }
        None => Ok(()),
    }
}
