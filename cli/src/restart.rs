// SPDX-License-Identifier: MIT OR Apache-2.0

//! Delayed automatic restart of a resolved round
//!
//! Feed every snapshot to `RestartTimer::on_snapshot`. A resolved snapshot
//! schedules `start_new_game` on the session after the delay; any later
//! snapshot that is not resolved cancels it, and so does a newer schedule.

use rps_core::MatchState;
use rps_network::SessionHandle;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Delay between showing a result and clearing the board
pub const DEFAULT_RESTART_DELAY: Duration = Duration::from_secs(3);

pub struct RestartTimer {
    session: SessionHandle,
    delay: Duration,
    pending: Option<JoinHandle<()>>,
}

impl RestartTimer {
    pub fn new(session: SessionHandle, delay: Duration) -> Self {
        Self {
            session,
            delay,
            pending: None,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// React to a snapshot from the session
    pub fn on_snapshot(&mut self, state: &MatchState) {
        if state.show_result() {
            self.schedule();
        } else {
            self.cancel();
        }
    }

    /// Schedule a restart, replacing any pending one
    pub fn schedule(&mut self) {
        self.cancel();

        let session = self.session.clone();
        let delay = self.delay;
        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            debug!("Starting new round");
            if let Err(e) = session.start_new_game().await {
                warn!("Unable to restart round: {}", e);
            }
        }));
    }

    /// Abort the pending restart, if any
    pub fn cancel(&mut self) {
        if let Some(task) = self.pending.take() {
            if !task.is_finished() {
                debug!("Cancelled pending restart");
            }
            task.abort();
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.as_ref().map_or(false, |task| !task.is_finished())
    }
}

impl Drop for RestartTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}
