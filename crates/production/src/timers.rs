//! Tokio-backed round timer.
//!
//! The pacemaker keeps at most one timer alive. Each arming spawns a task
//! that sleeps for the round timeout and then posts `Event::RoundTimeout`
//! to the runner's timer channel. Re-arming aborts the previous task.

use hotstuff_core::{Event, RoundTimer, TimerTicket};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

pub struct TokioRoundTimer {
    /// The live timer task, if any.
    task: Option<JoinHandle<()>>,
    /// Where expiries are posted.
    event_tx: mpsc::Sender<Event>,
}

impl TokioRoundTimer {
    pub fn new(event_tx: mpsc::Sender<Event>) -> Self {
        Self { task: None, event_tx }
    }

    /// Whether a timer task is armed and has not yet fired.
    pub fn is_armed(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

impl RoundTimer for TokioRoundTimer {
    fn arm(&mut self, ticket: TimerTicket, timeout: Duration) {
        self.cancel();

        let Ok(runtime) = Handle::try_current() else {
            warn!(height = ticket.height, round = ticket.round, "No tokio runtime, round timer not armed");
            return;
        };
        let event_tx = self.event_tx.clone();
        self.task = Some(runtime.spawn(async move {
            tokio::time::sleep(timeout).await;
            trace!(height = ticket.height, round = ticket.round, "Round timer fired");
            if event_tx.send(Event::RoundTimeout(ticket)).await.is_err() {
                debug!("Runner gone, dropping round timeout");
            }
        }));
        trace!(height = ticket.height, round = ticket.round, ?timeout, "Round timer armed");
    }

    fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for TokioRoundTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}
