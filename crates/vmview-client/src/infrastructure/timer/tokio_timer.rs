//! Tokio-backed retry timer.
//!
//! Each armed ticket gets its own sleeping task.  When the sleep finishes the
//! task sends the ticket on an `mpsc` channel that the runtime loop selects
//! on; the loop then calls `ViewerSession::retry_due`.  Disarming aborts the
//! task.  An expiry that was already queued before the abort is harmless: the
//! backoff controller ignores tickets that are no longer pending.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;
use vmview_core::{RetryTicket, RetryTimer};

/// Retry timer that sleeps on the tokio runtime.
///
/// `arm` must be called from within a tokio runtime.
pub struct TokioRetryTimer {
    expired: mpsc::UnboundedSender<RetryTicket>,
    tasks: HashMap<RetryTicket, JoinHandle<()>>,
}

impl TokioRetryTimer {
    /// Creates a timer and the receiver on which expired tickets arrive.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<RetryTicket>) {
        let (expired, rx) = mpsc::unbounded_channel();
        (Self { expired, tasks: HashMap::new() }, rx)
    }

    /// Number of timers still sleeping.
    pub fn armed_count(&self) -> usize {
        self.tasks.values().filter(|task| !task.is_finished()).count()
    }
}

impl RetryTimer for TokioRetryTimer {
    fn arm(&mut self, ticket: RetryTicket, delay: Duration) {
        self.tasks.retain(|_, task| !task.is_finished());
        let expired = self.expired.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if expired.send(ticket).is_err() {
                debug!(ticket = ticket.get(), "retry expired after the event loop stopped");
            }
        });
        self.tasks.insert(ticket, task);
    }

    fn disarm(&mut self, ticket: RetryTicket) {
        if let Some(task) = self.tasks.remove(&ticket) {
            task.abort();
        }
    }
}

impl Drop for TokioRetryTimer {
    fn drop(&mut self) {
        for (_, task) in self.tasks.drain() {
            task.abort();
        }
    }
}
