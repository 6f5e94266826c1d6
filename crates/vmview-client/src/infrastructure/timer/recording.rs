//! Recording retry timer for tests.
//!
//! Nothing ever expires on its own.  Tests read the armed tickets and call
//! `retry_due` themselves, which makes backoff sequences deterministic.

use std::time::Duration;

use vmview_core::{RetryTicket, RetryTimer};

/// A [`RetryTimer`] that only records calls.
#[derive(Debug, Default)]
pub struct RecordingRetryTimer {
    /// Every `(ticket, delay)` passed to `arm`, in order.
    pub armed: Vec<(RetryTicket, Duration)>,
    /// Every ticket passed to `disarm`, in order.
    pub disarmed: Vec<RetryTicket>,
}

impl RecordingRetryTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// The most recently armed ticket.
    pub fn last_armed(&self) -> Option<(RetryTicket, Duration)> {
        self.armed.last().copied()
    }

    /// Delays of every armed timer, in order.
    pub fn delays(&self) -> Vec<Duration> {
        self.armed.iter().map(|(_, delay)| *delay).collect()
    }
}

impl RetryTimer for RecordingRetryTimer {
    fn arm(&mut self, ticket: RetryTicket, delay: Duration) {
        self.armed.push((ticket, delay));
    }

    fn disarm(&mut self, ticket: RetryTicket) {
        self.disarmed.push(ticket);
    }
}
