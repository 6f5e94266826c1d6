//! Reconnect backoff: the wait schedule and the controller that walks it.
//!
//! The controller never looks at whether an attempt succeeded.  The session
//! layer reports outcomes explicitly:
//!
//! - success → [`BackoffController::reset`]
//! - failure while reconnection is wanted → [`BackoffController::attempt`]
//!
//! ```text
//! reset()   attempt()   attempt()   attempt()   attempt()   attempt()
//!   │          │           │           │           │           │
//! cursor=0   now        +1s (c=1)   +2s (c=2)   +5s (c=3)   +10s (c=4) …
//! ```
//!
//! Waiting is delegated to a [`RetryTimer`] so the controller is independent of
//! any particular event loop.  Each armed timer is identified by a
//! [`RetryTicket`]; an expiry carrying any ticket other than the pending one is
//! ignored, which makes cancellation race-free even when the timer task has
//! already posted its expiry.

use std::time::Duration;

use thiserror::Error;
use tracing::debug;

/// Errors raised when building a [`BackoffSchedule`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScheduleError {
    /// A schedule needs at least one delay to saturate at.
    #[error("backoff schedule must contain at least one delay")]
    Empty,
}

/// Ordered wait durations between reconnect attempts.
///
/// Lookups past the end saturate at the last entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffSchedule {
    delays: Vec<Duration>,
}

impl BackoffSchedule {
    /// The standard schedule: 1 s, 2 s, 5 s, then 10 s forever.
    pub const DEFAULT_MS: [u64; 4] = [1000, 2000, 5000, 10000];

    /// Builds a schedule from explicit delays.
    ///
    /// # Errors
    ///
    /// Returns [`ScheduleError::Empty`] if `delays` is empty.
    pub fn new(delays: Vec<Duration>) -> Result<Self, ScheduleError> {
        if delays.is_empty() {
            return Err(ScheduleError::Empty);
        }
        Ok(Self { delays })
    }

    /// Builds a schedule from millisecond values.
    ///
    /// # Errors
    ///
    /// Returns [`ScheduleError::Empty`] if `millis` is empty.
    pub fn from_millis(millis: &[u64]) -> Result<Self, ScheduleError> {
        Self::new(millis.iter().copied().map(Duration::from_millis).collect())
    }

    /// Returns the wait for the given cursor position.
    pub fn delay_for(&self, cursor: usize) -> Duration {
        let last = self.delays.len() - 1;
        self.delays[cursor.min(last)]
    }

    /// Returns all configured delays.
    pub fn delays(&self) -> &[Duration] {
        &self.delays
    }
}

impl Default for BackoffSchedule {
    fn default() -> Self {
        Self {
            delays: Self::DEFAULT_MS.iter().copied().map(Duration::from_millis).collect(),
        }
    }
}

/// Identity of one armed retry timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RetryTicket(u64);

impl RetryTicket {
    /// Returns the raw ticket number (for logging).
    pub fn get(self) -> u64 {
        self.0
    }
}

/// A schedulable delayed task.
///
/// Implementations arrange for [`BackoffController::fire`] to be called with
/// `ticket` once `delay` has elapsed, on the same loop that owns the
/// controller.
#[cfg_attr(test, mockall::automock)]
pub trait RetryTimer {
    /// Starts a timer that expires after `delay`.
    fn arm(&mut self, ticket: RetryTicket, delay: Duration);

    /// Cancels a previously armed timer.  Cancelling an expired or unknown
    /// ticket is a no-op.
    fn disarm(&mut self, ticket: RetryTicket);
}

/// What the caller must do after [`BackoffController::attempt`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempt {
    /// Run the retry now.
    Immediate,
    /// A timer was armed; run the retry when `ticket` fires.
    Scheduled { ticket: RetryTicket, delay: Duration },
}

/// Spaces out reconnect attempts according to a [`BackoffSchedule`].
///
/// There is no retry limit: attempts continue until [`reset`](Self::reset) or
/// until the controller is dropped.  At most one timer is armed at a time.
pub struct BackoffController<T: RetryTimer> {
    schedule: BackoffSchedule,
    timer: T,
    cursor: usize,
    immediate_used: bool,
    pending: Option<RetryTicket>,
    next_ticket: u64,
}

impl<T: RetryTimer> BackoffController<T> {
    /// Creates a controller at cursor 0 whose next attempt is immediate.
    pub fn new(schedule: BackoffSchedule, timer: T) -> Self {
        Self {
            schedule,
            timer,
            cursor: 0,
            immediate_used: false,
            pending: None,
            next_ticket: 0,
        }
    }

    /// Zeroes the cursor and cancels any pending timer.
    ///
    /// The next [`attempt`](Self::attempt) after a reset is immediate again.
    pub fn reset(&mut self) {
        self.cursor = 0;
        self.immediate_used = false;
        if let Some(ticket) = self.pending.take() {
            debug!(ticket = ticket.get(), "backoff reset; cancelling pending retry");
            self.timer.disarm(ticket);
        }
    }

    /// Requests another attempt.
    ///
    /// The first call after construction or [`reset`](Self::reset) returns
    /// [`Attempt::Immediate`] and leaves the cursor alone.  Every later call
    /// arms a timer for `schedule[min(cursor, len - 1)]` and advances the
    /// cursor.  An already pending timer is replaced.
    pub fn attempt(&mut self) -> Attempt {
        if !self.immediate_used {
            self.immediate_used = true;
            debug!("backoff: immediate attempt");
            return Attempt::Immediate;
        }

        if let Some(previous) = self.pending.take() {
            self.timer.disarm(previous);
        }

        let delay = self.schedule.delay_for(self.cursor);
        self.cursor = self.cursor.saturating_add(1);
        self.next_ticket += 1;
        let ticket = RetryTicket(self.next_ticket);
        self.pending = Some(ticket);
        self.timer.arm(ticket, delay);
        debug!(ticket = ticket.get(), ?delay, cursor = self.cursor, "backoff: retry scheduled");
        Attempt::Scheduled { ticket, delay }
    }

    /// Reports a timer expiry.
    ///
    /// Returns `true` when `ticket` is the pending timer, meaning the retry
    /// should run now.  Expiries for cancelled or replaced timers return
    /// `false`.
    pub fn fire(&mut self, ticket: RetryTicket) -> bool {
        if self.pending == Some(ticket) {
            self.pending = None;
            true
        } else {
            debug!(ticket = ticket.get(), "ignoring expiry of stale retry timer");
            false
        }
    }

    /// Current cursor position (number of scheduled waits since the last reset).
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// The ticket of the armed timer, if any.
    pub fn pending(&self) -> Option<RetryTicket> {
        self.pending
    }

    /// The schedule this controller walks.
    pub fn schedule(&self) -> &BackoffSchedule {
        &self.schedule
    }

    /// Shared access to the timer (used by tests to inspect recorded calls).
    pub fn timer(&self) -> &T {
        &self.timer
    }
}
