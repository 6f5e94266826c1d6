//! Session identity: generation numbers, session state and the viewer credential.
//!
//! # Why generations? (for beginners)
//!
//! Every connection attempt creates a fresh *session*.  Requests that leave the
//! session (e.g. "please give me a transport for this channel") are answered
//! asynchronously, and the answer can arrive after the user has already
//! disconnected or after a retry has started a newer session.
//!
//! Each session is stamped with a [`Generation`]: a number that only ever goes
//! up.  Every outbound request captures the generation it belongs to and every
//! inbound event carries it back.  Comparing the two numbers is all that is
//! needed to tell a live answer from a stale one.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Identity of one session attempt.
///
/// Generations are totally ordered; a larger value is always a newer session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Generation(u64);

impl Generation {
    /// Returns the raw generation number.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gen#{}", self.0)
    }
}

/// Monotonically increasing source of [`Generation`]s.
///
/// The controller runs on a single cooperative loop, so the counter is a plain
/// integer rather than an atomic.  The first generation handed out is 1.
#[derive(Debug, Default)]
pub struct GenerationCounter {
    current: u64,
}

impl GenerationCounter {
    /// Creates a counter that has not yet issued a generation.
    pub fn new() -> Self {
        Self::default()
    }

    /// Issues the next generation.
    ///
    /// Returns `None` once `u64::MAX` has been issued; the counter never wraps
    /// and never hands out the same generation twice.
    pub fn bump(&mut self) -> Option<Generation> {
        let Some(next) = self.current.checked_add(1) else {
            debug!("generation counter exhausted");
            return None;
        };
        self.current = next;
        Some(Generation(next))
    }

    /// Returns the most recently issued generation, if any.
    pub fn current(&self) -> Option<Generation> {
        (self.current > 0).then_some(Generation(self.current))
    }
}

/// Lifecycle state of the viewer's session as seen by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    /// No session and no reconnect pending (never connected, or the user
    /// disconnected).
    Idle,
    /// A session exists and is waiting for transports or the display.
    Connecting,
    /// The display is showing.
    Connected,
    /// The last session failed; a retry may be pending.
    Disconnected,
}

/// Which family of display backend the viewer drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// One transport, no channels (VNC-style framebuffer protocol).
    Single,
    /// Many logical channels, each with its own transport, one of which is the
    /// display (SPICE-style protocol).
    Multichannel,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Single => f.write_str("single"),
            BackendKind::Multichannel => f.write_str("multichannel"),
        }
    }
}

/// The secret used to authenticate the viewer to the remote display.
///
/// `Debug` output is redacted so credentials never reach the log.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// Wraps a password.
    pub fn password(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// Returns the secret.  Only backends should call this.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}
