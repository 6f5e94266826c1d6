//! The display backend seam.
//!
//! The session controller drives one of two interchangeable display
//! libraries.  Both are reached through [`DisplayBackend`]; the only
//! behavioural difference the controller knows about is
//! [`BackendKind`]: single-transport or multichannel.
//!
//! # Event flow (for beginners)
//!
//! Calls go *into* the backend through this trait.  Notifications come *out*
//! of it as [`BackendEvent`](vmview_core::BackendEvent)s stamped with the
//! generation passed to [`DisplayBackend::open`], delivered on the same loop
//! that owns the session.  The backend never calls the session directly, so
//! there are no re-entrant callbacks to worry about.
//!
//! ```text
//!             open / bind_transport / teardown
//! ViewerSession ─────────────────────────────────► DisplayBackend
//!       ▲                                               │
//!       └──────── Stamped<BackendEvent> (mpsc) ◄────────┘
//! ```

use thiserror::Error;
use vmview_core::{BackendKind, ChannelId, Credential, Frame, Generation};

/// Error type for backend session start-up.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BackendError {
    /// The backend refused to open a session.
    #[error("failed to open display session: {0}")]
    Open(String),
}

/// A transport the backend refused to take ownership of.
///
/// Ownership returns to the caller, which is then responsible for closing it.
#[derive(Debug)]
pub struct Rejected<T> {
    pub transport: T,
    pub reason: String,
}

/// One remote display library.
///
/// Implementations own every transport they accept and close all of them in
/// [`teardown`](Self::teardown).
pub trait DisplayBackend {
    /// The OS-level I/O handle the backend speaks its protocol over.
    type Transport;

    /// Which family of protocol this backend speaks.
    fn kind(&self) -> BackendKind;

    /// Starts a new session.
    ///
    /// Every event the backend raises for this session must carry
    /// `generation`.  A multichannel backend announces its channels through
    /// `ChannelAnnounced` events after this returns.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] if the session cannot be started at all.
    fn open(&mut self, generation: Generation, credential: &Credential) -> Result<(), BackendError>;

    /// Hands a transport to the backend.
    ///
    /// `channel` is `None` for the single-transport backend.
    ///
    /// # Errors
    ///
    /// Returns the transport inside [`Rejected`] if the backend will not use it.
    fn bind_transport(
        &mut self,
        channel: Option<ChannelId>,
        transport: Self::Transport,
    ) -> Result<(), Rejected<Self::Transport>>;

    /// Captures the currently rendered screen, if any.
    fn capture_frame(&self) -> Option<Frame>;

    /// Closes every channel and transport of the current session.
    ///
    /// Must be safe to call when no session is open.
    fn teardown(&mut self);
}
