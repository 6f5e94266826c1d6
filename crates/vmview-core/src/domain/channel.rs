//! Channel lifecycle for the multichannel display backend.
//!
//! A multichannel session carries several logical sub-streams (main, display,
//! inputs, cursor, audio playback, …), each with its own transport.  The
//! [`ChannelTable`] tracks every channel of one session and the single display
//! channel that gates visibility.
//!
//! # Per-channel state machine
//!
//! ```text
//!              transport bound            ready signal
//! Announced ───────────────────► AwaitingReady ───────────► Ready
//!     │         (display only)         │                      │
//!     │ transport bound (other kinds) ─┼──────────────────────► Ready
//!     │                                │                      │
//!     └──── transport failed / fatal signal / session end ────┴──► TornDown
//! ```
//!
//! Rules enforced here:
//!
//! - A channel whose transport failed is torn down and never re-requested.
//!   Only a new session (new table) creates fresh channels.
//! - The display surface exists only while its channel is the *current*
//!   display channel and has signalled ready.  There is never more than one.
//! - Losing the current display channel escalates to the whole session;
//!   losing any other channel only removes that channel.

use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

use crate::domain::session::Generation;
use crate::domain::surface::{DisplaySurface, SurfaceFormat};

/// Backend-assigned identifier of a channel within one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChannelId(pub u32);

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ch#{}", self.0)
    }
}

/// Type tag of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    Main,
    Display,
    Inputs,
    Cursor,
    Playback,
    Record,
    Other,
}

impl ChannelKind {
    /// Returns `true` for the channel type that carries the guest screen.
    pub fn is_display(self) -> bool {
        self == ChannelKind::Display
    }
}

/// Lifecycle state of one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// Transport requested, awaiting the host's answer.
    Announced,
    /// Display channel with a bound transport, waiting for the surface format.
    AwaitingReady,
    /// Usable.
    Ready,
    /// Closed; never comes back.
    TornDown,
}

/// Transport binding of one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportBinding {
    /// Requested, not yet answered.
    Pending,
    /// Handed to the backend.
    Bound,
    /// The host could not supply one.
    Failed,
}

/// Channel events issued by the backend library.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelSignal {
    Opened,
    Closed,
    ErrorAuth,
    ErrorConnect,
    ErrorIo,
    ErrorLink,
    ErrorTls,
}

impl ChannelSignal {
    /// Returns `true` for every classification that ends the channel.
    pub fn is_fatal(self) -> bool {
        !matches!(self, ChannelSignal::Opened)
    }
}

impl fmt::Display for ChannelSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ChannelSignal::Opened => "opened",
            ChannelSignal::Closed => "closed",
            ChannelSignal::ErrorAuth => "authentication error",
            ChannelSignal::ErrorConnect => "connect error",
            ChannelSignal::ErrorIo => "I/O error",
            ChannelSignal::ErrorLink => "link error",
            ChannelSignal::ErrorTls => "TLS error",
        };
        f.write_str(text)
    }
}

/// Errors raised by [`ChannelTable`] lookups.
///
/// All of them mean the caller referenced a channel that can no longer be
/// acted upon; the session treats them as stale events.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChannelError {
    /// The channel was never announced in this session.
    #[error("unknown channel {0}")]
    UnknownChannel(ChannelId),
    /// The channel id was announced twice.
    #[error("channel {0} announced twice")]
    AlreadyAnnounced(ChannelId),
    /// The channel already has a transport.
    #[error("channel {0} already has a transport")]
    AlreadyBound(ChannelId),
    /// The channel's transport failed or the channel was torn down.
    #[error("channel {0} is torn down")]
    TornDown(ChannelId),
}

/// One logical channel of a multichannel session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    pub id: ChannelId,
    pub kind: ChannelKind,
    pub state: ChannelState,
    pub transport: TransportBinding,
    /// Session that announced the channel.
    pub generation: Generation,
}

impl Channel {
    /// Returns `true` until the channel is torn down.
    pub fn is_alive(&self) -> bool {
        self.state != ChannelState::TornDown
    }
}

/// Result of announcing a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Announcement {
    /// A new non-display channel, or the first display channel.
    Added,
    /// A display channel that replaced the previous current one.
    ReplacedDisplay {
        previous: ChannelId,
        surface_destroyed: bool,
    },
}

/// Result of binding a transport to a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindOutcome {
    /// Non-display channel: immediately usable.
    Usable,
    /// Display channel: waiting for the ready signal.
    AwaitingReady,
}

/// How far a channel failure reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureScope {
    /// Only the channel is gone.
    Channel,
    /// The current display channel is gone; the session must end.
    Session,
}

/// Result of a ready signal on a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadyOutcome {
    /// The surface was created.
    Created(DisplaySurface),
    /// The surface already exists for this channel.
    AlreadyShowing,
    /// The channel is not the current display channel or has no transport yet.
    Ignored,
}

/// All channels of one multichannel session.
#[derive(Debug)]
pub struct ChannelTable {
    generation: Generation,
    channels: BTreeMap<ChannelId, Channel>,
    display: Option<ChannelId>,
    surface: Option<DisplaySurface>,
}

impl ChannelTable {
    /// Creates an empty table for the session `generation`.
    pub fn new(generation: Generation) -> Self {
        Self {
            generation,
            channels: BTreeMap::new(),
            display: None,
            surface: None,
        }
    }

    /// The session this table belongs to.
    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Records a new channel in `Announced` state.
    ///
    /// A display channel becomes the current display channel, replacing (and
    /// destroying the surface of) any previous one.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::AlreadyAnnounced`] if `id` is already known.
    pub fn announce(&mut self, id: ChannelId, kind: ChannelKind) -> Result<Announcement, ChannelError> {
        if self.channels.contains_key(&id) {
            return Err(ChannelError::AlreadyAnnounced(id));
        }
        self.channels.insert(
            id,
            Channel {
                id,
                kind,
                state: ChannelState::Announced,
                transport: TransportBinding::Pending,
                generation: self.generation,
            },
        );

        if !kind.is_display() {
            return Ok(Announcement::Added);
        }
        match self.display.replace(id) {
            Some(previous) => {
                let surface_destroyed = self.surface.take().is_some();
                Ok(Announcement::ReplacedDisplay { previous, surface_destroyed })
            }
            None => Ok(Announcement::Added),
        }
    }

    /// Marks the channel's transport as handed to the backend.
    ///
    /// # Errors
    ///
    /// [`ChannelError::UnknownChannel`], [`ChannelError::TornDown`] or
    /// [`ChannelError::AlreadyBound`] when the channel cannot take a transport.
    pub fn bind(&mut self, id: ChannelId) -> Result<BindOutcome, ChannelError> {
        let channel = self.live_channel_mut(id)?;
        if channel.transport != TransportBinding::Pending {
            return Err(ChannelError::AlreadyBound(id));
        }
        channel.transport = TransportBinding::Bound;
        if channel.kind.is_display() {
            channel.state = ChannelState::AwaitingReady;
            Ok(BindOutcome::AwaitingReady)
        } else {
            channel.state = ChannelState::Ready;
            Ok(BindOutcome::Usable)
        }
    }

    /// Records that no transport could be supplied and tears the channel down.
    ///
    /// # Errors
    ///
    /// [`ChannelError::UnknownChannel`] or [`ChannelError::TornDown`].
    pub fn fail_transport(&mut self, id: ChannelId) -> Result<FailureScope, ChannelError> {
        let channel = self.live_channel_mut(id)?;
        channel.transport = TransportBinding::Failed;
        Ok(self.tear_down(id))
    }

    /// Applies a backend channel signal.
    ///
    /// Returns `None` for non-fatal signals and the failure scope for fatal
    /// ones.
    ///
    /// # Errors
    ///
    /// [`ChannelError::UnknownChannel`] or [`ChannelError::TornDown`].
    pub fn signal(&mut self, id: ChannelId, signal: ChannelSignal) -> Result<Option<FailureScope>, ChannelError> {
        self.live_channel_mut(id)?;
        if !signal.is_fatal() {
            return Ok(None);
        }
        Ok(Some(self.tear_down(id)))
    }

    /// Applies the ready signal that describes the display surface.
    ///
    /// This is the only way a surface comes into existence.
    ///
    /// # Errors
    ///
    /// [`ChannelError::UnknownChannel`] or [`ChannelError::TornDown`].
    pub fn surface_ready(&mut self, id: ChannelId, format: SurfaceFormat) -> Result<ReadyOutcome, ChannelError> {
        let is_current = self.display == Some(id);
        let channel = self.live_channel_mut(id)?;
        if !is_current {
            return Ok(ReadyOutcome::Ignored);
        }
        let state = channel.state;
        match state {
            ChannelState::AwaitingReady => {
                channel.state = ChannelState::Ready;
                let surface = DisplaySurface { channel: Some(id), format: Some(format) };
                self.surface = Some(surface.clone());
                Ok(ReadyOutcome::Created(surface))
            }
            ChannelState::Ready => Ok(ReadyOutcome::AlreadyShowing),
            ChannelState::Announced | ChannelState::TornDown => Ok(ReadyOutcome::Ignored),
        }
    }

    /// Tears down every live channel and destroys the surface.
    ///
    /// Returns the number of channels that were still alive.
    pub fn teardown_all(&mut self) -> usize {
        let mut closed = 0;
        for channel in self.channels.values_mut().filter(|c| c.is_alive()) {
            channel.state = ChannelState::TornDown;
            closed += 1;
        }
        self.surface = None;
        self.display = None;
        closed
    }

    /// The surface, if the current display channel is ready.
    pub fn surface(&self) -> Option<&DisplaySurface> {
        self.surface.as_ref()
    }

    /// The current display channel.
    pub fn display_channel(&self) -> Option<ChannelId> {
        self.display
    }

    /// Looks up a channel.
    pub fn get(&self, id: ChannelId) -> Option<&Channel> {
        self.channels.get(&id)
    }

    /// Iterates over all channels (live and torn down) in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Channel> {
        self.channels.values()
    }

    /// Number of channels not yet torn down.
    pub fn live_count(&self) -> usize {
        self.channels.values().filter(|c| c.is_alive()).count()
    }

    /// Returns `true` when the surface invariant holds: a surface exists only
    /// for the current, ready display channel.
    pub fn surface_invariant_holds(&self) -> bool {
        match &self.surface {
            None => true,
            Some(surface) => {
                surface.channel.is_some()
                    && surface.channel == self.display
                    && surface
                        .channel
                        .and_then(|id| self.channels.get(&id))
                        .is_some_and(|c| c.state == ChannelState::Ready)
            }
        }
    }

    fn live_channel_mut(&mut self, id: ChannelId) -> Result<&mut Channel, ChannelError> {
        let channel = self.channels.get_mut(&id).ok_or(ChannelError::UnknownChannel(id))?;
        if !channel.is_alive() {
            return Err(ChannelError::TornDown(id));
        }
        Ok(channel)
    }

    fn tear_down(&mut self, id: ChannelId) -> FailureScope {
        if let Some(channel) = self.channels.get_mut(&id) {
            channel.state = ChannelState::TornDown;
        }
        if self.display == Some(id) {
            self.surface = None;
            FailureScope::Session
        } else {
            FailureScope::Channel
        }
    }
}
