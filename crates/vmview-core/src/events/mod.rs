//! Events crossing the controller boundary.
//!
//! - [`ViewerEvent`]: outbound, from the session to the host, in the order the
//!   session raised them.
//! - [`BackendEvent`]: inbound, from a display backend to the session, always
//!   wrapped in [`Stamped`] so the session can discard stale ones.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::channel::{ChannelId, ChannelKind, ChannelSignal};
use crate::domain::session::Generation;
use crate::domain::surface::SurfaceFormat;
use crate::error::ViewerError;

/// Address of one outstanding transport request.
///
/// `channel` is `None` for the single-transport backend.  The host must answer
/// every token exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransportToken {
    pub generation: Generation,
    pub channel: Option<ChannelId>,
}

impl fmt::Display for TransportToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.channel {
            Some(channel) => write!(f, "{}/{}", self.generation, channel),
            None => write!(f, "{}/main", self.generation),
        }
    }
}

/// Which input device a grab refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GrabKind {
    Keyboard,
    Mouse,
}

/// Notifications raised by the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewerEvent {
    /// The host must resolve `token` and answer with `provide_transport`.
    TransportRequested(TransportToken),
    /// The display is showing.
    Connected,
    /// The session ended.
    Disconnected { reason: ViewerError },
    /// The remote desktop changed size.
    Resized { width: u32, height: u32 },
    /// A keyboard or mouse grab was taken or released.
    InputGrabChanged { kind: GrabKind, grabbed: bool },
}

/// Notifications raised by a display backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendEvent {
    /// Simple backend: the remote framebuffer is up.
    Connected,
    /// Simple backend: the remote end closed the connection.
    Disconnected,
    /// The desktop size changed.
    DesktopResized { width: u32, height: u32 },
    /// Multichannel backend: a new channel needs a transport.
    ChannelAnnounced { channel: ChannelId, kind: ChannelKind },
    /// Multichannel backend: open / close / error classification on a channel.
    ChannelSignal { channel: ChannelId, signal: ChannelSignal },
    /// Multichannel backend: the display channel described its surface.
    SurfaceReady { channel: ChannelId, format: SurfaceFormat },
    /// The display widget took or released an input grab.
    GrabChanged { kind: GrabKind, grabbed: bool },
}

/// An event tagged with the generation of the session that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stamped<E> {
    pub generation: Generation,
    pub event: E,
}

impl<E> Stamped<E> {
    pub fn new(generation: Generation, event: E) -> Self {
        Self { generation, event }
    }
}
