//! Why a session ended.
//!
//! No failure inside the controller is process-fatal.  Every failure resolves
//! to a `Disconnected` event carrying one of these values, plus (optionally) a
//! scheduled retry.  Presenting the error to a user is the host's job.

use thiserror::Error;

use crate::domain::channel::{ChannelId, ChannelSignal};

/// Reason carried by [`ViewerEvent::Disconnected`](crate::events::ViewerEvent::Disconnected).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ViewerError {
    /// The host could not supply a transport for the simple backend or the
    /// display channel, or the backend refused the one supplied.
    #[error("no transport available for the display")]
    TransportUnavailable,

    /// The backend reported a fatal condition on the display channel.
    #[error("display channel {channel} failed: {signal}")]
    ChannelFatal {
        channel: ChannelId,
        signal: ChannelSignal,
    },

    /// An event referenced a session or channel that is no longer current.
    ///
    /// Never surfaced to the host; used internally to classify discards.
    #[error("event refers to a stale session or channel")]
    StaleEvent,

    /// The user asked to disconnect.  No retry follows.
    #[error("disconnected by user")]
    UserInitiatedDisconnect,

    /// The backend refused to open a session.
    #[error("backend refused to open a session: {0}")]
    BackendRejected(String),

    /// The remote end of the simple backend closed the connection.
    #[error("remote display closed the connection")]
    RemoteClosed,
}

impl ViewerError {
    /// Returns `true` when the failure may be followed by an automatic retry.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ViewerError::UserInitiatedDisconnect | ViewerError::StaleEvent)
    }
}
