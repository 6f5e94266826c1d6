//! Transport resolution.
//!
//! The session never opens sockets.  It raises `TransportRequested(token)` and
//! waits; the runtime hands the token to a [`TransportResolver`], and the
//! resolver's answer is fed back through `provide_transport`.
//!
//! # Async resolution (for beginners)
//!
//! Resolving a transport may take a while (TCP connect, tunnel setup).  The
//! runtime therefore runs every resolution in its own tokio task and sends
//! the answer back to the event loop as a message.  Meanwhile the loop keeps
//! processing other events, including a user `disconnect`.  The session
//! recognises late answers by their generation and closes them.
//!
//! ```text
//! event loop                 resolver task
//! ──────────                 ─────────────
//! TransportRequested ──────► resolve(token).await
//!   … other events …              │
//! provide_transport ◄─────────────┘ (token, Option<transport>)
//! ```

pub mod socket;

use async_trait::async_trait;
use vmview_core::TransportToken;

pub use self::socket::{Endpoint, SocketTransport, SocketTransportResolver, TransportError};

/// Obtains transports on the host's behalf.
///
/// Every call must complete; `None` means no transport could be obtained.
#[async_trait]
pub trait TransportResolver: Send + Sync + 'static {
    /// The handle handed to the display backend.
    type Transport: Send + 'static;

    /// Resolves one transport request.
    async fn resolve(&self, token: TransportToken) -> Option<Self::Transport>;
}
