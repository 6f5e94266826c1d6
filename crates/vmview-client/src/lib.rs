//! vmview-client library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.
//!
//! # What does vmview-client do? (for beginners)
//!
//! VMView shows the screen of a running virtual machine.  The display itself
//! is drawn by a remote display library; this crate decides *when* that
//! library connects, *which* transport it gets and *what happens* when the
//! connection breaks.
//!
//! The client application:
//!
//! 1. Loads its TOML configuration and the command-line overrides.
//! 2. Starts a [`ViewerSession`](application::viewer_session::ViewerSession)
//!    on a single cooperative event loop.
//! 3. Resolves every transport request by connecting to the configured TCP
//!    address or Unix socket.
//! 4. Forwards `Connected`, `Disconnected`, `Resized` and `InputGrabChanged`
//!    to the presentation layer and keeps a status snapshot for it.
//! 5. Reconnects after failures, waiting 1 s, 2 s, 5 s, then 10 s between
//!    attempts, until the user disconnects.

/// Application layer: the session controller and the backend seam.
pub mod application;

/// Infrastructure layer: backends, network, timers, storage and UI bridge.
pub mod infrastructure;
