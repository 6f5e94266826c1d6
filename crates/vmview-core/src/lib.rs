//! # vmview-core
//!
//! Shared domain library for VMView, the remote display viewer for running
//! virtual machines.  It contains the reconnect backoff, the pointer-motion
//! shaper, the multichannel lifecycle table and the event and error types the
//! session controller exchanges with its host.
//!
//! It has zero dependencies on OS APIs, display libraries or async runtimes.
//!
//! # Architecture overview (for beginners)
//!
//! A viewer connects to the remote display of a virtual machine through one
//! of two kinds of display library:
//!
//! - a **single** backend that speaks over one transport (VNC-style), and
//! - a **multichannel** backend whose protocol is split into logical channels
//!   (display, inputs, cursor, audio …), each needing its own transport
//!   (SPICE-style).
//!
//! The viewer never opens sockets itself.  It asks the host for a transport,
//! waits for the answer, and hands it to the backend.  Because answers arrive
//! asynchronously, every session is stamped with a [`Generation`] and late
//! answers for an older session are discarded.
//!
//! This crate defines:
//!
//! - **`domain::backoff`** – The reconnect schedule (1 s, 2 s, 5 s, 10 s …)
//!   and the controller that walks it.
//! - **`domain::motion`** – Rate limiting of pointer motion and compensation
//!   for the server's pointer-warp corrections.
//! - **`domain::channel`** – The per-channel state machine of the
//!   multichannel backend and the rule that only the display channel's ready
//!   signal shows the screen.
//! - **`events`** / **`error`** – What flows in and out of the session.

pub mod domain;
pub mod error;
pub mod events;

// Re-export the most-used types at the crate root so callers can write
// `vmview_core::MotionShaper` instead of `vmview_core::domain::motion::MotionShaper`.
pub use domain::backoff::{
    Attempt, BackoffController, BackoffSchedule, RetryTicket, RetryTimer, ScheduleError,
};
pub use domain::channel::{
    Announcement, BindOutcome, Channel, ChannelError, ChannelId, ChannelKind, ChannelSignal,
    ChannelState, ChannelTable, FailureScope, ReadyOutcome, TransportBinding,
};
pub use domain::motion::{interval_for_rate, MotionEvent, MotionMode, MotionShaper, MotionVerdict};
pub use domain::session::{BackendKind, Credential, Generation, GenerationCounter, SessionState};
pub use domain::surface::{DisplaySurface, Frame, SurfaceFormat};
pub use error::ViewerError;
pub use events::{BackendEvent, GrabKind, Stamped, TransportToken, ViewerEvent};
