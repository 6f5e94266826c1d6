//! Application layer for the viewer.
//!
//! # What lives here?
//!
//! - **`backend`** – The [`DisplayBackend`](backend::DisplayBackend) trait the
//!   session drives, and the errors a backend can report.  Concrete display
//!   libraries implement it in the infrastructure layer.
//!
//! - **`viewer_session`** – The session controller: connect / disconnect,
//!   transport brokering, channel lifecycle, reconnect backoff and pointer
//!   shaping.  It only talks to the outside world through the backend trait,
//!   a [`RetryTimer`](vmview_core::RetryTimer) and an event channel, so it can
//!   be tested without sockets or a runtime.

pub mod backend;
pub mod viewer_session;
