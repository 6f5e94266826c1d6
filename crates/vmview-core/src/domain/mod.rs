//! Pure domain logic for the display session controller.
//!
//! Nothing in here touches the OS, sockets or an async runtime.  Waiting is
//! expressed through the [`backoff::RetryTimer`] trait so the caller decides
//! which event loop drives it.

pub mod backoff;
pub mod channel;
pub mod motion;
pub mod session;
pub mod surface;
