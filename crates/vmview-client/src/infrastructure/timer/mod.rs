//! Retry timers.
//!
//! The backoff controller only knows the [`RetryTimer`](vmview_core::RetryTimer)
//! trait.  These are its implementations:
//!
//! - **`tokio_timer`** – arms a `tokio::time::sleep` task per ticket that posts the
//!   ticket back to the event loop when it expires.
//! - **`recording`** – records armed and disarmed tickets without waiting, for
//!   tests that drive expiries by hand.

pub mod recording;
pub mod tokio_timer;

pub use self::recording::RecordingRetryTimer;
pub use self::tokio_timer::TokioRetryTimer;
