//! Infrastructure layer for the viewer.
//!
//! Contains OS-facing adapters and the event loop that drives the session.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `vmview_core`, but MUST NOT be imported by the `application` or domain
//! layers.
//!
//! # Sub-modules
//!
//! - **`backend`** – Implementations of `DisplayBackend`.  Currently the
//!   recording `MockDisplayBackend`, which can also simulate a remote display
//!   for the binary.
//!
//! - **`network`** – The `TransportResolver` trait and the socket resolver
//!   that connects to a TCP address or a Unix socket.
//!
//! - **`runtime`** – The single-task `tokio::select!` loop that serialises
//!   host commands, backend events, transport answers and retry expiries.
//!
//! - **`storage`** – TOML configuration persistence.
//!
//! - **`timer`** – `RetryTimer` implementations: tokio sleeps for production,
//!   a recorder for tests.
//!
//! - **`ui_bridge`** – Serialisable status snapshot for a presentation layer.

pub mod backend;
pub mod network;
pub mod runtime;
pub mod storage;
pub mod timer;
pub mod ui_bridge;
