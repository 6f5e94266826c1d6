//! Status bridge between the session and a presentation layer.
//!
//! The session raises events; a presentation layer usually wants *state*: "am
//! I connected, how large is the desktop, is the keyboard grabbed?".
//! [`ViewerAppState`] folds the event stream into that state, and
//! [`get_viewer_status`] returns a plain serialisable snapshot of it.
//!
//! # DTOs (Data Transfer Objects)
//!
//! `ViewerAppState` uses tokio `Mutex`es and is not directly serialisable.
//! [`ViewerStatusDto`] is a plain snapshot that can be sent across any IPC
//! boundary.  Commands return it wrapped in [`ViewerCommandResult`]:
//!
//! ```json
//! { "success": true,  "data": {...}, "error": null  }
//! { "success": false, "data": null,  "error": "..." }
//! ```
//!
//! # Async Mutex vs std Mutex
//!
//! The state is read from async command handlers, so it uses
//! `tokio::sync::Mutex`: holding a `std::sync::Mutex` guard across an
//! `.await` point would block the runtime thread.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use vmview_core::{GrabKind, ViewerEvent};

// ── Shared application state ──────────────────────────────────────────────────

/// Connection status of the viewer as seen by the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ViewerConnectionStatus {
    /// No session; the user has not connected or has disconnected.
    Idle,
    /// Waiting for transports or the display.
    Connecting,
    /// The display is showing.
    Connected,
    /// The last session failed; a reconnect may follow.
    Reconnecting,
}

/// Viewer state shared with the presentation layer.
pub struct ViewerAppState {
    /// The current connection status.
    pub connection_status: Mutex<ViewerConnectionStatus>,
    /// Last reported desktop size.
    pub desktop_size: Mutex<Option<(u32, u32)>>,
    pub keyboard_grabbed: Mutex<bool>,
    pub mouse_grabbed: Mutex<bool>,
    /// Number of sessions that ended in failure since the last success.
    pub failed_attempts: Mutex<u32>,
    /// Human-readable reason of the last disconnect.
    pub last_error: Mutex<Option<String>>,
}

impl ViewerAppState {
    /// Creates a new shared state with all fields at their defaults.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Applies one session event.
    pub async fn apply(&self, event: &ViewerEvent) {
        match event {
            ViewerEvent::TransportRequested(_) => {
                let mut status = self.connection_status.lock().await;
                if *status != ViewerConnectionStatus::Connected {
                    *status = ViewerConnectionStatus::Connecting;
                }
            }
            ViewerEvent::Connected => {
                *self.connection_status.lock().await = ViewerConnectionStatus::Connected;
                *self.failed_attempts.lock().await = 0;
                *self.last_error.lock().await = None;
            }
            ViewerEvent::Disconnected { reason } => {
                let next = if reason.is_retryable() {
                    *self.failed_attempts.lock().await += 1;
                    ViewerConnectionStatus::Reconnecting
                } else {
                    ViewerConnectionStatus::Idle
                };
                *self.connection_status.lock().await = next;
                *self.desktop_size.lock().await = None;
                *self.last_error.lock().await = Some(reason.to_string());
            }
            ViewerEvent::Resized { width, height } => {
                *self.desktop_size.lock().await = Some((*width, *height));
            }
            ViewerEvent::InputGrabChanged { kind, grabbed } => {
                let slot = match kind {
                    GrabKind::Keyboard => &self.keyboard_grabbed,
                    GrabKind::Mouse => &self.mouse_grabbed,
                };
                *slot.lock().await = *grabbed;
            }
        }
    }
}

impl Default for ViewerAppState {
    fn default() -> Self {
        Self {
            connection_status: Mutex::new(ViewerConnectionStatus::Idle),
            desktop_size: Mutex::new(None),
            keyboard_grabbed: Mutex::new(false),
            mouse_grabbed: Mutex::new(false),
            failed_attempts: Mutex::new(0),
            last_error: Mutex::new(None),
        }
    }
}

// ── DTOs ──────────────────────────────────────────────────────────────────────

/// Status snapshot returned to the presentation layer.
///
/// `connection_status` is the `Debug` spelling of [`ViewerConnectionStatus`]
/// (e.g. `"Connected"`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewerStatusDto {
    pub connection_status: String,
    pub desktop_width: Option<u32>,
    pub desktop_height: Option<u32>,
    pub keyboard_grabbed: bool,
    pub mouse_grabbed: bool,
    pub failed_attempts: u32,
    pub last_error: Option<String>,
}

/// Unified response wrapper for viewer commands.
#[derive(Debug, Serialize, Deserialize)]
pub struct ViewerCommandResult<T: Serialize> {
    /// `true` if the command completed successfully.
    pub success: bool,
    /// The command's return value, present only when `success` is `true`.
    pub data: Option<T>,
    /// A human-readable error message, present only when `success` is `false`.
    pub error: Option<String>,
}

impl<T: Serialize> ViewerCommandResult<T> {
    pub fn ok(data: T) -> Self {
        Self { success: true, data: Some(data), error: None }
    }

    pub fn err(msg: impl Into<String>) -> Self {
        Self { success: false, data: None, error: Some(msg.into()) }
    }
}

// ── Commands ──────────────────────────────────────────────────────────────────

/// Returns the current viewer status snapshot.
pub async fn get_viewer_status(state: Arc<ViewerAppState>) -> ViewerCommandResult<ViewerStatusDto> {
    let status = *state.connection_status.lock().await;
    let size = *state.desktop_size.lock().await;

    ViewerCommandResult::ok(ViewerStatusDto {
        connection_status: format!("{status:?}"),
        desktop_width: size.map(|(w, _)| w),
        desktop_height: size.map(|(_, h)| h),
        keyboard_grabbed: *state.keyboard_grabbed.lock().await,
        mouse_grabbed: *state.mouse_grabbed.lock().await,
        failed_attempts: *state.failed_attempts.lock().await,
        last_error: state.last_error.lock().await.clone(),
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
