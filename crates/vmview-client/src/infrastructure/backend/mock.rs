//! Mock display backend.
//!
//! # Why a mock backend?
//!
//! The real display libraries need a running guest, a graphics stack and a
//! remote display server.  None of that is available in unit tests or CI.
//!
//! `MockDisplayBackend` replaces every library call with in-memory recording.
//! Each call is pushed into a `Mutex<Vec<BackendCall>>` so tests can inspect
//! exactly what the session asked for and in which order.  Accepted
//! transports are held until `teardown`, which drops (closes) them.
//!
//! # Simulated remote display
//!
//! Built with [`MockDisplayBackend::simulating`], the mock also raises the
//! events a healthy remote display would raise, stamped with the session's
//! generation:
//!
//! - multichannel: announces the main, display, inputs, cursor, playback and
//!   record channels plus one channel of a type the viewer does not model on
//!   `open`, then signals the display surface once the display channel gets a
//!   transport;
//! - single: reports `Connected` and the desktop size once its transport is
//!   bound.
//!
//! The `vmview` binary runs on this until a real display library is wired in.
//!
//! # Failure switches
//!
//! Set `fail_open` to make `open` fail, or `reject_transports` to make
//! `bind_transport` hand every transport back.

use std::sync::Mutex;

use tokio::sync::mpsc;
use tracing::debug;
use vmview_core::{
    BackendEvent, BackendKind, ChannelId, ChannelKind, ChannelSignal, Credential, Frame,
    Generation, Stamped, SurfaceFormat,
};

use crate::application::backend::{BackendError, DisplayBackend, Rejected};

/// Channel layout announced by the simulated multichannel display.
pub const SIMULATED_CHANNELS: [(ChannelId, ChannelKind); 7] = [
    (ChannelId(0), ChannelKind::Main),
    (ChannelId(1), ChannelKind::Display),
    (ChannelId(2), ChannelKind::Inputs),
    (ChannelId(3), ChannelKind::Cursor),
    (ChannelId(4), ChannelKind::Playback),
    (ChannelId(5), ChannelKind::Record),
    (ChannelId(6), ChannelKind::Other),
];

/// One recorded backend call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCall {
    Open(Generation),
    Bind(Option<ChannelId>),
    CaptureFrame,
    Teardown,
}

struct Simulation {
    events: mpsc::UnboundedSender<Stamped<BackendEvent>>,
    format: SurfaceFormat,
}

/// A backend that records all calls without touching a display library.
pub struct MockDisplayBackend<T> {
    kind: BackendKind,
    /// Every call, in order.
    pub calls: Mutex<Vec<BackendCall>>,
    /// When set, `open` fails with this message.
    pub fail_open: Option<String>,
    /// When `true`, `bind_transport` rejects every transport.
    pub reject_transports: bool,
    /// Frame returned by `capture_frame` while a session is open.
    pub frame: Option<Frame>,
    bound: Vec<(Option<ChannelId>, T)>,
    generation: Option<Generation>,
    simulation: Option<Simulation>,
}

impl<T> MockDisplayBackend<T> {
    /// Creates a silent recording backend of the given kind.
    pub fn new(kind: BackendKind) -> Self {
        Self {
            kind,
            calls: Mutex::new(Vec::new()),
            fail_open: None,
            reject_transports: false,
            frame: None,
            bound: Vec::new(),
            generation: None,
            simulation: None,
        }
    }

    /// Creates a backend that plays a healthy remote display on `events`.
    pub fn simulating(
        kind: BackendKind,
        events: mpsc::UnboundedSender<Stamped<BackendEvent>>,
        format: SurfaceFormat,
    ) -> Self {
        let mut backend = Self::new(kind);
        backend.simulation = Some(Simulation { events, format });
        backend
    }

    /// Snapshot of the recorded calls.
    pub fn calls(&self) -> Vec<BackendCall> {
        match self.calls.lock() {
            Ok(calls) => calls.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Channels currently holding a transport (`None` for the single backend).
    pub fn bound_channels(&self) -> Vec<Option<ChannelId>> {
        self.bound.iter().map(|(channel, _)| *channel).collect()
    }

    fn record(&self, call: BackendCall) {
        match self.calls.lock() {
            Ok(mut calls) => calls.push(call),
            Err(poisoned) => poisoned.into_inner().push(call),
        }
    }

    fn raise(&self, event: BackendEvent) {
        let (Some(sim), Some(generation)) = (&self.simulation, self.generation) else {
            return;
        };
        if sim.events.send(Stamped::new(generation, event)).is_err() {
            debug!("backend event receiver dropped");
        }
    }

    fn simulate_bound(&mut self, channel: Option<ChannelId>) {
        let Some(format) = self.simulation.as_ref().map(|s| s.format) else {
            return;
        };
        let display = SIMULATED_CHANNELS
            .iter()
            .find(|(_, kind)| kind.is_display())
            .map(|(id, _)| *id);

        match (self.kind, channel) {
            (BackendKind::Single, None) => {
                self.frame = Some(blank_frame(format));
                self.raise(BackendEvent::Connected);
                self.raise(BackendEvent::DesktopResized { width: format.width, height: format.height });
            }
            (BackendKind::Multichannel, Some(id)) => {
                self.raise(BackendEvent::ChannelSignal { channel: id, signal: ChannelSignal::Opened });
                if Some(id) == display {
                    self.frame = Some(blank_frame(format));
                    self.raise(BackendEvent::SurfaceReady { channel: id, format });
                }
            }
            _ => {}
        }
    }
}

impl<T> DisplayBackend for MockDisplayBackend<T> {
    type Transport = T;

    fn kind(&self) -> BackendKind {
        self.kind
    }

    fn open(&mut self, generation: Generation, _credential: &Credential) -> Result<(), BackendError> {
        self.record(BackendCall::Open(generation));
        if let Some(reason) = &self.fail_open {
            return Err(BackendError::Open(reason.clone()));
        }
        self.generation = Some(generation);
        if self.kind == BackendKind::Multichannel {
            for (channel, kind) in SIMULATED_CHANNELS {
                self.raise(BackendEvent::ChannelAnnounced { channel, kind });
            }
        }
        Ok(())
    }

    fn bind_transport(&mut self, channel: Option<ChannelId>, transport: T) -> Result<(), Rejected<T>> {
        self.record(BackendCall::Bind(channel));
        if self.reject_transports {
            return Err(Rejected { transport, reason: "mock backend rejects transports".to_string() });
        }
        self.bound.push((channel, transport));
        self.simulate_bound(channel);
        Ok(())
    }

    fn capture_frame(&self) -> Option<Frame> {
        self.record(BackendCall::CaptureFrame);
        self.generation.and(self.frame.clone())
    }

    fn teardown(&mut self) {
        self.record(BackendCall::Teardown);
        self.bound.clear();
        self.generation = None;
        if self.simulation.is_some() {
            self.frame = None;
        }
    }
}

/// A black frame matching `format`.
fn blank_frame(format: SurfaceFormat) -> Frame {
    let len = format.stride as usize * format.height as usize;
    Frame {
        width: format.width,
        height: format.height,
        stride: format.stride,
        data: vec![0; len],
    }
}
