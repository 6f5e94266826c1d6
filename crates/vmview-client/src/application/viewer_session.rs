//! ViewerSession: the remote display session controller.
//!
//! This use case is the one component the host drives directly.  It composes
//! the reconnect backoff, the motion shaper and (for the multichannel backend)
//! the channel lifecycle table, and it owns the [`DisplayBackend`].
//!
//! # Session lifecycle
//!
//! ```text
//!   connect()                       display ready / remote connected
//!  Idle ─────► Connecting ───────────────────────────────────────► Connected
//!                 ▲   │ transport missing, fatal display signal,        │
//!                 │   │ backend refused, remote closed                  │
//!      retry due  │   ▼                                                 │
//!                Disconnected ◄─────────────────────────────────────────┘
//!
//!   disconnect() from any state ─► Idle (no retry)
//! ```
//!
//! Every session attempt gets a fresh [`Generation`].  Transport answers and
//! backend events carry the generation they were issued for; anything that
//! does not match the active session is logged at `debug` and dropped without
//! touching state.
//!
//! # Who retries?
//!
//! A failure tears the session down, raises `Disconnected`, and then asks the
//! [`BackoffController`] for another attempt if reconnection is still wanted.
//! A user-initiated `disconnect()` clears that wish first, so nothing follows
//! it.
//!
//! # Transport ownership
//!
//! A transport handed to [`ViewerSession::provide_transport`] is owned by the
//! session from then on.  Either the backend accepts it (and closes it in
//! `teardown`) or the session drops it on the spot.  Because closing is tied to
//! `Drop`, every handle is closed exactly once.

use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};
use vmview_core::{
    Announcement, Attempt, BackendEvent, BackendKind, BackoffController, BackoffSchedule, Channel,
    ChannelId, ChannelKind, ChannelSignal, ChannelTable, Credential, DisplaySurface, FailureScope,
    Frame, Generation, GenerationCounter, GrabKind, MotionEvent, MotionShaper, MotionVerdict,
    ReadyOutcome, RetryTicket, RetryTimer, SessionState, Stamped, SurfaceFormat, TransportBinding,
    TransportToken, ViewerError, ViewerEvent,
};

use crate::application::backend::{DisplayBackend, Rejected};

/// Tunables for a [`ViewerSession`].
#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    /// Waits between reconnect attempts.
    pub schedule: BackoffSchedule,
    /// Maximum pointer-motion events per second.  `None` or `Some(0)` disables
    /// rate limiting.
    pub max_mouse_rate: Option<u32>,
}

/// Backend-specific bookkeeping of the active session.
enum Topology {
    /// One transport, no channels.
    Single { transport: TransportBinding },
    /// One transport per channel.
    Multi(ChannelTable),
}

struct ActiveSession {
    generation: Generation,
    topology: Topology,
}

/// The session controller.
///
/// `B` is the display backend, `T` the timer the backoff arms.
pub struct ViewerSession<B: DisplayBackend, T: RetryTimer> {
    backend: B,
    kind: BackendKind,
    backoff: BackoffController<T>,
    shaper: MotionShaper,
    generations: GenerationCounter,
    credential: Option<Credential>,
    want_reconnect: bool,
    state: SessionState,
    active: Option<ActiveSession>,
    keyboard_grabbed: bool,
    mouse_grabbed: bool,
    events: mpsc::UnboundedSender<ViewerEvent>,
}

impl<B: DisplayBackend, T: RetryTimer> ViewerSession<B, T> {
    /// Creates an idle session controller.
    ///
    /// Returns the controller and the receiver on which it raises
    /// [`ViewerEvent`]s, in the order they happen.
    pub fn new(
        backend: B,
        timer: T,
        config: SessionConfig,
    ) -> (Self, mpsc::UnboundedReceiver<ViewerEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let kind = backend.kind();
        let session = Self {
            backend,
            kind,
            backoff: BackoffController::new(config.schedule, timer),
            shaper: MotionShaper::for_backend(kind, config.max_mouse_rate),
            generations: GenerationCounter::new(),
            credential: None,
            want_reconnect: false,
            state: SessionState::Idle,
            active: None,
            keyboard_grabbed: false,
            mouse_grabbed: false,
            events,
        };
        (session, rx)
    }

    // ── Host operations ───────────────────────────────────────────────────────

    /// Starts connecting with `credential`, replacing any existing session.
    ///
    /// The first attempt runs immediately.  Reconnection stays wanted until
    /// [`disconnect`](Self::disconnect).
    pub fn connect(&mut self, credential: Credential) {
        info!(backend = %self.kind, "connect requested");
        self.credential = Some(credential);
        self.want_reconnect = true;
        self.backoff.reset();
        self.schedule_attempt();
    }

    /// Answers a transport request.
    ///
    /// `None` means the host could not obtain a transport.  For the single
    /// backend or the display channel that ends the session; for any other
    /// channel only that channel is lost.  Answers for stale tokens are
    /// dropped (closing the handle) without any other effect.
    pub fn provide_transport(&mut self, token: TransportToken, transport: Option<B::Transport>) {
        if !self.is_current(token.generation) {
            discard_transport(token, transport, "session is no longer current");
            return;
        }
        match self.kind {
            BackendKind::Single => self.provide_single(token, transport),
            BackendKind::Multichannel => self.provide_channel(token, transport),
        }
    }

    /// Ends the session at the user's request.
    ///
    /// Clears the reconnect wish, cancels any pending retry and tears down all
    /// channels and the surface.  Raises `Disconnected` only if a session was
    /// active, so repeated calls are harmless.
    pub fn disconnect(&mut self) {
        self.want_reconnect = false;
        self.backoff.reset();
        if self.active.is_none() {
            self.state = SessionState::Idle;
            return;
        }
        info!("disconnect requested");
        self.teardown_active();
        self.state = SessionState::Idle;
        self.emit(ViewerEvent::Disconnected {
            reason: ViewerError::UserInitiatedDisconnect,
        });
    }

    /// Returns the last rendered frame, or `None` while no surface exists.
    ///
    /// A frame whose buffer is shorter than its geometry is dropped.
    pub fn current_frame(&self) -> Option<Frame> {
        self.surface()?;
        let frame = self.backend.capture_frame()?;
        if !frame.is_well_formed() {
            warn!(
                width = frame.width,
                height = frame.height,
                stride = frame.stride,
                bytes = frame.data.len(),
                "backend returned a truncated frame; dropping it"
            );
            return None;
        }
        Some(frame)
    }

    /// Applies one event from the backend.
    pub fn handle_backend_event(&mut self, stamped: Stamped<BackendEvent>) {
        let Stamped { generation, event } = stamped;
        if !self.is_current(generation) {
            debug!(%generation, ?event, "discarding stale backend event");
            return;
        }
        match event {
            BackendEvent::Connected => self.on_remote_connected(),
            BackendEvent::Disconnected => {
                info!(%generation, "remote display closed the connection");
                self.fail_session(ViewerError::RemoteClosed);
            }
            BackendEvent::DesktopResized { width, height } => self.on_resized(width, height),
            BackendEvent::ChannelAnnounced { channel, kind } => {
                self.on_channel_announced(generation, channel, kind)
            }
            BackendEvent::ChannelSignal { channel, signal } => self.on_channel_signal(channel, signal),
            BackendEvent::SurfaceReady { channel, format } => self.on_surface_ready(channel, format),
            BackendEvent::GrabChanged { kind, grabbed } => self.set_grab(kind, grabbed),
        }
    }

    /// Reports the expiry of a retry timer.
    ///
    /// Expiries of cancelled or replaced timers are ignored.
    pub fn retry_due(&mut self, ticket: RetryTicket) {
        if !self.backoff.fire(ticket) {
            return;
        }
        if !self.want_reconnect {
            debug!(ticket = ticket.get(), "retry expired after reconnect was abandoned");
            return;
        }
        info!(ticket = ticket.get(), "retry timer expired; reconnecting");
        self.start_attempt();
    }

    /// Shapes one raw pointer-motion event.
    pub fn filter_motion(&mut self, event: &MotionEvent) -> MotionVerdict {
        let verdict = self.shaper.filter(event);
        if verdict == MotionVerdict::Reject {
            trace!(timestamp_ms = event.timestamp_ms, "motion event dropped");
        }
        verdict
    }

    // ── Observation ───────────────────────────────────────────────────────────

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The most recently issued session generation.
    pub fn generation(&self) -> Option<Generation> {
        self.generations.current()
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.kind
    }

    pub fn want_reconnect(&self) -> bool {
        self.want_reconnect
    }

    pub fn keyboard_grabbed(&self) -> bool {
        self.keyboard_grabbed
    }

    pub fn mouse_grabbed(&self) -> bool {
        self.mouse_grabbed
    }

    /// The display surface, if one exists.
    ///
    /// The single backend has no surface format; its surface exists while the
    /// session is connected.
    pub fn surface(&self) -> Option<DisplaySurface> {
        let active = self.active.as_ref()?;
        match &active.topology {
            Topology::Single { .. } => (self.state == SessionState::Connected)
                .then_some(DisplaySurface { channel: None, format: None }),
            Topology::Multi(table) => table.surface().cloned(),
        }
    }

    /// Looks up a channel of the active multichannel session.
    pub fn channel(&self, id: ChannelId) -> Option<&Channel> {
        match &self.active.as_ref()?.topology {
            Topology::Multi(table) => table.get(id),
            Topology::Single { .. } => None,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backoff(&self) -> &BackoffController<T> {
        &self.backoff
    }

    // ── Attempts and teardown ─────────────────────────────────────────────────

    fn schedule_attempt(&mut self) {
        match self.backoff.attempt() {
            Attempt::Immediate => self.start_attempt(),
            Attempt::Scheduled { ticket, delay } => {
                info!(ticket = ticket.get(), ?delay, "reconnect scheduled");
            }
        }
    }

    fn start_attempt(&mut self) {
        let Some(credential) = self.credential.clone() else {
            warn!("no credential available; not starting a session");
            return;
        };
        self.teardown_active();

        let Some(generation) = self.generations.bump() else {
            warn!("session generations exhausted; giving up on reconnecting");
            self.want_reconnect = false;
            self.state = SessionState::Idle;
            return;
        };
        let topology = match self.kind {
            BackendKind::Single => Topology::Single { transport: TransportBinding::Pending },
            BackendKind::Multichannel => Topology::Multi(ChannelTable::new(generation)),
        };
        self.active = Some(ActiveSession { generation, topology });
        self.state = SessionState::Connecting;
        info!(%generation, "starting session");

        if let Err(e) = self.backend.open(generation, &credential) {
            warn!(%generation, error = %e, "backend refused to open session");
            self.fail_session(ViewerError::BackendRejected(e.to_string()));
            return;
        }

        if self.kind == BackendKind::Single {
            self.emit(ViewerEvent::TransportRequested(TransportToken { generation, channel: None }));
        }
    }

    /// Tears down the active session, raises `Disconnected` and schedules a
    /// retry if reconnection is wanted.
    fn fail_session(&mut self, reason: ViewerError) {
        self.teardown_active();
        self.state = SessionState::Disconnected;
        warn!(%reason, "session ended");
        self.emit(ViewerEvent::Disconnected { reason });
        if self.want_reconnect {
            self.schedule_attempt();
        }
    }

    fn teardown_active(&mut self) {
        let Some(mut active) = self.active.take() else {
            return;
        };
        if let Topology::Multi(table) = &mut active.topology {
            let closed = table.teardown_all();
            debug!(closed, "channels torn down");
        }
        self.backend.teardown();
        self.set_grab(GrabKind::Keyboard, false);
        self.set_grab(GrabKind::Mouse, false);
        debug!(generation = %active.generation, "session torn down");
    }

    // ── Transport answers ─────────────────────────────────────────────────────

    fn provide_single(&mut self, token: TransportToken, transport: Option<B::Transport>) {
        if token.channel.is_some() {
            discard_transport(token, transport, "single backend has no channels");
            return;
        }
        let pending = matches!(
            self.active.as_ref().map(|a| &a.topology),
            Some(Topology::Single { transport: TransportBinding::Pending })
        );
        if !pending {
            discard_transport(token, transport, "transport request already answered");
            return;
        }

        let Some(handle) = transport else {
            warn!(%token, "host could not supply a transport");
            self.set_single_binding(TransportBinding::Failed);
            self.fail_session(ViewerError::TransportUnavailable);
            return;
        };
        match self.backend.bind_transport(None, handle) {
            Ok(()) => {
                debug!(%token, "transport bound");
                self.set_single_binding(TransportBinding::Bound);
            }
            Err(Rejected { transport, reason }) => {
                debug!(%token, %reason, "backend rejected transport; closing it");
                drop(transport);
                self.set_single_binding(TransportBinding::Failed);
                self.fail_session(ViewerError::TransportUnavailable);
            }
        }
    }

    fn set_single_binding(&mut self, binding: TransportBinding) {
        if let Some(ActiveSession { topology: Topology::Single { transport }, .. }) = self.active.as_mut() {
            *transport = binding;
        }
    }

    fn provide_channel(&mut self, token: TransportToken, transport: Option<B::Transport>) {
        let Some(channel) = token.channel else {
            discard_transport(token, transport, "multichannel transport without a channel");
            return;
        };
        let Some(table) = self.channel_table_mut() else {
            discard_transport(token, transport, "no channel table");
            return;
        };

        let Some(handle) = transport else {
            match table.fail_transport(channel) {
                Ok(FailureScope::Channel) => {
                    warn!(%channel, "no transport for channel; continuing without it");
                }
                Ok(FailureScope::Session) => {
                    warn!(%channel, "no transport for display channel");
                    self.fail_session(ViewerError::TransportUnavailable);
                }
                Err(e) => debug!(%token, error = %e, "ignoring stale transport failure"),
            }
            return;
        };

        if let Err(e) = table.bind(channel) {
            debug!(%token, error = %e, "closing transport for stale channel");
            drop(handle);
            return;
        }
        match self.backend.bind_transport(Some(channel), handle) {
            Ok(()) => debug!(%channel, "transport bound"),
            Err(Rejected { transport, reason }) => {
                debug!(%channel, %reason, "backend rejected transport; closing it");
                drop(transport);
                let scope = self.channel_table_mut().map(|t| t.fail_transport(channel));
                match scope {
                    Some(Ok(FailureScope::Session)) => {
                        self.fail_session(ViewerError::TransportUnavailable)
                    }
                    Some(Ok(FailureScope::Channel)) => {
                        warn!(%channel, "channel lost its transport; continuing without it")
                    }
                    _ => {}
                }
            }
        }
    }

    // ── Backend events ────────────────────────────────────────────────────────

    fn on_remote_connected(&mut self) {
        if self.kind == BackendKind::Multichannel {
            debug!("multichannel backend connects through its display channel; ignoring");
            return;
        }
        if self.state != SessionState::Connected {
            self.mark_connected();
        }
    }

    fn mark_connected(&mut self) {
        self.state = SessionState::Connected;
        self.backoff.reset();
        info!(generation = ?self.generation(), "display connected");
        self.emit(ViewerEvent::Connected);
    }

    fn on_resized(&mut self, width: u32, height: u32) {
        // The multichannel display reports 1×1 until it is configured.
        if self.kind == BackendKind::Multichannel && (width <= 1 || height <= 1) {
            debug!(width, height, "ignoring placeholder size");
            return;
        }
        self.emit(ViewerEvent::Resized { width, height });
    }

    fn on_channel_announced(&mut self, generation: Generation, channel: ChannelId, kind: ChannelKind) {
        let Some(table) = self.channel_table_mut() else {
            debug!(%channel, "single backend announced a channel; ignoring");
            return;
        };
        match table.announce(channel, kind) {
            Ok(Announcement::Added) => debug!(%channel, ?kind, "channel announced"),
            Ok(Announcement::ReplacedDisplay { previous, surface_destroyed }) => {
                info!(%previous, %channel, surface_destroyed, "display channel replaced");
                if surface_destroyed && self.state == SessionState::Connected {
                    self.state = SessionState::Connecting;
                }
            }
            Err(e) => {
                debug!(error = %e, "ignoring duplicate channel announcement");
                return;
            }
        }
        self.emit(ViewerEvent::TransportRequested(TransportToken {
            generation,
            channel: Some(channel),
        }));
    }

    fn on_channel_signal(&mut self, channel: ChannelId, signal: ChannelSignal) {
        let Some(table) = self.channel_table_mut() else {
            debug!(%channel, "single backend raised a channel signal; ignoring");
            return;
        };
        match table.signal(channel, signal) {
            Ok(None) => debug!(%channel, %signal, "channel signal"),
            Ok(Some(FailureScope::Channel)) => {
                warn!(%channel, %signal, "channel failed; continuing without it");
            }
            Ok(Some(FailureScope::Session)) => {
                warn!(%channel, %signal, "display channel failed");
                self.fail_session(ViewerError::ChannelFatal { channel, signal });
            }
            Err(e) => debug!(%channel, error = %e, "ignoring signal for stale channel"),
        }
    }

    fn on_surface_ready(&mut self, channel: ChannelId, format: SurfaceFormat) {
        let Some(table) = self.channel_table_mut() else {
            debug!(%channel, "single backend raised a ready signal; ignoring");
            return;
        };
        match table.surface_ready(channel, format) {
            Ok(ReadyOutcome::Created(_)) => {
                info!(%channel, width = format.width, height = format.height, "display surface created");
                self.mark_connected();
                self.on_resized(format.width, format.height);
            }
            Ok(ReadyOutcome::AlreadyShowing) => debug!(%channel, "surface already showing"),
            Ok(ReadyOutcome::Ignored) => {
                debug!(%channel, "ready signal for a channel that cannot show; ignoring")
            }
            Err(e) => debug!(%channel, error = %e, "ignoring ready signal for stale channel"),
        }
    }

    /// Records a grab flag and raises `InputGrabChanged` if it changed.
    fn set_grab(&mut self, kind: GrabKind, grabbed: bool) {
        let slot = match kind {
            GrabKind::Keyboard => &mut self.keyboard_grabbed,
            GrabKind::Mouse => &mut self.mouse_grabbed,
        };
        if *slot == grabbed {
            return;
        }
        *slot = grabbed;
        debug!(?kind, grabbed, "input grab changed");
        self.emit(ViewerEvent::InputGrabChanged { kind, grabbed });
    }

    // ── Helpers ───────────────────────────────────────────────────────────────

    fn is_current(&self, generation: Generation) -> bool {
        self.active.as_ref().is_some_and(|a| a.generation == generation)
    }

    fn channel_table_mut(&mut self) -> Option<&mut ChannelTable> {
        match &mut self.active.as_mut()?.topology {
            Topology::Multi(table) => Some(table),
            Topology::Single { .. } => None,
        }
    }

    fn emit(&self, event: ViewerEvent) {
        if self.events.send(event).is_err() {
            debug!("viewer event receiver dropped");
        }
    }
}

/// Drops a transport that no session will use, closing it.
fn discard_transport<H>(token: TransportToken, transport: Option<H>, why: &str) {
    if let Some(handle) = transport {
        debug!(%token, why, "closing unused transport");
        drop(handle);
    } else {
        debug!(%token, why, "ignoring stale transport failure");
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::backend::BackendError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    const DISPLAY: ChannelId = ChannelId(2);
    const AUDIO: ChannelId = ChannelId(5);

    /// Transport handle that counts how often it was closed.
    struct Handle {
        closed: Arc<AtomicUsize>,
    }

    impl Drop for Handle {
        fn drop(&mut self) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Backend that records calls and keeps accepted transports alive.
    struct FakeBackend {
        kind: BackendKind,
        opened: Vec<Generation>,
        bound: Vec<(Option<ChannelId>, Handle)>,
        teardowns: usize,
        fail_open: bool,
        reject_transports: bool,
        truncated_frames: bool,
    }

    impl FakeBackend {
        fn new(kind: BackendKind) -> Self {
            Self {
                kind,
                opened: Vec::new(),
                bound: Vec::new(),
                teardowns: 0,
                fail_open: false,
                reject_transports: false,
                truncated_frames: false,
            }
        }
    }

    impl DisplayBackend for FakeBackend {
        type Transport = Handle;

        fn kind(&self) -> BackendKind {
            self.kind
        }

        fn open(&mut self, generation: Generation, _credential: &Credential) -> Result<(), BackendError> {
            if self.fail_open {
                return Err(BackendError::Open("no GL".to_string()));
            }
            self.opened.push(generation);
            Ok(())
        }

        fn bind_transport(
            &mut self,
            channel: Option<ChannelId>,
            transport: Handle,
        ) -> Result<(), Rejected<Handle>> {
            if self.reject_transports {
                return Err(Rejected { transport, reason: "unsupported".to_string() });
            }
            self.bound.push((channel, transport));
            Ok(())
        }

        fn capture_frame(&self) -> Option<Frame> {
            let len = if self.truncated_frames { 3 } else { 4 };
            Some(Frame { width: 1, height: 1, stride: 4, data: vec![0; len] })
        }

        fn teardown(&mut self) {
            self.bound.clear();
            self.teardowns += 1;
        }
    }

    #[derive(Default)]
    struct RecordingTimer {
        armed: Vec<(RetryTicket, Duration)>,
        disarmed: Vec<RetryTicket>,
    }

    impl RetryTimer for RecordingTimer {
        fn arm(&mut self, ticket: RetryTicket, delay: Duration) {
            self.armed.push((ticket, delay));
        }

        fn disarm(&mut self, ticket: RetryTicket) {
            self.disarmed.push(ticket);
        }
    }

    type Session = ViewerSession<FakeBackend, RecordingTimer>;

    fn make_session(backend: FakeBackend) -> (Session, mpsc::UnboundedReceiver<ViewerEvent>) {
        ViewerSession::new(backend, RecordingTimer::default(), SessionConfig::default())
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<ViewerEvent>) -> Vec<ViewerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn handle(counter: &Arc<AtomicUsize>) -> Handle {
        Handle { closed: Arc::clone(counter) }
    }

    fn current(session: &Session) -> Generation {
        session.generation().expect("a session was started")
    }

    fn announce(session: &mut Session, channel: ChannelId, kind: ChannelKind) {
        let generation = current(session);
        session.handle_backend_event(Stamped::new(
            generation,
            BackendEvent::ChannelAnnounced { channel, kind },
        ));
    }

    fn token(session: &Session, channel: Option<ChannelId>) -> TransportToken {
        TransportToken { generation: current(session), channel }
    }

    fn format() -> SurfaceFormat {
        SurfaceFormat { pixel_format: 32, width: 800, height: 600, stride: 3200 }
    }

    fn disconnects(events: &[ViewerEvent]) -> usize {
        events
            .iter()
            .filter(|e| matches!(e, ViewerEvent::Disconnected { .. }))
            .count()
    }

    // ── Single backend ────────────────────────────────────────────────────────

    #[test]
    fn test_connect_single_requests_one_transport() {
        // Arrange
        let (mut session, mut rx) = make_session(FakeBackend::new(BackendKind::Single));

        // Act
        session.connect(Credential::password("secret"));

        // Assert
        let generation = current(&session);
        assert_eq!(
            drain(&mut rx),
            vec![ViewerEvent::TransportRequested(TransportToken { generation, channel: None })]
        );
        assert_eq!(session.state(), SessionState::Connecting);
        assert_eq!(session.backend().opened, vec![generation]);
    }

    #[test]
    fn test_single_backend_connects_once_transport_bound() {
        // Arrange
        let (mut session, mut rx) = make_session(FakeBackend::new(BackendKind::Single));
        let closed = Arc::new(AtomicUsize::new(0));
        session.connect(Credential::password("secret"));
        drain(&mut rx);

        // Act
        session.provide_transport(token(&session, None), Some(handle(&closed)));
        session.handle_backend_event(Stamped::new(current(&session), BackendEvent::Connected));
        session.handle_backend_event(Stamped::new(current(&session), BackendEvent::Connected));

        // Assert
        assert_eq!(drain(&mut rx), vec![ViewerEvent::Connected]);
        assert_eq!(session.state(), SessionState::Connected);
        assert_eq!(session.backoff().cursor(), 0);
        assert_eq!(closed.load(Ordering::SeqCst), 0, "backend owns the transport");
        assert!(session.current_frame().is_some());
    }

    #[test]
    fn test_truncated_frame_is_not_returned() {
        // Arrange
        let mut backend = FakeBackend::new(BackendKind::Single);
        backend.truncated_frames = true;
        let (mut session, _rx) = make_session(backend);
        let closed = Arc::new(AtomicUsize::new(0));
        session.connect(Credential::password("secret"));
        session.provide_transport(token(&session, None), Some(handle(&closed)));
        session.handle_backend_event(Stamped::new(current(&session), BackendEvent::Connected));

        // Act
        let frame = session.current_frame();

        // Assert
        assert!(session.surface().is_some(), "surface exists");
        assert!(frame.is_none());
    }

    #[test]
    fn test_missing_transport_fails_session_and_schedules_retry() {
        // Arrange
        let (mut session, mut rx) = make_session(FakeBackend::new(BackendKind::Single));
        session.connect(Credential::password("secret"));
        drain(&mut rx);

        // Act
        session.provide_transport(token(&session, None), None);

        // Assert
        assert_eq!(
            drain(&mut rx),
            vec![ViewerEvent::Disconnected { reason: ViewerError::TransportUnavailable }]
        );
        assert_eq!(session.state(), SessionState::Disconnected);
        assert_eq!(session.backoff().timer().armed.len(), 1);
        assert_eq!(session.backoff().timer().armed[0].1, Duration::from_secs(1));
    }

    #[test]
    fn test_rejected_transport_is_closed_once_and_fails_session() {
        // Arrange
        let mut backend = FakeBackend::new(BackendKind::Single);
        backend.reject_transports = true;
        let (mut session, mut rx) = make_session(backend);
        let closed = Arc::new(AtomicUsize::new(0));
        session.connect(Credential::password("secret"));
        drain(&mut rx);

        // Act
        session.provide_transport(token(&session, None), Some(handle(&closed)));

        // Assert
        assert_eq!(closed.load(Ordering::SeqCst), 1);
        assert_eq!(disconnects(&drain(&mut rx)), 1);
    }

    #[test]
    fn test_stale_transport_is_closed_without_state_change() {
        // Arrange – answer arrives after the user already disconnected
        let (mut session, mut rx) = make_session(FakeBackend::new(BackendKind::Single));
        let closed = Arc::new(AtomicUsize::new(0));
        session.connect(Credential::password("secret"));
        let stale = token(&session, None);
        session.disconnect();
        drain(&mut rx);

        // Act
        session.provide_transport(stale, Some(handle(&closed)));

        // Assert
        assert_eq!(closed.load(Ordering::SeqCst), 1);
        assert!(drain(&mut rx).is_empty());
        assert_eq!(session.state(), SessionState::Idle);
        assert!(session.backend().bound.is_empty());
    }

    #[test]
    fn test_remote_close_fails_session_with_remote_closed() {
        let (mut session, mut rx) = make_session(FakeBackend::new(BackendKind::Single));
        session.connect(Credential::password("secret"));
        drain(&mut rx);

        session.handle_backend_event(Stamped::new(current(&session), BackendEvent::Disconnected));

        assert_eq!(
            drain(&mut rx),
            vec![ViewerEvent::Disconnected { reason: ViewerError::RemoteClosed }]
        );
    }

    #[test]
    fn test_backend_open_failure_reports_backend_rejected() {
        // Arrange
        let mut backend = FakeBackend::new(BackendKind::Single);
        backend.fail_open = true;
        let (mut session, mut rx) = make_session(backend);

        // Act
        session.connect(Credential::password("secret"));

        // Assert
        let events = drain(&mut rx);
        assert!(matches!(
            events.as_slice(),
            [ViewerEvent::Disconnected { reason: ViewerError::BackendRejected(_) }]
        ));
        assert_eq!(session.backoff().timer().armed.len(), 1, "retry scheduled");
    }

    // ── Disconnect ────────────────────────────────────────────────────────────

    #[test]
    fn test_disconnect_is_idempotent_and_never_retries() {
        // Arrange
        let (mut session, mut rx) = make_session(FakeBackend::new(BackendKind::Single));
        session.connect(Credential::password("secret"));
        drain(&mut rx);

        // Act
        session.disconnect();
        session.disconnect();

        // Assert
        assert_eq!(
            drain(&mut rx),
            vec![ViewerEvent::Disconnected { reason: ViewerError::UserInitiatedDisconnect }]
        );
        assert!(!session.want_reconnect());
        assert_eq!(session.state(), SessionState::Idle);
        assert!(session.backoff().timer().armed.is_empty());
        assert_eq!(session.backend().teardowns, 1);
    }

    #[test]
    fn test_disconnect_cancels_pending_retry() {
        // Arrange
        let (mut session, mut rx) = make_session(FakeBackend::new(BackendKind::Single));
        session.connect(Credential::password("secret"));
        session.provide_transport(token(&session, None), None);
        let (ticket, _) = session.backoff().timer().armed[0];
        drain(&mut rx);

        // Act
        session.disconnect();
        session.retry_due(ticket);

        // Assert
        assert_eq!(session.backoff().timer().disarmed, vec![ticket]);
        assert!(drain(&mut rx).is_empty());
        assert_eq!(session.backend().opened.len(), 1, "no new attempt");
    }

    // ── Retry ─────────────────────────────────────────────────────────────────

    #[test]
    fn test_retry_due_starts_new_generation() {
        // Arrange
        let (mut session, mut rx) = make_session(FakeBackend::new(BackendKind::Single));
        session.connect(Credential::password("secret"));
        let first = current(&session);
        session.provide_transport(token(&session, None), None);
        let (ticket, _) = session.backoff().timer().armed[0];
        drain(&mut rx);

        // Act
        session.retry_due(ticket);

        // Assert
        let second = current(&session);
        assert!(second > first);
        assert_eq!(
            drain(&mut rx),
            vec![ViewerEvent::TransportRequested(TransportToken { generation: second, channel: None })]
        );
    }

    #[test]
    fn test_success_resets_backoff_cursor() {
        // Arrange – two failures walk the schedule
        let (mut session, mut rx) = make_session(FakeBackend::new(BackendKind::Single));
        let closed = Arc::new(AtomicUsize::new(0));
        session.connect(Credential::password("secret"));
        for _ in 0..2 {
            session.provide_transport(token(&session, None), None);
            let (ticket, _) = *session.backoff().timer().armed.last().expect("armed");
            session.retry_due(ticket);
        }
        assert_eq!(session.backoff().cursor(), 2);

        // Act
        session.provide_transport(token(&session, None), Some(handle(&closed)));
        session.handle_backend_event(Stamped::new(current(&session), BackendEvent::Connected));

        // Assert
        assert_eq!(session.backoff().cursor(), 0);
        assert!(drain(&mut rx).contains(&ViewerEvent::Connected));
    }

    #[test]
    fn test_stale_backend_event_changes_nothing() {
        // Arrange
        let (mut session, mut rx) = make_session(FakeBackend::new(BackendKind::Single));
        session.connect(Credential::password("secret"));
        let old = current(&session);
        session.connect(Credential::password("secret"));
        drain(&mut rx);

        // Act
        session.handle_backend_event(Stamped::new(old, BackendEvent::Connected));
        session.handle_backend_event(Stamped::new(old, BackendEvent::Disconnected));

        // Assert
        assert!(drain(&mut rx).is_empty());
        assert_eq!(session.state(), SessionState::Connecting);
    }

    // ── Multichannel backend ──────────────────────────────────────────────────

    #[test]
    fn test_audio_failure_is_ignored_and_display_ready_connects() {
        // Arrange
        let (mut session, mut rx) = make_session(FakeBackend::new(BackendKind::Multichannel));
        let closed = Arc::new(AtomicUsize::new(0));
        session.connect(Credential::password("secret"));
        announce(&mut session, DISPLAY, ChannelKind::Display);
        announce(&mut session, AUDIO, ChannelKind::Playback);
        let requested = drain(&mut rx);

        // Act
        session.provide_transport(token(&session, Some(AUDIO)), None);
        let after_audio = drain(&mut rx);
        session.provide_transport(token(&session, Some(DISPLAY)), Some(handle(&closed)));
        session.handle_backend_event(Stamped::new(
            current(&session),
            BackendEvent::SurfaceReady { channel: DISPLAY, format: format() },
        ));

        // Assert
        assert_eq!(requested.len(), 2, "one transport request per channel");
        assert!(after_audio.is_empty(), "audio failure must not end the session");
        assert_eq!(
            drain(&mut rx),
            vec![ViewerEvent::Connected, ViewerEvent::Resized { width: 800, height: 600 }]
        );
        assert!(session.surface().is_some());
        assert_eq!(session.channel(AUDIO).map(|c| c.transport), Some(TransportBinding::Failed));
    }

    #[test]
    fn test_display_never_ready_means_never_connected() {
        // Arrange
        let (mut session, mut rx) = make_session(FakeBackend::new(BackendKind::Multichannel));
        let closed = Arc::new(AtomicUsize::new(0));
        session.connect(Credential::password("secret"));
        for (id, kind) in [(ChannelId(1), ChannelKind::Main), (DISPLAY, ChannelKind::Display), (AUDIO, ChannelKind::Playback)] {
            announce(&mut session, id, kind);
        }
        drain(&mut rx);

        // Act
        for id in [ChannelId(1), DISPLAY, AUDIO] {
            session.provide_transport(token(&session, Some(id)), Some(handle(&closed)));
        }

        // Assert
        assert!(drain(&mut rx).is_empty());
        assert_eq!(session.state(), SessionState::Connecting);
        assert!(session.surface().is_none());
        assert!(session.current_frame().is_none());
    }

    #[test]
    fn test_missing_display_transport_disconnects_once() {
        let (mut session, mut rx) = make_session(FakeBackend::new(BackendKind::Multichannel));
        session.connect(Credential::password("secret"));
        announce(&mut session, DISPLAY, ChannelKind::Display);
        drain(&mut rx);

        session.provide_transport(token(&session, Some(DISPLAY)), None);

        assert_eq!(
            drain(&mut rx),
            vec![ViewerEvent::Disconnected { reason: ViewerError::TransportUnavailable }]
        );
        assert_eq!(session.backoff().timer().armed.len(), 1);
    }

    #[test]
    fn test_fatal_display_signal_tears_down_session() {
        // Arrange
        let (mut session, mut rx) = make_session(FakeBackend::new(BackendKind::Multichannel));
        let closed = Arc::new(AtomicUsize::new(0));
        session.connect(Credential::password("secret"));
        announce(&mut session, DISPLAY, ChannelKind::Display);
        session.provide_transport(token(&session, Some(DISPLAY)), Some(handle(&closed)));
        session.handle_backend_event(Stamped::new(
            current(&session),
            BackendEvent::SurfaceReady { channel: DISPLAY, format: format() },
        ));
        drain(&mut rx);

        // Act
        session.handle_backend_event(Stamped::new(
            current(&session),
            BackendEvent::ChannelSignal { channel: DISPLAY, signal: ChannelSignal::ErrorAuth },
        ));

        // Assert
        assert_eq!(
            drain(&mut rx),
            vec![ViewerEvent::Disconnected {
                reason: ViewerError::ChannelFatal { channel: DISPLAY, signal: ChannelSignal::ErrorAuth }
            }]
        );
        assert_eq!(closed.load(Ordering::SeqCst), 1, "backend teardown closed the transport");
        assert!(session.surface().is_none());
    }

    #[test]
    fn test_fatal_audio_signal_is_only_logged() {
        let (mut session, mut rx) = make_session(FakeBackend::new(BackendKind::Multichannel));
        session.connect(Credential::password("secret"));
        announce(&mut session, AUDIO, ChannelKind::Playback);
        drain(&mut rx);

        session.handle_backend_event(Stamped::new(
            current(&session),
            BackendEvent::ChannelSignal { channel: AUDIO, signal: ChannelSignal::ErrorIo },
        ));

        assert!(drain(&mut rx).is_empty());
        assert_eq!(session.state(), SessionState::Connecting);
    }

    #[test]
    fn test_placeholder_size_is_not_forwarded() {
        let (mut session, mut rx) = make_session(FakeBackend::new(BackendKind::Multichannel));
        session.connect(Credential::password("secret"));
        let generation = current(&session);

        session.handle_backend_event(Stamped::new(generation, BackendEvent::DesktopResized { width: 1, height: 1 }));
        session.handle_backend_event(Stamped::new(generation, BackendEvent::DesktopResized { width: 1024, height: 768 }));

        assert_eq!(drain(&mut rx), vec![ViewerEvent::Resized { width: 1024, height: 768 }]);
    }

    // ── Grabs ─────────────────────────────────────────────────────────────────

    #[test]
    fn test_grab_changes_are_reported_once_and_released_on_teardown() {
        // Arrange
        let (mut session, mut rx) = make_session(FakeBackend::new(BackendKind::Single));
        session.connect(Credential::password("secret"));
        let generation = current(&session);
        drain(&mut rx);

        // Act
        for _ in 0..2 {
            session.handle_backend_event(Stamped::new(
                generation,
                BackendEvent::GrabChanged { kind: GrabKind::Mouse, grabbed: true },
            ));
        }
        session.disconnect();

        // Assert
        assert_eq!(
            drain(&mut rx),
            vec![
                ViewerEvent::InputGrabChanged { kind: GrabKind::Mouse, grabbed: true },
                ViewerEvent::InputGrabChanged { kind: GrabKind::Mouse, grabbed: false },
                ViewerEvent::Disconnected { reason: ViewerError::UserInitiatedDisconnect },
            ]
        );
        assert!(!session.mouse_grabbed());
        assert!(!session.keyboard_grabbed());
    }

    // ── Motion ────────────────────────────────────────────────────────────────

    #[test]
    fn test_filter_motion_uses_configured_rate() {
        let config = SessionConfig { max_mouse_rate: Some(100), ..SessionConfig::default() };
        let (mut session, _rx) = ViewerSession::new(
            FakeBackend::new(BackendKind::Multichannel),
            RecordingTimer::default(),
            config,
        );

        let verdicts: Vec<MotionVerdict> = [0, 5, 6, 20, 21]
            .iter()
            .map(|&t| session.filter_motion(&MotionEvent::at(t)))
            .collect();

        use MotionVerdict::{Accept, Reject};
        assert_eq!(verdicts, vec![Accept, Accept, Reject, Accept, Accept]);
    }
}
