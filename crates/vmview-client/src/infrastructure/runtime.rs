//! The viewer event loop.
//!
//! Everything the session reacts to arrives as a message on its own `mpsc`
//! channel, and one task handles them strictly one at a time:
//!
//! ```text
//!  RuntimeHandle ──HostCommand──────────┐
//!  backend ───────Stamped<BackendEvent>─┤
//!  resolver tasks ─(token, transport)───┼──► select! ──► ViewerSession
//!  TokioRetryTimer ─RetryTicket─────────┘                    │
//!                                                            ▼
//!                         TransportRequested ──► spawn resolver task
//!                         every event        ──► presentation receiver
//! ```
//!
//! Transport requests are forwarded too, so the presentation layer can tell
//! that an attempt is in progress.
//!
//! # Why one task? (for beginners)
//!
//! The session is a plain `&mut self` state machine with no locks.  Running
//! it on a single task means no two handlers ever overlap, so there is nothing
//! to lock.  Slow work (connecting sockets, sleeping for a retry) happens in
//! separate tasks that report back with a message.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};
use vmview_core::{
    BackendEvent, Credential, Frame, MotionEvent, MotionVerdict, RetryTicket, Stamped,
    TransportToken, ViewerEvent,
};

use crate::application::backend::DisplayBackend;
use crate::application::viewer_session::{SessionConfig, ViewerSession};
use crate::infrastructure::network::TransportResolver;
use crate::infrastructure::timer::TokioRetryTimer;

/// Capacity of the host command queue.
const COMMAND_QUEUE: usize = 64;

/// Error returned by [`RuntimeHandle`] once the loop has stopped.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RuntimeError {
    #[error("viewer runtime has stopped")]
    Stopped,
}

/// Requests from the host to the event loop.
#[derive(Debug)]
pub enum HostCommand {
    Connect(Credential),
    Disconnect,
    /// Shape a pointer-motion event; the verdict is sent back on `reply`.
    Motion {
        event: MotionEvent,
        reply: oneshot::Sender<MotionVerdict>,
    },
    /// Capture the current frame, if a surface exists.
    CaptureFrame(oneshot::Sender<Option<Frame>>),
    /// Disconnect and stop the loop.
    Shutdown,
}

/// Cloneable sender side of the event loop.
#[derive(Debug, Clone)]
pub struct RuntimeHandle {
    commands: mpsc::Sender<HostCommand>,
}

impl RuntimeHandle {
    /// Starts connecting with `credential`.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Stopped`] if the loop is gone.
    pub async fn connect(&self, credential: Credential) -> Result<(), RuntimeError> {
        self.send(HostCommand::Connect(credential)).await
    }

    /// Disconnects without stopping the loop.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Stopped`] if the loop is gone.
    pub async fn disconnect(&self) -> Result<(), RuntimeError> {
        self.send(HostCommand::Disconnect).await
    }

    /// Shapes one pointer-motion event.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Stopped`] if the loop is gone.
    pub async fn motion(&self, event: MotionEvent) -> Result<MotionVerdict, RuntimeError> {
        let (reply, verdict) = oneshot::channel();
        self.send(HostCommand::Motion { event, reply }).await?;
        verdict.await.map_err(|_| RuntimeError::Stopped)
    }

    /// Captures the current frame.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Stopped`] if the loop is gone.
    pub async fn capture_frame(&self) -> Result<Option<Frame>, RuntimeError> {
        let (reply, frame) = oneshot::channel();
        self.send(HostCommand::CaptureFrame(reply)).await?;
        frame.await.map_err(|_| RuntimeError::Stopped)
    }

    /// Disconnects and stops the loop.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Stopped`] if the loop is already gone.
    pub async fn shutdown(&self) -> Result<(), RuntimeError> {
        self.send(HostCommand::Shutdown).await
    }

    async fn send(&self, command: HostCommand) -> Result<(), RuntimeError> {
        self.commands.send(command).await.map_err(|_| RuntimeError::Stopped)
    }
}

type Resolution<T> = (TransportToken, Option<T>);

/// The single-task event loop that owns a [`ViewerSession`].
pub struct ViewerRuntime<B, R>
where
    B: DisplayBackend,
    R: TransportResolver<Transport = B::Transport>,
{
    session: ViewerSession<B, TokioRetryTimer>,
    session_events: mpsc::UnboundedReceiver<ViewerEvent>,
    backend_events: mpsc::UnboundedReceiver<Stamped<BackendEvent>>,
    retries: mpsc::UnboundedReceiver<RetryTicket>,
    answers_tx: mpsc::UnboundedSender<Resolution<B::Transport>>,
    answers: mpsc::UnboundedReceiver<Resolution<B::Transport>>,
    commands: mpsc::Receiver<HostCommand>,
    output: mpsc::UnboundedSender<ViewerEvent>,
    resolver: Arc<R>,
}

impl<B, R> ViewerRuntime<B, R>
where
    B: DisplayBackend + Send + 'static,
    B::Transport: Send + 'static,
    R: TransportResolver<Transport = B::Transport>,
{
    /// Builds the loop.
    ///
    /// `backend_events` must be the receiving end of the channel the backend
    /// raises its events on.  Returns the loop (to be `run`), a handle for
    /// sending commands and the receiver of presentation events.
    pub fn new(
        backend: B,
        backend_events: mpsc::UnboundedReceiver<Stamped<BackendEvent>>,
        resolver: R,
        config: SessionConfig,
    ) -> (Self, RuntimeHandle, mpsc::UnboundedReceiver<ViewerEvent>) {
        let (timer, retries) = TokioRetryTimer::new();
        let (session, session_events) = ViewerSession::new(backend, timer, config);
        let (answers_tx, answers) = mpsc::unbounded_channel();
        let (commands_tx, commands) = mpsc::channel(COMMAND_QUEUE);
        let (output, output_rx) = mpsc::unbounded_channel();

        let runtime = Self {
            session,
            session_events,
            backend_events,
            retries,
            answers_tx,
            answers,
            commands,
            output,
            resolver: Arc::new(resolver),
        };
        (runtime, RuntimeHandle { commands: commands_tx }, output_rx)
    }

    /// Runs until [`HostCommand::Shutdown`] or until every handle is dropped.
    ///
    /// The session is disconnected before returning.
    pub async fn run(mut self) {
        info!(backend = %self.session.backend_kind(), "viewer runtime started");
        loop {
            self.forward_session_events();
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(HostCommand::Shutdown) | None => break,
                    Some(command) => self.handle_command(command),
                },
                Some(stamped) = self.backend_events.recv() => {
                    self.session.handle_backend_event(stamped);
                }
                Some((token, transport)) = self.answers.recv() => {
                    self.session.provide_transport(token, transport);
                }
                Some(ticket) = self.retries.recv() => {
                    self.session.retry_due(ticket);
                }
            }
        }
        self.session.disconnect();
        self.forward_session_events();
        info!("viewer runtime stopped");
    }

    fn handle_command(&mut self, command: HostCommand) {
        match command {
            HostCommand::Connect(credential) => self.session.connect(credential),
            HostCommand::Disconnect => self.session.disconnect(),
            HostCommand::Motion { event, reply } => {
                let verdict = self.session.filter_motion(&event);
                if reply.send(verdict).is_err() {
                    debug!("motion caller went away");
                }
            }
            HostCommand::CaptureFrame(reply) => {
                if reply.send(self.session.current_frame()).is_err() {
                    debug!("frame caller went away");
                }
            }
            HostCommand::Shutdown => {}
        }
    }

    /// Services transport requests and forwards every event.
    fn forward_session_events(&mut self) {
        while let Ok(event) = self.session_events.try_recv() {
            if let ViewerEvent::TransportRequested(token) = event {
                self.spawn_resolution(token);
            }
            if self.output.send(event).is_err() {
                debug!("presentation receiver dropped");
            }
        }
    }

    fn spawn_resolution(&self, token: TransportToken) {
        debug!(%token, "resolving transport");
        let resolver = Arc::clone(&self.resolver);
        let answers = self.answers_tx.clone();
        tokio::spawn(async move {
            let transport = resolver.resolve(token).await;
            // A failed send drops (closes) the transport.
            if answers.send((token, transport)).is_err() {
                debug!(%token, "runtime stopped before the transport arrived");
            }
        });
    }
}
