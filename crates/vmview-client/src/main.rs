//! VMView viewer: entry point.
//!
//! Loads the configuration, starts the single-task viewer runtime and keeps
//! the display session alive until Ctrl+C.
//!
//! # Usage
//!
//! ```text
//! vmview [OPTIONS]
//!
//! Options:
//!   --config <PATH>          Config file [default: platform config dir]
//!   --endpoint <ENDPOINT>    host:port or unix:<path> to open transports on
//!   --backend <KIND>         single | multichannel
//!   --max-mouse-rate <N>     Pointer events per second (0 = unlimited)
//!   --password <SECRET>      Display password
//!   --save-config            Write the effective config back to disk
//! ```
//!
//! # Environment variable overrides
//!
//! | Variable          | Description                        |
//! |-------------------|------------------------------------|
//! | `VMVIEW_CONFIG`   | Config file path                   |
//! | `VMVIEW_ENDPOINT` | Transport endpoint                 |
//! | `VMVIEW_PASSWORD` | Display password                   |
//! | `RUST_LOG`        | Log filter; beats `viewer.log_level` |
//!
//! # Startup sequence
//!
//! 1. CLI arguments are parsed with `clap`.
//! 2. The config file is loaded (defaults if absent), CLI overrides are
//!    applied and the result is validated.
//! 3. `tracing_subscriber` is initialised from `RUST_LOG`, falling back to
//!    `viewer.log_level`.
//! 4. The runtime is spawned and asked to connect.
//! 5. Presentation events are folded into [`ViewerAppState`] and logged until
//!    Ctrl+C shuts the runtime down.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use vmview_client::infrastructure::backend::mock::MockDisplayBackend;
use vmview_client::infrastructure::network::{SocketTransport, SocketTransportResolver};
use vmview_client::infrastructure::runtime::ViewerRuntime;
use vmview_client::infrastructure::storage::config::{
    config_file_path, read_config_from, save_config_to, AppConfig,
};
use vmview_client::infrastructure::ui_bridge::{get_viewer_status, ViewerAppState};
use vmview_core::{BackendKind, Credential, SurfaceFormat, ViewerEvent};

/// Surface the simulated display reports until a real display library is
/// wired in.
const SIMULATED_FORMAT: SurfaceFormat = SurfaceFormat {
    pixel_format: 32,
    width: 1024,
    height: 768,
    stride: 4096,
};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// VMView remote display viewer.
#[derive(Debug, Parser)]
#[command(name = "vmview", about = "Remote display viewer with automatic reconnect", version)]
struct Cli {
    /// Path of the TOML config file.
    ///
    /// Defaults to `config.toml` in the platform config directory.
    #[arg(long, env = "VMVIEW_CONFIG")]
    config: Option<PathBuf>,

    /// Transport endpoint, `host:port` or `unix:<path>`.
    #[arg(long, env = "VMVIEW_ENDPOINT")]
    endpoint: Option<String>,

    /// Display backend to drive.
    #[arg(long, value_parser = parse_backend)]
    backend: Option<BackendKind>,

    /// Maximum pointer-motion events per second; 0 disables rate limiting.
    #[arg(long)]
    max_mouse_rate: Option<u32>,

    /// Password presented to the remote display.
    #[arg(long, env = "VMVIEW_PASSWORD", hide_env_values = true, default_value = "")]
    password: String,

    /// Write the effective configuration back to the config file.
    #[arg(long)]
    save_config: bool,
}

fn parse_backend(s: &str) -> Result<BackendKind, String> {
    match s.to_ascii_lowercase().as_str() {
        "single" => Ok(BackendKind::Single),
        "multichannel" => Ok(BackendKind::Multichannel),
        other => Err(format!("unknown backend '{other}' (expected single or multichannel)")),
    }
}

impl Cli {
    /// The config file this invocation reads and, with `--save-config`,
    /// writes.
    fn config_path(&self) -> anyhow::Result<PathBuf> {
        match &self.config {
            Some(path) => Ok(path.clone()),
            None => config_file_path().context("cannot locate the platform config directory"),
        }
    }

    /// Loads the config file and applies the command-line overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if the
    /// config does not validate once the overrides are applied.
    fn app_config(&self) -> anyhow::Result<AppConfig> {
        let path = self.config_path()?;
        let mut config = read_config_from(&path)
            .with_context(|| format!("failed to load config from {}", path.display()))?;

        if let Some(endpoint) = &self.endpoint {
            config.transport.endpoint = endpoint.clone();
        }
        if let Some(backend) = self.backend {
            config.viewer.backend = backend;
        }
        if let Some(rate) = self.max_mouse_rate {
            config.viewer.max_mouse_rate = Some(rate);
        }
        config.validate().context("invalid configuration")?;
        Ok(config)
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli.app_config()?;

    // ── Logging setup ─────────────────────────────────────────────────────────
    //
    // `RUST_LOG` wins; otherwise the level from the config file applies.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.viewer.log_level)),
        )
        .init();

    if cli.save_config {
        let path = cli.config_path()?;
        save_config_to(&config, &path)
            .with_context(|| format!("failed to save config to {}", path.display()))?;
        info!("config saved to {}", path.display());
    }

    let endpoint = config.endpoint()?;
    info!(
        "VMView starting: backend={}, endpoint={}",
        config.viewer.backend, endpoint
    );

    // ── Runtime ───────────────────────────────────────────────────────────────
    let (backend_tx, backend_rx) = mpsc::unbounded_channel();
    let backend: MockDisplayBackend<SocketTransport> =
        MockDisplayBackend::simulating(config.viewer.backend, backend_tx, SIMULATED_FORMAT);
    let (runtime, handle, mut events) = ViewerRuntime::new(
        backend,
        backend_rx,
        SocketTransportResolver::new(endpoint),
        config.session_config()?,
    );
    let runtime_task = tokio::spawn(runtime.run());

    // ── Graceful shutdown ─────────────────────────────────────────────────────
    let shutdown = handle.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C; disconnecting");
                if shutdown.shutdown().await.is_err() {
                    debug!("runtime already stopped");
                }
            }
            Err(e) => {
                tracing::error!("failed to listen for Ctrl+C signal: {e}");
            }
        }
    });

    handle.connect(Credential::password(cli.password)).await?;

    // ── Presentation loop ─────────────────────────────────────────────────────
    let state = ViewerAppState::new();
    while let Some(event) = events.recv().await {
        state.apply(&event).await;
        match &event {
            ViewerEvent::Connected => info!("display connected"),
            ViewerEvent::Disconnected { reason } if reason.is_retryable() => {
                warn!("display disconnected: {reason}")
            }
            ViewerEvent::Disconnected { reason } => info!("display disconnected: {reason}"),
            ViewerEvent::Resized { width, height } => info!("desktop size {width}x{height}"),
            ViewerEvent::InputGrabChanged { kind, grabbed } => debug!(?kind, grabbed, "input grab"),
            ViewerEvent::TransportRequested(token) => debug!(%token, "transport requested"),
        }
    }

    runtime_task.await.context("viewer runtime task failed")?;

    let status = get_viewer_status(Arc::clone(&state)).await;
    if let Some(status) = status.data {
        info!(
            "VMView stopped: status={}, failed_attempts={}",
            status.connection_status, status.failed_attempts
        );
    }
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
