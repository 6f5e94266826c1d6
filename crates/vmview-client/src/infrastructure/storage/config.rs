//! TOML-based configuration persistence for the viewer.
//!
//! Reads and writes `AppConfig` to the platform-appropriate config file:
//! - Windows:  `%APPDATA%\VMView\config.toml`
//! - Linux:    `~/.config/vmview/config.toml` (or `$XDG_CONFIG_HOME/vmview`)
//! - macOS:    `~/Library/Application Support/VMView/config.toml`
//!
//! Example file:
//!
//! ```toml
//! [viewer]
//! backend = "multichannel"
//! max_mouse_rate = 50
//! log_level = "info"
//!
//! [reconnect]
//! schedule_ms = [1000, 2000, 5000, 10000]
//!
//! [transport]
//! endpoint = "unix:/run/vmnetx/display.sock"
//! ```
//!
//! # Serde default values
//!
//! Every section and field has a default, so a missing file, a missing
//! section or a missing key all fall back to the values shown above (with
//! `max_mouse_rate` unset and the endpoint `127.0.0.1:5900`).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use vmview_core::{BackendKind, BackoffSchedule};

use crate::application::viewer_session::SessionConfig;
use crate::infrastructure::network::Endpoint;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// The config parsed but holds an unusable value.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level application configuration stored on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub viewer: ViewerConfig,
    #[serde(default)]
    pub reconnect: ReconnectConfig,
    #[serde(default)]
    pub transport: TransportConfig,
}

/// Display and input settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ViewerConfig {
    /// Which display backend to drive.
    #[serde(default = "default_backend")]
    pub backend: BackendKind,
    /// Maximum pointer-motion events per second.  Absent or 0 disables
    /// rate limiting.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_mouse_rate: Option<u32>,
    /// `tracing` log level used when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Reconnect cadence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReconnectConfig {
    /// Waits between attempts in milliseconds; the last one repeats forever.
    #[serde(default = "default_schedule_ms")]
    pub schedule_ms: Vec<u64>,
}

/// Where transports come from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransportConfig {
    /// `host:port` or `unix:<path>`.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_backend() -> BackendKind {
    BackendKind::Multichannel
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_schedule_ms() -> Vec<u64> {
    BackoffSchedule::DEFAULT_MS.to_vec()
}
fn default_endpoint() -> String {
    "127.0.0.1:5900".to_string()
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            max_mouse_rate: None,
            log_level: default_log_level(),
        }
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self { schedule_ms: default_schedule_ms() }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self { endpoint: default_endpoint() }
    }
}

// ── Validation and conversion ─────────────────────────────────────────────────

impl AppConfig {
    /// Checks every value the runtime depends on.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for an empty or zero-containing
    /// reconnect schedule or an unparseable endpoint.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.backoff_schedule()?;
        self.endpoint()?;
        Ok(())
    }

    /// The reconnect schedule.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if the schedule is empty or contains 0.
    pub fn backoff_schedule(&self) -> Result<BackoffSchedule, ConfigError> {
        if self.reconnect.schedule_ms.contains(&0) {
            return Err(ConfigError::Invalid(
                "reconnect.schedule_ms entries must be greater than 0".to_string(),
            ));
        }
        BackoffSchedule::from_millis(&self.reconnect.schedule_ms)
            .map_err(|e| ConfigError::Invalid(format!("reconnect.schedule_ms: {e}")))
    }

    /// The transport endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if the endpoint does not parse.
    pub fn endpoint(&self) -> Result<Endpoint, ConfigError> {
        self.transport
            .endpoint
            .parse()
            .map_err(|e| ConfigError::Invalid(format!("transport.endpoint: {e}")))
    }

    /// Session tunables derived from this config.
    ///
    /// # Errors
    ///
    /// Same as [`backoff_schedule`](Self::backoff_schedule).
    pub fn session_config(&self) -> Result<SessionConfig, ConfigError> {
        Ok(SessionConfig {
            schedule: self.backoff_schedule()?,
            max_mouse_rate: self.viewer.max_mouse_rate,
        })
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Determines the platform-appropriate directory for the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] when the platform config base
/// directory cannot be determined from the environment.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    platform_config_dir().ok_or(ConfigError::NoPlatformConfigDir)
}

/// Resolves the full path to the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] if the base directory cannot be
/// determined.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.toml"))
}

/// Loads `AppConfig` from the platform config file, returning defaults if the
/// file does not yet exist.
///
/// # Errors
///
/// See [`load_config_from`].
pub fn load_config() -> Result<AppConfig, ConfigError> {
    load_config_from(&config_file_path()?)
}

/// Reads `AppConfig` from `path` without validating it, returning defaults
/// if the file does not exist.
///
/// Callers that apply overrides on top of the file validate afterwards.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found"
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn read_config_from(path: &Path) -> Result<AppConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str::<AppConfig>(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(AppConfig::default()),
        Err(source) => Err(ConfigError::Io { path: path.to_path_buf(), source }),
    }
}

/// Loads and validates `AppConfig` from `path`, returning defaults if the file
/// does not exist.
///
/// # Errors
///
/// Everything [`read_config_from`] returns, plus [`ConfigError::Invalid`] if
/// validation fails.
pub fn load_config_from(path: &Path) -> Result<AppConfig, ConfigError> {
    let cfg = read_config_from(path)?;
    cfg.validate()?;
    Ok(cfg)
}

/// Persists `config` to the platform config file.
///
/// # Errors
///
/// See [`save_config_to`].
pub fn save_config(config: &AppConfig) -> Result<(), ConfigError> {
    save_config_to(config, &config_file_path()?)
}

/// Persists `config` to `path`, creating the parent directory if needed.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config_to(config: &AppConfig, path: &Path) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}

/// Resolves the platform config directory including the `VMView` subdirectory.
fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        // %APPDATA% e.g. C:\Users\<user>\AppData\Roaming
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("VMView"))
    }

    #[cfg(target_os = "linux")]
    {
        // XDG_CONFIG_HOME or ~/.config
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("vmview"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("VMView")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
