//! Socket transport resolver.
//!
//! Connects to the remote display over TCP (`host:port`) or a Unix domain
//! socket (`unix:/path`).  Every channel of a multichannel session gets its
//! own connection to the same endpoint.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use async_trait::async_trait;
use thiserror::Error;
use tokio::net::TcpStream;
#[cfg(unix)]
use tokio::net::UnixStream;
use tracing::{debug, warn};
use vmview_core::TransportToken;

use super::TransportResolver;

/// Error type for transport resolution.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The endpoint string is neither `host:port` nor `unix:<path>`.
    #[error("invalid endpoint '{0}': expected host:port or unix:<path>")]
    InvalidEndpoint(String),

    /// Connecting to the endpoint failed.
    #[error("failed to connect to {endpoint}: {source}")]
    Connect {
        endpoint: String,
        #[source]
        source: std::io::Error,
    },

    /// Unix sockets are not available on this platform.
    #[error("unix socket endpoints are not supported on this platform")]
    UnixUnsupported,
}

/// Where the remote display listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Tcp { host: String, port: u16 },
    Unix(PathBuf),
}

impl FromStr for Endpoint {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = || TransportError::InvalidEndpoint(s.to_string());

        if let Some(path) = s.strip_prefix("unix:") {
            if path.is_empty() {
                return Err(invalid());
            }
            return Ok(Endpoint::Unix(PathBuf::from(path)));
        }

        if let Ok(addr) = s.parse::<std::net::SocketAddr>() {
            return Ok(Endpoint::Tcp { host: addr.ip().to_string(), port: addr.port() });
        }

        let (host, port) = s.rsplit_once(':').ok_or_else(invalid)?;
        if host.is_empty() || host.contains(':') {
            return Err(invalid());
        }
        let port = port.parse::<u16>().map_err(|_| invalid())?;
        Ok(Endpoint::Tcp { host: host.to_string(), port })
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Tcp { host, port } if host.contains(':') => write!(f, "[{host}]:{port}"),
            Endpoint::Tcp { host, port } => write!(f, "{host}:{port}"),
            Endpoint::Unix(path) => write!(f, "unix:{}", path.display()),
        }
    }
}

/// A connected stream carrying the remote display protocol.
///
/// Dropping it closes the connection.
#[derive(Debug)]
pub enum SocketTransport {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(UnixStream),
}

/// Resolves every request by connecting to one endpoint.
#[derive(Debug, Clone)]
pub struct SocketTransportResolver {
    endpoint: Endpoint,
}

impl SocketTransportResolver {
    pub fn new(endpoint: Endpoint) -> Self {
        Self { endpoint }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Opens one connection to the endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Connect`] if the connection fails and
    /// [`TransportError::UnixUnsupported`] for a Unix endpoint on a platform
    /// without Unix sockets.
    pub async fn connect(&self) -> Result<SocketTransport, TransportError> {
        let connect_error = |source| TransportError::Connect {
            endpoint: self.endpoint.to_string(),
            source,
        };
        match &self.endpoint {
            Endpoint::Tcp { host, port } => {
                let stream = TcpStream::connect((host.as_str(), *port))
                    .await
                    .map_err(connect_error)?;
                // Pointer and keyboard traffic is latency-sensitive.
                if let Err(e) = stream.set_nodelay(true) {
                    debug!("could not disable Nagle on display transport: {e}");
                }
                Ok(SocketTransport::Tcp(stream))
            }
            #[cfg(unix)]
            Endpoint::Unix(path) => {
                let stream = UnixStream::connect(path).await.map_err(connect_error)?;
                Ok(SocketTransport::Unix(stream))
            }
            #[cfg(not(unix))]
            Endpoint::Unix(_) => Err(TransportError::UnixUnsupported),
        }
    }
}

#[async_trait]
impl TransportResolver for SocketTransportResolver {
    type Transport = SocketTransport;

    async fn resolve(&self, token: TransportToken) -> Option<SocketTransport> {
        match self.connect().await {
            Ok(transport) => {
                debug!(%token, endpoint = %self.endpoint, "transport connected");
                Some(transport)
            }
            Err(e) => {
                warn!(%token, "transport unavailable: {e}");
                None
            }
        }
    }
}
