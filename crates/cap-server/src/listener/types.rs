use std::fmt;
use std::net::SocketAddr;

/// Reasons a listener could not start or keep serving
#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("TLS configuration error: {0}")]
    Tls(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Health signal published by a running listener
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenerState {
    Starting,
    Serving(SocketAddr),
    Failed(String),
    Stopped,
}

impl ListenerState {
    pub fn is_serving(&self) -> bool {
        matches!(self, ListenerState::Serving(_))
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        match self {
            ListenerState::Serving(addr) => Some(*addr),
            _ => None,
        }
    }
}

impl fmt::Display for ListenerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListenerState::Starting => f.write_str("starting"),
            ListenerState::Serving(addr) => write!(f, "serving on {addr}"),
            ListenerState::Failed(reason) => write!(f, "failed: {reason}"),
            ListenerState::Stopped => f.write_str("stopped"),
        }
    }
}
