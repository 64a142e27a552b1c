//! Human-readable status reporting
//!
//! The host that embeds a tunnel (a plugin framework, a CLI) renders these
//! transitions however it likes; the tunnel only pushes them into a sink.

use std::fmt;
use tracing::{info, warn};

/// Status transitions reported by the relay and the forwarder
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TunnelStatus {
    /// No tunnel session is open
    Disconnected,
    /// The forwarder is dialing the relay
    Connecting,
    /// A tunnel session is open
    Established,
    /// The forwarder lost its session and will reconnect
    ConnectionLost,
    /// The session failed with an error
    Error(String),
    /// The configuration cannot be used (e.g. missing relay URL)
    InvalidUrl,
}

impl fmt::Display for TunnelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => f.write_str("disconnected"),
            Self::Connecting => f.write_str("connecting"),
            Self::Established => f.write_str("WebSocket tunnel established"),
            Self::ConnectionLost => f.write_str("Disconnected from the WebSocket server"),
            Self::Error(_) => f.write_str("Error"),
            Self::InvalidUrl => f.write_str("The URL is invalid or not defined."),
        }
    }
}

/// Receiver for status transitions
pub trait StatusSink: Send + Sync {
    fn report(&self, status: TunnelStatus);
}

/// Status sink that writes every transition to the log
#[derive(Debug, Clone, Default)]
pub struct LogStatus {
    name: String,
}

impl LogStatus {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl StatusSink for LogStatus {
    fn report(&self, status: TunnelStatus) {
        match &status {
            TunnelStatus::Error(reason) => warn!("[{}] {}: {}", self.name, status, reason),
            _ => info!("[{}] {}", self.name, status),
        }
    }
}
