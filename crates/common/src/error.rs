use http::StatusCode;
use thiserror::Error;

use crate::constants::TUNNEL_ERROR_NAME;

/// Error types for the WebSocket tunnel system
#[derive(Error, Debug)]
pub enum TunnelError {
    #[error("Malformed frame: {0} bytes is shorter than the correlation identifier")]
    MalformedFrame(usize),

    #[error("Missing Host header in request")]
    MissingHostHeader,

    #[error("Invalid Host header: {0}")]
    InvalidHostHeader(String),

    #[error("Upstream connection error: {0}")]
    UpstreamConnectionError(String),

    /// Tagged error; `name` replaces the reason phrase in the status line
    #[error("{message}")]
    TunnelUnavailable {
        message: String,
        status: u16,
        name: String,
    },

    #[error("Timeout waiting for response")]
    Timeout,

    #[error("Request header block exceeds {0} bytes")]
    RequestTooLarge(usize),

    #[error("WebSocket error: {0}")]
    WebSocketError(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl TunnelError {
    /// The error raised when a request needs the tunnel and no session is open
    pub fn tunnel_unavailable() -> Self {
        Self::TunnelUnavailable {
            message: "WebSocket connection not established.".to_string(),
            status: StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
            name: TUNNEL_ERROR_NAME.to_string(),
        }
    }

    /// HTTP status used when this error is turned into a synthesized response
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Timeout => StatusCode::REQUEST_TIMEOUT,
            Self::TunnelUnavailable { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
            Self::MissingHostHeader | Self::InvalidHostHeader(_) => StatusCode::BAD_REQUEST,
            Self::RequestTooLarge(_) => StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE,
            Self::UpstreamConnectionError(_) | Self::MalformedFrame(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Type alias for Results using TunnelError
pub type Result<T> = std::result::Result<T, TunnelError>;
