//! Common utilities and types for the WebSocket tunnel system
//!
//! This crate provides the wire format, raw HTTP helpers, configuration models and
//! error types shared by both the relay (public side) and the forwarder (private side).

pub mod constants;
pub mod error;
pub mod models;
pub mod protocol;
pub mod status;
pub mod utils;

// Re-export commonly used types for convenience
pub use error::{Result, TunnelError};
pub use models::{ListenerConfig, PendingRequest, TunnelConfig, UpstreamRoute};
pub use protocol::{CorrelationId, Frame};
pub use status::{LogStatus, StatusSink, TunnelStatus};
pub use utils::{generate_correlation_id, http_date, spawn_write_task};
