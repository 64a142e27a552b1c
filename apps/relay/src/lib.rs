//! Relay side of the WebSocket tunnel
//!
//! The relay accepts public TCP connections on the ingress port, ships each
//! buffered request through the single WebSocket tunnel opened by the
//! forwarder, and writes the correlated response back to the caller.

pub mod error_handling;
pub mod ingress;
pub mod registry;
pub mod server;
pub mod session;

pub use registry::CorrelationRegistry;
pub use server::{RunningTunnel, TunnelServer, Tunnels};
pub use session::{RelaySession, SessionState};
