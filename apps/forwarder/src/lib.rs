//! Private-side half of the WebSocket tunnel
//!
//! The forwarder dials the relay, keeps the session alive across drops, and
//! answers every request frame by replaying its bytes against the upstream
//! named in the request's `Host` header.

pub mod config;
pub mod connection;
pub mod dispatcher;

pub use config::Config;
pub use connection::{ConnectionManager, ConnectionState};
pub use dispatcher::UpstreamDispatcher;
