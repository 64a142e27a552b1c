mod config;
mod pending;
mod route;

pub use config::{ListenerConfig, TunnelConfig};
pub use pending::PendingRequest;
pub use route::UpstreamRoute;
