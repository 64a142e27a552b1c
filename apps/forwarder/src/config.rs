use std::time::Duration;
use url::Url;
use ws_tunnel_common::{
    Result, TunnelError,
    constants::{RECONNECT_DELAY_MS, UPSTREAM_TIMEOUT_MS},
};

/// Configuration for the forwarder
#[derive(Debug, Clone)]
pub struct Config {
    /// Relay WebSocket URL (e.g., "ws://relay.example.com:8083")
    pub websocket_url: String,

    /// Fixed delay between a dropped session and the next connect attempt
    pub reconnect_delay: Duration,

    /// Budget for one upstream exchange
    pub request_timeout: Duration,
}

impl Config {
    /// Build a configuration with default timings after validating the relay URL
    pub fn new(websocket_url: Option<&str>) -> Result<Self> {
        let websocket_url = validate_websocket_url(websocket_url)?;

        Ok(Self {
            websocket_url,
            reconnect_delay: Duration::from_millis(RECONNECT_DELAY_MS),
            request_timeout: Duration::from_millis(UPSTREAM_TIMEOUT_MS),
        })
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// Accept only `ws://` and `wss://` URLs with a host
fn validate_websocket_url(url: Option<&str>) -> Result<String> {
    let url = url
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .ok_or_else(|| TunnelError::InvalidConfig("The URL is invalid or not defined.".to_string()))?;

    let parsed = Url::parse(url)
        .map_err(|e| TunnelError::InvalidConfig(format!("Invalid relay URL {}: {}", url, e)))?;

    match parsed.scheme() {
        "ws" | "wss" => {}
        scheme => {
            return Err(TunnelError::InvalidConfig(format!(
                "Relay URL must use ws:// or wss://, got {}://",
                scheme
            )));
        }
    }

    if parsed.host_str().is_none_or(str::is_empty) {
        return Err(TunnelError::InvalidConfig(format!(
            "Relay URL {} has no host",
            url
        )));
    }

    Ok(url.to_string())
}
