use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use crate::constants::{
    DEFAULT_DST_ADDR, DEFAULT_DST_PORT, DEFAULT_SRC_ADDR, DEFAULT_SRC_PORT, DEFAULT_WS_HOST,
    DEFAULT_WS_PORT, MAX_HEADER_BLOCK_BYTES, PING_INTERVAL_SECS, REQUEST_TIMEOUT_MS,
};
use crate::error::{Result, TunnelError};
use crate::models::UpstreamRoute;

/// Tunnel configuration as supplied by the host (a JSON node or CLI flags)
///
/// Every field is optional; [`TunnelConfig::into_listener_config`] fills in
/// defaults and validates.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TunnelConfig {
    /// Display name of the tunnel
    pub name: Option<String>,

    /// WebSocket listen host
    pub host: Option<String>,

    /// WebSocket listen port
    pub port: Option<u16>,

    /// Ingress listen address
    pub src_addr: Option<String>,

    /// Ingress listen port
    pub src_port: Option<u16>,

    /// Destination written into the Host header; a bare host or a URL
    /// Example: "https://intranet.local"
    pub dst_addr: Option<String>,

    /// Destination port, overriding any port implied by `dst_addr`
    pub dst_port: Option<u16>,

    /// Round-trip budget per request in milliseconds
    pub timeout: Option<u64>,
}

/// Immutable snapshot the relay runs with
///
/// Never mutated after startup; reconfiguration replaces it and restarts the
/// listeners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerConfig {
    pub name: String,
    pub ws_host: String,
    pub ws_port: u16,
    pub src_addr: String,
    pub src_port: u16,
    pub destination: UpstreamRoute,
    pub request_timeout: Duration,
    pub ping_interval: Duration,
    pub max_header_bytes: usize,
}

impl TunnelConfig {
    /// Parse a JSON configuration document
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Apply defaults, validate, and freeze into a [`ListenerConfig`]
    pub fn into_listener_config(self) -> Result<ListenerConfig> {
        let (dst_host, implied_port) = match non_empty(self.dst_addr) {
            Some(addr) => parse_destination(&addr)?,
            None => (DEFAULT_DST_ADDR.to_string(), None),
        };

        let dst_port = self
            .dst_port
            .or(implied_port)
            .unwrap_or(DEFAULT_DST_PORT);
        if dst_port == 0 {
            return Err(TunnelError::InvalidConfig(
                "dstPort must be between 1 and 65535".to_string(),
            ));
        }

        let timeout_ms = self.timeout.unwrap_or(REQUEST_TIMEOUT_MS);
        if timeout_ms == 0 {
            return Err(TunnelError::InvalidConfig(
                "timeout must be greater than zero".to_string(),
            ));
        }

        Ok(ListenerConfig {
            name: non_empty(self.name).unwrap_or_else(|| "websocket tunnel".to_string()),
            ws_host: non_empty(self.host).unwrap_or_else(|| DEFAULT_WS_HOST.to_string()),
            ws_port: self.port.unwrap_or(DEFAULT_WS_PORT),
            src_addr: non_empty(self.src_addr).unwrap_or_else(|| DEFAULT_SRC_ADDR.to_string()),
            src_port: self.src_port.unwrap_or(DEFAULT_SRC_PORT),
            destination: UpstreamRoute::new(dst_host, dst_port),
            request_timeout: Duration::from_millis(timeout_ms),
            ping_interval: Duration::from_secs(PING_INTERVAL_SECS),
            max_header_bytes: MAX_HEADER_BLOCK_BYTES,
        })
    }
}

impl ListenerConfig {
    /// Address the WebSocket server binds to
    pub fn ws_bind(&self) -> (&str, u16) {
        (self.ws_host.as_str(), self.ws_port)
    }

    /// Address the ingress TCP server binds to
    pub fn ingress_bind(&self) -> (&str, u16) {
        (self.src_addr.as_str(), self.src_port)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Split a destination into host and the port its scheme implies
///
/// Values without a scheme are read as `http://`.
fn parse_destination(addr: &str) -> Result<(String, Option<u16>)> {
    let with_scheme = if addr.contains("://") {
        addr.to_string()
    } else {
        format!("http://{}", addr)
    };

    let url = Url::parse(&with_scheme)
        .map_err(|e| TunnelError::InvalidConfig(format!("Invalid dstAddr {}: {}", addr, e)))?;

    let host = url
        .host_str()
        .map(|h| h.trim_start_matches('[').trim_end_matches(']').to_string())
        .filter(|h| !h.is_empty())
        .ok_or_else(|| TunnelError::InvalidConfig(format!("dstAddr {} has no host", addr)))?;

    let port = url.port_or_known_default().or(match url.scheme() {
        "ssh" => Some(22),
        _ => None,
    });

    Ok((host, port))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TunnelConfig::default().into_listener_config().unwrap();

        assert_eq!(config.name, "websocket tunnel");
        assert_eq!(config.ws_bind(), ("localhost", 8083));
        assert_eq!(config.ingress_bind(), ("localhost", 8080));
        assert_eq!(config.destination, UpstreamRoute::new("localhost", 80));
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.ping_interval, Duration::from_secs(30));
        assert_eq!(config.max_header_bytes, 64 * 1024);
    }

    #[test]
    fn test_from_json_camel_case() {
        let json = r#"{
            "name": "intranet",
            "host": "0.0.0.0",
            "port": 9000,
            "srcAddr": "127.0.0.1",
            "srcPort": 9001,
            "dstAddr": "app.internal",
            "dstPort": 3000,
            "timeout": 5000
        }"#;

        let config = TunnelConfig::from_json(json)
            .unwrap()
            .into_listener_config()
            .unwrap();

        assert_eq!(config.name, "intranet");
        assert_eq!(config.ws_bind(), ("0.0.0.0", 9000));
        assert_eq!(config.ingress_bind(), ("127.0.0.1", 9001));
        assert_eq!(config.destination, UpstreamRoute::new("app.internal", 3000));
        assert_eq!(config.request_timeout, Duration::from_millis(5000));
    }

    #[test]
    fn test_dst_addr_scheme_implies_port() {
        let config = TunnelConfig {
            dst_addr: Some("https://secure.internal".to_string()),
            ..Default::default()
        }
        .into_listener_config()
        .unwrap();
        assert_eq!(config.destination, UpstreamRoute::new("secure.internal", 443));

        let config = TunnelConfig {
            dst_addr: Some("ssh://bastion".to_string()),
            ..Default::default()
        }
        .into_listener_config()
        .unwrap();
        assert_eq!(config.destination.port, 22);
    }

    #[test]
    fn test_dst_addr_explicit_port_wins() {
        let config = TunnelConfig {
            dst_addr: Some("http://svc:8081/ignored/path".to_string()),
            ..Default::default()
        }
        .into_listener_config()
        .unwrap();
        assert_eq!(config.destination, UpstreamRoute::new("svc", 8081));

        let config = TunnelConfig {
            dst_addr: Some("http://svc:8081".to_string()),
            dst_port: Some(9999),
            ..Default::default()
        }
        .into_listener_config()
        .unwrap();
        assert_eq!(config.destination.port, 9999);
    }

    #[test]
    fn test_dst_addr_bare_host_defaults_to_http() {
        let config = TunnelConfig {
            dst_addr: Some("plain.internal".to_string()),
            ..Default::default()
        }
        .into_listener_config()
        .unwrap();
        assert_eq!(config.destination, UpstreamRoute::new("plain.internal", 80));
    }

    #[test]
    fn test_blank_strings_fall_back_to_defaults() {
        let config = TunnelConfig {
            host: Some("  ".to_string()),
            dst_addr: Some(String::new()),
            ..Default::default()
        }
        .into_listener_config()
        .unwrap();
        assert_eq!(config.ws_host, "localhost");
        assert_eq!(config.destination.hostname, "localhost");
    }

    #[test]
    fn test_rejects_invalid_values() {
        let zero_timeout = TunnelConfig {
            timeout: Some(0),
            ..Default::default()
        };
        assert!(matches!(
            zero_timeout.into_listener_config(),
            Err(TunnelError::InvalidConfig(_))
        ));

        let zero_port = TunnelConfig {
            dst_port: Some(0),
            ..Default::default()
        };
        assert!(matches!(
            zero_port.into_listener_config(),
            Err(TunnelError::InvalidConfig(_))
        ));

        let bad_url = TunnelConfig {
            dst_addr: Some("http://".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            bad_url.into_listener_config(),
            Err(TunnelError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_from_json_rejects_wrong_types() {
        let err = TunnelConfig::from_json(r#"{"port": "not a number"}"#).unwrap_err();
        assert!(matches!(err, TunnelError::SerializationError(_)));
    }
}
