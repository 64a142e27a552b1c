use std::fmt;

use crate::constants::TLS_PORT;
use crate::error::{Result, TunnelError};

/// Where a forwarded request goes, derived from its `Host` header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamRoute {
    pub hostname: String,
    pub port: u16,
}

impl UpstreamRoute {
    pub fn new(hostname: impl Into<String>, port: u16) -> Self {
        Self {
            hostname: hostname.into(),
            port,
        }
    }

    /// Parse a `host[:port]` authority; a missing port means 443
    ///
    /// IPv6 literals must be bracketed (`[::1]:8080`).
    pub fn parse(authority: &str) -> Result<Self> {
        let invalid = || TunnelError::InvalidHostHeader(authority.chars().take(100).collect());

        let (hostname, port) = if let Some(rest) = authority.strip_prefix('[') {
            let (host, tail) = rest.split_once(']').ok_or_else(invalid)?;
            let port = match tail {
                "" => None,
                tail => Some(tail.strip_prefix(':').ok_or_else(invalid)?),
            };
            (host, port)
        } else {
            match authority.split_once(':') {
                Some((host, port)) => (host, Some(port)),
                None => (authority, None),
            }
        };

        if hostname.is_empty() {
            return Err(invalid());
        }

        let port = match port {
            Some(port) => match port.parse::<u16>() {
                Ok(0) | Err(_) => return Err(invalid()),
                Ok(port) => port,
            },
            None => TLS_PORT,
        };

        Ok(Self::new(hostname, port))
    }

    /// `host:port`, bracketing IPv6 literals
    pub fn authority(&self) -> String {
        if self.hostname.contains(':') {
            format!("[{}]:{}", self.hostname, self.port)
        } else {
            format!("{}:{}", self.hostname, self.port)
        }
    }
}

impl fmt::Display for UpstreamRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.authority())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_host_and_port() {
        let route = UpstreamRoute::parse("api.internal:8080").unwrap();
        assert_eq!(route, UpstreamRoute::new("api.internal", 8080));
    }

    #[test]
    fn test_parse_defaults_to_tls_port() {
        let route = UpstreamRoute::parse("example.com").unwrap();
        assert_eq!(route.port, TLS_PORT);
    }

    #[test]
    fn test_parse_explicit_tls_port() {
        assert_eq!(UpstreamRoute::parse("example.com:443").unwrap().port, TLS_PORT);
    }

    #[test]
    fn test_parse_ipv6() {
        let route = UpstreamRoute::parse("[::1]:3000").unwrap();
        assert_eq!(route.hostname, "::1");
        assert_eq!(route.port, 3000);
        assert_eq!(route.authority(), "[::1]:3000");

        let route = UpstreamRoute::parse("[fe80::1]").unwrap();
        assert_eq!(route.port, 443);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        for bad in ["", ":80", "host:", "host:0", "host:70000", "host:abc", "::1", "[::1", "[::1]x"] {
            assert!(
                matches!(UpstreamRoute::parse(bad), Err(TunnelError::InvalidHostHeader(_))),
                "should reject {:?}",
                bad
            );
        }
    }

    #[test]
    fn test_display_matches_authority() {
        let route = UpstreamRoute::new("localhost", 80);
        assert_eq!(route.to_string(), "localhost:80");
    }
}
