//! Upstream dispatcher
//!
//! Sends a raw HTTP request to the host named in its `Host` header and
//! collects every byte the upstream writes until it closes the connection.
//! The TLS port (443 unless overridden) is spoken over TLS, everything else
//! over plain TCP.

use rustls::{ClientConfig, RootCertStore, pki_types::ServerName};
use std::{io, sync::Arc, time::Duration};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tracing::debug;
use ws_tunnel_common::{
    Result, TunnelError, UpstreamRoute, constants::TLS_PORT, protocol::extract_route,
};

/// Forwards tunnelled requests to their upstream
#[derive(Clone)]
pub struct UpstreamDispatcher {
    tls: TlsConnector,
    tls_port: u16,
    timeout: Duration,
}

impl UpstreamDispatcher {
    /// Dispatcher trusting the bundled webpki roots
    pub fn new(timeout: Duration) -> Result<Self> {
        Ok(Self::with_tls_config(default_tls_config()?, timeout))
    }

    pub fn with_tls_config(config: Arc<ClientConfig>, timeout: Duration) -> Self {
        Self {
            tls: TlsConnector::from(config),
            tls_port: TLS_PORT,
            timeout,
        }
    }

    /// Dial this port with TLS instead of 443
    pub fn with_tls_port(mut self, port: u16) -> Self {
        self.tls_port = port;
        self
    }

    fn uses_tls(&self, route: &UpstreamRoute) -> bool {
        route.port == self.tls_port
    }

    /// Send `request` upstream and return the complete response bytes
    pub async fn forward(&self, request: &[u8]) -> Result<Vec<u8>> {
        let route = extract_route(request)?;
        debug!(
            "Dispatching {} bytes to {} over {}",
            request.len(),
            route,
            if self.uses_tls(&route) { "TLS" } else { "TCP" }
        );

        tokio::time::timeout(self.timeout, self.exchange(&route, request))
            .await
            .map_err(|_| TunnelError::Timeout)?
    }

    async fn exchange(&self, route: &UpstreamRoute, request: &[u8]) -> Result<Vec<u8>> {
        let stream = connect(route).await?;

        if self.uses_tls(route) {
            let stream = self.handshake(&route.hostname, stream).await?;
            roundtrip(stream, request).await
        } else {
            roundtrip(stream, request).await
        }
    }

    async fn handshake(
        &self,
        hostname: &str,
        stream: TcpStream,
    ) -> Result<tokio_rustls::client::TlsStream<TcpStream>> {
        let server_name = ServerName::try_from(hostname.to_string()).map_err(|e| {
            TunnelError::UpstreamConnectionError(format!("Invalid server name {}: {}", hostname, e))
        })?;

        self.tls.connect(server_name, stream).await.map_err(|e| {
            TunnelError::UpstreamConnectionError(format!(
                "TLS handshake with {} failed: {}",
                hostname, e
            ))
        })
    }
}

/// Client configuration with the ring provider and webpki roots
pub fn default_tls_config() -> Result<Arc<ClientConfig>> {
    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    let config = ClientConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_safe_default_protocol_versions()
    .map_err(|e| TunnelError::InternalError(format!("TLS configuration failed: {}", e)))?
    .with_root_certificates(roots)
    .with_no_client_auth();

    Ok(Arc::new(config))
}

async fn connect(route: &UpstreamRoute) -> Result<TcpStream> {
    TcpStream::connect((route.hostname.as_str(), route.port))
        .await
        .map_err(|e| {
            TunnelError::UpstreamConnectionError(format!("Failed to connect to {}: {}", route, e))
        })
}

/// Write the request, then read until the upstream closes
async fn roundtrip<S>(mut stream: S, request: &[u8]) -> Result<Vec<u8>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    stream
        .write_all(request)
        .await
        .map_err(|e| TunnelError::UpstreamConnectionError(format!("Failed to send request: {}", e)))?;
    stream
        .flush()
        .await
        .map_err(|e| TunnelError::UpstreamConnectionError(format!("Failed to send request: {}", e)))?;

    let mut response = Vec::new();
    loop {
        match stream.read_buf(&mut response).await {
            Ok(0) => break,
            Ok(_) => {}
            // Servers that skip close_notify
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
            Err(e) => {
                return Err(TunnelError::UpstreamConnectionError(format!(
                    "Failed to read response: {}",
                    e
                )));
            }
        }
    }

    debug!("Upstream returned {} bytes", response.len());
    Ok(response)
}
