//! Ingress listener
//!
//! Accepts public TCP connections, buffers each one until its HTTP header
//! block is complete, rewrites the `Host` header to the configured
//! destination, and hands the bytes to the correlation registry. Each
//! connection gets exactly one answer and is then closed.

use std::{net::SocketAddr, sync::Arc};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info};
use ws_tunnel_common::{
    ListenerConfig, Result, TunnelError,
    protocol::{find_header_end, rewrite_host},
};

use crate::error_handling::error_response_for;
use crate::registry::CorrelationRegistry;

const READ_CHUNK_BYTES: usize = 4096;

/// Accept loop for the ingress port
pub async fn run_ingress_listener(
    listener: TcpListener,
    registry: Arc<CorrelationRegistry>,
    config: Arc<ListenerConfig>,
) -> Result<()> {
    loop {
        let (socket, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                error!("Failed to accept ingress connection: {}", e);
                continue;
            }
        };

        let registry = registry.clone();
        let config = config.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(socket, peer, &registry, &config).await {
                error!("Connection error from {}: {}", peer, e);
            }
        });
    }
}

/// Serve one inbound connection from first byte to close
pub async fn handle_connection(
    mut socket: TcpStream,
    peer: SocketAddr,
    registry: &CorrelationRegistry,
    config: &ListenerConfig,
) -> Result<()> {
    let response = match read_request(&mut socket, config.max_header_bytes).await {
        Ok(Some(request)) => {
            debug!("Received {} byte request from {}", request.len(), peer);
            match forward(&request, registry, config).await {
                Ok(response) => response,
                Err(e) => {
                    info!("Request from {} failed: {}", peer, e);
                    error_response_for(&e)
                }
            }
        }
        Ok(None) => {
            debug!("Client {} disconnected before completing its headers", peer);
            return Ok(());
        }
        Err(e @ TunnelError::RequestTooLarge(_)) => {
            info!("Rejecting request from {}: {}", peer, e);
            error_response_for(&e)
        }
        Err(e) => return Err(e),
    };

    socket
        .write_all(&response)
        .await
        .map_err(|e| TunnelError::ConnectionError(format!("Failed to write response: {}", e)))?;
    socket
        .shutdown()
        .await
        .map_err(|e| TunnelError::ConnectionError(format!("Failed to close socket: {}", e)))?;

    Ok(())
}

/// Rewrite the request for the destination and send it through the tunnel
async fn forward(
    request: &[u8],
    registry: &CorrelationRegistry,
    config: &ListenerConfig,
) -> Result<Vec<u8>> {
    let outbound = rewrite_host(request, &config.destination)?;
    registry.submit(&outbound, config.request_timeout).await
}

/// Buffer bytes until the header block ends
///
/// Whatever arrived in the same reads past `\r\n\r\n` stays in the buffer, but
/// no further body bytes are waited for. `Ok(None)` means the peer closed first.
pub async fn read_request<S>(stream: &mut S, limit: usize) -> Result<Option<Vec<u8>>>
where
    S: AsyncRead + Unpin,
{
    let mut buf = Vec::with_capacity(READ_CHUNK_BYTES);
    let mut chunk = [0u8; READ_CHUNK_BYTES];

    loop {
        let n = stream
            .read(&mut chunk)
            .await
            .map_err(|e| TunnelError::ConnectionError(format!("Failed to read request: {}", e)))?;
        if n == 0 {
            return Ok(None);
        }

        // The terminator may straddle the previous chunk
        let scan_from = buf.len().saturating_sub(3);
        buf.extend_from_slice(&chunk[..n]);

        if let Some(end) = find_header_end(&buf[scan_from..])
            && scan_from + end <= limit
        {
            return Ok(Some(buf));
        }

        if buf.len() > limit {
            return Err(TunnelError::RequestTooLarge(limit));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn test_read_request_waits_for_header_end() {
        let (mut client, mut server) = tokio::io::duplex(64);

        let reader = tokio::spawn(async move { read_request(&mut server, 1024).await });

        client.write_all(b"GET / HTTP/1.1\r\nHost: a\r").await.unwrap();
        tokio::task::yield_now().await;
        client.write_all(b"\n\r\n").await.unwrap();

        let request = reader.await.unwrap().unwrap().unwrap();
        assert_eq!(request, b"GET / HTTP/1.1\r\nHost: a\r\n\r\n");
    }

    #[tokio::test]
    async fn test_read_request_keeps_trailing_body_bytes() {
        let (mut client, mut server) = tokio::io::duplex(256);
        client
            .write_all(b"POST / HTTP/1.1\r\nHost: a\r\nContent-Length: 4\r\n\r\nbody")
            .await
            .unwrap();

        let request = read_request(&mut server, 1024).await.unwrap().unwrap();
        assert!(request.ends_with(b"\r\n\r\nbody"));
    }

    #[tokio::test]
    async fn test_read_request_peer_closes_early() {
        let (mut client, mut server) = tokio::io::duplex(64);
        client.write_all(b"GET / HTTP/1.1\r\n").await.unwrap();
        drop(client);

        assert!(read_request(&mut server, 1024).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_read_request_enforces_limit() {
        let (mut client, mut server) = tokio::io::duplex(4096);

        let writer = tokio::spawn(async move {
            let _ = client.write_all(b"GET / HTTP/1.1\r\n").await;
            let _ = client.write_all(&[b'a'; 2048]).await;
            client
        });

        let err = read_request(&mut server, 1024).await.unwrap_err();
        assert!(matches!(err, TunnelError::RequestTooLarge(1024)));
        drop(writer.await.unwrap());
    }
}
