//! Relay, forwarder and upstream wired together over loopback

use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use ws_tunnel_common::{LogStatus, TunnelConfig};
use ws_tunnel_forwarder::{Config, ConnectionManager, UpstreamDispatcher};
use ws_tunnel_relay::{RunningTunnel, TunnelServer};

/// Upstream that answers every connection with `reply` and records what it saw
async fn spawn_upstream(reply: &'static [u8]) -> (SocketAddr, tokio::sync::mpsc::Receiver<Vec<u8>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (seen_tx, seen_rx) = tokio::sync::mpsc::channel(16);

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let seen_tx = seen_tx.clone();
            tokio::spawn(async move {
                let mut received = Vec::new();
                let mut chunk = [0u8; 1024];
                while !received.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut chunk).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => received.extend_from_slice(&chunk[..n]),
                    }
                }
                let _ = seen_tx.send(received).await;
                let _ = socket.write_all(reply).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    (addr, seen_rx)
}

async fn start_relay(dst_port: u16) -> RunningTunnel {
    let config = TunnelConfig {
        host: Some("127.0.0.1".to_string()),
        port: Some(0),
        src_addr: Some("127.0.0.1".to_string()),
        src_port: Some(0),
        dst_addr: Some("127.0.0.1".to_string()),
        dst_port: Some(dst_port),
        timeout: Some(5_000),
        ..Default::default()
    }
    .into_listener_config()
    .unwrap();

    TunnelServer::new(config, Arc::new(LogStatus::new("relay")))
        .start()
        .await
        .unwrap()
}

fn start_forwarder(relay: &RunningTunnel) -> tokio::task::JoinHandle<()> {
    let config = Config::new(Some(&format!("ws://{}", relay.ws_addr())))
        .unwrap()
        .with_reconnect_delay(Duration::from_millis(100))
        .with_request_timeout(Duration::from_secs(2));
    let dispatcher = UpstreamDispatcher::new(config.request_timeout).unwrap();
    let manager = ConnectionManager::new(config, dispatcher, Arc::new(LogStatus::new("forwarder")));

    tokio::spawn(async move {
        let _ = manager.run().await;
    })
}

async fn wait_for_tunnel(relay: &RunningTunnel) {
    for _ in 0..200 {
        if relay.session().is_open().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("forwarder never connected");
}

async fn request(addr: SocketAddr, raw: &[u8]) -> Vec<u8> {
    let mut socket = TcpStream::connect(addr).await.unwrap();
    socket.write_all(raw).await.unwrap();
    let mut response = Vec::new();
    socket.read_to_end(&mut response).await.unwrap();
    response
}

#[tokio::test]
async fn test_request_reaches_upstream_and_returns_verbatim() {
    let reply: &[u8] = b"HTTP/1.1 200 OK\r\nContent-Length: 7\r\nX-Upstream: yes\r\n\r\ntunnel!";
    let (upstream, mut seen) = spawn_upstream(reply).await;
    let relay = start_relay(upstream.port()).await;
    let forwarder = start_forwarder(&relay);
    wait_for_tunnel(&relay).await;

    let response = request(
        relay.ingress_addr(),
        b"GET /health HTTP/1.1\r\nHost: public.example.com\r\nUser-Agent: e2e\r\n\r\n",
    )
    .await;

    assert_eq!(response, reply);
    let received = seen.recv().await.unwrap();
    assert_eq!(
        received,
        format!(
            "GET /health HTTP/1.1\r\nHost: 127.0.0.1:{}\r\nUser-Agent: e2e\r\n\r\n",
            upstream.port()
        )
        .as_bytes()
    );

    forwarder.abort();
    relay.stop().await;
}

#[tokio::test]
async fn test_concurrent_requests_are_not_crossed() {
    let (upstream, _seen) = spawn_upstream(b"HTTP/1.1 200 OK\r\n\r\nsame").await;
    let relay = start_relay(upstream.port()).await;
    let forwarder = start_forwarder(&relay);
    wait_for_tunnel(&relay).await;

    let ingress = relay.ingress_addr();
    let callers: Vec<_> = (0..10)
        .map(|i| {
            tokio::spawn(async move {
                let raw = format!("GET /{} HTTP/1.1\r\nHost: x\r\n\r\n", i);
                request(ingress, raw.as_bytes()).await
            })
        })
        .collect();

    for caller in callers {
        assert_eq!(caller.await.unwrap(), b"HTTP/1.1 200 OK\r\n\r\nsame");
    }
    assert_eq!(relay.registry().pending_count().await, 0);

    forwarder.abort();
    relay.stop().await;
}

#[tokio::test]
async fn test_unreachable_upstream_yields_bad_gateway() {
    let closed_port = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    };
    let relay = start_relay(closed_port).await;
    let forwarder = start_forwarder(&relay);
    wait_for_tunnel(&relay).await;

    let response = request(relay.ingress_addr(), b"GET / HTTP/1.1\r\nHost: x\r\n\r\n").await;
    let text = String::from_utf8(response).unwrap();

    assert!(text.starts_with("HTTP/1.1 502 Bad Gateway\r\n"), "{}", text);

    forwarder.abort();
    relay.stop().await;
}

#[tokio::test]
async fn test_forwarder_survives_relay_shutdown() {
    let (upstream, _seen) = spawn_upstream(b"HTTP/1.1 204 No Content\r\n\r\n").await;
    let relay = start_relay(upstream.port()).await;
    let forwarder = start_forwarder(&relay);
    wait_for_tunnel(&relay).await;

    let response = request(relay.ingress_addr(), b"GET / HTTP/1.1\r\nHost: x\r\n\r\n").await;
    assert_eq!(response, b"HTTP/1.1 204 No Content\r\n\r\n");

    // Dropping the relay side closes the session; the forwarder keeps retrying
    let session = relay.session().clone();
    relay.stop().await;
    for _ in 0..100 {
        if !session.is_open().await {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(!session.is_open().await);
    assert!(!forwarder.is_finished());

    forwarder.abort();
}
