use futures_util::{StreamExt, stream::SplitStream};
use http::StatusCode;
use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};
use tokio::sync::{Mutex, mpsc};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message as WsMessage,
};
use tracing::{debug, error, info, warn};
use ws_tunnel_common::{
    Frame, Result, StatusSink, TunnelError, TunnelStatus, constants::OUTGOING_QUEUE_CAPACITY,
    protocol::error_response, spawn_write_task,
};

use crate::config::Config;
use crate::dispatcher::UpstreamDispatcher;

type WebSocket = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Connection state tracking
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Open,
}

/// Connection manager handles the tunnel lifecycle and reconnection
pub struct ConnectionManager {
    config: Config,
    dispatcher: UpstreamDispatcher,
    status: Arc<dyn StatusSink>,
    connection_state: Arc<Mutex<ConnectionState>>,
    attempts: AtomicUsize,
}

impl ConnectionManager {
    pub fn new(config: Config, dispatcher: UpstreamDispatcher, status: Arc<dyn StatusSink>) -> Self {
        Self {
            config,
            dispatcher,
            status,
            connection_state: Arc::new(Mutex::new(ConnectionState::Disconnected)),
            attempts: AtomicUsize::new(0),
        }
    }

    pub async fn state(&self) -> ConnectionState {
        *self.connection_state.lock().await
    }

    /// Connect attempts made so far
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::Relaxed)
    }

    /// Main run loop; reconnects after a fixed delay, forever
    pub async fn run(&self) -> Result<()> {
        loop {
            let attempt = self.attempts.fetch_add(1, Ordering::Relaxed) + 1;
            self.set_state(ConnectionState::Connecting).await;
            self.status.report(TunnelStatus::Connecting);

            match self.establish_connection().await {
                Ok(ws_stream) => {
                    info!("Tunnel established with {}", self.config.websocket_url);
                    self.set_state(ConnectionState::Open).await;
                    self.status.report(TunnelStatus::Established);

                    // Handle the connection until it drops
                    if let Err(e) = self.handle_connection(ws_stream).await {
                        error!("Connection error: {}", e);
                    }
                    self.status.report(TunnelStatus::ConnectionLost);
                }
                Err(e) => {
                    error!("Failed to connect: {}", e);
                    self.status.report(TunnelStatus::Error(e.to_string()));
                }
            }

            self.set_state(ConnectionState::Disconnected).await;

            info!(
                "Reconnecting in {:?} (attempt {})",
                self.config.reconnect_delay, attempt
            );
            tokio::time::sleep(self.config.reconnect_delay).await;
        }
    }

    async fn set_state(&self, state: ConnectionState) {
        *self.connection_state.lock().await = state;
    }

    async fn establish_connection(&self) -> Result<WebSocket> {
        debug!("Connecting to {}", self.config.websocket_url);

        let (ws_stream, _) = connect_async(&self.config.websocket_url)
            .await
            .map_err(|e| TunnelError::ConnectionError(e.to_string()))?;

        Ok(ws_stream)
    }

    /// Handle active WebSocket connection with split read/write tasks
    async fn handle_connection(&self, ws_stream: WebSocket) -> Result<()> {
        let (write, read) = ws_stream.split();

        let (outgoing_tx, outgoing_rx) = mpsc::channel(OUTGOING_QUEUE_CAPACITY);

        let mut write_handle = tokio::spawn(spawn_write_task(write, outgoing_rx));
        let mut read_handle = tokio::spawn(spawn_read_task(
            read,
            outgoing_tx,
            self.dispatcher.clone(),
        ));

        // Either side ending means the session is gone
        tokio::select! {
            result = &mut write_handle => {
                warn!("Write task ended: {:?}", result);
            }
            result = &mut read_handle => {
                warn!("Read task ended: {:?}", result);
            }
        }

        write_handle.abort();
        read_handle.abort();

        Ok(())
    }
}

/// Read task receives frames and dispatches each one concurrently
async fn spawn_read_task(
    mut read: SplitStream<WebSocket>,
    outgoing_tx: mpsc::Sender<WsMessage>,
    dispatcher: UpstreamDispatcher,
) -> Result<()> {
    while let Some(message) = read.next().await {
        match message {
            Ok(WsMessage::Binary(data)) => {
                handle_frame(&data, &outgoing_tx, &dispatcher);
            }
            Ok(WsMessage::Text(text)) => {
                handle_frame(text.as_bytes(), &outgoing_tx, &dispatcher);
            }
            Ok(WsMessage::Ping(_)) => {
                // tungstenite queues the pong itself
                debug!("Received WebSocket ping");
            }
            Ok(WsMessage::Close(_)) => {
                info!("Server closed connection");
                break;
            }
            Err(e) => {
                error!("WebSocket error: {}", e);
                break;
            }
            _ => {}
        }
    }

    debug!("Read task exiting");
    Ok(())
}

/// Decode a request frame and answer it from a spawned task
fn handle_frame(data: &[u8], outgoing_tx: &mpsc::Sender<WsMessage>, dispatcher: &UpstreamDispatcher) {
    let frame = match Frame::decode(data) {
        Ok(frame) => frame,
        Err(e) => {
            warn!("Dropping message: {}", e);
            return;
        }
    };

    let outgoing_tx = outgoing_tx.clone();
    let dispatcher = dispatcher.clone();

    tokio::spawn(async move {
        debug!("Received request {} ({} bytes)", frame.id, frame.payload.len());

        let payload = match dispatcher.forward(&frame.payload).await {
            Ok(response) => response,
            Err(e) => {
                error!("Request {} failed upstream: {}", frame.id, e);
                upstream_failure_response(&e)
            }
        };

        let reply = Frame::new(frame.id, payload).encode();
        if let Err(e) = outgoing_tx.send(WsMessage::Binary(reply.into())).await {
            error!("Failed to send response for {}: {}", frame.id, e);
        }
    });
}

/// Response sent back through the tunnel when the upstream cannot answer
pub fn upstream_failure_response(error: &TunnelError) -> Vec<u8> {
    let status = match error {
        TunnelError::Timeout => StatusCode::GATEWAY_TIMEOUT,
        TunnelError::MissingHostHeader | TunnelError::InvalidHostHeader(_) => {
            StatusCode::BAD_REQUEST
        }
        _ => StatusCode::BAD_GATEWAY,
    };

    error_response(status, status.canonical_reason().unwrap_or("Error"))
}
