//! Relay-side tunnel session
//!
//! Exactly one forwarder may hold the tunnel at a time. The session slot is the
//! only place the outgoing WebSocket queue lives; the correlation registry sends
//! frames through it and fails fast while it is empty.

use futures_util::{StreamExt, stream::SplitStream};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, mpsc, watch};
use tokio::time::Instant;
use tokio_tungstenite::{WebSocketStream, accept_async, tungstenite::Message as WsMessage};
use tracing::{debug, error, info, warn};
use ws_tunnel_common::{
    Result, StatusSink, TunnelError, TunnelStatus, constants::OUTGOING_QUEUE_CAPACITY,
    spawn_write_task,
};

use crate::registry::CorrelationRegistry;

type WebSocket = WebSocketStream<TcpStream>;

/// Observable state of the relay's tunnel slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Open {
        peer: SocketAddr,
        opened_at: Instant,
        /// Last keepalive answer; informational only, nothing is evicted on it
        last_pong_at: Option<Instant>,
    },
}

/// Handles given to the connection that won the tunnel slot
#[derive(Debug)]
pub struct OpenedSession {
    /// Identifies this occupancy of the slot; stale closes are ignored
    pub generation: u64,
    pub outgoing_tx: mpsc::Sender<WsMessage>,
    pub outgoing_rx: mpsc::Receiver<WsMessage>,
}

struct Slot {
    generation: u64,
    state: SessionState,
    outgoing: Option<mpsc::Sender<WsMessage>>,
}

/// The single tunnel slot of a relay instance
pub struct RelaySession {
    slot: Mutex<Slot>,
    status: Arc<dyn StatusSink>,
}

impl RelaySession {
    pub fn new(status: Arc<dyn StatusSink>) -> Self {
        Self {
            slot: Mutex::new(Slot {
                generation: 0,
                state: SessionState::Disconnected,
                outgoing: None,
            }),
            status,
        }
    }

    /// Claim the slot for a new tunnel connection
    ///
    /// Returns `None` while another session is open; that session is left untouched.
    pub async fn try_open(&self, peer: SocketAddr) -> Option<OpenedSession> {
        let mut slot = self.slot.lock().await;
        if matches!(slot.state, SessionState::Open { .. }) {
            return None;
        }

        let (outgoing_tx, outgoing_rx) = mpsc::channel(OUTGOING_QUEUE_CAPACITY);
        slot.generation += 1;
        slot.state = SessionState::Open {
            peer,
            opened_at: Instant::now(),
            last_pong_at: None,
        };
        slot.outgoing = Some(outgoing_tx.clone());
        let generation = slot.generation;
        drop(slot);

        self.status.report(TunnelStatus::Established);

        Some(OpenedSession {
            generation,
            outgoing_tx,
            outgoing_rx,
        })
    }

    /// Release the slot held by `generation`
    pub async fn close(&self, generation: u64) {
        let mut slot = self.slot.lock().await;
        if slot.generation != generation || slot.state == SessionState::Disconnected {
            return;
        }

        slot.state = SessionState::Disconnected;
        slot.outgoing = None;
        drop(slot);

        self.status.report(TunnelStatus::Disconnected);
    }

    pub async fn is_open(&self) -> bool {
        matches!(self.slot.lock().await.state, SessionState::Open { .. })
    }

    pub async fn state(&self) -> SessionState {
        self.slot.lock().await.state.clone()
    }

    pub async fn record_pong(&self, generation: u64) {
        let mut slot = self.slot.lock().await;
        if slot.generation != generation {
            return;
        }
        if let SessionState::Open { last_pong_at, .. } = &mut slot.state {
            *last_pong_at = Some(Instant::now());
        }
    }

    /// Queue an encoded frame on the open session
    pub async fn send(&self, frame: Vec<u8>) -> Result<()> {
        let outgoing = self
            .slot
            .lock()
            .await
            .outgoing
            .clone()
            .ok_or_else(TunnelError::tunnel_unavailable)?;

        outgoing
            .send(WsMessage::Binary(frame.into()))
            .await
            .map_err(|_| TunnelError::tunnel_unavailable())
    }

    pub fn report(&self, status: TunnelStatus) {
        self.status.report(status);
    }
}

/// Accept loop for the WebSocket port
pub async fn run_websocket_listener(
    listener: TcpListener,
    session: Arc<RelaySession>,
    registry: Arc<CorrelationRegistry>,
    ping_interval: Duration,
    shutdown: watch::Receiver<bool>,
) -> Result<()> {
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                error!("Failed to accept WebSocket connection: {}", e);
                continue;
            }
        };

        debug!("Incoming WebSocket connection from {}", peer);

        let session = session.clone();
        let registry = registry.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) =
                handle_connection(stream, peer, session, registry, ping_interval, shutdown).await
            {
                error!("WebSocket connection from {} failed: {}", peer, e);
            }
        });
    }
}

/// Run one inbound WebSocket connection until it drops or the relay stops
async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    session: Arc<RelaySession>,
    registry: Arc<CorrelationRegistry>,
    ping_interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let mut ws_stream = accept_async(stream)
        .await
        .map_err(|e| TunnelError::WebSocketError(format!("Handshake failed: {}", e)))?;

    let Some(opened) = session.try_open(peer).await else {
        warn!("WebSocket tunnel is already active, rejecting {}", peer);
        if let Err(e) = ws_stream.close(None).await {
            debug!("Failed to close rejected connection: {}", e);
        }
        return Ok(());
    };

    info!("WebSocket tunnel established with {}", peer);

    let (write, read) = ws_stream.split();

    let mut write_handle = tokio::spawn(spawn_write_task(write, opened.outgoing_rx));
    let mut read_handle = tokio::spawn(spawn_read_task(
        read,
        session.clone(),
        registry,
        opened.generation,
    ));
    let mut heartbeat_handle =
        tokio::spawn(spawn_heartbeat_task(opened.outgoing_tx, ping_interval));

    // Wait for any task to complete (usually means connection dropped)
    tokio::select! {
        result = &mut write_handle => {
            warn!("Write task ended: {:?}", result);
        }
        result = &mut read_handle => {
            debug!("Read task ended: {:?}", result);
        }
        result = &mut heartbeat_handle => {
            warn!("Heartbeat task ended: {:?}", result);
        }
        _ = shutdown.changed() => {
            info!("Relay stopping, closing tunnel with {}", peer);
        }
    }

    write_handle.abort();
    read_handle.abort();
    heartbeat_handle.abort();

    session.close(opened.generation).await;
    info!("WebSocket tunnel with {} closed", peer);

    Ok(())
}

/// Read task routes response frames to the registry and tracks pongs
async fn spawn_read_task(
    mut read: SplitStream<WebSocket>,
    session: Arc<RelaySession>,
    registry: Arc<CorrelationRegistry>,
    generation: u64,
) -> Result<()> {
    while let Some(message) = read.next().await {
        match message {
            Ok(WsMessage::Binary(data)) => {
                deliver(&registry, &data).await;
            }
            Ok(WsMessage::Text(text)) => {
                deliver(&registry, text.as_bytes()).await;
            }
            Ok(WsMessage::Pong(_)) => {
                debug!("Received pong from tunnel client");
                session.record_pong(generation).await;
            }
            Ok(WsMessage::Close(_)) => {
                info!("Tunnel client closed connection");
                break;
            }
            Err(e) => {
                error!("WebSocket error: {}", e);
                session.report(TunnelStatus::Error(e.to_string()));
                break;
            }
            _ => {}
        }
    }

    debug!("Read task exiting");
    Ok(())
}

async fn deliver(registry: &CorrelationRegistry, data: &[u8]) {
    match registry.on_frame_received(data).await {
        Ok(true) => {}
        Ok(false) => debug!("Discarded response with no waiting request"),
        Err(e) => warn!("Discarded frame: {}", e),
    }
}

/// Heartbeat task sends periodic WebSocket pings
async fn spawn_heartbeat_task(
    outgoing_tx: mpsc::Sender<WsMessage>,
    interval: Duration,
) -> Result<()> {
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);

    loop {
        ticker.tick().await;

        if let Err(e) = outgoing_tx.send(WsMessage::Ping(Vec::new().into())).await {
            error!("Failed to send ping: {}", e);
            break;
        }

        debug!("Sent ping to tunnel client");
    }

    debug!("Heartbeat task exiting");
    Ok(())
}
