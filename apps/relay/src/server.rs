//! Relay lifecycle
//!
//! [`TunnelServer::start`] binds the WebSocket and ingress ports and spawns
//! their accept loops; [`RunningTunnel::stop`] tears both down and closes the
//! active tunnel. [`Tunnels`] keeps one running relay per logical tunnel id and
//! replaces it wholesale on reconfiguration.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};
use ws_tunnel_common::{ListenerConfig, Result, StatusSink, TunnelError, TunnelStatus};

use crate::ingress::run_ingress_listener;
use crate::registry::CorrelationRegistry;
use crate::session::{RelaySession, run_websocket_listener};

/// A relay ready to be started with a fixed configuration
pub struct TunnelServer {
    config: Arc<ListenerConfig>,
    status: Arc<dyn StatusSink>,
}

/// Handles to a started relay
pub struct RunningTunnel {
    ws_addr: SocketAddr,
    ingress_addr: SocketAddr,
    session: Arc<RelaySession>,
    registry: Arc<CorrelationRegistry>,
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<Result<()>>>,
}

impl TunnelServer {
    pub fn new(config: ListenerConfig, status: Arc<dyn StatusSink>) -> Self {
        Self {
            config: Arc::new(config),
            status,
        }
    }

    /// Bind both listeners and start serving
    pub async fn start(&self) -> Result<RunningTunnel> {
        let ws_listener = bind(self.config.ws_bind()).await?;
        let ingress_listener = bind(self.config.ingress_bind()).await?;

        let ws_addr = local_addr(&ws_listener)?;
        let ingress_addr = local_addr(&ingress_listener)?;

        info!("WebSocket server is listening on {}", ws_addr);
        info!("HTTP server listening on {}", ingress_addr);
        info!(
            "Forwarding requests to {} (timeout {:?})",
            self.config.destination, self.config.request_timeout
        );

        let session = Arc::new(RelaySession::new(self.status.clone()));
        let registry = Arc::new(CorrelationRegistry::new(session.clone()));
        let (shutdown, shutdown_rx) = watch::channel(false);

        self.status.report(TunnelStatus::Disconnected);

        let ws_task = tokio::spawn(run_websocket_listener(
            ws_listener,
            session.clone(),
            registry.clone(),
            self.config.ping_interval,
            shutdown_rx,
        ));
        let ingress_task = tokio::spawn(run_ingress_listener(
            ingress_listener,
            registry.clone(),
            self.config.clone(),
        ));

        Ok(RunningTunnel {
            ws_addr,
            ingress_addr,
            session,
            registry,
            shutdown,
            tasks: vec![ws_task, ingress_task],
        })
    }
}

impl RunningTunnel {
    /// Address the WebSocket server is bound to
    pub fn ws_addr(&self) -> SocketAddr {
        self.ws_addr
    }

    /// Address the ingress server is bound to
    pub fn ingress_addr(&self) -> SocketAddr {
        self.ingress_addr
    }

    pub fn session(&self) -> &Arc<RelaySession> {
        &self.session
    }

    pub fn registry(&self) -> &Arc<CorrelationRegistry> {
        &self.registry
    }

    /// Stop accepting, close the active tunnel, and release both ports
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);

        for task in &self.tasks {
            task.abort();
        }
        for task in self.tasks {
            let _ = task.await;
        }

        info!(
            "Relay on {} / {} stopped",
            self.ws_addr, self.ingress_addr
        );
    }
}

/// Running relays keyed by logical tunnel id
#[derive(Default)]
pub struct Tunnels {
    running: Mutex<HashMap<String, RunningTunnel>>,
}

impl Tunnels {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a relay for `id`, stopping any relay already running under it
    pub async fn start(
        &self,
        id: &str,
        config: ListenerConfig,
        status: Arc<dyn StatusSink>,
    ) -> Result<(SocketAddr, SocketAddr)> {
        let mut running = self.running.lock().await;

        if let Some(previous) = running.remove(id) {
            info!("Reconfiguring tunnel {}", id);
            previous.stop().await;
        }

        let tunnel = TunnelServer::new(config, status).start().await?;
        let addrs = (tunnel.ws_addr(), tunnel.ingress_addr());
        running.insert(id.to_string(), tunnel);

        Ok(addrs)
    }

    /// Stop the relay running under `id`; returns false if there was none
    pub async fn stop(&self, id: &str) -> bool {
        let tunnel = self.running.lock().await.remove(id);
        match tunnel {
            Some(tunnel) => {
                tunnel.stop().await;
                true
            }
            None => {
                warn!("No tunnel running under {}", id);
                false
            }
        }
    }

    pub async fn stop_all(&self) {
        let drained: Vec<_> = self.running.lock().await.drain().collect();
        for (_, tunnel) in drained {
            tunnel.stop().await;
        }
    }

    pub async fn is_running(&self, id: &str) -> bool {
        self.running.lock().await.contains_key(id)
    }
}

async fn bind(addr: (&str, u16)) -> Result<TcpListener> {
    TcpListener::bind(addr).await.map_err(|e| {
        TunnelError::ConnectionError(format!("Failed to bind {}:{}: {}", addr.0, addr.1, e))
    })
}

fn local_addr(listener: &TcpListener) -> Result<SocketAddr> {
    listener
        .local_addr()
        .map_err(|e| TunnelError::ConnectionError(e.to_string()))
}
