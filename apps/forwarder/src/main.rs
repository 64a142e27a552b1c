use anyhow::{Context, Result};
use clap::Parser;
use std::{sync::Arc, time::Duration};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use ws_tunnel_common::{
    LogStatus, StatusSink, TunnelStatus,
    constants::{RECONNECT_DELAY_MS, UPSTREAM_TIMEOUT_MS},
};
use ws_tunnel_forwarder::{Config, ConnectionManager, UpstreamDispatcher};

/// CLI arguments for the forwarder agent
#[derive(Parser, Debug)]
#[command(name = "wsf")]
#[command(about = "Private-side forwarder for the WebSocket tunnel", long_about = None)]
#[command(version)]
struct Args {
    /// Relay WebSocket URL (ws:// or wss://)
    #[arg(short, long, env = "WSF_URL")]
    url: Option<String>,

    /// Delay between reconnect attempts in milliseconds
    #[arg(long, default_value_t = RECONNECT_DELAY_MS)]
    reconnect_delay: u64,

    /// Upstream request timeout in milliseconds
    #[arg(long, default_value_t = UPSTREAM_TIMEOUT_MS)]
    request_timeout: u64,

    /// Name used in status messages
    #[arg(long, default_value = "wsf")]
    name: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn config(&self) -> ws_tunnel_common::Result<Config> {
        Ok(Config::new(self.url.as_deref())?
            .with_reconnect_delay(Duration::from_millis(self.reconnect_delay))
            .with_request_timeout(Duration::from_millis(self.request_timeout)))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging; RUST_LOG takes precedence over --verbose
    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .init();

    info!("WebSocket Tunnel Forwarder v{}", env!("CARGO_PKG_VERSION"));

    let status: Arc<dyn StatusSink> = Arc::new(LogStatus::new(args.name.clone()));

    let config = match args.config() {
        Ok(config) => config,
        Err(e) => {
            status.report(TunnelStatus::InvalidUrl);
            return Err(e).context("Invalid forwarder configuration");
        }
    };
    info!("Relay endpoint: {}", config.websocket_url);

    let dispatcher = UpstreamDispatcher::new(config.request_timeout)?;
    let manager = ConnectionManager::new(config, dispatcher, status);

    // Run until interrupted
    tokio::select! {
        result = manager.run() => {
            error!("Connection manager exited: {:?}", result);
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl-C, shutting down gracefully...");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_defaults() {
        let args = Args::parse_from(["wsf", "--url", "ws://relay:8083"]);
        let config = args.config().unwrap();

        assert_eq!(config.websocket_url, "ws://relay:8083");
        assert_eq!(config.reconnect_delay, Duration::from_secs(5));
        assert_eq!(config.request_timeout, Duration::from_secs(25));
        assert_eq!(args.name, "wsf");
    }

    #[test]
    fn test_args_overrides() {
        let args = Args::parse_from([
            "wsf",
            "-u",
            "wss://relay.example.com",
            "--reconnect-delay",
            "250",
            "--request-timeout",
            "1500",
            "-v",
        ]);
        let config = args.config().unwrap();

        assert_eq!(config.reconnect_delay, Duration::from_millis(250));
        assert_eq!(config.request_timeout, Duration::from_millis(1500));
        assert!(args.verbose);
    }

    #[test]
    fn test_args_invalid_url() {
        let args = Args::parse_from(["wsf", "--url", "http://relay"]);
        assert!(args.config().is_err());
    }
}
