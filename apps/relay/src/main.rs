use anyhow::{Context, Result};
use clap::Parser;
use std::{path::PathBuf, sync::Arc};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use ws_tunnel_common::{LogStatus, TunnelConfig};
use ws_tunnel_relay::Tunnels;

/// CLI arguments for the relay
#[derive(Parser, Debug)]
#[command(name = "wsr")]
#[command(about = "Public relay for the WebSocket tunnel", long_about = None)]
#[command(version)]
struct Args {
    /// JSON configuration file; flags below override its values
    #[arg(short, long, env = "WSR_CONFIG")]
    config: Option<PathBuf>,

    /// WebSocket listen host
    #[arg(long)]
    host: Option<String>,

    /// WebSocket listen port
    #[arg(short, long)]
    port: Option<u16>,

    /// Ingress listen address
    #[arg(long)]
    src_addr: Option<String>,

    /// Ingress listen port
    #[arg(long)]
    src_port: Option<u16>,

    /// Destination written into the Host header (host or URL)
    #[arg(long)]
    dst_addr: Option<String>,

    /// Destination port
    #[arg(long)]
    dst_port: Option<u16>,

    /// Round-trip timeout in milliseconds
    #[arg(short, long)]
    timeout: Option<u64>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

/// Merge the optional config file with command-line overrides
fn load_config(args: &Args) -> Result<TunnelConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            TunnelConfig::from_json(&text)
                .with_context(|| format!("Failed to parse config file {}", path.display()))?
        }
        None => TunnelConfig::default(),
    };

    if args.host.is_some() {
        config.host = args.host.clone();
    }
    if args.port.is_some() {
        config.port = args.port;
    }
    if args.src_addr.is_some() {
        config.src_addr = args.src_addr.clone();
    }
    if args.src_port.is_some() {
        config.src_port = args.src_port;
    }
    if args.dst_addr.is_some() {
        config.dst_addr = args.dst_addr.clone();
    }
    if args.dst_port.is_some() {
        config.dst_port = args.dst_port;
    }
    if args.timeout.is_some() {
        config.timeout = args.timeout;
    }

    Ok(config)
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

    info!("WebSocket Tunnel Relay v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(&args)?
        .into_listener_config()
        .context("Invalid tunnel configuration")?;

    let tunnels = Tunnels::new();
    let name = config.name.clone();
    let status = Arc::new(LogStatus::new(name.clone()));
    tunnels.start(&name, config, status).await?;

    // Run until interrupted
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl-C, shutting down gracefully..."),
        Err(e) => error!("Failed to listen for Ctrl-C: {}", e),
    }

    tunnels.stop_all().await;
    Ok(())
}
