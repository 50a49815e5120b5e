//! dns-relay
//!
//! Minimal authoritative/forwarding DNS server over UDP.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        DNS RELAY                            │
//! ├─────────────────────────────────────────────────────────────┤
//! │  UDP listener (2053)   ←── one datagram at a time           │
//! │  Message codec         ←── header, questions, answers       │
//! │  Local answers         ←── static table / placeholder A     │
//! │  Forwarder             ←── split, relay upstream, merge     │
//! │  HTTP API (optional)   ←── health and metrics               │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tracing::{error, info, warn};

use dns_relay::api::{self, Metrics};
use dns_relay::config::RelayConfig;
use dns_relay::dns::LocalAnswers;
use dns_relay::forward::{Forwarder, UdpUpstream};
use dns_relay::server::{self, Mode, Relay};

/// dns-relay - answers DNS queries locally or through an upstream resolver
#[derive(Parser, Debug)]
#[command(name = "dns-relay")]
#[command(version)]
#[command(about = "Minimal authoritative/forwarding DNS server", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "dns-relay.toml")]
    config: PathBuf,

    /// Address to listen on (overrides the config file)
    #[arg(long)]
    bind: Option<String>,

    /// Upstream resolver address, host:port (overrides the config file)
    #[arg(long)]
    resolver: Option<String>,

    /// HTTP API port for metrics (overrides the config file)
    #[arg(long)]
    api_port: Option<u16>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| args.log_level.clone().into())
        )
        .init();

    info!("🌐 dns-relay v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = if args.config.exists() {
        RelayConfig::load(&args.config)?
    } else {
        warn!("Config file not found, using defaults");
        RelayConfig::default()
    };

    // Override config with CLI args
    let config = config
        .with_bind_addr(args.bind)
        .with_resolver(args.resolver)
        .with_api_port(args.api_port);

    config.validate()?;

    info!("⚙️  Configuration:");
    info!("   Listen address: {}", config.bind_addr);
    match &config.resolver {
        Some(resolver) => info!(
            "   Resolver: {} (timeout {}ms, {} attempts)",
            resolver, config.forward_timeout_ms, config.forward_attempts
        ),
        None => info!("   Resolver: none, answering locally ({} static records)", config.static_records.len()),
    }

    let config = Arc::new(config);
    let metrics = Arc::new(Metrics::new());

    let mode = match &config.resolver {
        Some(resolver) => {
            let upstream = UdpUpstream::connect(
                resolver,
                config.forward_timeout(),
                config.forward_attempts,
                config.max_packet_size,
            )
            .await?;
            info!("🔗 Upstream session open to {}", upstream.peer_addr()?);
            Mode::Forward(Forwarder::new(Box::new(upstream), metrics.clone()))
        }
        None => Mode::Local(LocalAnswers::new(&config.static_records, config.answer_ttl)),
    };

    let socket = UdpSocket::bind(config.bind_addr.as_str()).await?;
    let relay = Relay::new(mode, metrics.clone());

    let dns_handle = tokio::spawn(server::run_server(socket, relay, config.max_packet_size));

    let api_handle = tokio::spawn(run_api(config.clone(), metrics.clone()));

    let status_handle = tokio::spawn(run_status_log(config.status_interval_secs, metrics.clone()));

    info!("✅ All services started");

    // Wait for shutdown signal
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("🛑 Shutdown signal received");
        }
        result = dns_handle => {
            error!("DNS server exited: {:?}", result);
        }
        result = api_handle => {
            error!("HTTP API exited: {:?}", result);
        }
        result = status_handle => {
            error!("Status task exited: {:?}", result);
        }
    }

    let snapshot = metrics.snapshot();
    info!(
        "👋 dns-relay shutting down after {} datagrams, {} responses",
        snapshot.datagrams_received, snapshot.responses_sent
    );
    Ok(())
}

/// Serve the HTTP API when a port is configured, otherwise idle forever
async fn run_api(config: Arc<RelayConfig>, metrics: Arc<Metrics>) -> anyhow::Result<()> {
    let port = config.api_port;
    match port {
        Some(port) => api::run_api_server(config, metrics, port).await,
        None => std::future::pending().await,
    }
}

/// Periodic status line with the request counters
async fn run_status_log(interval_secs: u64, metrics: Arc<Metrics>) -> anyhow::Result<()> {
    if interval_secs == 0 {
        return std::future::pending().await;
    }

    let mut interval = tokio::time::interval(std::time::Duration::from_secs(interval_secs));
    // First tick completes immediately
    interval.tick().await;

    loop {
        interval.tick().await;

        let s = metrics.snapshot();
        info!(
            "📊 Status: {} datagrams ({} malformed), {} local, {} forwarded ({} failed), {} sent",
            s.datagrams_received,
            s.malformed_datagrams,
            s.local_responses,
            s.forwarded_questions,
            s.forward_failures,
            s.responses_sent
        );
    }
}
