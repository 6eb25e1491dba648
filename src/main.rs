use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{routing::get, Router};
use clap::Parser;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use gatehouse::clock::{Clock, SystemClock};
use gatehouse::config::GatehouseConfig;
use gatehouse::gate::{AuthProbe, ClientIpResolver, RequestGate};
use gatehouse::http::HttpServer;
use gatehouse::ratelimit::{CleanupScheduler, SlidingWindowStore};

#[derive(Parser, Debug)]
#[command(name = "gatehouse")]
#[command(about = "Rate limiting and auth gate in front of an HTTP application")]
struct Args {
    /// YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address, overrides server.listen_addr
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if args.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_ids(true)
            .init();
    }

    info!("Starting Gatehouse");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    // Refuse to start with an undefined rate limit.
    let mut config = GatehouseConfig::load(args.config.as_deref())?;
    if let Some(listen) = args.listen {
        config.server.listen_addr = listen;
    }

    let limiter = config.limiter()?;
    let trusted = config.trusted_proxies()?;
    info!(
        listen_addr = %config.server.listen_addr,
        window_secs = limiter.window_secs(),
        max_requests = limiter.max_requests(),
        trusted_proxies = trusted.len(),
        "Configuration loaded"
    );

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store = Arc::new(SlidingWindowStore::new(limiter));

    let scheduler = CleanupScheduler::new(Arc::clone(&store), Arc::clone(&clock));
    scheduler.start();

    let probe = config.auth_probe();
    if probe.is_empty() {
        info!("No bearer tokens configured; every request is anonymous");
    }
    let probe: Arc<dyn AuthProbe> = Arc::new(probe);

    let gate = Arc::new(RequestGate::new(
        store,
        probe,
        ClientIpResolver::new(trusted),
        config.route_table()?,
        clock,
    ));

    let app = Router::new().route("/healthz", get(|| async { "ok" }));
    let server = HttpServer::new(config.server.listen_addr, gate, app);

    server.serve_with_shutdown(shutdown_signal()).await?;

    scheduler.stop();
    info!("Gatehouse stopped");
    Ok(())
}

/// Resolve once the process is asked to stop, logging which signal did it.
async fn shutdown_signal() {
    let received = wait_for_stop().await;
    info!(signal = received, "Stop requested, draining connections");
}

/// Ctrl+C, or never if the handler cannot be installed.
async fn ctrl_c() {
    if let Err(e) = signal::ctrl_c().await {
        warn!(error = %e, "Ctrl+C handler failed");
        std::future::pending::<()>().await;
    }
}

#[cfg(unix)]
async fn wait_for_stop() -> &'static str {
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
        .expect("Failed to install SIGTERM handler");
    tokio::select! {
        _ = ctrl_c() => "SIGINT",
        _ = sigterm.recv() => "SIGTERM",
    }
}

#[cfg(not(unix))]
async fn wait_for_stop() -> &'static str {
    ctrl_c().await;
    "SIGINT"
}
