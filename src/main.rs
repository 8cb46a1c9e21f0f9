use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use akhbarna_ratelimit::config::AkhbarnaConfig;
use akhbarna_ratelimit::http::{AppState, HttpServer};
use akhbarna_ratelimit::ratelimit::{PolicyTable, SlidingWindowStore};

/// Rate limiting service for the Akhbarna news portal.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Path to a configuration file (YAML)
    #[arg(short, long)]
    config: Option<String>,

    /// HTTP listen address, overriding the configuration file
    #[arg(long)]
    http_addr: Option<SocketAddr>,

    /// Path to a YAML file of policy overrides
    #[arg(long)]
    policies: Option<String>,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if cli.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_thread_ids(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_ids(true)
            .init();
    }

    info!("Starting Akhbarna rate limiting service");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let mut config = AkhbarnaConfig::load(cli.config.as_deref())?;
    if let Some(addr) = cli.http_addr {
        config.server.http_addr = addr;
    }
    if let Some(path) = cli.policies {
        config.rate_limiting.policies_path = Some(path);
    }
    info!(http_addr = %config.server.http_addr, "Configuration loaded");

    let policies = match &config.rate_limiting.policies_path {
        Some(path) => PolicyTable::from_file(path)?,
        None => PolicyTable::presets(),
    };
    for policy in policies.iter() {
        info!(
            policy = %policy.name,
            window_ms = policy.window_ms(),
            max_requests = policy.max_requests,
            key = ?policy.key_strategy,
            "Rate limit policy active"
        );
    }

    let retention = config.rate_limiting.retention(&policies);
    let store = Arc::new(SlidingWindowStore::new().with_retention(retention));
    let sweeper = store.start_sweeper(config.rate_limiting.sweep_interval());
    info!(
        retention = ?retention,
        sweep_interval = ?config.rate_limiting.sweep_interval(),
        "Rate limit store initialized"
    );

    let server = HttpServer::new(config.server.http_addr, AppState::new(store, policies));

    let served = server.serve_with_shutdown(shutdown_signal()).await;

    sweeper.shutdown().await;
    served?;

    info!("Akhbarna rate limiting service stopped");
    Ok(())
}

/// Resolve once the process is asked to stop (Ctrl+C, or SIGTERM on unix).
///
/// A handler that cannot be installed is logged and never fires; the other
/// one still stops the server.
async fn shutdown_signal() {
    let interrupt = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Cannot listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
        "SIGINT"
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
        "SIGTERM"
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<&'static str>();

    let received = tokio::select! {
        name = interrupt => name,
        name = terminate => name,
    };
    info!(signal = received, "Draining in-flight requests before stopping");
}
