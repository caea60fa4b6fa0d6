//! CCTX Relayer - observer node for ballot-driven cross-chain transfers
//!
//! Applies observer votes to the CCTX store, serves queries over HTTP and
//! signs and broadcasts the outbound legs this observer is elected for.

use anyhow::Result;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

use cctx_relayer::api::{self, AppState};
use cctx_relayer::chain::SignerRegistry;
use cctx_relayer::config::Settings;
use cctx_relayer::metrics::{self, MetricsServer};
use cctx_relayer::monitor::RelayMonitor;
use cctx_relayer::node::Node;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    init_logging();

    info!("Starting CCTX Relayer v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let settings = Settings::load()?;
    info!(
        "Loaded configuration for {} chains, observer {}",
        settings.enabled_chains().len(),
        settings.node.observer_id
    );

    // Initialize node state
    let node = Arc::new(Node::from_settings(&settings)?);
    info!(
        "Node initialized with {} observers",
        settings.node.observers.len()
    );

    // Initialize outbound signers
    let signers = Arc::new(SignerRegistry::from_settings(&settings)?);
    info!("Signers initialized for chains {:?}", signers.chain_ids());

    // Initialize metrics server
    let metrics_server = if settings.metrics.enabled {
        Some(MetricsServer::new(settings.metrics.port))
    } else {
        None
    };

    // Initialize relay monitor
    let monitor = if settings.monitor.enabled {
        Some(Arc::new(RelayMonitor::new(
            settings.node.observer_id.clone(),
            node.clone(),
            signers.clone(),
            &settings.monitor,
        )))
    } else {
        None
    };

    // Start API server
    let api_handle = tokio::spawn({
        let config = settings.api.clone();
        let state = AppState {
            node: node.clone(),
            signers: signers.clone(),
        };
        async move {
            if let Err(e) = api::run_server(config, state).await {
                error!("API server error: {}", e);
            }
        }
    });

    // Start metrics server
    let metrics_handle = metrics_server.map(|server| {
        tokio::spawn(async move {
            if let Err(e) = server.run().await {
                error!("Metrics server error: {}", e);
            }
        })
    });

    // Start relay monitor
    let monitor_handle = monitor.clone().map(|monitor| {
        tokio::spawn(async move {
            if let Err(e) = monitor.run().await {
                error!("Relay monitor error: {}", e);
            }
        })
    });

    // Health check loop
    let health_handle = tokio::spawn({
        let node = node.clone();
        let interval = settings.monitor.poll_interval_ms.max(1000);
        async move {
            loop {
                tokio::time::sleep(tokio::time::Duration::from_millis(interval)).await;
                metrics::record_cctx_stats(&node.stats().await);
                metrics::record_health_check();
            }
        }
    });

    info!("CCTX Relayer is running");
    info!("API server: http://{}:{}", settings.api.host, settings.api.port);
    if settings.metrics.enabled {
        info!("Metrics: http://0.0.0.0:{}/metrics", settings.metrics.port);
    }

    // Wait for shutdown signal
    shutdown_signal().await;

    info!("Shutdown signal received, stopping...");

    // Graceful shutdown
    if let Some(monitor) = &monitor {
        monitor.stop().await;
    }

    // Abort background tasks
    api_handle.abort();
    health_handle.abort();
    if let Some(h) = monitor_handle {
        h.abort();
    }
    if let Some(h) = metrics_handle {
        h.abort();
    }

    info!("CCTX Relayer stopped at height {}", node.height().await);
    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,cctx_relayer=debug,hyper=warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
