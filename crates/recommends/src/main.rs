//! Transient Recommends Service
//!
//! Serves post recommendations computed over an in-memory interaction graph.
//! Handles:
//! - Graph snapshots rebuilt from the database on an interval
//! - Incremental node/edge/vote ingestion
//! - Recommendation queries
//! - Observability (logging, metrics)

use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use transient_common::{
    config::{AppConfig, ObservabilityConfig},
    db::{DbPool, Repository},
    metrics::{self, LATENCY_BUCKETS, REBUILD_BUCKETS},
};
use transient_recommends::{graph::GraphSource, routes::create_router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = AppConfig::load()?;

    init_tracing(&config.observability);
    info!(
        "Starting {} v{}",
        config.observability.service_name,
        transient_common::VERSION
    );

    // Initialize metrics
    if config.observability.metrics_port != 0 {
        install_metrics_exporter(config.observability.metrics_port)?;
    }
    metrics::register_metrics();

    // Graph source
    let source: Option<Arc<dyn GraphSource>> = if config.rebuild.enabled {
        info!("Connecting to database...");
        let db = DbPool::new(&config.database).await?;
        Some(Arc::new(Repository::new(db)))
    } else {
        warn!("Database rebuilds disabled; graph is fed by ingestion events only");
        None
    };

    let state = AppState::new(config.clone(), source.clone());

    let refresh = match source {
        Some(source) => {
            let snapshots = state.snapshots.clone();
            let initial = source.clone();
            tokio::spawn(async move {
                if let Err(e) = snapshots.rebuild(initial.as_ref()).await {
                    error!(error = %e, "Initial graph build failed");
                }
            });

            config
                .rebuild
                .interval()
                .map(|interval| state.snapshots.clone().spawn_refresh(source, interval))
        }
        None => None,
    };

    // Build the router
    let app = create_router(state);

    // Start the server
    let host: std::net::IpAddr = config.server.host.parse()?;
    let addr = SocketAddr::from((host, config.server.port));
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    let (draining_tx, mut draining_rx) = watch::channel(false);
    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        shutdown_signal().await;
        let _ = draining_tx.send(true);
    });

    let drain_limit = config.shutdown_timeout();
    tokio::select! {
        result = server.into_future() => result?,
        _ = async {
            let _ = draining_rx.wait_for(|draining| *draining).await;
            tokio::time::sleep(drain_limit).await;
        } => warn!(timeout_secs = drain_limit.as_secs(), "Graceful shutdown timed out, dropping open connections"),
    }

    if let Some(handle) = refresh {
        handle.abort();
    }

    info!("Server shutdown complete");
    Ok(())
}

fn init_tracing(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    if config.json_logging {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

fn install_metrics_exporter(port: u16) -> anyhow::Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(SocketAddr::from(([0, 0, 0, 0], port)))
        .set_buckets_for_metric(Matcher::Suffix("request_duration_seconds".to_string()), LATENCY_BUCKETS)?
        .set_buckets_for_metric(Matcher::Suffix("propagation_duration_seconds".to_string()), LATENCY_BUCKETS)?
        .set_buckets_for_metric(Matcher::Suffix("rebuild_duration_seconds".to_string()), REBUILD_BUCKETS)?
        .install()?;

    info!(port, "Prometheus exporter listening");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}
