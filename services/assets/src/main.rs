use anyhow::{Context, Result};
use asset_service::api::{start_api_server, AppState};
use asset_service::config::{Config, StoreBackend};
use asset_service::{AssetManager, MemoryObjectStore, ObjectStore, S3ObjectStore};
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load().context("Failed to load configuration")?;

    // Initialize logging
    init_tracing(&config.service.log_level);

    info!(
        service = %config.service.name,
        "Starting asset service"
    );

    // Initialize metrics
    init_metrics(config.service.metrics_port)?;

    let store: Arc<dyn ObjectStore> = match config.s3.backend {
        StoreBackend::S3 => Arc::new(
            S3ObjectStore::new(&config.s3)
                .await
                .context("Failed to initialize S3 object store")?,
        ),
        StoreBackend::Memory => {
            warn!("Using in-memory object store; assets are lost on restart");
            Arc::new(MemoryObjectStore::new(config.s3.bucket.clone()))
        }
    };

    let manager = Arc::new(AssetManager::from_config(store, &config));

    info!(
        variants = ?manager.variants().iter().map(|v| v.label.as_str()).collect::<Vec<_>>(),
        list_label = %config.assets.list_label,
        rollback = config.assets.rollback_on_partial_failure,
        "Asset manager ready"
    );

    let api_state = AppState { manager };

    // Spawn API server task
    let api_config = config.api.clone();
    let api_handle = tokio::spawn(async move {
        if let Err(e) = start_api_server(api_state, &api_config).await {
            error!(error = %e, "API server error");
        }
    });

    info!("Asset service started successfully");

    // Wait for shutdown signal
    shutdown_signal().await;

    info!("Shutting down asset service");

    api_handle.abort();

    info!("Asset service stopped");

    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().json())
        .init();
}

/// Initialize Prometheus metrics exporter
fn init_metrics(port: u16) -> Result<()> {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .context("Failed to install Prometheus metrics exporter")?;

    info!(port = port, "Prometheus metrics exporter started");

    Ok(())
}

/// Wait for shutdown signal (SIGINT or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
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
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}
