mod aggregator;
mod api;
mod backend;
mod config;
mod fingerprint;
mod mdns;
mod scan;
mod self_filter;
mod store;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use mdns_sd::ServiceDaemon;
use anyhow::{Context, Result};
use crate::aggregator::{Aggregator, AggregatorHandle};
use crate::backend::BackendRegistry;
use crate::config::Config;
use crate::scan::ScanDispatcher;
use crate::self_filter::InterfaceAddresses;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("service_discoveryd=info"))
        )
        .init();

    tracing::info!("Starting service-discoveryd");

    // Load config
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "/etc/service-discovery/discoveryd.toml".to_string());

    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path))?;

    tracing::info!(
        "Loaded config from {} (ttl window {}s)",
        config_path,
        config.discovery.ttl_window_secs
    );

    let serial_config = config.serial_backend_json()?;

    // Scan requests for announce-based categories go to the browser task
    let (scan_tx, scan_rx) = mpsc::channel(16);

    // Start aggregator thread
    let ttl_window = config.discovery.ttl_window();
    let aggregator = AggregatorHandle::spawn(move |context| {
        let scans = ScanDispatcher::new(scan_tx, BackendRegistry::default(), serial_config, context);
        Aggregator::new(ttl_window, Box::new(InterfaceAddresses), Box::new(scans))
    });

    // Create mDNS daemon, optionally bound to one interface
    let mdns_daemon = ServiceDaemon::new()
        .context("Failed to create mDNS daemon")?;
    if let Some(interface) = &config.discovery.interface {
        mdns_daemon
            .disable_interface(mdns_sd::IfKind::All)
            .context("Failed to disable default interfaces")?;
        mdns_daemon
            .enable_interface(interface.as_str())
            .with_context(|| format!("Failed to enable interface {}", interface))?;
    }

    let session_info = if config.advertise.enabled {
        Some(mdns::advertise::register_session(&mdns_daemon, &config.advertise)?)
    } else {
        None
    };

    // Create cancellation token for graceful shutdown
    let cancel = CancellationToken::new();

    // Spawn mDNS browser task
    let browser_cancel = cancel.clone();
    let browser_daemon = mdns_daemon.clone();
    let browser_aggregator = aggregator.clone();
    let browser_handle = tokio::spawn(async move {
        if let Err(e) = mdns::browser::run_browser(browser_daemon, browser_aggregator, scan_rx, browser_cancel).await {
            tracing::error!("mDNS browser error: {}", e);
        }
    });

    // Spawn maintenance task
    let mgr_cancel = cancel.clone();
    let mgr_aggregator = aggregator.clone();
    let mgr_interval = config.discovery.maintenance_interval_secs;
    let mgr_handle = tokio::spawn(async move {
        if let Err(e) = crate::aggregator::run_maintenance(mgr_aggregator, mgr_interval, mgr_cancel).await {
            tracing::error!("Maintenance error: {}", e);
        }
    });

    // Initial active scan so serial boards show up without a query
    aggregator.request_services_scan().await?;

    // Build API router
    let app_state = api::routes::AppState {
        aggregator: aggregator.clone(),
    };
    let app = api::routes::router(app_state);

    // Bind HTTP server
    let listener = tokio::net::TcpListener::bind(&config.api.listen)
        .await
        .with_context(|| format!("Failed to bind to {}", config.api.listen))?;

    tracing::info!("API listening on {}", config.api.listen);

    // Run server with graceful shutdown
    let server_cancel = cancel.clone();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async move { server_cancel.cancelled().await })
            .await
        {
            tracing::error!("Server error: {}", e);
        }
    });

    // Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutdown signal received");

    // Trigger cancellation
    cancel.cancel();

    // Wait for all tasks to complete
    let _ = tokio::join!(browser_handle, mgr_handle, server_handle);

    // Withdraw our own announcement
    if let Some(info) = &session_info {
        if let Err(e) = mdns::advertise::unregister_session(&mdns_daemon, info) {
            tracing::error!("Failed to unregister mDNS service: {}", e);
        }
    }

    // Shutdown aggregator thread, closing its scan backends
    if let Err(e) = aggregator.shutdown().await {
        tracing::error!("Failed to shutdown aggregator: {}", e);
    }

    // Shutdown mDNS daemon
    if let Err(e) = mdns_daemon.shutdown() {
        tracing::error!("Failed to shutdown mDNS daemon: {}", e);
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
