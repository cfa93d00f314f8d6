use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use milkrun_api::{app, state::AppState};
use milkrun_core::events::EventHub;
use milkrun_core::inventory::{InventoryService, MockInventory};
use milkrun_reconcile::{ReconcileSettings, ReconciliationWorker};
use milkrun_request::{AdmissionGateway, BatchOrchestrator, RequestRegistry};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "milkrun_api=debug,tower_http=debug,axum::rejection=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = milkrun_store::app_config::Config::load().expect("Failed to load config");
    tracing::info!("Starting Milkrun API on port {}", config.server.port);

    // Inventory Backend
    let inventory: Arc<dyn InventoryService> = if config.inventory.use_mock {
        tracing::warn!("Serving container lookups from the in-memory mock inventory");
        Arc::new(MockInventory::new())
    } else {
        let client = milkrun_store::ErpDatasourceClient::new(&config.inventory)
            .expect("Failed to build inventory client");
        Arc::new(client)
    };

    // Registry and Event Fan-out
    let hub = EventHub::new(100);
    let registry = Arc::new(RequestRegistry::new());
    let gateway = Arc::new(AdmissionGateway::new(registry.clone(), hub.clone()));
    let batch = Arc::new(BatchOrchestrator::new(
        gateway.clone(),
        registry.clone(),
        inventory.clone(),
        Duration::from_millis(config.batch.item_delay_ms),
    ));

    // Reconciliation Worker
    let worker = Arc::new(ReconciliationWorker::new(
        registry.clone(),
        inventory.clone(),
        hub.clone(),
        ReconcileSettings {
            production_locations: config
                .reconciliation
                .production_locations
                .iter()
                .cloned()
                .collect::<HashSet<_>>(),
            probe_delay: Duration::from_millis(config.reconciliation.probe_delay_ms),
        },
    ));
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let worker_handle = tokio::spawn(worker.clone().run(
        Duration::from_secs(config.reconciliation.interval_seconds),
        shutdown_rx,
    ));

    let app_state = AppState {
        registry,
        gateway,
        batch,
        worker,
        inventory,
        hub,
        excluded_location_prefixes: config.inventory.excluded_location_prefixes.clone(),
    };

    let app = app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .unwrap();

    // Stop the worker between cycles and wait for it to wind down
    let _ = shutdown_tx.send(true);
    let _ = worker_handle.await;
    tracing::info!("Shutdown complete");
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
