use milkrun_core::events::EventHub;
use milkrun_core::inventory::InventoryService;
use milkrun_reconcile::ReconciliationWorker;
use milkrun_request::{AdmissionGateway, BatchOrchestrator, RequestRegistry};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<RequestRegistry>,
    pub gateway: Arc<AdmissionGateway>,
    pub batch: Arc<BatchOrchestrator>,
    pub worker: Arc<ReconciliationWorker>,
    pub inventory: Arc<dyn InventoryService>,
    pub hub: EventHub,
    /// Location prefixes hidden from part container listings
    pub excluded_location_prefixes: Vec<String>,
}
