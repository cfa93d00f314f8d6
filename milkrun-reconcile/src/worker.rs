use chrono::{DateTime, Utc};
use milkrun_core::events::{EventHub, RegistryEvent};
use milkrun_core::inventory::InventoryService;
use milkrun_core::model::DeliveryRequest;
use milkrun_request::registry::RequestRegistry;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tokio::time::{interval, sleep, MissedTickBehavior};
use tracing::{debug, error, info};

#[derive(Debug, Clone)]
pub struct ReconcileSettings {
    /// Locations that mean a container has reached active use
    pub production_locations: HashSet<String>,
    /// Pause between per-serial inventory probes within a cycle
    pub probe_delay: Duration,
}

/// What one reconciliation cycle did
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub checked: usize,
    pub removed: usize,
    pub removed_serials: Vec<String>,
    pub error: Option<String>,
}

/// Snapshot served by the status endpoint
#[derive(Debug, Clone, Serialize)]
pub struct WorkerStatus {
    pub running: bool,
    pub last_cycle: Option<CycleReport>,
}

#[derive(Debug, thiserror::Error)]
#[error("a reconciliation cycle is already running")]
pub struct CycleBusy;

/// Removes pending requests whose containers have physically arrived.
///
/// A request is fulfilled when inventory reports its container at a
/// production location different from the one recorded at admission. Cycles
/// run to completion once started; an inventory failure mid-cycle abandons
/// the remaining serials until the next tick, while removals already made
/// stand.
pub struct ReconciliationWorker {
    registry: Arc<RequestRegistry>,
    inventory: Arc<dyn InventoryService>,
    hub: EventHub,
    settings: ReconcileSettings,
    busy: AtomicBool,
    last_cycle: RwLock<Option<CycleReport>>,
}

impl ReconciliationWorker {
    pub fn new(
        registry: Arc<RequestRegistry>,
        inventory: Arc<dyn InventoryService>,
        hub: EventHub,
        settings: ReconcileSettings,
    ) -> Self {
        Self {
            registry,
            inventory,
            hub,
            settings,
            busy: AtomicBool::new(false),
            last_cycle: RwLock::new(None),
        }
    }

    /// Run cycles on a fixed timer until shutdown is signalled.
    ///
    /// Shutdown is honored between cycles; a cycle in flight finishes first.
    pub async fn run(
        self: Arc<Self>,
        cycle_interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut ticker = interval(cycle_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(
            "Reconciliation worker started, cycle every {:?}, {} production locations",
            cycle_interval,
            self.settings.production_locations.len()
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.try_run_cycle().await {
                        Ok(report) => {
                            debug!(
                                "Cycle checked {} requests, removed {}",
                                report.checked, report.removed
                            );
                        }
                        Err(CycleBusy) => {
                            debug!("Cycle already in flight, skipping tick");
                        }
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Reconciliation worker stopping");
                        break;
                    }
                }
            }
        }
    }

    /// Run one cycle now, refusing to overlap a cycle already in flight.
    pub async fn try_run_cycle(&self) -> Result<CycleReport, CycleBusy> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(CycleBusy);
        }

        let report = self.run_cycle().await;
        *self.last_cycle.write().await = Some(report.clone());
        self.busy.store(false, Ordering::SeqCst);
        Ok(report)
    }

    pub async fn status(&self) -> WorkerStatus {
        WorkerStatus {
            running: self.busy.load(Ordering::SeqCst),
            last_cycle: self.last_cycle.read().await.clone(),
        }
    }

    async fn run_cycle(&self) -> CycleReport {
        let started_at = Utc::now();
        let pending = self.registry.snapshot().await;
        let mut checked = 0;
        let mut removed_serials = Vec::new();
        let mut cycle_error = None;

        for request in &pending {
            if checked > 0 {
                sleep(self.settings.probe_delay).await;
            }

            let current = match self.inventory.container_by_serial(&request.serial_no).await {
                Ok(current) => current,
                Err(e) => {
                    error!(
                        "Inventory probe for {} failed, abandoning cycle: {}",
                        request.serial_no, e
                    );
                    cycle_error = Some(e.to_string());
                    self.hub
                        .publish(RegistryEvent::auto_cleanup_error(e.to_string()));
                    break;
                }
            };
            checked += 1;

            // A serial inventory no longer knows stays pending
            let current = match current {
                Some(current) => current,
                None => continue,
            };

            if self.is_fulfilled(request, &current.location) {
                // Remove can lose to a concurrent explicit cancel; only a
                // real removal is reported
                if self.registry.remove(&request.serial_no).await.is_some() {
                    info!(
                        "Auto-completed {} (moved {} -> {})",
                        request.serial_no, request.location, current.location
                    );
                    self.hub
                        .publish(RegistryEvent::deleted(request.serial_no.clone()));
                    removed_serials.push(request.serial_no.clone());
                }
            }
        }

        let report = CycleReport {
            started_at,
            checked,
            removed: removed_serials.len(),
            removed_serials,
            error: cycle_error,
        };

        if report.error.is_none() && report.removed > 0 {
            self.hub.publish(RegistryEvent::auto_cleanup_complete(
                report.checked,
                report.removed_serials.clone(),
            ));
        }
        report
    }

    fn is_fulfilled(&self, request: &DeliveryRequest, current_location: &str) -> bool {
        self.settings.production_locations.contains(current_location)
            && current_location != request.location
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use milkrun_core::inventory::MockInventory;
    use milkrun_core::model::ContainerRecord;

    fn settings(probe_delay: Duration) -> ReconcileSettings {
        ReconcileSettings {
            production_locations: HashSet::from([
                "PROD-LINE-3".to_string(),
                "PROD-LINE-7".to_string(),
            ]),
            probe_delay,
        }
    }

    fn harness(probe_delay: Duration) -> (
        Arc<ReconciliationWorker>,
        Arc<RequestRegistry>,
        Arc<MockInventory>,
        EventHub,
    ) {
        let registry = Arc::new(RequestRegistry::new());
        let inventory = Arc::new(MockInventory::new());
        let hub = EventHub::new(64);
        let worker = Arc::new(ReconciliationWorker::new(
            registry.clone(),
            inventory.clone(),
            hub.clone(),
            settings(probe_delay),
        ));
        (worker, registry, inventory, hub)
    }

    async fn seed_pending(
        registry: &RequestRegistry,
        inventory: &MockInventory,
        serial_no: &str,
        location: &str,
        age_seconds: i64,
    ) {
        let mut request = DeliveryRequest::new(
            serial_no.to_string(),
            "P1".to_string(),
            "A".to_string(),
            10.0,
            location.to_string(),
            "WC-5".to_string(),
        );
        request.req_time = Utc::now() - ChronoDuration::seconds(age_seconds);
        registry.insert(request).await;
        inventory
            .add_container(ContainerRecord {
                serial_no: serial_no.to_string(),
                part_no: "P1".to_string(),
                revision: "A".to_string(),
                quantity: 10.0,
                location: location.to_string(),
                add_date: "2026-01-10".to_string(),
            })
            .await;
    }

    #[tokio::test]
    async fn cycle_removes_requests_delivered_to_production() {
        let (worker, registry, inventory, hub) = harness(Duration::ZERO);
        let mut rx = hub.subscribe();
        seed_pending(&registry, &inventory, "SN100", "BIN-1", 10).await;
        inventory.set_location("SN100", "PROD-LINE-3").await;

        let report = worker.try_run_cycle().await.unwrap();

        assert_eq!(report.checked, 1);
        assert_eq!(report.removed, 1);
        assert_eq!(report.removed_serials, vec!["SN100".to_string()]);
        assert!(registry.is_empty().await);

        match rx.recv().await.unwrap() {
            RegistryEvent::Deleted { serial_no, .. } => assert_eq!(serial_no, "SN100"),
            other => panic!("unexpected event: {:?}", other),
        }
        match rx.recv().await.unwrap() {
            RegistryEvent::AutoCleanupComplete { checked, removed, .. } => {
                assert_eq!(checked, 1);
                assert_eq!(removed, 1);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn cycle_leaves_unmoved_containers_pending() {
        let (worker, registry, inventory, hub) = harness(Duration::ZERO);
        let mut rx = hub.subscribe();
        seed_pending(&registry, &inventory, "SN1", "BIN-1", 10).await;

        let report = worker.try_run_cycle().await.unwrap();

        assert_eq!(report.checked, 1);
        assert_eq!(report.removed, 0);
        assert_eq!(registry.len().await, 1);
        // No removals, so no cleanup report either
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn move_to_non_production_location_does_not_fulfill() {
        let (worker, registry, inventory, _hub) = harness(Duration::ZERO);
        seed_pending(&registry, &inventory, "SN1", "BIN-1", 10).await;
        inventory.set_location("SN1", "BIN-9").await;

        let report = worker.try_run_cycle().await.unwrap();
        assert_eq!(report.removed, 0);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn admission_at_a_production_location_requires_a_move() {
        let (worker, registry, inventory, _hub) = harness(Duration::ZERO);
        // Requested while already sitting on the line; staying put is not delivery
        seed_pending(&registry, &inventory, "SN1", "PROD-LINE-3", 10).await;

        let report = worker.try_run_cycle().await.unwrap();
        assert_eq!(report.removed, 0);
        assert_eq!(registry.len().await, 1);

        // Moving between production locations does count
        inventory.set_location("SN1", "PROD-LINE-7").await;
        let report = worker.try_run_cycle().await.unwrap();
        assert_eq!(report.removed, 1);
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn serial_unknown_to_inventory_stays_pending() {
        let (worker, registry, _inventory, _hub) = harness(Duration::ZERO);
        let request = DeliveryRequest::new(
            "SN1".to_string(),
            "P1".to_string(),
            "A".to_string(),
            1.0,
            "BIN-1".to_string(),
            "WC-5".to_string(),
        );
        registry.insert(request).await;

        let report = worker.try_run_cycle().await.unwrap();
        assert_eq!(report.checked, 1);
        assert_eq!(report.removed, 0);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn inventory_failure_abandons_cycle_but_keeps_prior_removals() {
        let (worker, registry, inventory, hub) = harness(Duration::ZERO);
        let mut rx = hub.subscribe();

        // Older request completes before the failing probe aborts the cycle
        seed_pending(&registry, &inventory, "SN1", "BIN-1", 30).await;
        inventory.set_location("SN1", "PROD-LINE-3").await;
        let mut failing = DeliveryRequest::new(
            "fail-SN2".to_string(),
            "P1".to_string(),
            "A".to_string(),
            1.0,
            "BIN-2".to_string(),
            "WC-5".to_string(),
        );
        failing.req_time = Utc::now() - ChronoDuration::seconds(10);
        registry.insert(failing).await;

        let report = worker.try_run_cycle().await.unwrap();

        assert_eq!(report.checked, 1);
        assert_eq!(report.removed, 1);
        assert!(report.error.is_some());
        // The removal stands, the failing serial stays for the next tick
        assert_eq!(registry.len().await, 1);
        assert!(registry.contains("fail-SN2").await);

        assert!(matches!(rx.recv().await.unwrap(), RegistryEvent::Deleted { .. }));
        assert!(matches!(
            rx.recv().await.unwrap(),
            RegistryEvent::AutoCleanupError { .. }
        ));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn worker_survives_a_failed_cycle() {
        let (worker, registry, inventory, _hub) = harness(Duration::ZERO);
        let mut failing = DeliveryRequest::new(
            "fail-SN1".to_string(),
            "P1".to_string(),
            "A".to_string(),
            1.0,
            "BIN-1".to_string(),
            "WC-5".to_string(),
        );
        failing.req_time = Utc::now() - ChronoDuration::seconds(20);
        registry.insert(failing).await;

        let report = worker.try_run_cycle().await.unwrap();
        assert!(report.error.is_some());

        // The next cycle runs normally and can still complete work
        seed_pending(&registry, &inventory, "SN2", "BIN-2", 10).await;
        inventory.set_location("SN2", "PROD-LINE-3").await;
        let report = worker.try_run_cycle().await.unwrap();
        assert_eq!(report.removed, 1);
    }

    #[tokio::test]
    async fn concurrent_trigger_is_refused_while_a_cycle_runs() {
        let (worker, registry, inventory, _hub) = harness(Duration::from_millis(200));
        for (serial, age) in [("SN1", 30), ("SN2", 20), ("SN3", 10)] {
            seed_pending(&registry, &inventory, serial, "BIN-1", age).await;
        }

        let running = {
            let worker = worker.clone();
            tokio::spawn(async move { worker.try_run_cycle().await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(worker.try_run_cycle().await.is_err());
        assert!(worker.status().await.running);

        let report = running.await.unwrap().unwrap();
        assert_eq!(report.checked, 3);
        assert!(!worker.status().await.running);
    }

    #[tokio::test]
    async fn status_reports_the_last_cycle() {
        let (worker, registry, inventory, _hub) = harness(Duration::ZERO);

        assert!(worker.status().await.last_cycle.is_none());

        seed_pending(&registry, &inventory, "SN1", "BIN-1", 10).await;
        inventory.set_location("SN1", "PROD-LINE-3").await;
        worker.try_run_cycle().await.unwrap();

        let status = worker.status().await;
        let last = status.last_cycle.unwrap();
        assert_eq!(last.removed, 1);
        let json = serde_json::to_value(&last).unwrap();
        assert_eq!(json["removed_serials"][0], "SN1");
        assert!(json["started_at"].is_string());
    }

    #[tokio::test]
    async fn run_loop_stops_on_shutdown_signal() {
        let (worker, _registry, _inventory, _hub) = harness(Duration::ZERO);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(worker.clone().run(Duration::from_millis(20), shutdown_rx));
        tokio::time::sleep(Duration::from_millis(60)).await;
        shutdown_tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("worker did not stop")
            .unwrap();
        // The empty-registry cycles ran and recorded status
        assert!(worker.status().await.last_cycle.is_some());
    }
}
