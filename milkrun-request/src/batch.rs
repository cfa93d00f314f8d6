use crate::admission::{AdmissionGateway, AdmitCommand};
use crate::registry::RequestRegistry;
use milkrun_core::inventory::InventoryService;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

/// Result of a master-unit batch admission
#[derive(Debug, Clone, Serialize)]
pub struct BatchOutcome {
    pub master_unit: String,
    pub success_count: usize,
    pub failure_count: usize,
    pub skipped_count: usize,
    pub errors: Vec<BatchItemError>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchItemError {
    pub serial_no: String,
    pub message: String,
}

/// Bulk admission of every container under one master unit.
///
/// Items are admitted one at a time with a pause between them to bound load
/// on the inventory system. A failed item is recorded and the batch moves
/// on; already-admitted items are never rolled back.
pub struct BatchOrchestrator {
    gateway: Arc<AdmissionGateway>,
    registry: Arc<RequestRegistry>,
    inventory: Arc<dyn InventoryService>,
    item_delay: Duration,
}

impl BatchOrchestrator {
    pub fn new(
        gateway: Arc<AdmissionGateway>,
        registry: Arc<RequestRegistry>,
        inventory: Arc<dyn InventoryService>,
        item_delay: Duration,
    ) -> Self {
        Self {
            gateway,
            registry,
            inventory,
            item_delay,
        }
    }

    pub async fn request_all(
        &self,
        master_unit: &str,
        deliver_to: &str,
    ) -> Result<BatchOutcome, BatchError> {
        if deliver_to.trim().is_empty() {
            return Err(BatchError::MissingWorkcenter);
        }

        // 1. Enumerate the master unit's containers. An unknown master unit
        //    is an empty list, which yields an empty outcome.
        let containers = self
            .inventory
            .containers_by_master_unit(master_unit)
            .await
            .map_err(|e| BatchError::Inventory {
                master_unit: master_unit.to_string(),
                message: e.to_string(),
            })?;

        let mut outcome = BatchOutcome {
            master_unit: master_unit.to_string(),
            success_count: 0,
            failure_count: 0,
            skipped_count: 0,
            errors: Vec::new(),
        };

        // 2. Tag against the registry and keep only the ones not yet pending
        let mut to_admit = Vec::new();
        for container in containers {
            if self.registry.contains(&container.serial_no).await {
                outcome.skipped_count += 1;
            } else {
                to_admit.push(container.serial_no);
            }
        }

        // 3. Admit sequentially with a pause between items
        for (index, serial_no) in to_admit.iter().enumerate() {
            if index > 0 {
                sleep(self.item_delay).await;
            }

            // Fetch the container fresh; the enumeration may be stale by now
            let record = match self.inventory.container_by_serial(serial_no).await {
                Ok(Some(record)) => record,
                Ok(None) => {
                    outcome.record_failure(serial_no, "no longer found in inventory");
                    continue;
                }
                Err(e) => {
                    outcome.record_failure(serial_no, &e.to_string());
                    continue;
                }
            };

            let command = AdmitCommand {
                serial_no: record.serial_no,
                part_no: record.part_no,
                revision: record.revision,
                quantity: Some(record.quantity),
                location: Some(record.location),
                deliver_to: deliver_to.to_string(),
            };
            match self.gateway.admit(command).await {
                Ok(_) => outcome.success_count += 1,
                Err(e) => outcome.record_failure(serial_no, &e.to_string()),
            }
        }

        info!(
            "Batch for master unit {}: {} admitted, {} failed, {} already pending",
            master_unit, outcome.success_count, outcome.failure_count, outcome.skipped_count
        );
        Ok(outcome)
    }
}

impl BatchOutcome {
    fn record_failure(&mut self, serial_no: &str, message: &str) {
        warn!("Batch item {} failed: {}", serial_no, message);
        self.failure_count += 1;
        self.errors.push(BatchItemError {
            serial_no: serial_no.to_string(),
            message: message.to_string(),
        });
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    #[error("a destination workcenter is required")]
    MissingWorkcenter,

    #[error("inventory lookup for master unit {master_unit} failed: {message}")]
    Inventory { master_unit: String, message: String },
}
