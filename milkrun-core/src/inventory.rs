use crate::model::ContainerRecord;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Read-only view of the facility's container inventory.
///
/// Absent keys are an empty result, not an error. Errors mean the backing
/// system was unreachable or returned something unusable.
#[async_trait]
pub trait InventoryService: Send + Sync {
    /// All containers currently holding the given part
    async fn containers_by_part(
        &self,
        part_no: &str,
    ) -> Result<Vec<ContainerRecord>, Box<dyn std::error::Error + Send + Sync>>;

    /// The container with the given serial, if inventory knows it
    async fn container_by_serial(
        &self,
        serial_no: &str,
    ) -> Result<Option<ContainerRecord>, Box<dyn std::error::Error + Send + Sync>>;

    /// All containers grouped under the given master unit
    async fn containers_by_master_unit(
        &self,
        master_unit: &str,
    ) -> Result<Vec<ContainerRecord>, Box<dyn std::error::Error + Send + Sync>>;
}

/// In-memory inventory for tests and local development.
///
/// Lookups for keys starting with `fail-` return an error to exercise
/// outage paths.
#[derive(Default)]
pub struct MockInventory {
    containers: RwLock<HashMap<String, ContainerRecord>>,
    master_units: RwLock<HashMap<String, Vec<String>>>,
}

impl MockInventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_container(&self, record: ContainerRecord) {
        let mut containers = self.containers.write().await;
        containers.insert(record.serial_no.clone(), record);
    }

    pub async fn assign_master_unit(&self, master_unit: &str, serial_no: &str) {
        let mut master_units = self.master_units.write().await;
        master_units
            .entry(master_unit.to_string())
            .or_default()
            .push(serial_no.to_string());
    }

    /// Relocate a container, returning false if the serial is unknown
    pub async fn set_location(&self, serial_no: &str, location: &str) -> bool {
        let mut containers = self.containers.write().await;
        match containers.get_mut(serial_no) {
            Some(record) => {
                record.location = location.to_string();
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl InventoryService for MockInventory {
    async fn containers_by_part(
        &self,
        part_no: &str,
    ) -> Result<Vec<ContainerRecord>, Box<dyn std::error::Error + Send + Sync>> {
        if part_no.starts_with("fail-") {
            return Err("simulated inventory outage".into());
        }
        let containers = self.containers.read().await;
        let mut records: Vec<ContainerRecord> = containers
            .values()
            .filter(|record| record.part_no == part_no)
            .cloned()
            .collect();
        records.sort_by(|a, b| a.serial_no.cmp(&b.serial_no));
        Ok(records)
    }

    async fn container_by_serial(
        &self,
        serial_no: &str,
    ) -> Result<Option<ContainerRecord>, Box<dyn std::error::Error + Send + Sync>> {
        if serial_no.starts_with("fail-") {
            return Err("simulated inventory outage".into());
        }
        let containers = self.containers.read().await;
        Ok(containers.get(serial_no).cloned())
    }

    async fn containers_by_master_unit(
        &self,
        master_unit: &str,
    ) -> Result<Vec<ContainerRecord>, Box<dyn std::error::Error + Send + Sync>> {
        if master_unit.starts_with("fail-") {
            return Err("simulated inventory outage".into());
        }
        let master_units = self.master_units.read().await;
        let serials = match master_units.get(master_unit) {
            Some(serials) => serials.clone(),
            None => return Ok(Vec::new()),
        };
        drop(master_units);

        let containers = self.containers.read().await;
        Ok(serials
            .iter()
            .filter_map(|serial| containers.get(serial).cloned())
            .collect())
    }
}
