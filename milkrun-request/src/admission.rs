use crate::registry::{InsertOutcome, RequestRegistry};
use milkrun_core::events::{EventHub, RegistryEvent};
use milkrun_core::model::DeliveryRequest;
use std::sync::Arc;
use tracing::{info, warn};

/// Fields supplied by the caller when requesting a delivery
#[derive(Debug, Clone)]
pub struct AdmitCommand {
    pub serial_no: String,
    pub part_no: String,
    pub revision: String,
    pub quantity: Option<f64>,
    pub location: Option<String>,
    pub deliver_to: String,
}

/// Validates and idempotently inserts delivery requests
pub struct AdmissionGateway {
    registry: Arc<RequestRegistry>,
    hub: EventHub,
}

impl AdmissionGateway {
    pub fn new(registry: Arc<RequestRegistry>, hub: EventHub) -> Self {
        Self { registry, hub }
    }

    /// Admit a delivery request.
    ///
    /// Re-admitting a serial that is already pending returns the existing
    /// record without a second Created event, so callers can retry safely.
    pub async fn admit(&self, command: AdmitCommand) -> Result<DeliveryRequest, AdmitError> {
        // 1. Validate
        if command.deliver_to.trim().is_empty() {
            return Err(AdmitError::MissingWorkcenter);
        }
        if command.serial_no.trim().is_empty() {
            return Err(AdmitError::MissingSerial);
        }
        if let Some(quantity) = command.quantity {
            if quantity < 0.0 {
                return Err(AdmitError::NegativeQuantity(quantity));
            }
        }

        // 2. Lenient defaults for fields scanners sometimes omit
        let quantity = match command.quantity {
            Some(quantity) => quantity,
            None => {
                warn!("Admitting {} without a quantity", command.serial_no);
                0.0
            }
        };
        let location = match command.location {
            Some(location) => location,
            None => {
                warn!("Admitting {} without a source location", command.serial_no);
                String::new()
            }
        };

        // 3. Insert; request time is assigned here, not by the caller
        let request = DeliveryRequest::new(
            command.serial_no,
            command.part_no,
            command.revision,
            quantity,
            location,
            command.deliver_to,
        );

        match self.registry.insert(request).await {
            InsertOutcome::Inserted(request) => {
                info!(
                    "Admitted delivery request {} for part {} to {}",
                    request.serial_no, request.part_no, request.deliver_to
                );
                // 4. Broadcast only after the write commits
                self.hub.publish(RegistryEvent::created(request.clone()));
                Ok(request)
            }
            InsertOutcome::AlreadyPending(existing) => {
                info!("Request {} already pending, returning existing", existing.serial_no);
                Ok(existing)
            }
        }
    }

    /// Cancel a pending request. Cancelling an absent serial is a success,
    /// which keeps an explicit cancel safe to race with auto-cleanup.
    pub async fn cancel(&self, serial_no: &str) -> Option<DeliveryRequest> {
        match self.registry.remove(serial_no).await {
            Some(removed) => {
                info!("Cancelled delivery request {}", serial_no);
                self.hub.publish(RegistryEvent::deleted(serial_no.to_string()));
                Some(removed)
            }
            None => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AdmitError {
    #[error("a destination workcenter is required")]
    MissingWorkcenter,

    #[error("a container serial number is required")]
    MissingSerial,

    #[error("quantity must not be negative, got {0}")]
    NegativeQuantity(f64),
}
