use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a delivery request
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestStatus {
    Pending,
    Fulfilled,
    Cancelled,
}

/// A worker-initiated request to move one container to a workcenter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryRequest {
    pub serial_no: String,
    pub part_no: String,
    pub revision: String,
    pub quantity: f64,
    pub location: String,
    pub deliver_to: String,
    pub req_time: DateTime<Utc>,
    pub status: RequestStatus,
}

impl DeliveryRequest {
    pub fn new(
        serial_no: String,
        part_no: String,
        revision: String,
        quantity: f64,
        location: String,
        deliver_to: String,
    ) -> Self {
        Self {
            serial_no,
            part_no,
            revision,
            quantity,
            location,
            deliver_to,
            req_time: Utc::now(),
            status: RequestStatus::Pending,
        }
    }
}

/// A container as reported by the facility's inventory system
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerRecord {
    pub serial_no: String,
    pub part_no: String,
    pub revision: String,
    pub quantity: f64,
    pub location: String,
    pub add_date: String,
}
