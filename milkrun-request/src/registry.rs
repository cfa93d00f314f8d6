use milkrun_core::model::DeliveryRequest;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;

/// Outcome of an insert attempt
#[derive(Debug, Clone)]
pub enum InsertOutcome {
    Inserted(DeliveryRequest),
    AlreadyPending(DeliveryRequest),
}

/// A pending request as listed to viewers, with the FIFO highlight
#[derive(Debug, Clone, Serialize)]
pub struct PendingEntry {
    #[serde(flatten)]
    pub request: DeliveryRequest,
    /// True for the earliest pending request of its part
    pub oldest: bool,
}

/// Authoritative store of pending delivery requests.
///
/// At most one active request exists per serial. All mutations take the
/// write lock, so a concurrent insert and remove of the same serial settle
/// to exactly one of "pending" or "absent".
pub struct RequestRegistry {
    requests: RwLock<HashMap<String, DeliveryRequest>>,
}

impl RequestRegistry {
    pub fn new() -> Self {
        Self {
            requests: RwLock::new(HashMap::new()),
        }
    }

    /// Insert a request. An existing active entry for the serial wins and is
    /// returned unchanged, so retries never create duplicates.
    pub async fn insert(&self, request: DeliveryRequest) -> InsertOutcome {
        let mut requests = self.requests.write().await;
        if let Some(existing) = requests.get(&request.serial_no) {
            return InsertOutcome::AlreadyPending(existing.clone());
        }
        requests.insert(request.serial_no.clone(), request.clone());
        InsertOutcome::Inserted(request)
    }

    pub async fn get(&self, serial_no: &str) -> Option<DeliveryRequest> {
        let requests = self.requests.read().await;
        requests.get(serial_no).cloned()
    }

    pub async fn contains(&self, serial_no: &str) -> bool {
        let requests = self.requests.read().await;
        requests.contains_key(serial_no)
    }

    /// Remove a request. Removing an absent serial is a no-op success.
    pub async fn remove(&self, serial_no: &str) -> Option<DeliveryRequest> {
        let mut requests = self.requests.write().await;
        requests.remove(serial_no)
    }

    /// All pending requests ordered by request time, each flagged if it is
    /// the oldest for its part.
    pub async fn list(&self) -> Vec<PendingEntry> {
        let ordered = self.snapshot().await;
        let mut seen_parts = HashSet::new();
        ordered
            .into_iter()
            .map(|request| {
                let oldest = seen_parts.insert(request.part_no.clone());
                PendingEntry { request, oldest }
            })
            .collect()
    }

    /// All pending requests ordered by request time
    pub async fn snapshot(&self) -> Vec<DeliveryRequest> {
        let requests = self.requests.read().await;
        let mut ordered: Vec<DeliveryRequest> = requests.values().cloned().collect();
        drop(requests);
        ordered.sort_by(|a, b| {
            a.req_time
                .cmp(&b.req_time)
                .then_with(|| a.serial_no.cmp(&b.serial_no))
        });
        ordered
    }

    pub async fn len(&self) -> usize {
        let requests = self.requests.read().await;
        requests.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for RequestRegistry {
    fn default() -> Self {
        Self::new()
    }
}
