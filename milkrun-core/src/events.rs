use crate::model::DeliveryRequest;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

/// A registry change pushed to connected viewers.
///
/// Events are ephemeral: emitted once per mutation, never persisted or
/// replayed. New viewers pull the full pending list instead of a backlog.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RegistryEvent {
    Created {
        #[serde(flatten)]
        request: DeliveryRequest,
        timestamp: DateTime<Utc>,
    },
    Deleted {
        serial_no: String,
        timestamp: DateTime<Utc>,
    },
    AutoCleanupComplete {
        checked: usize,
        removed: usize,
        removed_serials: Vec<String>,
        timestamp: DateTime<Utc>,
    },
    AutoCleanupError {
        message: String,
        timestamp: DateTime<Utc>,
    },
}

impl RegistryEvent {
    pub fn created(request: DeliveryRequest) -> Self {
        Self::Created {
            request,
            timestamp: Utc::now(),
        }
    }

    pub fn deleted(serial_no: String) -> Self {
        Self::Deleted {
            serial_no,
            timestamp: Utc::now(),
        }
    }

    pub fn auto_cleanup_complete(checked: usize, removed_serials: Vec<String>) -> Self {
        Self::AutoCleanupComplete {
            checked,
            removed: removed_serials.len(),
            removed_serials,
            timestamp: Utc::now(),
        }
    }

    pub fn auto_cleanup_error(message: String) -> Self {
        Self::AutoCleanupError {
            message,
            timestamp: Utc::now(),
        }
    }
}

/// Fan-out channel for registry events.
///
/// Delivery is best effort: publishing with no subscribers is a no-op and a
/// lagging subscriber misses events rather than stalling the publisher.
#[derive(Clone)]
pub struct EventHub {
    tx: broadcast::Sender<RegistryEvent>,
}

impl EventHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: RegistryEvent) {
        if self.tx.receiver_count() > 0 {
            debug!("Publishing event to {} viewers", self.tx.receiver_count());
            let _ = self.tx.send(event);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_request() -> DeliveryRequest {
        DeliveryRequest::new(
            "SN100".to_string(),
            "P1".to_string(),
            "A".to_string(),
            10.0,
            "BIN-1".to_string(),
            "WC-5".to_string(),
        )
    }

    #[test]
    fn created_event_serializes_with_snake_case_tag() {
        let event = RegistryEvent::created(sample_request());
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["type"], "created");
        assert_eq!(json["serial_no"], "SN100");
        assert_eq!(json["deliver_to"], "WC-5");
        assert!(json["timestamp"].is_string());
    }

    #[test]
    fn cleanup_events_serialize_report_fields() {
        let event = RegistryEvent::auto_cleanup_complete(3, vec!["SN1".to_string()]);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "auto_cleanup_complete");
        assert_eq!(json["checked"], 3);
        assert_eq!(json["removed"], 1);

        let event = RegistryEvent::auto_cleanup_error("inventory unreachable".to_string());
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "auto_cleanup_error");
        assert_eq!(json["message"], "inventory unreachable");
    }

    #[test]
    fn publish_without_subscribers_is_a_noop() {
        let hub = EventHub::new(16);
        assert_eq!(hub.subscriber_count(), 0);
        hub.publish(RegistryEvent::deleted("SN100".to_string()));
    }

    #[tokio::test]
    async fn subscribers_observe_events_in_publish_order() {
        let hub = EventHub::new(16);
        let mut rx = hub.subscribe();

        hub.publish(RegistryEvent::created(sample_request()));
        hub.publish(RegistryEvent::deleted("SN100".to_string()));

        assert!(matches!(rx.recv().await.unwrap(), RegistryEvent::Created { .. }));
        match rx.recv().await.unwrap() {
            RegistryEvent::Deleted { serial_no, .. } => assert_eq!(serial_no, "SN100"),
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
