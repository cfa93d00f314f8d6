pub mod events;
pub mod inventory;
pub mod model;

pub use events::{EventHub, RegistryEvent};
pub use inventory::{InventoryService, MockInventory};
pub use model::{ContainerRecord, DeliveryRequest, RequestStatus};
