pub mod admission;
pub mod batch;
pub mod registry;

pub use admission::{AdmissionGateway, AdmitCommand, AdmitError};
pub use batch::{BatchError, BatchOrchestrator, BatchOutcome};
pub use registry::{InsertOutcome, PendingEntry, RequestRegistry};
