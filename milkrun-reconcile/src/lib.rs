pub mod worker;

pub use worker::{CycleBusy, CycleReport, ReconcileSettings, ReconciliationWorker, WorkerStatus};
