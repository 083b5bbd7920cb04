// Port Layer - Interfaces for external collaborators

pub mod id_provider;
pub mod job_store;
pub mod notification_gateway;
pub mod request_ledger;
pub mod time_provider;
pub mod vendor_directory;

// Re-exports
pub use id_provider::IdProvider;
pub use job_store::JobStore;
pub use notification_gateway::NotificationGateway;
pub use request_ledger::{InsertOutcome, NewRequest, RequestLedger};
pub use time_provider::TimeProvider;
pub use vendor_directory::VendorDirectory;
