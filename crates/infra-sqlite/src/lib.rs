// Vendormatch SQLite Infrastructure
//
// sqlx-backed adapters for the JobStore, VendorDirectory and RequestLedger
// ports. The (job_id, vendor_id) UNIQUE constraint on dispatch_requests is
// the sole concurrency safeguard against duplicate-request races.

mod connection;
mod error;
mod job_store;
mod migration;
mod request_ledger;
mod vendor_directory;

pub use connection::create_pool;
pub use job_store::SqliteJobStore;
pub use migration::run_migrations;
pub use request_ledger::SqliteRequestLedger;
pub use vendor_directory::SqliteVendorDirectory;
