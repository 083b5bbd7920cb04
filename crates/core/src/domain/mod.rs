// Domain Layer - Pure dispatch entities and rules

pub mod error;
pub mod job;
pub mod request;
pub mod vendor;
pub mod wave;

// Re-exports
pub use error::DomainError;
pub use job::{Candidate, Job, JobId, JobStatus, OfferPayload};
pub use request::{DeliveryChannel, DispatchRequest, RequestStatus};
pub use vendor::{Availability, Vendor, VendorId};
pub use wave::{WavePolicy, WaveTier};
