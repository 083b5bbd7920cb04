// Job Domain Model

use serde::{Deserialize, Serialize};

use crate::domain::vendor::VendorId;

/// Job ID (UUID v4)
pub type JobId = String;

/// Job lifecycle states visible to the dispatcher
///
/// Only SEARCHING jobs are scanned; the other states exist so the external
/// acceptance/cancellation flows have somewhere to land.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Searching,
    Assigned,
    NoProvider,
    Cancelled,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Searching => write!(f, "SEARCHING"),
            JobStatus::Assigned => write!(f, "ASSIGNED"),
            JobStatus::NoProvider => write!(f, "NO_PROVIDER"),
            JobStatus::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

/// One pre-ranked candidate vendor for a job
///
/// Insertion order IS the ranking order (nearest first). The list is
/// immutable after job creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub vendor_id: VendorId,
    pub distance_km: Option<f64>,
}

/// Job Entity
///
/// The dispatcher mutates only the wave fields (`current_wave`,
/// `wave_started_at`, `notified_vendor_ids`); everything else belongs to the
/// external booking flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub status: JobStatus,

    /// Ranked candidate pool, nearest first. Never reordered.
    pub candidates: Vec<Candidate>,

    /// 1-based wave index. Strictly monotonically increasing.
    pub current_wave: i32,
    /// Epoch ms when the current wave began. None until wave 1 is seeded.
    pub wave_started_at: Option<i64>,
    /// Every vendor ever notified for this job. Grows, never shrinks.
    pub notified_vendor_ids: Vec<VendorId>,

    // Offer summary carried into notification payloads
    pub service_name: String,
    pub customer_name: String,
    pub scheduled_at: i64,
    pub address: String,
    pub quoted_price: Option<f64>,

    pub created_at: i64,
}

/// Per-vendor notification payload assembled at fan-out time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfferPayload {
    pub job_id: JobId,
    pub service_name: String,
    pub customer_name: String,
    pub scheduled_at: i64,
    pub address: String,
    pub quoted_price: Option<f64>,
    pub distance_km: Option<f64>,
}

impl Job {
    /// Create a new job in SEARCHING state with wave 1 not yet seeded
    ///
    /// # Arguments
    ///
    /// * `id` - Unique job ID (injected, not generated)
    /// * `created_at` - Creation timestamp in epoch ms (injected, not system time)
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: impl Into<String>,
        created_at: i64,
        service_name: impl Into<String>,
        customer_name: impl Into<String>,
        scheduled_at: i64,
        address: impl Into<String>,
        quoted_price: Option<f64>,
        candidates: Vec<Candidate>,
    ) -> Self {
        Self {
            id: id.into(),
            status: JobStatus::Searching,
            candidates,
            current_wave: 1,
            wave_started_at: None,
            notified_vendor_ids: Vec::new(),
            service_name: service_name.into(),
            customer_name: customer_name.into(),
            scheduled_at,
            address: address.into(),
            quoted_price,
            created_at,
        }
    }

    /// True when the periodic scan should consider this job at all
    pub fn is_searchable(&self) -> bool {
        self.status == JobStatus::Searching
            && self.wave_started_at.is_some()
            && !self.candidates.is_empty()
    }

    pub fn has_notified(&self, vendor_id: &str) -> bool {
        self.notified_vendor_ids.iter().any(|v| v == vendor_id)
    }

    /// Union new vendor ids into the notified set, preserving order and
    /// dropping duplicates (the set only ever grows).
    pub fn union_notified(&mut self, vendor_ids: &[VendorId]) {
        for id in vendor_ids {
            if !self.has_notified(id) {
                self.notified_vendor_ids.push(id.clone());
            }
        }
    }

    /// Ranked distance for a vendor, if it is in the candidate pool
    pub fn distance_to(&self, vendor_id: &str) -> Option<f64> {
        self.candidates
            .iter()
            .find(|c| c.vendor_id == vendor_id)
            .and_then(|c| c.distance_km)
    }

    /// Assemble the notification payload for one candidate vendor
    pub fn offer_for(&self, vendor_id: &str) -> OfferPayload {
        OfferPayload {
            job_id: self.id.clone(),
            service_name: self.service_name.clone(),
            customer_name: self.customer_name.clone(),
            scheduled_at: self.scheduled_at,
            address: self.address.clone(),
            quoted_price: self.quoted_price,
            distance_km: self.distance_to(vendor_id),
        }
    }
}
