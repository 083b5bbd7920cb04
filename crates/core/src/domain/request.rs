// Dispatch Request Domain Model
//
// One record per (job, vendor) notification attempt. The dispatcher only
// ever creates these; vendors (via the external acceptance flow) and the TTL
// sweeper move them forward.

use serde::{Deserialize, Serialize};

use crate::domain::error::{DomainError, Result};
use crate::domain::job::JobId;
use crate::domain::vendor::VendorId;

/// Request lifecycle states
///
/// PENDING -> VIEWED -> ACCEPTED | REJECTED
/// PENDING -> ACCEPTED | REJECTED        (viewing is optional)
/// PENDING | VIEWED -> EXPIRED           (passive, TTL-based)
/// PENDING | VIEWED -> CANCELLED         (job cancelled externally)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestStatus {
    Pending,
    Viewed,
    Accepted,
    Rejected,
    Expired,
    Cancelled,
}

impl RequestStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RequestStatus::Accepted
                | RequestStatus::Rejected
                | RequestStatus::Expired
                | RequestStatus::Cancelled
        )
    }
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestStatus::Pending => write!(f, "PENDING"),
            RequestStatus::Viewed => write!(f, "VIEWED"),
            RequestStatus::Accepted => write!(f, "ACCEPTED"),
            RequestStatus::Rejected => write!(f, "REJECTED"),
            RequestStatus::Expired => write!(f, "EXPIRED"),
            RequestStatus::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

/// Notification delivery channels (advisory flags, not part of the
/// correctness state machine)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryChannel {
    InApp,
    Push,
}

/// Dispatch Request Entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchRequest {
    pub job_id: JobId,
    pub vendor_id: VendorId,
    pub status: RequestStatus,

    /// Wave index this request was issued in
    pub wave: i32,
    pub distance_km: Option<f64>,

    pub sent_at: i64,
    pub viewed_at: Option<i64>,
    pub responded_at: Option<i64>,
    /// Hard validity horizon (hours). Wave duration governs dispatcher
    /// escalation only, never request validity.
    pub expires_at: i64,

    // Advisory delivery flags
    pub push_delivered: bool,
    pub in_app_delivered: bool,
}

impl DispatchRequest {
    /// Create a PENDING request at dispatch time
    pub fn new(
        job_id: impl Into<String>,
        vendor_id: impl Into<String>,
        wave: i32,
        distance_km: Option<f64>,
        sent_at: i64,
        expires_at: i64,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            vendor_id: vendor_id.into(),
            status: RequestStatus::Pending,
            wave,
            distance_km,
            sent_at,
            viewed_at: None,
            responded_at: None,
            expires_at,
            push_delivered: false,
            in_app_delivered: false,
        }
    }

    fn guard(&self, allowed: &[RequestStatus], to: RequestStatus) -> Result<()> {
        if allowed.contains(&self.status) {
            Ok(())
        } else {
            Err(DomainError::InvalidStateTransition {
                from: self.status.to_string(),
                to: to.to_string(),
            })
        }
    }

    /// Vendor opened the offer (optional step)
    pub fn mark_viewed(&mut self, now_millis: i64) -> Result<()> {
        self.guard(&[RequestStatus::Pending], RequestStatus::Viewed)?;
        self.status = RequestStatus::Viewed;
        self.viewed_at = Some(now_millis);
        Ok(())
    }

    pub fn accept(&mut self, now_millis: i64) -> Result<()> {
        self.guard(
            &[RequestStatus::Pending, RequestStatus::Viewed],
            RequestStatus::Accepted,
        )?;
        self.status = RequestStatus::Accepted;
        self.responded_at = Some(now_millis);
        Ok(())
    }

    pub fn reject(&mut self, now_millis: i64) -> Result<()> {
        self.guard(
            &[RequestStatus::Pending, RequestStatus::Viewed],
            RequestStatus::Rejected,
        )?;
        self.status = RequestStatus::Rejected;
        self.responded_at = Some(now_millis);
        Ok(())
    }

    /// Passive TTL expiry
    pub fn expire(&mut self, now_millis: i64) -> Result<()> {
        self.guard(
            &[RequestStatus::Pending, RequestStatus::Viewed],
            RequestStatus::Expired,
        )?;
        self.status = RequestStatus::Expired;
        self.responded_at = Some(now_millis);
        Ok(())
    }

    pub fn cancel(&mut self, now_millis: i64) -> Result<()> {
        self.guard(
            &[RequestStatus::Pending, RequestStatus::Viewed],
            RequestStatus::Cancelled,
        )?;
        self.status = RequestStatus::Cancelled;
        self.responded_at = Some(now_millis);
        Ok(())
    }

    pub fn is_overdue(&self, now_millis: i64) -> bool {
        !self.status.is_terminal() && now_millis >= self.expires_at
    }
}
