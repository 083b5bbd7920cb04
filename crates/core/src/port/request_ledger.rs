// Request Ledger Port (Interface)
//
// One record per (job, vendor) dispatch attempt. The compound uniqueness on
// that pair is the sole concurrency safeguard against duplicate-request
// races - a conflicting insert is an expected outcome, never an error.

use crate::domain::{DeliveryChannel, DispatchRequest, JobId, VendorId};
use crate::error::Result;
use async_trait::async_trait;

/// Outcome of an idempotent insert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Created,
    AlreadyExists,
}

/// Parameters for creating a PENDING request
#[derive(Debug, Clone)]
pub struct NewRequest {
    pub job_id: JobId,
    pub vendor_id: VendorId,
    pub wave: i32,
    pub distance_km: Option<f64>,
    pub sent_at: i64,
    pub expires_at: i64,
}

#[async_trait]
pub trait RequestLedger: Send + Sync {
    /// Idempotent insert keyed on (job_id, vendor_id). A duplicate returns
    /// `AlreadyExists` - it must never surface as a fatal error.
    async fn create_if_absent(&self, request: NewRequest) -> Result<InsertOutcome>;

    async fn find(&self, job_id: &JobId, vendor_id: &VendorId)
        -> Result<Option<DispatchRequest>>;

    /// All requests for one job, in sent order (for auditing and tests)
    async fn find_for_job(&self, job_id: &JobId) -> Result<Vec<DispatchRequest>>;

    /// Update the advisory delivery flag for one channel after fan-out
    async fn record_delivery(
        &self,
        job_id: &JobId,
        vendor_id: &VendorId,
        channel: DeliveryChannel,
        delivered: bool,
    ) -> Result<()>;

    // --- transitions driven by the external acceptance flow ---

    async fn mark_viewed(&self, job_id: &JobId, vendor_id: &VendorId, now_millis: i64)
        -> Result<()>;

    /// Accept or reject a pending/viewed request
    async fn respond(
        &self,
        job_id: &JobId,
        vendor_id: &VendorId,
        accepted: bool,
        now_millis: i64,
    ) -> Result<()>;

    /// Cancel every open request for a job (job cancelled externally).
    /// Returns the number of requests cancelled.
    async fn cancel_for_job(&self, job_id: &JobId, now_millis: i64) -> Result<u64>;

    // --- TTL sweep ---

    /// Mark overdue PENDING/VIEWED requests EXPIRED. Returns count.
    async fn expire_overdue(&self, now_millis: i64) -> Result<u64>;

    /// Delete EXPIRED requests whose horizon passed before `cutoff_millis`.
    /// Returns count.
    async fn purge_expired_before(&self, cutoff_millis: i64) -> Result<u64>;
}

// ============================================================================
// Mock Implementation for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::error::AppError;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory ledger keyed on (job_id, vendor_id)
    pub struct MockRequestLedger {
        requests: Mutex<HashMap<(JobId, VendorId), DispatchRequest>>,
    }

    impl MockRequestLedger {
        pub fn new() -> Self {
            Self {
                requests: Mutex::new(HashMap::new()),
            }
        }

        pub fn count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    impl Default for MockRequestLedger {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl RequestLedger for MockRequestLedger {
        async fn create_if_absent(&self, request: NewRequest) -> Result<InsertOutcome> {
            let mut map = self.requests.lock().unwrap();
            let key = (request.job_id.clone(), request.vendor_id.clone());
            if map.contains_key(&key) {
                return Ok(InsertOutcome::AlreadyExists);
            }
            map.insert(
                key,
                DispatchRequest::new(
                    request.job_id,
                    request.vendor_id,
                    request.wave,
                    request.distance_km,
                    request.sent_at,
                    request.expires_at,
                ),
            );
            Ok(InsertOutcome::Created)
        }

        async fn find(
            &self,
            job_id: &JobId,
            vendor_id: &VendorId,
        ) -> Result<Option<DispatchRequest>> {
            let map = self.requests.lock().unwrap();
            Ok(map.get(&(job_id.clone(), vendor_id.clone())).cloned())
        }

        async fn find_for_job(&self, job_id: &JobId) -> Result<Vec<DispatchRequest>> {
            let map = self.requests.lock().unwrap();
            let mut out: Vec<DispatchRequest> = map
                .values()
                .filter(|r| &r.job_id == job_id)
                .cloned()
                .collect();
            out.sort_by_key(|r| (r.sent_at, r.vendor_id.clone()));
            Ok(out)
        }

        async fn record_delivery(
            &self,
            job_id: &JobId,
            vendor_id: &VendorId,
            channel: DeliveryChannel,
            delivered: bool,
        ) -> Result<()> {
            let mut map = self.requests.lock().unwrap();
            if let Some(r) = map.get_mut(&(job_id.clone(), vendor_id.clone())) {
                match channel {
                    DeliveryChannel::InApp => r.in_app_delivered = delivered,
                    DeliveryChannel::Push => r.push_delivered = delivered,
                }
            }
            Ok(())
        }

        async fn mark_viewed(
            &self,
            job_id: &JobId,
            vendor_id: &VendorId,
            now_millis: i64,
        ) -> Result<()> {
            let mut map = self.requests.lock().unwrap();
            let r = map
                .get_mut(&(job_id.clone(), vendor_id.clone()))
                .ok_or_else(|| AppError::NotFound(format!("request {}/{}", job_id, vendor_id)))?;
            r.mark_viewed(now_millis)?;
            Ok(())
        }

        async fn respond(
            &self,
            job_id: &JobId,
            vendor_id: &VendorId,
            accepted: bool,
            now_millis: i64,
        ) -> Result<()> {
            let mut map = self.requests.lock().unwrap();
            let r = map
                .get_mut(&(job_id.clone(), vendor_id.clone()))
                .ok_or_else(|| AppError::NotFound(format!("request {}/{}", job_id, vendor_id)))?;
            if accepted {
                r.accept(now_millis)?;
            } else {
                r.reject(now_millis)?;
            }
            Ok(())
        }

        async fn cancel_for_job(&self, job_id: &JobId, now_millis: i64) -> Result<u64> {
            let mut map = self.requests.lock().unwrap();
            let mut cancelled = 0;
            for r in map.values_mut().filter(|r| &r.job_id == job_id) {
                if r.cancel(now_millis).is_ok() {
                    cancelled += 1;
                }
            }
            Ok(cancelled)
        }

        async fn expire_overdue(&self, now_millis: i64) -> Result<u64> {
            let mut map = self.requests.lock().unwrap();
            let mut expired = 0;
            for r in map.values_mut() {
                if r.is_overdue(now_millis) && r.expire(now_millis).is_ok() {
                    expired += 1;
                }
            }
            Ok(expired)
        }

        async fn purge_expired_before(&self, cutoff_millis: i64) -> Result<u64> {
            let mut map = self.requests.lock().unwrap();
            let before = map.len();
            map.retain(|_, r| {
                !(r.status == crate::domain::RequestStatus::Expired
                    && r.expires_at < cutoff_millis)
            });
            Ok((before - map.len()) as u64)
        }
    }
}
