// Job Store Port (Interface)

use crate::domain::{Job, JobId, VendorId};
use crate::error::Result;
use async_trait::async_trait;

/// Persistence interface for the job side of dispatch
///
/// The dispatcher owns exactly two operations: scanning for in-flight jobs
/// and recording a wave advance. Everything else about a job belongs to the
/// external booking flow.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// All jobs eligible for escalation: status SEARCHING, wave already
    /// seeded (`wave_started_at` set) and a non-empty candidate pool.
    async fn find_searchable(&self) -> Result<Vec<Job>>;

    /// Persist one wave advance: bump `current_wave`, reset
    /// `wave_started_at` and union the newly-notified vendor ids.
    ///
    /// Implementations must keep waves monotonic - a stale advance (from an
    /// overlapping tick) is dropped silently, never an error.
    async fn record_wave_advance(
        &self,
        job_id: &JobId,
        new_wave: i32,
        wave_started_at: i64,
        added_vendor_ids: &[VendorId],
    ) -> Result<()>;
}

// ============================================================================
// Mock Implementation for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::error::AppError;
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;

    /// In-memory JobStore for dispatcher tests
    pub struct MockJobStore {
        jobs: Mutex<HashMap<JobId, Job>>,
        /// Job ids whose wave advance should fail with a store error
        fail_advance_for: Mutex<HashSet<JobId>>,
    }

    impl MockJobStore {
        pub fn new() -> Self {
            Self {
                jobs: Mutex::new(HashMap::new()),
                fail_advance_for: Mutex::new(HashSet::new()),
            }
        }

        pub fn insert(&self, job: Job) {
            self.jobs.lock().unwrap().insert(job.id.clone(), job);
        }

        pub fn get(&self, id: &str) -> Option<Job> {
            self.jobs.lock().unwrap().get(id).cloned()
        }

        pub fn fail_advance_for(&self, job_id: impl Into<String>) {
            self.fail_advance_for.lock().unwrap().insert(job_id.into());
        }
    }

    impl Default for MockJobStore {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl JobStore for MockJobStore {
        async fn find_searchable(&self) -> Result<Vec<Job>> {
            let jobs = self.jobs.lock().unwrap();
            Ok(jobs.values().filter(|j| j.is_searchable()).cloned().collect())
        }

        async fn record_wave_advance(
            &self,
            job_id: &JobId,
            new_wave: i32,
            wave_started_at: i64,
            added_vendor_ids: &[VendorId],
        ) -> Result<()> {
            if self.fail_advance_for.lock().unwrap().contains(job_id) {
                return Err(AppError::Database("injected store failure".to_string()));
            }
            let mut jobs = self.jobs.lock().unwrap();
            let job = jobs
                .get_mut(job_id)
                .ok_or_else(|| AppError::NotFound(format!("job {}", job_id)))?;
            // Monotonic guard, same contract as the SQLite adapter
            if new_wave > job.current_wave {
                job.current_wave = new_wave;
                job.wave_started_at = Some(wave_started_at);
            }
            job.union_notified(added_vendor_ids);
            Ok(())
        }
    }
}
