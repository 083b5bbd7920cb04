// SQLite JobStore Implementation

use async_trait::async_trait;
use sqlx::SqlitePool;
use tracing::debug;

use vendormatch_core::domain::{Candidate, Job, JobId, JobStatus, VendorId};
use vendormatch_core::error::{AppError, Result};
use vendormatch_core::port::JobStore;

use crate::error::map_sqlx_error;

pub struct SqliteJobStore {
    pool: SqlitePool,
}

impl SqliteJobStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a job (used by the external booking flow and tests)
    pub async fn insert(&self, job: &Job) -> Result<()> {
        let candidates_json = serde_json::to_string(&job.candidates)?;
        let notified_json = serde_json::to_string(&job.notified_vendor_ids)?;

        sqlx::query(
            r#"
            INSERT INTO jobs (
                id, status, service_name, customer_name, scheduled_at, address,
                quoted_price, candidates, current_wave, wave_started_at,
                notified_vendor_ids, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&job.id)
        .bind(job.status.to_string())
        .bind(&job.service_name)
        .bind(&job.customer_name)
        .bind(job.scheduled_at)
        .bind(&job.address)
        .bind(job.quoted_price)
        .bind(&candidates_json)
        .bind(job.current_wave)
        .bind(job.wave_started_at)
        .bind(&notified_json)
        .bind(job.created_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    pub async fn find_by_id(&self, id: &JobId) -> Result<Option<Job>> {
        let row = sqlx::query_as::<_, JobRow>("SELECT * FROM jobs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        row.map(|r| r.into_job()).transpose()
    }

    /// Status change from the external acceptance/cancellation flow
    pub async fn update_status(&self, id: &JobId, status: JobStatus) -> Result<()> {
        let result = sqlx::query("UPDATE jobs SET status = ? WHERE id = ?")
            .bind(status.to_string())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Job {} not found", id)));
        }
        Ok(())
    }
}

#[async_trait]
impl JobStore for SqliteJobStore {
    async fn find_searchable(&self) -> Result<Vec<Job>> {
        let rows = sqlx::query_as::<_, JobRow>(
            r#"
            SELECT * FROM jobs
            WHERE status = 'SEARCHING'
              AND wave_started_at IS NOT NULL
              AND candidates <> '[]'
            ORDER BY created_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(|r| r.into_job()).collect()
    }

    async fn record_wave_advance(
        &self,
        job_id: &JobId,
        new_wave: i32,
        wave_started_at: i64,
        added_vendor_ids: &[VendorId],
    ) -> Result<()> {
        // Read-merge-write on the notified set; the monotonic wave guard on
        // the UPDATE makes a stale advance from an overlapping tick a no-op
        let current = self
            .find_by_id(job_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Job {} not found", job_id)))?;

        let mut merged = current;
        merged.union_notified(added_vendor_ids);
        let notified_json = serde_json::to_string(&merged.notified_vendor_ids)?;

        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET current_wave = ?, wave_started_at = ?, notified_vendor_ids = ?
            WHERE id = ? AND status = 'SEARCHING' AND current_wave < ?
            "#,
        )
        .bind(new_wave)
        .bind(wave_started_at)
        .bind(&notified_json)
        .bind(job_id)
        .bind(new_wave)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            // Lost the race to a concurrent advance (or the job left
            // SEARCHING mid-tick); expected, not an error
            debug!(job_id = %job_id, new_wave, "Wave advance dropped (stale or job no longer searching)");
        }
        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct JobRow {
    id: String,
    status: String,
    service_name: String,
    customer_name: String,
    scheduled_at: i64,
    address: String,
    quoted_price: Option<f64>,
    candidates: String,
    current_wave: i32,
    wave_started_at: Option<i64>,
    notified_vendor_ids: String,
    created_at: i64,
}

impl JobRow {
    fn into_job(self) -> Result<Job> {
        let status = match self.status.as_str() {
            "SEARCHING" => JobStatus::Searching,
            "ASSIGNED" => JobStatus::Assigned,
            "NO_PROVIDER" => JobStatus::NoProvider,
            "CANCELLED" => JobStatus::Cancelled,
            other => {
                return Err(AppError::Database(format!(
                    "Unknown job status in row: {}",
                    other
                )))
            }
        };
        let candidates: Vec<Candidate> = serde_json::from_str(&self.candidates)?;
        let notified_vendor_ids: Vec<VendorId> = serde_json::from_str(&self.notified_vendor_ids)?;

        Ok(Job {
            id: self.id,
            status,
            candidates,
            current_wave: self.current_wave,
            wave_started_at: self.wave_started_at,
            notified_vendor_ids,
            service_name: self.service_name,
            customer_name: self.customer_name,
            scheduled_at: self.scheduled_at,
            address: self.address,
            quoted_price: self.quoted_price,
            created_at: self.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::create_pool;
    use crate::migration::run_migrations;

    async fn store() -> SqliteJobStore {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        SqliteJobStore::new(pool)
    }

    fn job(id: &str, n_candidates: usize) -> Job {
        let mut j = Job::new(
            id,
            1_000,
            "Salon at Home",
            "D. Customer",
            5_000,
            "2 Pine Ct",
            Some(1_200.0),
            (0..n_candidates)
                .map(|i| Candidate {
                    vendor_id: format!("v{}", i),
                    distance_km: Some(i as f64 * 1.5),
                })
                .collect(),
        );
        j.wave_started_at = Some(1_000);
        j
    }

    #[tokio::test]
    async fn test_insert_and_roundtrip() {
        let store = store().await;
        let j = job("job-1", 5);
        store.insert(&j).await.unwrap();

        let loaded = store.find_by_id(&"job-1".to_string()).await.unwrap().unwrap();
        assert_eq!(loaded.status, JobStatus::Searching);
        assert_eq!(loaded.candidates, j.candidates);
        assert_eq!(loaded.current_wave, 1);
        assert!(loaded.notified_vendor_ids.is_empty());
    }

    #[tokio::test]
    async fn test_find_searchable_filters() {
        let store = store().await;
        store.insert(&job("searching", 3)).await.unwrap();

        let mut unseeded = job("unseeded", 3);
        unseeded.wave_started_at = None;
        store.insert(&unseeded).await.unwrap();

        let mut no_pool = job("no-pool", 0);
        no_pool.wave_started_at = Some(1_000);
        store.insert(&no_pool).await.unwrap();

        let mut assigned = job("assigned", 3);
        assigned.status = JobStatus::Assigned;
        store.insert(&assigned).await.unwrap();

        let found = store.find_searchable().await.unwrap();
        let ids: Vec<&str> = found.iter().map(|j| j.id.as_str()).collect();
        assert_eq!(ids, vec!["searching"]);
    }

    #[tokio::test]
    async fn test_record_wave_advance_unions_and_bumps() {
        let store = store().await;
        store.insert(&job("job-1", 5)).await.unwrap();

        store
            .record_wave_advance(
                &"job-1".to_string(),
                2,
                9_000,
                &["v0".to_string(), "v1".to_string()],
            )
            .await
            .unwrap();

        let j = store.find_by_id(&"job-1".to_string()).await.unwrap().unwrap();
        assert_eq!(j.current_wave, 2);
        assert_eq!(j.wave_started_at, Some(9_000));
        assert_eq!(j.notified_vendor_ids, vec!["v0", "v1"]);
    }

    #[tokio::test]
    async fn test_stale_wave_advance_is_dropped() {
        let store = store().await;
        store.insert(&job("job-1", 5)).await.unwrap();

        store
            .record_wave_advance(&"job-1".to_string(), 3, 20_000, &["v2".to_string()])
            .await
            .unwrap();
        // Stale advance to wave 2 arrives late from an overlapping tick
        store
            .record_wave_advance(&"job-1".to_string(), 2, 15_000, &["v1".to_string()])
            .await
            .unwrap();

        let j = store.find_by_id(&"job-1".to_string()).await.unwrap().unwrap();
        assert_eq!(j.current_wave, 3);
        assert_eq!(j.wave_started_at, Some(20_000));
    }

    #[tokio::test]
    async fn test_advance_after_assignment_is_dropped() {
        let store = store().await;
        store.insert(&job("job-1", 5)).await.unwrap();
        store
            .update_status(&"job-1".to_string(), JobStatus::Assigned)
            .await
            .unwrap();

        store
            .record_wave_advance(&"job-1".to_string(), 2, 9_000, &[])
            .await
            .unwrap();

        let j = store.find_by_id(&"job-1".to_string()).await.unwrap().unwrap();
        assert_eq!(j.current_wave, 1);
        assert_eq!(j.status, JobStatus::Assigned);
    }
}
