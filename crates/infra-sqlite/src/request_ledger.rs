// SQLite RequestLedger Implementation
//
// The PRIMARY KEY (job_id, vendor_id) is the uniqueness constraint the whole
// dispatch engine leans on: `create_if_absent` turns a conflict into an
// explicit AlreadyExists outcome instead of a storage error.

use async_trait::async_trait;
use sqlx::SqlitePool;

use vendormatch_core::domain::{DeliveryChannel, DispatchRequest, JobId, RequestStatus, VendorId};
use vendormatch_core::error::{AppError, Result};
use vendormatch_core::port::{InsertOutcome, NewRequest, RequestLedger};

use crate::error::map_sqlx_error;

pub struct SqliteRequestLedger {
    pool: SqlitePool,
}

impl SqliteRequestLedger {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Shared conditional transition: only PENDING/VIEWED rows move, so two
    /// writers cannot both land a terminal state.
    async fn transition(
        &self,
        job_id: &JobId,
        vendor_id: &VendorId,
        to: RequestStatus,
        now_millis: i64,
    ) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE dispatch_requests
            SET status = ?, responded_at = ?
            WHERE job_id = ? AND vendor_id = ?
              AND status IN ('PENDING', 'VIEWED')
            "#,
        )
        .bind(to.to_string())
        .bind(now_millis)
        .bind(job_id)
        .bind(vendor_id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            // Row missing, or already terminal - tell the caller which
            let current: Option<String> = sqlx::query_scalar(
                "SELECT status FROM dispatch_requests WHERE job_id = ? AND vendor_id = ?",
            )
            .bind(job_id)
            .bind(vendor_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

            return match current {
                None => Err(AppError::NotFound(format!(
                    "Request {}/{} not found",
                    job_id, vendor_id
                ))),
                Some(state) => Err(AppError::InvalidState(format!(
                    "Cannot move request {}/{} from {} to {}",
                    job_id, vendor_id, state, to
                ))),
            };
        }
        Ok(())
    }
}

#[async_trait]
impl RequestLedger for SqliteRequestLedger {
    async fn create_if_absent(&self, request: NewRequest) -> Result<InsertOutcome> {
        let result = sqlx::query(
            r#"
            INSERT INTO dispatch_requests (
                job_id, vendor_id, status, wave, distance_km, sent_at, expires_at
            ) VALUES (?, ?, 'PENDING', ?, ?, ?, ?)
            ON CONFLICT(job_id, vendor_id) DO NOTHING
            "#,
        )
        .bind(&request.job_id)
        .bind(&request.vendor_id)
        .bind(request.wave)
        .bind(request.distance_km)
        .bind(request.sent_at)
        .bind(request.expires_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 1 {
            Ok(InsertOutcome::Created)
        } else {
            Ok(InsertOutcome::AlreadyExists)
        }
    }

    async fn find(
        &self,
        job_id: &JobId,
        vendor_id: &VendorId,
    ) -> Result<Option<DispatchRequest>> {
        let row = sqlx::query_as::<_, RequestRow>(
            "SELECT * FROM dispatch_requests WHERE job_id = ? AND vendor_id = ?",
        )
        .bind(job_id)
        .bind(vendor_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        row.map(|r| r.into_request()).transpose()
    }

    async fn find_for_job(&self, job_id: &JobId) -> Result<Vec<DispatchRequest>> {
        let rows = sqlx::query_as::<_, RequestRow>(
            "SELECT * FROM dispatch_requests WHERE job_id = ? ORDER BY sent_at ASC, vendor_id ASC",
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(|r| r.into_request()).collect()
    }

    async fn record_delivery(
        &self,
        job_id: &JobId,
        vendor_id: &VendorId,
        channel: DeliveryChannel,
        delivered: bool,
    ) -> Result<()> {
        let column = match channel {
            DeliveryChannel::InApp => "in_app_delivered",
            DeliveryChannel::Push => "push_delivered",
        };
        // Column name comes from a closed enum, never from input
        let sql = format!(
            "UPDATE dispatch_requests SET {} = ? WHERE job_id = ? AND vendor_id = ?",
            column
        );
        sqlx::query(&sql)
            .bind(delivered)
            .bind(job_id)
            .bind(vendor_id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn mark_viewed(
        &self,
        job_id: &JobId,
        vendor_id: &VendorId,
        now_millis: i64,
    ) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE dispatch_requests
            SET status = 'VIEWED', viewed_at = ?
            WHERE job_id = ? AND vendor_id = ? AND status = 'PENDING'
            "#,
        )
        .bind(now_millis)
        .bind(job_id)
        .bind(vendor_id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            let exists: Option<String> = sqlx::query_scalar(
                "SELECT status FROM dispatch_requests WHERE job_id = ? AND vendor_id = ?",
            )
            .bind(job_id)
            .bind(vendor_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

            return match exists {
                None => Err(AppError::NotFound(format!(
                    "Request {}/{} not found",
                    job_id, vendor_id
                ))),
                Some(state) => Err(AppError::InvalidState(format!(
                    "Cannot view request {}/{} in state {}",
                    job_id, vendor_id, state
                ))),
            };
        }
        Ok(())
    }

    async fn respond(
        &self,
        job_id: &JobId,
        vendor_id: &VendorId,
        accepted: bool,
        now_millis: i64,
    ) -> Result<()> {
        let to = if accepted {
            RequestStatus::Accepted
        } else {
            RequestStatus::Rejected
        };
        self.transition(job_id, vendor_id, to, now_millis).await
    }

    async fn cancel_for_job(&self, job_id: &JobId, now_millis: i64) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE dispatch_requests
            SET status = 'CANCELLED', responded_at = ?
            WHERE job_id = ? AND status IN ('PENDING', 'VIEWED')
            "#,
        )
        .bind(now_millis)
        .bind(job_id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected())
    }

    async fn expire_overdue(&self, now_millis: i64) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE dispatch_requests
            SET status = 'EXPIRED', responded_at = ?
            WHERE status IN ('PENDING', 'VIEWED') AND expires_at <= ?
            "#,
        )
        .bind(now_millis)
        .bind(now_millis)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected())
    }

    async fn purge_expired_before(&self, cutoff_millis: i64) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM dispatch_requests WHERE status = 'EXPIRED' AND expires_at < ?",
        )
        .bind(cutoff_millis)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected())
    }
}

#[derive(sqlx::FromRow)]
struct RequestRow {
    job_id: String,
    vendor_id: String,
    status: String,
    wave: i32,
    distance_km: Option<f64>,
    sent_at: i64,
    viewed_at: Option<i64>,
    responded_at: Option<i64>,
    expires_at: i64,
    push_delivered: bool,
    in_app_delivered: bool,
}

impl RequestRow {
    fn into_request(self) -> Result<DispatchRequest> {
        let status = match self.status.as_str() {
            "PENDING" => RequestStatus::Pending,
            "VIEWED" => RequestStatus::Viewed,
            "ACCEPTED" => RequestStatus::Accepted,
            "REJECTED" => RequestStatus::Rejected,
            "EXPIRED" => RequestStatus::Expired,
            "CANCELLED" => RequestStatus::Cancelled,
            other => {
                return Err(AppError::Database(format!(
                    "Unknown request status in row: {}",
                    other
                )))
            }
        };
        Ok(DispatchRequest {
            job_id: self.job_id,
            vendor_id: self.vendor_id,
            status,
            wave: self.wave,
            distance_km: self.distance_km,
            sent_at: self.sent_at,
            viewed_at: self.viewed_at,
            responded_at: self.responded_at,
            expires_at: self.expires_at,
            push_delivered: self.push_delivered,
            in_app_delivered: self.in_app_delivered,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::create_pool;
    use crate::migration::run_migrations;

    async fn ledger() -> SqliteRequestLedger {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        SqliteRequestLedger::new(pool)
    }

    fn new_request(job: &str, vendor: &str) -> NewRequest {
        NewRequest {
            job_id: job.to_string(),
            vendor_id: vendor.to_string(),
            wave: 2,
            distance_km: Some(4.2),
            sent_at: 1_000,
            expires_at: 1_000 + 21_600_000,
        }
    }

    #[tokio::test]
    async fn test_create_if_absent_tri_state() {
        let ledger = ledger().await;

        let first = ledger.create_if_absent(new_request("j1", "v1")).await.unwrap();
        assert_eq!(first, InsertOutcome::Created);

        // Same pair again: swallowed, not an error
        let second = ledger.create_if_absent(new_request("j1", "v1")).await.unwrap();
        assert_eq!(second, InsertOutcome::AlreadyExists);

        // Different vendor, same job: fine
        let third = ledger.create_if_absent(new_request("j1", "v2")).await.unwrap();
        assert_eq!(third, InsertOutcome::Created);

        let all = ledger.find_for_job(&"j1".to_string()).await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn test_view_then_accept() {
        let ledger = ledger().await;
        ledger.create_if_absent(new_request("j1", "v1")).await.unwrap();

        ledger
            .mark_viewed(&"j1".to_string(), &"v1".to_string(), 2_000)
            .await
            .unwrap();
        ledger
            .respond(&"j1".to_string(), &"v1".to_string(), true, 3_000)
            .await
            .unwrap();

        let r = ledger
            .find(&"j1".to_string(), &"v1".to_string())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(r.status, RequestStatus::Accepted);
        assert_eq!(r.viewed_at, Some(2_000));
        assert_eq!(r.responded_at, Some(3_000));
    }

    #[tokio::test]
    async fn test_respond_on_terminal_is_invalid_state() {
        let ledger = ledger().await;
        ledger.create_if_absent(new_request("j1", "v1")).await.unwrap();
        ledger
            .respond(&"j1".to_string(), &"v1".to_string(), false, 2_000)
            .await
            .unwrap();

        let err = ledger
            .respond(&"j1".to_string(), &"v1".to_string(), true, 3_000)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_respond_unknown_request_is_not_found() {
        let ledger = ledger().await;
        let err = ledger
            .respond(&"j1".to_string(), &"nope".to_string(), true, 1_000)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_cancel_for_job_leaves_terminal_rows() {
        let ledger = ledger().await;
        ledger.create_if_absent(new_request("j1", "v1")).await.unwrap();
        ledger.create_if_absent(new_request("j1", "v2")).await.unwrap();
        ledger.create_if_absent(new_request("j2", "v1")).await.unwrap();
        ledger
            .respond(&"j1".to_string(), &"v1".to_string(), false, 2_000)
            .await
            .unwrap();

        let cancelled = ledger.cancel_for_job(&"j1".to_string(), 3_000).await.unwrap();
        assert_eq!(cancelled, 1); // v2 only; v1 already rejected

        let v1 = ledger
            .find(&"j1".to_string(), &"v1".to_string())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(v1.status, RequestStatus::Rejected);
        let other_job = ledger
            .find(&"j2".to_string(), &"v1".to_string())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(other_job.status, RequestStatus::Pending);
    }

    #[tokio::test]
    async fn test_expire_and_purge() {
        let ledger = ledger().await;
        let mut overdue = new_request("j1", "v1");
        overdue.expires_at = 5_000;
        ledger.create_if_absent(overdue).await.unwrap();
        ledger.create_if_absent(new_request("j1", "v2")).await.unwrap();

        let expired = ledger.expire_overdue(10_000).await.unwrap();
        assert_eq!(expired, 1);

        let r = ledger
            .find(&"j1".to_string(), &"v1".to_string())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(r.status, RequestStatus::Expired);

        let purged = ledger.purge_expired_before(6_000).await.unwrap();
        assert_eq!(purged, 1);
        assert!(ledger
            .find(&"j1".to_string(), &"v1".to_string())
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_record_delivery_flags() {
        let ledger = ledger().await;
        ledger.create_if_absent(new_request("j1", "v1")).await.unwrap();

        ledger
            .record_delivery(
                &"j1".to_string(),
                &"v1".to_string(),
                DeliveryChannel::InApp,
                true,
            )
            .await
            .unwrap();
        ledger
            .record_delivery(
                &"j1".to_string(),
                &"v1".to_string(),
                DeliveryChannel::Push,
                false,
            )
            .await
            .unwrap();

        let r = ledger
            .find(&"j1".to_string(), &"v1".to_string())
            .await
            .unwrap()
            .unwrap();
        assert!(r.in_app_delivered);
        assert!(!r.push_delivered);
        // Flags are advisory: status untouched
        assert_eq!(r.status, RequestStatus::Pending);
    }
}
