// SQLite VendorDirectory Implementation

use async_trait::async_trait;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use vendormatch_core::domain::{Vendor, VendorId};
use vendormatch_core::error::Result;
use vendormatch_core::port::VendorDirectory;

use crate::error::map_sqlx_error;

pub struct SqliteVendorDirectory {
    pool: SqlitePool,
}

impl SqliteVendorDirectory {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert or replace a vendor (presence updates come from outside the
    /// dispatch core)
    pub async fn upsert(&self, vendor: &Vendor) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO vendors (id, name, is_online, availability)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                is_online = excluded.is_online,
                availability = excluded.availability
            "#,
        )
        .bind(&vendor.id)
        .bind(&vendor.name)
        .bind(vendor.is_online)
        .bind(vendor.availability.to_string())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }
}

#[async_trait]
impl VendorDirectory for SqliteVendorDirectory {
    async fn filter_reachable(&self, vendor_ids: &[VendorId]) -> Result<Vec<VendorId>> {
        if vendor_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT id FROM vendors \
             WHERE is_online = 1 AND availability IN ('AVAILABLE', 'BUSY') AND id IN (",
        );
        let mut separated = builder.separated(", ");
        for id in vendor_ids {
            separated.push_bind(id);
        }
        separated.push_unseparated(")");

        let ids: Vec<VendorId> = builder
            .build_query_scalar()
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::create_pool;
    use crate::migration::run_migrations;
    use vendormatch_core::domain::Availability;

    async fn directory() -> SqliteVendorDirectory {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        SqliteVendorDirectory::new(pool)
    }

    fn vendor(id: &str, is_online: bool, availability: Availability) -> Vendor {
        Vendor {
            id: id.to_string(),
            name: format!("Vendor {}", id),
            is_online,
            availability,
        }
    }

    #[tokio::test]
    async fn test_filter_keeps_available_and_busy() {
        let dir = directory().await;
        dir.upsert(&vendor("v1", true, Availability::Available)).await.unwrap();
        dir.upsert(&vendor("v2", true, Availability::Busy)).await.unwrap();
        dir.upsert(&vendor("v3", true, Availability::Offline)).await.unwrap();
        dir.upsert(&vendor("v4", false, Availability::Available)).await.unwrap();

        let ids = vec![
            "v1".to_string(),
            "v2".to_string(),
            "v3".to_string(),
            "v4".to_string(),
            "unknown".to_string(),
        ];
        let mut reachable = dir.filter_reachable(&ids).await.unwrap();
        reachable.sort();
        assert_eq!(reachable, vec!["v1", "v2"]);
    }

    #[tokio::test]
    async fn test_empty_input_short_circuits() {
        let dir = directory().await;
        assert!(dir.filter_reachable(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_upsert_updates_presence() {
        let dir = directory().await;
        dir.upsert(&vendor("v1", false, Availability::Offline)).await.unwrap();
        assert!(dir
            .filter_reachable(&["v1".to_string()])
            .await
            .unwrap()
            .is_empty());

        // Vendor comes online between waves
        dir.upsert(&vendor("v1", true, Availability::Available)).await.unwrap();
        assert_eq!(
            dir.filter_reachable(&["v1".to_string()]).await.unwrap(),
            vec!["v1"]
        );
    }
}
