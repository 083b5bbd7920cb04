// Composite Notification Gateway
//
// write_in_app persists an inbox row in the shared SQLite database;
// send_push publishes on the realtime bus. Both are best-effort and
// independently fallible, exactly as the fan-out layer expects.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::SqlitePool;
use tracing::debug;

use vendormatch_core::domain::{OfferPayload, VendorId};
use vendormatch_core::error::{AppError, Result};
use vendormatch_core::port::{IdProvider, NotificationGateway, TimeProvider};

use crate::hub::{NotificationHub, PushEvent};

pub struct CompositeGateway {
    pool: SqlitePool,
    hub: NotificationHub,
    id_provider: Arc<dyn IdProvider>,
    time_provider: Arc<dyn TimeProvider>,
}

impl CompositeGateway {
    pub fn new(
        pool: SqlitePool,
        hub: NotificationHub,
        id_provider: Arc<dyn IdProvider>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            pool,
            hub,
            id_provider,
            time_provider,
        }
    }
}

#[async_trait]
impl NotificationGateway for CompositeGateway {
    async fn write_in_app(&self, vendor_id: &VendorId, offer: &OfferPayload) -> Result<()> {
        let payload_json = serde_json::to_string(offer)?;
        let title = "New job offer".to_string();
        let body = format!("{} at {}", offer.service_name, offer.address);

        sqlx::query(
            r#"
            INSERT INTO in_app_notifications (id, vendor_id, job_id, title, body, payload, is_read, created_at)
            VALUES (?, ?, ?, ?, ?, ?, 0, ?)
            "#,
        )
        .bind(self.id_provider.generate_id())
        .bind(vendor_id)
        .bind(&offer.job_id)
        .bind(&title)
        .bind(&body)
        .bind(&payload_json)
        .bind(self.time_provider.now_millis())
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(())
    }

    async fn send_push(&self, vendor_id: &VendorId, offer: &OfferPayload) -> Result<()> {
        let event = PushEvent {
            vendor_id: vendor_id.clone(),
            offer: offer.clone(),
        };
        match self.hub.publish(event) {
            Ok(receivers) => {
                debug!(vendor_id = %vendor_id, receivers, "Push event published");
                Ok(())
            }
            Err(_) => Err(AppError::Notification(format!(
                "No realtime subscribers for push to {}",
                vendor_id
            ))),
        }
    }
}
