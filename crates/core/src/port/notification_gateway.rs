// Notification Gateway Port (Interface)

use crate::domain::{OfferPayload, VendorId};
use crate::error::Result;
use async_trait::async_trait;

/// Outbound delivery to vendors over two independent channels
///
/// Both channels are best-effort: either may fail for one vendor without
/// affecting other vendors or the job's wave state. Retry is an external
/// concern layered on the delivery-flag audit trail.
#[async_trait]
pub trait NotificationGateway: Send + Sync {
    /// Durable in-app notification write (vendor sees it on next open)
    async fn write_in_app(&self, vendor_id: &VendorId, offer: &OfferPayload) -> Result<()>;

    /// Realtime push/event delivery (vendor sees it immediately, if connected)
    async fn send_push(&self, vendor_id: &VendorId, offer: &OfferPayload) -> Result<()>;
}

// ============================================================================
// Mock Implementation for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::error::AppError;
    use std::collections::HashSet;
    use std::sync::Mutex;

    /// Recorded delivery for assertions
    #[derive(Debug, Clone, PartialEq)]
    pub struct SentNotification {
        pub vendor_id: VendorId,
        pub channel: &'static str,
        pub job_id: String,
    }

    /// Gateway mock that records deliveries and can fail per vendor/channel
    pub struct MockNotificationGateway {
        sent: Mutex<Vec<SentNotification>>,
        fail_push_for: Mutex<HashSet<VendorId>>,
        fail_in_app_for: Mutex<HashSet<VendorId>>,
    }

    impl MockNotificationGateway {
        pub fn new() -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
                fail_push_for: Mutex::new(HashSet::new()),
                fail_in_app_for: Mutex::new(HashSet::new()),
            }
        }

        pub fn fail_push_for(&self, vendor_id: impl Into<String>) {
            self.fail_push_for.lock().unwrap().insert(vendor_id.into());
        }

        pub fn fail_in_app_for(&self, vendor_id: impl Into<String>) {
            self.fail_in_app_for.lock().unwrap().insert(vendor_id.into());
        }

        pub fn sent(&self) -> Vec<SentNotification> {
            self.sent.lock().unwrap().clone()
        }

        /// Vendor ids that got at least one channel, in first-delivery order
        pub fn notified_vendors(&self) -> Vec<VendorId> {
            let mut seen = Vec::new();
            for s in self.sent.lock().unwrap().iter() {
                if !seen.contains(&s.vendor_id) {
                    seen.push(s.vendor_id.clone());
                }
            }
            seen
        }
    }

    impl Default for MockNotificationGateway {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl NotificationGateway for MockNotificationGateway {
        async fn write_in_app(&self, vendor_id: &VendorId, offer: &OfferPayload) -> Result<()> {
            if self.fail_in_app_for.lock().unwrap().contains(vendor_id) {
                return Err(AppError::Notification(format!(
                    "in-app write failed for {}",
                    vendor_id
                )));
            }
            self.sent.lock().unwrap().push(SentNotification {
                vendor_id: vendor_id.clone(),
                channel: "in_app",
                job_id: offer.job_id.clone(),
            });
            Ok(())
        }

        async fn send_push(&self, vendor_id: &VendorId, offer: &OfferPayload) -> Result<()> {
            if self.fail_push_for.lock().unwrap().contains(vendor_id) {
                return Err(AppError::Notification(format!(
                    "push failed for {}",
                    vendor_id
                )));
            }
            self.sent.lock().unwrap().push(SentNotification {
                vendor_id: vendor_id.clone(),
                channel: "push",
                job_id: offer.job_id.clone(),
            });
            Ok(())
        }
    }
}
