// Notification Fan-Out
//
// One payload per newly-notified vendor, delivered concurrently over two
// independent best-effort channels. The batch joins on settlement of every
// task - a failed delivery never short-circuits the rest, and nothing here
// retries (retry is layered externally on the delivery-flag audit).

use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::domain::{DeliveryChannel, Job, VendorId};
use crate::port::{NotificationGateway, RequestLedger};

/// Settlement counts for one batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FanoutReport {
    /// Vendors reached on at least one channel
    pub delivered: usize,
    /// Vendors reached on no channel at all
    pub failed: usize,
}

/// Deliver offers for `vendor_ids` of `job`, concurrently, and record the
/// advisory delivery flags once each vendor's channels settle.
pub async fn dispatch_batch(
    gateway: Arc<dyn NotificationGateway>,
    ledger: Arc<dyn RequestLedger>,
    job: &Job,
    vendor_ids: &[VendorId],
) -> FanoutReport {
    let mut tasks: JoinSet<(VendorId, bool, bool)> = JoinSet::new();

    for vendor_id in vendor_ids {
        let gateway = Arc::clone(&gateway);
        let ledger = Arc::clone(&ledger);
        let vendor_id = vendor_id.clone();
        let job_id = job.id.clone();
        let offer = job.offer_for(&vendor_id);

        tasks.spawn(async move {
            // Both channels race independently; neither awaits the other
            let (in_app, push) = tokio::join!(
                gateway.write_in_app(&vendor_id, &offer),
                gateway.send_push(&vendor_id, &offer),
            );

            let in_app_ok = match in_app {
                Ok(()) => true,
                Err(e) => {
                    warn!(job_id = %job_id, vendor_id = %vendor_id, error = %e,
                        "In-app notification write failed");
                    false
                }
            };
            let push_ok = match push {
                Ok(()) => true,
                Err(e) => {
                    debug!(job_id = %job_id, vendor_id = %vendor_id, error = %e,
                        "Realtime push not delivered");
                    false
                }
            };

            // Advisory only - a failure to record is logged and dropped
            for (channel, ok) in [
                (DeliveryChannel::InApp, in_app_ok),
                (DeliveryChannel::Push, push_ok),
            ] {
                if let Err(e) = ledger.record_delivery(&job_id, &vendor_id, channel, ok).await {
                    warn!(job_id = %job_id, vendor_id = %vendor_id, error = %e,
                        "Failed to record delivery flag");
                }
            }

            (vendor_id, in_app_ok, push_ok)
        });
    }

    let mut report = FanoutReport::default();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((_, in_app_ok, push_ok)) => {
                if in_app_ok || push_ok {
                    report.delivered += 1;
                } else {
                    report.failed += 1;
                }
            }
            Err(e) => {
                // A panicked delivery task counts as a failed vendor
                warn!(job_id = %job.id, error = %e, "Notification task panicked");
                report.failed += 1;
            }
        }
    }
    report
}
