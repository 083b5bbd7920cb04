// Ledger Sweeper - request TTL housekeeping
//
// Requests expire passively: once `expires_at` passes without a response the
// record is marked EXPIRED, and long-expired rows are garbage-collected.
// Runs in the background next to the dispatcher, on its own cadence.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::application::shutdown::ShutdownToken;
use crate::error::Result;
use crate::port::{RequestLedger, TimeProvider};

pub struct LedgerSweeper {
    ledger: Arc<dyn RequestLedger>,
    time_provider: Arc<dyn TimeProvider>,
    sweep_interval: Duration,
    /// How long EXPIRED rows are kept around for auditing before deletion
    retention_ms: i64,
}

impl LedgerSweeper {
    pub fn new(
        ledger: Arc<dyn RequestLedger>,
        time_provider: Arc<dyn TimeProvider>,
        sweep_interval: Duration,
        retention_ms: i64,
    ) -> Self {
        Self {
            ledger,
            time_provider,
            sweep_interval,
            retention_ms,
        }
    }

    /// Run the sweep loop until shutdown. Should be spawned in tokio::spawn.
    pub async fn run(self, mut shutdown: ShutdownToken) {
        info!(
            sweep_interval_ms = self.sweep_interval.as_millis() as u64,
            retention_ms = self.retention_ms,
            "Ledger sweeper started"
        );

        let mut ticker = interval(self.sweep_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if shutdown.is_shutdown() {
                        break;
                    }
                    if let Err(e) = self.sweep_now().await {
                        error!(error = %e, "Ledger sweep failed");
                    }
                }
                _ = shutdown.wait() => {
                    info!("Ledger sweeper shutting down");
                    break;
                }
            }
        }
        info!("Ledger sweeper stopped");
    }

    /// One sweep pass: expire overdue requests, then purge old EXPIRED rows.
    pub async fn sweep_now(&self) -> Result<(u64, u64)> {
        let now = self.time_provider.now_millis();

        let expired = self.ledger.expire_overdue(now).await?;
        let purged = self
            .ledger
            .purge_expired_before(now - self.retention_ms)
            .await?;

        if expired > 0 || purged > 0 {
            info!(expired, purged, "Ledger sweep completed");
        } else {
            debug!("Ledger sweep completed (nothing to do)");
        }
        Ok((expired, purged))
    }
}
