// Dispatcher - wave escalation loop
//
// Periodically scans every SEARCHING job and decides, per job, whether the
// current wave has run out of time. On escalation the next ranked slice of
// candidates is filtered to currently-reachable vendors, requests are
// created idempotently, and notifications fan out. Jobs are processed
// concurrently within one tick and one job's failure never aborts the tick.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::application::fanout;
use crate::application::shutdown::ShutdownToken;
use crate::domain::{Candidate, Job, VendorId, WavePolicy};
use crate::error::Result;
use crate::port::{
    InsertOutcome, JobStore, NewRequest, NotificationGateway, RequestLedger, TimeProvider,
    VendorDirectory,
};

/// Injectable dispatch tuning. Nothing in the engine is a hard-coded
/// constant: poll cadence, escalation table and request TTL all come from
/// the caller.
#[derive(Clone)]
pub struct DispatcherConfig {
    /// Fixed poll cadence, independent of any single job's wave duration
    pub poll_interval: Duration,
    pub wave_policy: WavePolicy,
    /// Validity horizon stamped on new requests (hours, not wave-sized:
    /// it must outlive every escalation for the job)
    pub request_ttl_ms: i64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            wave_policy: WavePolicy::default_policy(),
            request_ttl_ms: 6 * 3_600_000,
        }
    }
}

/// Per-job result of one escalation check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EscalationOutcome {
    /// Current wave still has time on the clock
    NotDue,
    /// Final wave already entered (wait = 0), nothing left to schedule
    TerminalWave,
    /// Advanced a wave and notified `notified` vendors
    Escalated { wave: i32, notified: usize },
    /// Advanced past a slice with nobody to notify (offline vendors must
    /// not stall forward progress while candidates remain further out)
    AdvancedEmpty { wave: i32 },
    /// Tail of the pool is all unreachable; job left in place so the next
    /// tick re-checks whether anyone came online
    AwaitingReachable,
    /// No candidates left at all - external no-provider resolution required
    Exhausted,
}

/// Counters for one poll tick
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickSummary {
    pub scanned: usize,
    pub escalated: usize,
    pub notified: usize,
    pub exhausted: usize,
    pub failed: usize,
}

/// The dispatch engine. Owns its dependencies explicitly - constructed once
/// by the composition root and cloned per spawned job task (all fields are
/// cheaply cloneable handles).
#[derive(Clone)]
pub struct Dispatcher {
    job_store: Arc<dyn JobStore>,
    vendor_directory: Arc<dyn VendorDirectory>,
    request_ledger: Arc<dyn RequestLedger>,
    gateway: Arc<dyn NotificationGateway>,
    time_provider: Arc<dyn TimeProvider>,
    config: Arc<DispatcherConfig>,
}

impl Dispatcher {
    pub fn new(
        job_store: Arc<dyn JobStore>,
        vendor_directory: Arc<dyn VendorDirectory>,
        request_ledger: Arc<dyn RequestLedger>,
        gateway: Arc<dyn NotificationGateway>,
        time_provider: Arc<dyn TimeProvider>,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            job_store,
            vendor_directory,
            request_ledger,
            gateway,
            time_provider,
            config: Arc::new(config),
        }
    }

    /// Run the poll loop until shutdown is signalled.
    ///
    /// Ticks never overlap (missed ticks are delayed, not burst); in-flight
    /// per-job work is allowed to finish on shutdown since request creation
    /// is idempotent.
    pub async fn run(self, mut shutdown: ShutdownToken) {
        info!(
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            wave_tiers = self.config.wave_policy.tier_count(),
            "Dispatcher started"
        );

        let mut ticker = interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if shutdown.is_shutdown() {
                        break;
                    }
                    self.tick().await;
                }
                _ = shutdown.wait() => {
                    info!("Dispatcher shutting down");
                    break;
                }
            }
        }
        info!("Dispatcher stopped");
    }

    /// One full scan of all SEARCHING jobs. Never returns an error: the
    /// tick boundary is the last-resort catch-and-log layer.
    pub async fn tick(&self) -> TickSummary {
        let jobs = match self.job_store.find_searchable().await {
            Ok(jobs) => jobs,
            Err(e) => {
                error!(error = %e, "Job scan failed; retrying next tick");
                return TickSummary::default();
            }
        };

        let mut summary = TickSummary {
            scanned: jobs.len(),
            ..Default::default()
        };

        let mut tasks: JoinSet<(String, Result<EscalationOutcome>)> = JoinSet::new();
        for job in jobs {
            let dispatcher = self.clone();
            tasks.spawn(async move {
                let job_id = job.id.clone();
                (job_id, dispatcher.escalate_job(job).await)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(outcome))) => match outcome {
                    EscalationOutcome::Escalated { notified, .. } => {
                        summary.escalated += 1;
                        summary.notified += notified;
                    }
                    EscalationOutcome::AdvancedEmpty { .. } => summary.escalated += 1,
                    EscalationOutcome::Exhausted => summary.exhausted += 1,
                    EscalationOutcome::NotDue
                    | EscalationOutcome::TerminalWave
                    | EscalationOutcome::AwaitingReachable => {}
                },
                Ok((job_id, Err(e))) => {
                    // Transient store/notification failure: skip this job
                    // for the tick, the next scan retries it
                    warn!(job_id = %job_id, error = %e, "Job escalation failed; skipped this tick");
                    summary.failed += 1;
                }
                Err(e) => {
                    error!(error = %e, "Escalation task panicked");
                    summary.failed += 1;
                }
            }
        }

        if summary.escalated > 0 || summary.failed > 0 {
            info!(
                scanned = summary.scanned,
                escalated = summary.escalated,
                notified = summary.notified,
                exhausted = summary.exhausted,
                failed = summary.failed,
                "Dispatch tick completed"
            );
        } else {
            debug!(scanned = summary.scanned, "Dispatch tick completed (no escalations)");
        }
        summary
    }

    /// Evaluate one job's wave schedule and escalate if its time is up.
    pub async fn escalate_job(&self, job: Job) -> Result<EscalationOutcome> {
        let now = self.time_provider.now_millis();
        let policy = &self.config.wave_policy;

        // Store contract guarantees wave_started_at, but stay defensive
        let Some(started) = job.wave_started_at else {
            return Ok(EscalationOutcome::NotDue);
        };
        let Some(wait) = policy.wait_ms(job.current_wave) else {
            warn!(job_id = %job.id, wave = job.current_wave, "Wave index outside policy table");
            return Ok(EscalationOutcome::NotDue);
        };
        if wait == 0 {
            return Ok(EscalationOutcome::TerminalWave);
        }
        if now - started < wait {
            return Ok(EscalationOutcome::NotDue);
        }

        let next_wave = job.current_wave + 1;
        let Some((start, end)) = policy.slice_bounds(next_wave, job.candidates.len()) else {
            // Last tier carried a non-zero wait and ran out; treat like
            // exhaustion and leave resolution to the outside
            info!(job_id = %job.id, wave = job.current_wave, "No wave beyond the current one");
            return Ok(EscalationOutcome::Exhausted);
        };
        let slice = &job.candidates[start..end];
        if slice.is_empty() {
            info!(
                job_id = %job.id,
                wave = next_wave,
                "Candidate pool exhausted; awaiting external no-provider resolution"
            );
            return Ok(EscalationOutcome::Exhausted);
        }
        let more_beyond = end < job.candidates.len();

        // Never re-notify: the notified set only grows
        let fresh: Vec<&Candidate> = slice
            .iter()
            .filter(|c| !job.has_notified(&c.vendor_id))
            .collect();
        let fresh_ids: Vec<VendorId> = fresh.iter().map(|c| c.vendor_id.clone()).collect();

        // Reachability is checked now, at escalation time
        let reachable: HashSet<VendorId> = self
            .vendor_directory
            .filter_reachable(&fresh_ids)
            .await?
            .into_iter()
            .collect();
        let to_notify: Vec<&Candidate> = fresh
            .into_iter()
            .filter(|c| reachable.contains(&c.vendor_id))
            .collect();

        if to_notify.is_empty() {
            if fresh_ids.is_empty() || more_beyond {
                // Keep moving through wave boundaries rather than stalling
                // on an unreachable (or already-handled) slice
                self.job_store
                    .record_wave_advance(&job.id, next_wave, now, &[])
                    .await?;
                info!(job_id = %job.id, wave = next_wave, "Advanced past unreachable slice");
                return Ok(EscalationOutcome::AdvancedEmpty { wave: next_wave });
            }
            debug!(
                job_id = %job.id,
                wave = next_wave,
                "Nobody reachable in the final slice; retrying next tick"
            );
            return Ok(EscalationOutcome::AwaitingReachable);
        }

        // Idempotent request creation: duplicates from overlapping ticks
        // are expected and swallowed
        let mut requested: Vec<VendorId> = Vec::with_capacity(to_notify.len());
        let mut created: Vec<VendorId> = Vec::with_capacity(to_notify.len());
        for candidate in &to_notify {
            let outcome = self
                .request_ledger
                .create_if_absent(NewRequest {
                    job_id: job.id.clone(),
                    vendor_id: candidate.vendor_id.clone(),
                    wave: next_wave,
                    distance_km: candidate.distance_km,
                    sent_at: now,
                    expires_at: now + self.config.request_ttl_ms,
                })
                .await?;
            requested.push(candidate.vendor_id.clone());
            match outcome {
                InsertOutcome::Created => created.push(candidate.vendor_id.clone()),
                InsertOutcome::AlreadyExists => {
                    debug!(
                        job_id = %job.id,
                        vendor_id = %candidate.vendor_id,
                        "Request already exists (overlapping tick)"
                    );
                }
            }
        }

        // Union every vendor that now has a request, so the notified set
        // stays exactly "vendors with a request" even after a crash between
        // request creation and wave advance
        self.job_store
            .record_wave_advance(&job.id, next_wave, now, &requested)
            .await?;

        // Fan out only to newly created requests; vendors with an existing
        // request were already notified by the earlier tick
        let report = fanout::dispatch_batch(
            Arc::clone(&self.gateway),
            Arc::clone(&self.request_ledger),
            &job,
            &created,
        )
        .await;

        info!(
            job_id = %job.id,
            wave = next_wave,
            notified = created.len(),
            delivered = report.delivered,
            undelivered = report.failed,
            "Wave escalated"
        );
        Ok(EscalationOutcome::Escalated {
            wave: next_wave,
            notified: created.len(),
        })
    }
}
