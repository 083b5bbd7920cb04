//! End-to-End Dispatch Flow Tests
//!
//! Real SQLite adapters and the real notification gateway wired into the
//! dispatcher, driven by a settable clock. File-backed databases are used so
//! restart scenarios can reopen the same state.

use std::sync::Arc;

use vendormatch_core::application::{Dispatcher, DispatcherConfig};
use vendormatch_core::domain::{
    Availability, Candidate, Job, JobStatus, RequestStatus, Vendor,
};
use vendormatch_core::port::id_provider::UuidProvider;
use vendormatch_core::port::time_provider::mocks::MockTimeProvider;
use vendormatch_core::port::{NewRequest, RequestLedger};
use vendormatch_infra_notify::{CompositeGateway, NotificationHub};
use vendormatch_infra_sqlite::{
    create_pool, run_migrations, SqliteJobStore, SqliteRequestLedger, SqliteVendorDirectory,
};

struct World {
    pool: sqlx::SqlitePool,
    store: Arc<SqliteJobStore>,
    directory: Arc<SqliteVendorDirectory>,
    ledger: Arc<SqliteRequestLedger>,
    hub: NotificationHub,
    clock: Arc<MockTimeProvider>,
    dispatcher: Dispatcher,
}

/// Open (or reopen) the full stack against one database file
async fn open_world(db_path: &str) -> World {
    let pool = create_pool(db_path).await.unwrap();
    run_migrations(&pool).await.unwrap();

    let store = Arc::new(SqliteJobStore::new(pool.clone()));
    let directory = Arc::new(SqliteVendorDirectory::new(pool.clone()));
    let ledger = Arc::new(SqliteRequestLedger::new(pool.clone()));
    let clock = Arc::new(MockTimeProvider::new(0));

    let hub = NotificationHub::default();
    let gateway = Arc::new(CompositeGateway::new(
        pool.clone(),
        hub.clone(),
        Arc::new(UuidProvider),
        clock.clone(),
    ));

    let dispatcher = Dispatcher::new(
        store.clone(),
        directory.clone(),
        ledger.clone(),
        gateway,
        clock.clone(),
        DispatcherConfig::default(),
    );

    World {
        pool,
        store,
        directory,
        ledger,
        hub,
        clock,
        dispatcher,
    }
}

async fn fresh_world(db_path: &str) -> World {
    let _ = std::fs::remove_file(db_path);
    open_world(db_path).await
}

async fn seed_vendors(w: &World, n: usize) {
    for i in 0..n {
        w.directory
            .upsert(&Vendor {
                id: format!("v{}", i),
                name: format!("Vendor {}", i),
                is_online: true,
                availability: Availability::Available,
            })
            .await
            .unwrap();
    }
}

/// A SEARCHING job with `n` ranked candidates, wave 1 seeded at t=0 the way
/// the external booking flow leaves it: wave-1 vendors already requested and
/// recorded in the notified set.
async fn seed_job(w: &World, id: &str, n: usize) {
    let mut job = Job::new(
        id,
        0,
        "Home Cleaning",
        "A. Customer",
        100_000,
        "18 Rose St",
        Some(420.0),
        (0..n)
            .map(|i| Candidate {
                vendor_id: format!("v{}", i),
                distance_km: Some(i as f64 * 1.2),
            })
            .collect(),
    );
    job.wave_started_at = Some(0);
    let wave1: Vec<String> = (0..n.min(3)).map(|i| format!("v{}", i)).collect();
    job.union_notified(&wave1);
    w.store.insert(&job).await.unwrap();

    for v in &wave1 {
        w.ledger
            .create_if_absent(NewRequest {
                job_id: id.to_string(),
                vendor_id: v.clone(),
                wave: 1,
                distance_km: None,
                sent_at: 0,
                expires_at: 21_600_000,
            })
            .await
            .unwrap();
    }
}

async fn request_vendors(w: &World, job_id: &str, wave: i32) -> Vec<String> {
    w.ledger
        .find_for_job(&job_id.to_string())
        .await
        .unwrap()
        .into_iter()
        .filter(|r| r.wave == wave)
        .map(|r| r.vendor_id)
        .collect()
}

async fn in_app_count(w: &World) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM in_app_notifications")
        .fetch_one(&w.pool)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_full_wave_timeline_end_to_end() {
    let w = fresh_world("/tmp/vendormatch_test_flow_timeline.db").await;
    seed_vendors(&w, 10).await;
    seed_job(&w, "job-1", 10).await;

    // A realtime subscriber is attached, so push delivery succeeds
    let mut rx = w.hub.subscribe();

    // Wave 1 -> 2 at the 15s boundary
    w.clock.set(15_000);
    let s = w.dispatcher.tick().await;
    assert_eq!(s.escalated, 1);
    assert_eq!(s.notified, 3);
    assert_eq!(request_vendors(&w, "job-1", 2).await, vec!["v3", "v4", "v5"]);
    assert_eq!(in_app_count(&w).await, 3);

    let mut pushed: Vec<String> = Vec::new();
    for _ in 0..3 {
        pushed.push(rx.recv().await.unwrap().vendor_id);
    }
    pushed.sort();
    assert_eq!(pushed, vec!["v3", "v4", "v5"]);

    let r = w
        .ledger
        .find(&"job-1".to_string(), &"v3".to_string())
        .await
        .unwrap()
        .unwrap();
    assert!(r.in_app_delivered);
    assert!(r.push_delivered);
    assert_eq!(r.status, RequestStatus::Pending);
    println!("✅ Wave 2 escalated with both channels delivered");

    // Wave 2 -> 3 at the 30s boundary (final bounded tier takes the rest)
    w.clock.set(30_000);
    let s = w.dispatcher.tick().await;
    assert_eq!(s.escalated, 1);
    assert_eq!(
        request_vendors(&w, "job-1", 3).await,
        vec!["v6", "v7", "v8", "v9"]
    );

    // Terminal wave entered: no further escalation, ever
    w.clock.set(45_000);
    let s = w.dispatcher.tick().await;
    assert_eq!(s.escalated, 0);

    let job = w.store.find_by_id(&"job-1".to_string()).await.unwrap().unwrap();
    assert_eq!(job.current_wave, 4);
    assert_eq!(job.wave_started_at, Some(30_000));
    assert_eq!(w.ledger.find_for_job(&"job-1".to_string()).await.unwrap().len(), 10);
    println!("✅ Full timeline: 10 candidates requested across 3 bounded waves");
}

#[tokio::test]
async fn test_offline_vendor_excluded_at_escalation() {
    let w = fresh_world("/tmp/vendormatch_test_flow_offline.db").await;
    seed_vendors(&w, 10).await;
    w.directory
        .upsert(&Vendor {
            id: "v4".to_string(),
            name: "Vendor 4".to_string(),
            is_online: false,
            availability: Availability::Available,
        })
        .await
        .unwrap();
    seed_job(&w, "job-1", 10).await;

    w.clock.set(15_000);
    w.dispatcher.tick().await;

    // v4 skipped, wave advanced on schedule anyway
    assert_eq!(request_vendors(&w, "job-1", 2).await, vec!["v3", "v5"]);
    let job = w.store.find_by_id(&"job-1".to_string()).await.unwrap().unwrap();
    assert_eq!(job.current_wave, 2);
    assert!(!job.notified_vendor_ids.contains(&"v4".to_string()));
    assert!(w
        .ledger
        .find(&"job-1".to_string(), &"v4".to_string())
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_assigned_job_leaves_the_scan() {
    let w = fresh_world("/tmp/vendormatch_test_flow_assigned.db").await;
    seed_vendors(&w, 10).await;
    seed_job(&w, "job-1", 10).await;

    // v1 accepts during wave 1; the external flow assigns the job and
    // cancels the remaining open requests
    w.ledger
        .respond(&"job-1".to_string(), &"v1".to_string(), true, 10_000)
        .await
        .unwrap();
    w.store
        .update_status(&"job-1".to_string(), JobStatus::Assigned)
        .await
        .unwrap();
    let cancelled = w.ledger.cancel_for_job(&"job-1".to_string(), 10_000).await.unwrap();
    assert_eq!(cancelled, 2); // v0 and v2

    // Past the wave boundary nothing happens: the job is no longer scanned
    w.clock.set(15_000);
    let s = w.dispatcher.tick().await;
    assert_eq!(s.scanned, 0);
    assert_eq!(w.ledger.find_for_job(&"job-1".to_string()).await.unwrap().len(), 3);

    let accepted = w
        .ledger
        .find(&"job-1".to_string(), &"v1".to_string())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(accepted.status, RequestStatus::Accepted);
    let cancelled = w
        .ledger
        .find(&"job-1".to_string(), &"v2".to_string())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(cancelled.status, RequestStatus::Cancelled);
}

#[tokio::test]
async fn test_dispatch_state_survives_restart() {
    let db_path = "/tmp/vendormatch_test_flow_restart.db";

    // First process: escalate to wave 2, then shut down
    {
        let w = fresh_world(db_path).await;
        seed_vendors(&w, 10).await;
        seed_job(&w, "job-1", 10).await;

        w.clock.set(15_000);
        w.dispatcher.tick().await;
        assert_eq!(request_vendors(&w, "job-1", 2).await, vec!["v3", "v4", "v5"]);
        w.pool.close().await;
    }

    // Second process: picks up exactly where the first left off
    {
        let w = open_world(db_path).await;
        let job = w.store.find_by_id(&"job-1".to_string()).await.unwrap().unwrap();
        assert_eq!(job.current_wave, 2);
        assert_eq!(job.wave_started_at, Some(15_000));

        w.clock.set(30_000);
        let s = w.dispatcher.tick().await;
        assert_eq!(s.escalated, 1);
        assert_eq!(
            request_vendors(&w, "job-1", 3).await,
            vec!["v6", "v7", "v8", "v9"]
        );
        // No duplicates for earlier waves
        assert_eq!(w.ledger.find_for_job(&"job-1".to_string()).await.unwrap().len(), 10);
        println!("✅ Restart resumed escalation without duplicate requests");
    }
}
