//! Vendormatch Dispatch Engine - Main Entry Point
//!
//! Composition root: wires the SQLite adapters and the notification bus
//! into the dispatcher and sweeper loops, then waits for ctrl-c.

mod config;

use anyhow::Result;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use vendormatch_core::application::{shutdown_channel, Dispatcher, DispatcherConfig, LedgerSweeper};
use vendormatch_core::port::id_provider::UuidProvider;
use vendormatch_core::port::time_provider::SystemTimeProvider;
use vendormatch_infra_notify::{CompositeGateway, NotificationHub};
use vendormatch_infra_sqlite::{
    create_pool, run_migrations, SqliteJobStore, SqliteRequestLedger, SqliteVendorDirectory,
};

use config::DaemonConfig;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize logging (JSON for production, pretty for development)
    let log_format =
        std::env::var("VENDORMATCH_LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("vendormatch=info"))
        .map_err(|e| anyhow::anyhow!("Failed to create env filter: {}", e))?;

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().pretty())
                .init();
        }
    }

    info!("Vendormatch dispatch engine v{} starting...", VERSION);

    // 2. Load configuration
    let config = DaemonConfig::from_env()?;
    info!(db_path = %config.db_path, "Initializing database...");

    // 3. Initialize database
    let pool = create_pool(&config.db_path).await?;
    run_migrations(&pool).await?;

    // 4. Setup dependencies (DI wiring)
    let time_provider = Arc::new(SystemTimeProvider);
    let id_provider = Arc::new(UuidProvider);

    let job_store = Arc::new(SqliteJobStore::new(pool.clone()));
    let vendor_directory = Arc::new(SqliteVendorDirectory::new(pool.clone()));
    let request_ledger = Arc::new(SqliteRequestLedger::new(pool.clone()));

    // Realtime bus: the websocket/API layer attaches its own subscribers
    let hub = NotificationHub::default();
    let gateway = Arc::new(CompositeGateway::new(
        pool.clone(),
        hub.clone(),
        id_provider,
        time_provider.clone(),
    ));

    // 5. Start dispatcher loop
    info!(
        poll_interval_ms = config.poll_interval.as_millis() as u64,
        wave_tiers = config.wave_policy.tier_count(),
        "Starting dispatcher..."
    );
    let (shutdown_tx, shutdown_rx) = shutdown_channel();

    let dispatcher = Dispatcher::new(
        job_store,
        vendor_directory,
        request_ledger.clone(),
        gateway,
        time_provider.clone(),
        DispatcherConfig {
            poll_interval: config.poll_interval,
            wave_policy: config.wave_policy.clone(),
            request_ttl_ms: config.request_ttl_ms,
        },
    );
    let dispatcher_handle = tokio::spawn({
        let shutdown = shutdown_rx.clone();
        async move { dispatcher.run(shutdown).await }
    });

    // 6. Start request TTL sweeper
    info!("Starting ledger sweeper...");
    let sweeper = LedgerSweeper::new(
        request_ledger,
        time_provider,
        config.sweep_interval,
        config.expired_retention_ms,
    );
    let sweeper_handle = tokio::spawn({
        let shutdown = shutdown_rx.clone();
        async move { sweeper.run(shutdown).await }
    });

    info!("Dispatch engine ready");
    info!("Press Ctrl+C to shutdown");

    // 7. Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received. Exiting gracefully...");

    // 8. Graceful shutdown: stop future ticks, let in-flight work settle
    shutdown_tx.shutdown();
    let _ = tokio::time::timeout(std::time::Duration::from_secs(5), dispatcher_handle).await;
    let _ = tokio::time::timeout(std::time::Duration::from_secs(5), sweeper_handle).await;

    info!("Shutdown complete.");
    Ok(())
}
