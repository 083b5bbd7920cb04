// Daemon configuration from environment variables
//
// Everything the engine tunes on is injectable here; nothing downstream
// reads the environment itself.

use std::time::Duration;

use anyhow::{Context, Result};
use vendormatch_core::domain::{WavePolicy, WaveTier};

const DEFAULT_DB_PATH: &str = "~/.vendormatch/dispatch.db";

#[derive(Debug)]
pub struct DaemonConfig {
    pub db_path: String,
    pub poll_interval: Duration,
    pub wave_policy: WavePolicy,
    pub request_ttl_ms: i64,
    pub sweep_interval: Duration,
    pub expired_retention_ms: i64,
}

impl DaemonConfig {
    pub fn from_env() -> Result<Self> {
        let db_path = std::env::var("VENDORMATCH_DB_PATH")
            .unwrap_or_else(|_| shellexpand::tilde(DEFAULT_DB_PATH).into_owned());

        let poll_interval_ms: u64 = env_parsed("VENDORMATCH_POLL_INTERVAL_MS", 5_000)?;
        let request_ttl_hours: i64 = env_parsed("VENDORMATCH_REQUEST_TTL_HOURS", 6)?;
        let sweep_interval_secs: u64 = env_parsed("VENDORMATCH_SWEEP_INTERVAL_SECS", 600)?;
        let retention_hours: i64 = env_parsed("VENDORMATCH_EXPIRED_RETENTION_HOURS", 24)?;

        let wave_policy = match std::env::var("VENDORMATCH_WAVE_POLICY") {
            Ok(json) => {
                let tiers: Vec<WaveTier> = serde_json::from_str(&json)
                    .context("VENDORMATCH_WAVE_POLICY is not a valid tier array")?;
                WavePolicy::new(tiers).context("VENDORMATCH_WAVE_POLICY rejected")?
            }
            Err(_) => WavePolicy::default_policy(),
        };

        Ok(Self {
            db_path,
            poll_interval: Duration::from_millis(poll_interval_ms),
            wave_policy,
            request_ttl_ms: request_ttl_hours * 3_600_000,
            sweep_interval: Duration::from_secs(sweep_interval_secs),
            expired_retention_ms: retention_hours * 3_600_000,
        })
    }
}

fn env_parsed<T: std::str::FromStr>(name: &str, default: T) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .with_context(|| format!("{} has an invalid value: {}", name, raw)),
        Err(_) => Ok(default),
    }
}
