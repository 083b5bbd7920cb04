// Wave Policy - static escalation table
//
// Maps a 1-based wave index to a candidate quota and a wait duration. The
// slice computation is pure: it is re-derived on every poll tick, so it must
// be deterministic with no hidden counters.

use serde::{Deserialize, Serialize};

use crate::domain::error::{DomainError, Result};

/// One row of the escalation table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaveTier {
    /// How many candidates this wave covers. None = all remaining (only
    /// valid for the final tier).
    pub count: Option<u32>,
    /// How long to sit in this wave before escalating. 0 = terminal wave,
    /// no further escalation once entered.
    pub wait_ms: i64,
}

/// Ordered, read-only escalation table
#[derive(Debug, Clone, PartialEq)]
pub struct WavePolicy {
    tiers: Vec<WaveTier>,
}

impl WavePolicy {
    pub fn new(tiers: Vec<WaveTier>) -> Result<Self> {
        if tiers.is_empty() {
            return Err(DomainError::InvalidWavePolicy(
                "policy must have at least one tier".to_string(),
            ));
        }
        for (i, tier) in tiers.iter().enumerate() {
            let is_last = i == tiers.len() - 1;
            match tier.count {
                None if !is_last => {
                    return Err(DomainError::InvalidWavePolicy(format!(
                        "tier {} is unbounded but not the final tier",
                        i + 1
                    )));
                }
                Some(0) => {
                    return Err(DomainError::InvalidWavePolicy(format!(
                        "tier {} has a zero quota",
                        i + 1
                    )));
                }
                _ => {}
            }
            if tier.wait_ms < 0 {
                return Err(DomainError::InvalidWavePolicy(format!(
                    "tier {} has a negative wait",
                    i + 1
                )));
            }
        }
        if tiers.last().map(|t| t.count) != Some(None) {
            return Err(DomainError::InvalidWavePolicy(
                "final tier must be unbounded (count = null)".to_string(),
            ));
        }
        Ok(Self { tiers })
    }

    /// Production default: 3 / 3 / 4 nearest candidates at 15s intervals,
    /// then everyone left.
    pub fn default_policy() -> Self {
        Self {
            tiers: vec![
                WaveTier {
                    count: Some(3),
                    wait_ms: 15_000,
                },
                WaveTier {
                    count: Some(3),
                    wait_ms: 15_000,
                },
                WaveTier {
                    count: Some(4),
                    wait_ms: 15_000,
                },
                WaveTier {
                    count: None,
                    wait_ms: 0,
                },
            ],
        }
    }

    pub fn tier_count(&self) -> usize {
        self.tiers.len()
    }

    /// Wait duration for a 1-based wave index; None when the index is
    /// outside the table.
    pub fn wait_ms(&self, wave: i32) -> Option<i64> {
        if wave < 1 {
            return None;
        }
        self.tiers.get(wave as usize - 1).map(|t| t.wait_ms)
    }

    /// Candidate index range for a 1-based wave index.
    ///
    /// Start offset is the sum of all prior quotas; end is start + quota, or
    /// None (unbounded) for the final tier. Returns None for indices outside
    /// the table.
    pub fn range_for_wave(&self, wave: i32) -> Option<(usize, Option<usize>)> {
        if wave < 1 || wave as usize > self.tiers.len() {
            return None;
        }
        let idx = wave as usize - 1;
        let start: usize = self.tiers[..idx]
            .iter()
            .map(|t| t.count.unwrap_or(0) as usize)
            .sum();
        let end = self.tiers[idx].count.map(|c| start + c as usize);
        Some((start, end))
    }

    /// Resolve a wave's slice bounds against a concrete candidate pool size.
    /// The slice may be empty when the pool is exhausted - never an error.
    pub fn slice_bounds(&self, wave: i32, pool_len: usize) -> Option<(usize, usize)> {
        let (start, end) = self.range_for_wave(wave)?;
        let start = start.min(pool_len);
        let end = end.unwrap_or(pool_len).min(pool_len);
        Some((start, end))
    }
}
