use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Schedule periods and buffer sizes for the test-run engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// Period of the live reading refresh.
    pub live_refresh_ms: u64,
    /// Period at which a reading is appended to the stored run.
    pub logging_interval_ms: u64,
    /// Length of one countdown second. Only shortened in tests.
    pub countdown_tick_ms: u64,
    /// Readings kept in the live buffer, newest first.
    pub live_history_len: usize,
    pub default_duration_secs: u64,
    /// A stored run still marked running with no reading for this long is
    /// treated as left behind by a crashed process.
    pub stale_run_after_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            live_refresh_ms: 1_000,
            logging_interval_ms: 5_000,
            countdown_tick_ms: 1_000,
            live_history_len: 10,
            default_duration_secs: 300,
            stale_run_after_ms: 60_000,
        }
    }
}

impl EngineConfig {
    pub fn live_refresh(&self) -> Duration {
        Duration::from_millis(self.live_refresh_ms.max(1))
    }

    pub fn logging_interval(&self) -> Duration {
        Duration::from_millis(self.logging_interval_ms.max(1))
    }

    pub fn countdown_tick(&self) -> Duration {
        Duration::from_millis(self.countdown_tick_ms.max(1))
    }

    /// Never shorter than three logging periods, so a live recorder that is
    /// merely between readings is not taken for a crashed one.
    pub fn stale_run_after(&self) -> chrono::Duration {
        let millis = self
            .stale_run_after_ms
            .max(self.logging_interval_ms.saturating_mul(3));
        chrono::Duration::milliseconds(i64::try_from(millis).unwrap_or(i64::MAX))
    }
}
