//! System configuration loaded from environment variables.

use chrono::Duration;

/// Tunables of the banking saga system, with sensible defaults.
///
/// Reads from environment variables:
/// - `BANK_STASH_CAPACITY` — commands an account buffers while in a
///   transaction before answering `Busy` (default: `64`)
/// - `BANK_PREPARE_TIMEOUT_MS` — saga prepare-phase deadline (default: `5000`)
/// - `BANK_TICK_INTERVAL_MS` — retry/timeout tick period; `0` disables the
///   ticker so tests can tick manually (default: `100`)
#[derive(Debug, Clone)]
pub struct BankConfig {
    pub stash_capacity: usize,
    pub prepare_timeout_ms: u64,
    pub tick_interval_ms: u64,
}

impl BankConfig {
    /// Loads configuration from environment variables, falling back to
    /// defaults.
    pub fn from_env() -> Self {
        Self {
            stash_capacity: std::env::var("BANK_STASH_CAPACITY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(64),
            prepare_timeout_ms: std::env::var("BANK_PREPARE_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5000),
            tick_interval_ms: std::env::var("BANK_TICK_INTERVAL_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(100),
        }
    }

    /// Returns the prepare-phase deadline as a duration.
    pub fn prepare_timeout(&self) -> Duration {
        Duration::milliseconds(self.prepare_timeout_ms as i64)
    }
}

impl Default for BankConfig {
    fn default() -> Self {
        Self {
            stash_capacity: 64,
            prepare_timeout_ms: 5000,
            tick_interval_ms: 100,
        }
    }
}
