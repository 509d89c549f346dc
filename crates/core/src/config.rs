use std::time::Duration;

/// Queue and sync limits.
///
/// Defaults match what field devices ship with; override via environment
/// variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncLimits {
    /// Pending operations allowed per tenant (default: `100`).
    pub max_pending: usize,
    /// Sync attempts before a Failed operation becomes terminal (default: `3`).
    pub max_attempts: u32,
    /// Pending operations older than this expire (default: 24h).
    pub max_age: Duration,
    /// Oldest-pending age that flags the device as stale (default: 12h).
    pub alert_age: Duration,
    /// Periodic drain interval (default: 5 min).
    pub sync_interval: Duration,
    /// Delay between coming back online and draining (default: 2 s).
    pub reconnect_delay: Duration,
    /// Bound on each remote round trip (default: 30 s).
    pub round_trip_timeout: Duration,
    /// Ledger append retries after losing the tail race (default: `8`).
    pub append_retries: u32,
}

impl Default for SyncLimits {
    fn default() -> Self {
        Self {
            max_pending: 100,
            max_attempts: 3,
            max_age: Duration::from_secs(24 * 60 * 60),
            alert_age: Duration::from_secs(12 * 60 * 60),
            sync_interval: Duration::from_secs(5 * 60),
            reconnect_delay: Duration::from_secs(2),
            round_trip_timeout: Duration::from_secs(30),
            append_retries: 8,
        }
    }
}

impl SyncLimits {
    /// Load limits from environment variables, falling back to defaults for
    /// anything missing or unparsable.
    ///
    /// | Env Var                                  | Default  |
    /// |------------------------------------------|----------|
    /// | `FIELDLEDGER_MAX_PENDING`                | `100`    |
    /// | `FIELDLEDGER_MAX_ATTEMPTS`               | `3`      |
    /// | `FIELDLEDGER_MAX_AGE_SECS`               | `86400`  |
    /// | `FIELDLEDGER_ALERT_AGE_SECS`             | `43200`  |
    /// | `FIELDLEDGER_SYNC_INTERVAL_SECS`         | `300`    |
    /// | `FIELDLEDGER_RECONNECT_DELAY_MS`         | `2000`   |
    /// | `FIELDLEDGER_ROUND_TRIP_TIMEOUT_SECS`    | `30`     |
    /// | `FIELDLEDGER_APPEND_RETRIES`             | `8`      |
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_pending: env_or("FIELDLEDGER_MAX_PENDING", defaults.max_pending),
            max_attempts: env_or("FIELDLEDGER_MAX_ATTEMPTS", defaults.max_attempts),
            max_age: Duration::from_secs(env_or(
                "FIELDLEDGER_MAX_AGE_SECS",
                defaults.max_age.as_secs(),
            )),
            alert_age: Duration::from_secs(env_or(
                "FIELDLEDGER_ALERT_AGE_SECS",
                defaults.alert_age.as_secs(),
            )),
            sync_interval: Duration::from_secs(env_or(
                "FIELDLEDGER_SYNC_INTERVAL_SECS",
                defaults.sync_interval.as_secs(),
            )),
            reconnect_delay: Duration::from_millis(env_or(
                "FIELDLEDGER_RECONNECT_DELAY_MS",
                defaults.reconnect_delay.as_millis() as u64,
            )),
            round_trip_timeout: Duration::from_secs(env_or(
                "FIELDLEDGER_ROUND_TRIP_TIMEOUT_SECS",
                defaults.round_trip_timeout.as_secs(),
            )),
            append_retries: env_or("FIELDLEDGER_APPEND_RETRIES", defaults.append_retries),
        }
    }

    /// `max_age` as a chrono duration for timestamp arithmetic.
    pub fn max_age_delta(&self) -> chrono::Duration {
        to_delta(self.max_age)
    }

    pub fn alert_age_delta(&self) -> chrono::Duration {
        to_delta(self.alert_age)
    }
}

/// Convert a std duration, saturating on overflow.
pub fn to_delta(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or(chrono::Duration::MAX)
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let limits = SyncLimits::default();
        assert_eq!(limits.max_pending, 100);
        assert_eq!(limits.max_attempts, 3);
        assert_eq!(limits.max_age_delta(), chrono::Duration::hours(24));
        assert_eq!(limits.alert_age_delta(), chrono::Duration::hours(12));
        assert_eq!(limits.sync_interval, Duration::from_secs(300));
    }

    #[test]
    fn unparsable_value_falls_back() {
        assert_eq!(env_or("FIELDLEDGER_TEST_UNSET_VARIABLE", 7u32), 7);
    }
}
