// ── Runtime configuration ──
//
// These types describe how the executor and the hub behave. They never
// touch disk: the server binary loads a file through `syncdesk-config`
// and hands the resulting values in.

use std::collections::HashMap;
use std::time::Duration;

use crate::model::Table;

/// Operation executor tuning.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutorConfig {
    /// Deadline for each remote attempt when the caller gives none.
    pub default_timeout: Duration,
    /// Retries after the first attempt for retryable failures.
    pub retry_attempts: u32,
    /// First backoff delay; doubles per attempt.
    pub backoff_base: Duration,
    /// Upper bound on a single backoff delay.
    pub backoff_max: Duration,
    /// TTL for cached read results.
    pub cache_ttl: Duration,
    /// Per-table TTL overrides.
    pub table_ttls: HashMap<Table, Duration>,
}

impl ExecutorConfig {
    pub fn ttl_for(&self, table: Table) -> Duration {
        self.table_ttls.get(&table).copied().unwrap_or(self.cache_ttl)
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(10),
            retry_attempts: 3,
            backoff_base: Duration::from_millis(250),
            backoff_max: Duration::from_secs(5),
            cache_ttl: Duration::from_secs(60),
            table_ttls: HashMap::new(),
        }
    }
}

/// Sync hub tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubConfig {
    /// How often heartbeat frames go out and staleness is evaluated.
    pub heartbeat_interval: Duration,
    /// Maximum time since last heartbeat before a connection is pruned.
    pub liveness_window: Duration,
    /// Frames queued per connection before it counts as too slow.
    pub connection_buffer: usize,
    /// How close in time a delete and another write must be to race.
    pub conflict_race_window: Duration,
    /// How long a record's last event is kept for conflict checks.
    pub event_retention: Duration,
    /// Buffered messages per external listener.
    pub listener_capacity: usize,
}

impl HubConfig {
    /// Defaults with the liveness window tied to the heartbeat interval.
    pub fn with_heartbeat_interval(interval: Duration) -> Self {
        Self {
            heartbeat_interval: interval,
            liveness_window: interval * 2,
            ..Self::default()
        }
    }
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(30),
            liveness_window: Duration::from_secs(60),
            connection_buffer: 256,
            conflict_race_window: Duration::from_secs(5),
            event_retention: Duration::from_secs(3600),
            listener_capacity: 1024,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_ttl_override_wins() {
        let mut config = ExecutorConfig::default();
        config.table_ttls.insert(Table::Proyectos, Duration::from_secs(5));
        assert_eq!(config.ttl_for(Table::Proyectos), Duration::from_secs(5));
        assert_eq!(config.ttl_for(Table::Materiales), config.cache_ttl);
    }

    #[test]
    fn liveness_window_is_twice_the_heartbeat() {
        let config = HubConfig::with_heartbeat_interval(Duration::from_secs(15));
        assert_eq!(config.liveness_window, Duration::from_secs(30));
    }
}
