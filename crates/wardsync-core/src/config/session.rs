//! Session coordination configuration.

use serde::{Deserialize, Serialize};

/// Session coordination configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Inactivity threshold in minutes after which a session is considered
    /// stale for occupancy purposes.
    #[serde(default = "default_inactivity_timeout")]
    pub inactivity_timeout_minutes: u64,
    /// Remaining time in minutes at which the countdown is marked urgent.
    #[serde(default = "default_urgent_threshold")]
    pub urgent_threshold_minutes: u64,
    /// Debounce window in seconds for activity heartbeat writes.
    #[serde(default = "default_heartbeat_debounce")]
    pub heartbeat_debounce_seconds: u64,
    /// Reconciliation sweep configuration.
    #[serde(default)]
    pub sweep: SweepConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            inactivity_timeout_minutes: default_inactivity_timeout(),
            urgent_threshold_minutes: default_urgent_threshold(),
            heartbeat_debounce_seconds: default_heartbeat_debounce(),
            sweep: SweepConfig::default(),
        }
    }
}

/// Reconciliation sweep configuration.
///
/// Staleness itself is a read-time interpretation and never deletes rows;
/// the sweep is the only path that physically removes rows left behind by
/// crashed or abandoned clients, after an additional grace period.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepConfig {
    /// Whether the periodic sweep is enabled.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Grace period in minutes past the inactivity threshold before a row
    /// is physically deleted.
    #[serde(default = "default_grace")]
    pub grace_minutes: u64,
    /// Cron schedule for the sweep job.
    #[serde(default = "default_schedule")]
    pub schedule: String,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            grace_minutes: default_grace(),
            schedule: default_schedule(),
        }
    }
}

fn default_inactivity_timeout() -> u64 {
    30
}

fn default_urgent_threshold() -> u64 {
    5
}

fn default_heartbeat_debounce() -> u64 {
    60
}

fn default_grace() -> u64 {
    60
}

fn default_schedule() -> String {
    "0 */15 * * * *".to_string()
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_thresholds() {
        let config = SessionConfig::default();
        assert_eq!(config.inactivity_timeout_minutes, 30);
        assert_eq!(config.urgent_threshold_minutes, 5);
        assert_eq!(config.heartbeat_debounce_seconds, 60);
        assert!(config.sweep.enabled);
    }
}
