//! Read-time session expiry policy.
//!
//! Pure functions over `(last_activity, now)`. Staleness never deletes a
//! row by itself; it only changes how a row is interpreted when listing
//! occupancy or rendering the header countdown. Physical deletion is the
//! sweep's job (see [`crate::sweep`]).

use chrono::{DateTime, Duration, Utc};

use wardsync_core::config::session::SessionConfig;

/// Countdown state for the header display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Countdown {
    /// Session is fresh; time remaining until staleness.
    Running(Duration),
    /// Remaining time is at or below the urgent threshold.
    Urgent(Duration),
    /// The session has gone stale.
    Expired,
}

/// Pure expiry computation shared by the countdown display and the
/// occupancy listings.
#[derive(Debug, Clone, Copy)]
pub struct ExpiryPolicy {
    /// Inactivity threshold after which a session is stale.
    inactivity_threshold: Duration,
    /// Remaining time at which the countdown turns urgent.
    urgent_threshold: Duration,
}

impl ExpiryPolicy {
    /// Creates a policy from configuration.
    pub fn from_config(config: &SessionConfig) -> Self {
        Self {
            inactivity_threshold: Duration::minutes(config.inactivity_timeout_minutes as i64),
            urgent_threshold: Duration::minutes(config.urgent_threshold_minutes as i64),
        }
    }

    /// Creates a policy with explicit thresholds.
    pub fn new(inactivity_threshold: Duration, urgent_threshold: Duration) -> Self {
        Self {
            inactivity_threshold,
            urgent_threshold,
        }
    }

    /// The inactivity threshold.
    pub fn inactivity_threshold(&self) -> Duration {
        self.inactivity_threshold
    }

    /// Time remaining before the session goes stale, clamped at zero.
    pub fn remaining(&self, last_activity: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
        let remaining = self.inactivity_threshold - (now - last_activity);
        remaining.max(Duration::zero())
    }

    /// Whether the session is stale: `now - last_activity >= threshold`.
    pub fn is_stale(&self, last_activity: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        now - last_activity >= self.inactivity_threshold
    }

    /// The countdown state for the header display.
    pub fn countdown(&self, last_activity: DateTime<Utc>, now: DateTime<Utc>) -> Countdown {
        if self.is_stale(last_activity, now) {
            return Countdown::Expired;
        }
        let remaining = self.remaining(last_activity, now);
        if remaining <= self.urgent_threshold {
            Countdown::Urgent(remaining)
        } else {
            Countdown::Running(remaining)
        }
    }

    /// The `last_activity` cutoff below which a row counts as stale,
    /// relative to `now`. Fed into the store's occupancy predicates.
    pub fn stale_cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - self.inactivity_threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> ExpiryPolicy {
        ExpiryPolicy::new(Duration::minutes(30), Duration::minutes(5))
    }

    #[test]
    fn test_fresh_session_is_running() {
        let now = Utc::now();
        let last = now - Duration::minutes(10);
        assert_eq!(
            policy().countdown(last, now),
            Countdown::Running(Duration::minutes(20))
        );
        assert!(!policy().is_stale(last, now));
    }

    #[test]
    fn test_urgent_at_five_minutes_remaining() {
        let now = Utc::now();
        let last = now - Duration::minutes(25);
        assert_eq!(
            policy().countdown(last, now),
            Countdown::Urgent(Duration::minutes(5))
        );
    }

    #[test]
    fn test_stale_at_exactly_threshold() {
        let now = Utc::now();
        let last = now - Duration::minutes(30);
        assert!(policy().is_stale(last, now));
        assert_eq!(policy().countdown(last, now), Countdown::Expired);
    }

    #[test]
    fn test_remaining_clamps_at_zero() {
        let now = Utc::now();
        let last = now - Duration::minutes(45);
        assert_eq!(policy().remaining(last, now), Duration::zero());
    }

    #[test]
    fn test_stale_cutoff_round_trips_with_is_stale() {
        let now = Utc::now();
        let cutoff = policy().stale_cutoff(now);
        let just_stale = cutoff - Duration::seconds(1);
        let just_fresh = cutoff + Duration::seconds(1);
        assert!(policy().is_stale(just_stale, now));
        assert!(!policy().is_stale(just_fresh, now));
    }
}
