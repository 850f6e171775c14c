//! Unit session entity model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use wardsync_core::types::{SessionId, UnitId, UserId};

/// One clinician's claim on one ICU unit.
///
/// A blocking session is the unit's exclusive write-holder. A non-blocking
/// session exists only as a handover receiver, created while the holder
/// has opened the unit for a shift handover. Rows are created by `start`
/// or `join_as_receiver`, mutated by the coordinator's flag transitions
/// and the heartbeat, and destroyed on release, on assumption (the
/// outgoing holder's row), by a forced disconnect, or by the sweep.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UnitSession {
    /// Unique session identifier, assigned on creation.
    pub id: SessionId,
    /// The clinician holding this session.
    pub user_id: UserId,
    /// The unit this session claims.
    pub unit_id: UnitId,
    /// Whether this session is the unit's exclusive write-holder.
    pub is_blocking: bool,
    /// Whether the holder has voluntarily opened the unit for handover.
    /// Only ever true on a blocking session.
    pub handover_mode: bool,
    /// Whether this session was created by a second clinician joining a
    /// unit in handover mode. Always implies `is_blocking = false`.
    pub is_handover_receiver: bool,
    /// When the session was created. Immutable.
    pub started_at: DateTime<Utc>,
    /// Last activity timestamp, refreshed by the heartbeat.
    pub last_activity: DateTime<Utc>,
}

impl UnitSession {
    /// Whether this session is a blocking holder with handover open.
    pub fn is_handover_open(&self) -> bool {
        self.is_blocking && self.handover_mode
    }

    /// How long the session has been idle, in seconds.
    pub fn idle_seconds(&self) -> i64 {
        (Utc::now() - self.last_activity).num_seconds().max(0)
    }

    /// Whether the session's last activity is older than the given cutoff.
    pub fn is_stale_before(&self, cutoff: DateTime<Utc>) -> bool {
        self.last_activity < cutoff
    }
}

/// Data required to create a new unit session.
///
/// The blocking/receiver flags are not part of the payload; they are set
/// by the store's conditional insert operations so that the flags can
/// never disagree with the predicate that admitted the row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewUnitSession {
    /// The clinician requesting the session.
    pub user_id: UserId,
    /// The unit being claimed.
    pub unit_id: UnitId,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn session(last_activity: DateTime<Utc>) -> UnitSession {
        UnitSession {
            id: SessionId::new(),
            user_id: UserId::new(),
            unit_id: UnitId::new(),
            is_blocking: true,
            handover_mode: false,
            is_handover_receiver: false,
            started_at: last_activity,
            last_activity,
        }
    }

    #[test]
    fn test_handover_open_requires_blocking() {
        let mut s = session(Utc::now());
        s.handover_mode = true;
        assert!(s.is_handover_open());
        s.is_blocking = false;
        assert!(!s.is_handover_open());
    }

    #[test]
    fn test_stale_before_cutoff() {
        let now = Utc::now();
        let s = session(now - Duration::minutes(31));
        assert!(s.is_stale_before(now - Duration::minutes(30)));
        assert!(!s.is_stale_before(now - Duration::minutes(45)));
    }

    #[test]
    fn test_idle_seconds_non_negative() {
        let s = session(Utc::now() + Duration::seconds(5));
        assert_eq!(s.idle_seconds(), 0);
    }
}
