//! Session change-feed events.
//!
//! Events carry identifiers and flags only. Subscribers are expected to
//! re-derive unit occupancy from a fresh store read rather than trusting
//! the payload — different clients observe events at different times, and
//! only the store is authoritative.

use serde::{Deserialize, Serialize};

use crate::types::{SessionId, UnitId, UserId};

/// Change events delivered to all store subscribers, in commit order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SessionChange {
    /// A session row was inserted.
    Created {
        /// The session ID.
        session_id: SessionId,
        /// The clinician holding the session.
        user_id: UserId,
        /// The unit the session claims.
        unit_id: UnitId,
        /// Whether the new session is the unit's blocking holder.
        is_blocking: bool,
    },
    /// A session row was updated (flag transition or activity refresh).
    Updated {
        /// The session ID.
        session_id: SessionId,
        /// The unit the session claims.
        unit_id: UnitId,
        /// Whether the session is now the unit's blocking holder.
        is_blocking: bool,
        /// Whether the holder has opened the unit for handover.
        handover_mode: bool,
        /// Whether the session is a handover receiver.
        is_handover_receiver: bool,
    },
    /// A session row was deleted.
    Deleted {
        /// The session ID.
        session_id: SessionId,
        /// The unit the session claimed.
        unit_id: UnitId,
    },
}

impl SessionChange {
    /// Return the unit this change concerns.
    pub fn unit_id(&self) -> UnitId {
        match self {
            Self::Created { unit_id, .. }
            | Self::Updated { unit_id, .. }
            | Self::Deleted { unit_id, .. } => *unit_id,
        }
    }

    /// Return the session this change concerns.
    pub fn session_id(&self) -> SessionId {
        match self {
            Self::Created { session_id, .. }
            | Self::Updated { session_id, .. }
            | Self::Deleted { session_id, .. } => *session_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tagged_serialization() {
        let change = SessionChange::Deleted {
            session_id: SessionId::new(),
            unit_id: UnitId::new(),
        };
        let json = serde_json::to_string(&change).expect("serialize");
        assert!(json.contains("\"type\":\"Deleted\""));
    }

    #[test]
    fn test_accessors() {
        let unit_id = UnitId::new();
        let session_id = SessionId::new();
        let change = SessionChange::Created {
            session_id,
            user_id: UserId::new(),
            unit_id,
            is_blocking: true,
        };
        assert_eq!(change.unit_id(), unit_id);
        assert_eq!(change.session_id(), session_id);
    }
}
