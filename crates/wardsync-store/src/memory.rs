//! In-memory session store using a Tokio mutex for single-node deployments.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, broadcast};
use tracing::{debug, info};

use wardsync_core::error::AppError;
use wardsync_core::events::SessionChange;
use wardsync_core::result::AppResult;
use wardsync_core::types::{SessionId, UnitId, UserId};
use wardsync_entity::session::{NewUnitSession, UnitSession};

use crate::store::SessionStore;

/// Default capacity of the change-feed broadcast channel.
const CHANGE_FEED_CAPACITY: usize = 256;

/// In-memory session store using a Tokio mutex for thread safety.
///
/// Every conditional operation evaluates its predicate and applies its
/// write while holding the single lock, which makes each operation atomic
/// with respect to all others. Suitable for tests and single-node
/// deployments only.
#[derive(Debug, Clone)]
pub struct MemorySessionStore {
    /// Protected session map.
    sessions: Arc<Mutex<HashMap<SessionId, UnitSession>>>,
    /// Change-feed broadcast sender.
    changes: broadcast::Sender<SessionChange>,
}

impl MemorySessionStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            changes,
        }
    }

    fn emit(&self, change: SessionChange) {
        // Send fails only when no subscriber exists, which is fine.
        let _ = self.changes.send(change);
    }

    fn created_event(session: &UnitSession) -> SessionChange {
        SessionChange::Created {
            session_id: session.id,
            user_id: session.user_id,
            unit_id: session.unit_id,
            is_blocking: session.is_blocking,
        }
    }

    fn updated_event(session: &UnitSession) -> SessionChange {
        SessionChange::Updated {
            session_id: session.id,
            unit_id: session.unit_id,
            is_blocking: session.is_blocking,
            handover_mode: session.handover_mode,
            is_handover_receiver: session.is_handover_receiver,
        }
    }
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn find_by_id(&self, id: SessionId) -> AppResult<Option<UnitSession>> {
        let sessions = self.sessions.lock().await;
        Ok(sessions.get(&id).cloned())
    }

    async fn find_by_unit(&self, unit_id: UnitId) -> AppResult<Vec<UnitSession>> {
        let sessions = self.sessions.lock().await;
        Ok(sessions
            .values()
            .filter(|s| s.unit_id == unit_id)
            .cloned()
            .collect())
    }

    async fn find_by_user(&self, user_id: UserId) -> AppResult<Vec<UnitSession>> {
        let sessions = self.sessions.lock().await;
        Ok(sessions
            .values()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn find_all(&self) -> AppResult<Vec<UnitSession>> {
        let sessions = self.sessions.lock().await;
        Ok(sessions.values().cloned().collect())
    }

    async fn insert_blocking_if_free(
        &self,
        new: NewUnitSession,
        stale_before: DateTime<Utc>,
    ) -> AppResult<UnitSession> {
        let mut sessions = self.sessions.lock().await;

        let live_blocking = sessions
            .values()
            .any(|s| s.unit_id == new.unit_id && s.is_blocking && s.last_activity >= stale_before);
        if live_blocking {
            return Err(AppError::unit_occupied(format!(
                "Unit {} already has a blocking session",
                new.unit_id
            )));
        }

        // Purge abandoned blocking rows for this unit in the same atomic
        // step so they never shadow the fresh holder.
        let stale_ids: Vec<SessionId> = sessions
            .values()
            .filter(|s| s.unit_id == new.unit_id && s.is_blocking)
            .map(|s| s.id)
            .collect();
        for id in stale_ids {
            if let Some(removed) = sessions.remove(&id) {
                debug!(session_id = %removed.id, unit_id = %removed.unit_id, "Purged stale blocking session");
                self.emit(SessionChange::Deleted {
                    session_id: removed.id,
                    unit_id: removed.unit_id,
                });
            }
        }

        let now = Utc::now();
        let session = UnitSession {
            id: SessionId::new(),
            user_id: new.user_id,
            unit_id: new.unit_id,
            is_blocking: true,
            handover_mode: false,
            is_handover_receiver: false,
            started_at: now,
            last_activity: now,
        };
        sessions.insert(session.id, session.clone());
        info!(session_id = %session.id, unit_id = %session.unit_id, user_id = %session.user_id, "Blocking session created");

        self.emit(Self::created_event(&session));
        Ok(session)
    }

    async fn insert_receiver_if_open(
        &self,
        new: NewUnitSession,
        stale_before: DateTime<Utc>,
    ) -> AppResult<UnitSession> {
        let mut sessions = self.sessions.lock().await;

        let handover_open = sessions.values().any(|s| {
            s.unit_id == new.unit_id
                && s.is_blocking
                && s.handover_mode
                && s.last_activity >= stale_before
        });
        if !handover_open {
            return Err(AppError::handover_not_open(format!(
                "Unit {} has no open handover",
                new.unit_id
            )));
        }

        let receiver_exists = sessions
            .values()
            .any(|s| s.unit_id == new.unit_id && s.is_handover_receiver);
        if receiver_exists {
            return Err(AppError::slot_taken(format!(
                "Unit {} already has a handover receiver",
                new.unit_id
            )));
        }

        let now = Utc::now();
        let session = UnitSession {
            id: SessionId::new(),
            user_id: new.user_id,
            unit_id: new.unit_id,
            is_blocking: false,
            handover_mode: false,
            is_handover_receiver: true,
            started_at: now,
            last_activity: now,
        };
        sessions.insert(session.id, session.clone());
        info!(session_id = %session.id, unit_id = %session.unit_id, user_id = %session.user_id, "Receiver session created");

        self.emit(Self::created_event(&session));
        Ok(session)
    }

    async fn set_handover_mode(&self, id: SessionId, open: bool) -> AppResult<UnitSession> {
        let mut sessions = self.sessions.lock().await;

        let current = sessions
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::not_found(format!("Session {id} not found")))?;

        if !current.is_blocking {
            return Err(AppError::conflict(
                "Handover mode can only change on the blocking session",
            ));
        }

        if !open {
            let receiver_exists = sessions
                .values()
                .any(|s| s.unit_id == current.unit_id && s.is_handover_receiver);
            if receiver_exists {
                return Err(AppError::conflict(
                    "Cannot close handover while a receiver has joined",
                ));
            }
        }

        let session = sessions
            .get_mut(&id)
            .ok_or_else(|| AppError::not_found(format!("Session {id} not found")))?;
        session.handover_mode = open;
        let updated = session.clone();
        info!(session_id = %id, unit_id = %updated.unit_id, open = open, "Handover mode changed");

        self.emit(Self::updated_event(&updated));
        Ok(updated)
    }

    async fn promote_receiver(&self, receiver_id: SessionId) -> AppResult<UnitSession> {
        let mut sessions = self.sessions.lock().await;

        let receiver = sessions
            .get(&receiver_id)
            .cloned()
            .ok_or_else(|| AppError::not_found(format!("Session {receiver_id} not found")))?;

        if !receiver.is_handover_receiver {
            return Err(AppError::conflict(
                "Only a handover receiver can assume the shift",
            ));
        }

        let outgoing_id = sessions
            .values()
            .find(|s| s.unit_id == receiver.unit_id && s.is_blocking)
            .map(|s| s.id)
            .ok_or_else(|| {
                AppError::stale_session(format!(
                    "Outgoing blocking session for unit {} is gone",
                    receiver.unit_id
                ))
            })?;

        let outgoing = sessions
            .remove(&outgoing_id)
            .ok_or_else(|| AppError::stale_session("Outgoing blocking session is gone"))?;
        self.emit(SessionChange::Deleted {
            session_id: outgoing.id,
            unit_id: outgoing.unit_id,
        });

        let session = sessions
            .get_mut(&receiver_id)
            .ok_or_else(|| AppError::not_found(format!("Session {receiver_id} not found")))?;
        session.is_blocking = true;
        session.is_handover_receiver = false;
        session.handover_mode = false;
        session.last_activity = Utc::now();
        let promoted = session.clone();
        info!(
            session_id = %promoted.id,
            unit_id = %promoted.unit_id,
            outgoing_session = %outgoing.id,
            "Shift assumed"
        );

        self.emit(Self::updated_event(&promoted));
        Ok(promoted)
    }

    async fn touch(&self, id: SessionId, at: DateTime<Utc>) -> AppResult<bool> {
        let mut sessions = self.sessions.lock().await;
        match sessions.get_mut(&id) {
            Some(session) => {
                session.last_activity = at;
                let updated = session.clone();
                self.emit(Self::updated_event(&updated));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_if_exists(&self, id: SessionId) -> AppResult<bool> {
        let mut sessions = self.sessions.lock().await;
        match sessions.remove(&id) {
            Some(removed) => {
                info!(session_id = %removed.id, unit_id = %removed.unit_id, "Session deleted");
                self.emit(SessionChange::Deleted {
                    session_id: removed.id,
                    unit_id: removed.unit_id,
                });
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_stale_before(&self, cutoff: DateTime<Utc>) -> AppResult<u64> {
        let mut sessions = self.sessions.lock().await;

        let stale_ids: Vec<SessionId> = sessions
            .values()
            .filter(|s| s.last_activity < cutoff)
            .map(|s| s.id)
            .collect();

        let mut removed = 0u64;
        for id in stale_ids {
            if let Some(gone) = sessions.remove(&id) {
                self.emit(SessionChange::Deleted {
                    session_id: gone.id,
                    unit_id: gone.unit_id,
                });
                removed += 1;
            }
        }

        if removed > 0 {
            info!(removed = removed, "Swept stale sessions");
        }
        Ok(removed)
    }

    fn subscribe(&self) -> broadcast::Receiver<SessionChange> {
        self.changes.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use wardsync_core::error::ErrorKind;

    fn new_session(unit_id: UnitId) -> NewUnitSession {
        NewUnitSession {
            user_id: UserId::new(),
            unit_id,
        }
    }

    fn cutoff() -> DateTime<Utc> {
        Utc::now() - Duration::minutes(30)
    }

    #[tokio::test]
    async fn test_second_blocking_insert_conflicts() {
        let store = MemorySessionStore::new();
        let unit_id = UnitId::new();

        store
            .insert_blocking_if_free(new_session(unit_id), cutoff())
            .await
            .unwrap();

        let err = store
            .insert_blocking_if_free(new_session(unit_id), cutoff())
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnitOccupied);
    }

    #[tokio::test]
    async fn test_stale_blocking_row_is_purged_on_insert() {
        let store = MemorySessionStore::new();
        let unit_id = UnitId::new();

        let stale = store
            .insert_blocking_if_free(new_session(unit_id), cutoff())
            .await
            .unwrap();

        // Pretend 31 minutes pass without a heartbeat.
        store
            .touch(stale.id, Utc::now() - Duration::minutes(31))
            .await
            .unwrap();

        let fresh = store
            .insert_blocking_if_free(new_session(unit_id), cutoff())
            .await
            .unwrap();
        assert_ne!(fresh.id, stale.id);
        assert!(store.find_by_id(stale.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_receiver_requires_open_handover() {
        let store = MemorySessionStore::new();
        let unit_id = UnitId::new();

        let holder = store
            .insert_blocking_if_free(new_session(unit_id), cutoff())
            .await
            .unwrap();

        let err = store
            .insert_receiver_if_open(new_session(unit_id), cutoff())
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::HandoverNotOpen);

        store.set_handover_mode(holder.id, true).await.unwrap();
        store
            .insert_receiver_if_open(new_session(unit_id), cutoff())
            .await
            .unwrap();

        let err = store
            .insert_receiver_if_open(new_session(unit_id), cutoff())
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::SlotTaken);
    }

    #[tokio::test]
    async fn test_close_handover_blocked_by_receiver() {
        let store = MemorySessionStore::new();
        let unit_id = UnitId::new();

        let holder = store
            .insert_blocking_if_free(new_session(unit_id), cutoff())
            .await
            .unwrap();
        store.set_handover_mode(holder.id, true).await.unwrap();
        store
            .insert_receiver_if_open(new_session(unit_id), cutoff())
            .await
            .unwrap();

        let err = store.set_handover_mode(holder.id, false).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn test_promote_receiver_swaps_holder_atomically() {
        let store = MemorySessionStore::new();
        let unit_id = UnitId::new();

        let holder = store
            .insert_blocking_if_free(new_session(unit_id), cutoff())
            .await
            .unwrap();
        store.set_handover_mode(holder.id, true).await.unwrap();
        let receiver = store
            .insert_receiver_if_open(new_session(unit_id), cutoff())
            .await
            .unwrap();

        let promoted = store.promote_receiver(receiver.id).await.unwrap();
        assert!(promoted.is_blocking);
        assert!(!promoted.is_handover_receiver);
        assert!(!promoted.handover_mode);
        assert!(store.find_by_id(holder.id).await.unwrap().is_none());

        let remaining = store.find_by_unit(unit_id).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, receiver.id);
    }

    #[tokio::test]
    async fn test_promote_without_outgoing_is_stale() {
        let store = MemorySessionStore::new();
        let unit_id = UnitId::new();

        let holder = store
            .insert_blocking_if_free(new_session(unit_id), cutoff())
            .await
            .unwrap();
        store.set_handover_mode(holder.id, true).await.unwrap();
        let receiver = store
            .insert_receiver_if_open(new_session(unit_id), cutoff())
            .await
            .unwrap();

        // Force-disconnect races the assumption.
        store.delete_if_exists(holder.id).await.unwrap();

        let err = store.promote_receiver(receiver.id).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::StaleSession);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let store = MemorySessionStore::new();
        let unit_id = UnitId::new();

        let session = store
            .insert_blocking_if_free(new_session(unit_id), cutoff())
            .await
            .unwrap();

        assert!(store.delete_if_exists(session.id).await.unwrap());
        assert!(!store.delete_if_exists(session.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_sweep_removes_only_stale_rows() {
        let store = MemorySessionStore::new();
        let fresh = store
            .insert_blocking_if_free(new_session(UnitId::new()), cutoff())
            .await
            .unwrap();
        let old = store
            .insert_blocking_if_free(new_session(UnitId::new()), cutoff())
            .await
            .unwrap();
        store
            .touch(old.id, Utc::now() - Duration::hours(2))
            .await
            .unwrap();

        let removed = store
            .delete_stale_before(Utc::now() - Duration::minutes(90))
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert!(store.find_by_id(fresh.id).await.unwrap().is_some());
        assert!(store.find_by_id(old.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_change_feed_order() {
        let store = MemorySessionStore::new();
        let mut feed = store.subscribe();
        let unit_id = UnitId::new();

        let session = store
            .insert_blocking_if_free(new_session(unit_id), cutoff())
            .await
            .unwrap();
        store.delete_if_exists(session.id).await.unwrap();

        match feed.recv().await.unwrap() {
            SessionChange::Created {
                session_id,
                is_blocking,
                ..
            } => {
                assert_eq!(session_id, session.id);
                assert!(is_blocking);
            }
            other => panic!("expected Created, got {other:?}"),
        }
        match feed.recv().await.unwrap() {
            SessionChange::Deleted { session_id, .. } => assert_eq!(session_id, session.id),
            other => panic!("expected Deleted, got {other:?}"),
        }
    }
}
