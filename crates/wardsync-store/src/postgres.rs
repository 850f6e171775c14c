//! PostgreSQL session store implementation.
//!
//! Every conditional operation is a single SQL statement (or one
//! transaction for the assumption), so the occupancy predicates and the
//! writes they guard are evaluated atomically by the database. The
//! partial unique indexes on `unit_sessions` back the mutual-exclusion
//! and single-receiver invariants even under concurrent inserts.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tokio::sync::broadcast;
use tracing::info;

use wardsync_core::error::{AppError, ErrorKind};
use wardsync_core::events::SessionChange;
use wardsync_core::result::AppResult;
use wardsync_core::types::{SessionId, UnitId, UserId};
use wardsync_entity::session::{NewUnitSession, UnitSession};

use crate::store::SessionStore;

/// Default capacity of the change-feed broadcast channel.
const CHANGE_FEED_CAPACITY: usize = 256;

/// PostgreSQL-backed session store.
///
/// Change events are broadcast in-process after each commit; a
/// multi-instance deployment would relay the same events over
/// LISTEN/NOTIFY.
#[derive(Debug, Clone)]
pub struct PostgresSessionStore {
    /// The underlying connection pool.
    pool: PgPool,
    /// Change-feed broadcast sender.
    changes: broadcast::Sender<SessionChange>,
}

impl PostgresSessionStore {
    /// Create a new store over an existing pool.
    pub fn new(pool: PgPool) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Self { pool, changes }
    }

    fn emit(&self, change: SessionChange) {
        let _ = self.changes.send(change);
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

    /// Map a unique-index violation on a conditional insert to its domain
    /// conflict; everything else is a database error.
    fn map_insert_error(err: sqlx::Error, conflict: AppError) -> AppError {
        match err {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => conflict,
            other => AppError::with_source(ErrorKind::Database, "Failed to insert session", other),
        }
    }
}

#[async_trait]
impl SessionStore for PostgresSessionStore {
    async fn find_by_id(&self, id: SessionId) -> AppResult<Option<UnitSession>> {
        sqlx::query_as::<_, UnitSession>("SELECT * FROM unit_sessions WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to find session", e))
    }

    async fn find_by_unit(&self, unit_id: UnitId) -> AppResult<Vec<UnitSession>> {
        sqlx::query_as::<_, UnitSession>(
            "SELECT * FROM unit_sessions WHERE unit_id = $1 ORDER BY started_at ASC",
        )
        .bind(unit_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to list unit sessions", e))
    }

    async fn find_by_user(&self, user_id: UserId) -> AppResult<Vec<UnitSession>> {
        sqlx::query_as::<_, UnitSession>(
            "SELECT * FROM unit_sessions WHERE user_id = $1 ORDER BY started_at ASC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to list user sessions", e))
    }

    async fn find_all(&self) -> AppResult<Vec<UnitSession>> {
        sqlx::query_as::<_, UnitSession>("SELECT * FROM unit_sessions ORDER BY started_at ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to list sessions", e))
    }

    async fn insert_blocking_if_free(
        &self,
        new: NewUnitSession,
        stale_before: DateTime<Utc>,
    ) -> AppResult<UnitSession> {
        // Purge and guarded insert run as two statements in one
        // transaction. A data-modifying CTE will not do here: Postgres
        // runs an unreferenced CTE delete after the main insert, so the
        // stale row would still trip the unique index and the whole
        // statement, purge included, would roll back.
        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to begin transaction", e)
        })?;

        let purged: Vec<SessionId> = sqlx::query_scalar(
            "DELETE FROM unit_sessions
             WHERE unit_id = $1 AND is_blocking AND last_activity < $2
             RETURNING id",
        )
        .bind(new.unit_id)
        .bind(stale_before)
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to purge stale sessions", e)
        })?;

        // The unique index is the backstop when two starts race past the
        // NOT EXISTS check.
        let session = sqlx::query_as::<_, UnitSession>(
            "INSERT INTO unit_sessions (user_id, unit_id, is_blocking)
             SELECT $1, $2, TRUE
             WHERE NOT EXISTS (
                 SELECT 1 FROM unit_sessions
                 WHERE unit_id = $2 AND is_blocking AND last_activity >= $3
             )
             RETURNING *",
        )
        .bind(new.user_id)
        .bind(new.unit_id)
        .bind(stale_before)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| {
            Self::map_insert_error(
                e,
                AppError::unit_occupied(format!(
                    "Unit {} already has a blocking session",
                    new.unit_id
                )),
            )
        })?
        .ok_or_else(|| {
            AppError::unit_occupied(format!(
                "Unit {} already has a blocking session",
                new.unit_id
            ))
        })?;

        tx.commit().await.map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to commit session insert", e)
        })?;

        for purged_id in purged {
            info!(session_id = %purged_id, unit_id = %new.unit_id, "Purged stale blocking session");
            self.emit(SessionChange::Deleted {
                session_id: purged_id,
                unit_id: new.unit_id,
            });
        }

        info!(session_id = %session.id, unit_id = %session.unit_id, user_id = %session.user_id, "Blocking session created");
        self.emit(SessionChange::Created {
            session_id: session.id,
            user_id: session.user_id,
            unit_id: session.unit_id,
            is_blocking: true,
        });
        Ok(session)
    }

    async fn insert_receiver_if_open(
        &self,
        new: NewUnitSession,
        stale_before: DateTime<Utc>,
    ) -> AppResult<UnitSession> {
        let session = sqlx::query_as::<_, UnitSession>(
            "INSERT INTO unit_sessions (user_id, unit_id, is_handover_receiver)
             SELECT $1, $2, TRUE
             WHERE EXISTS (
                 SELECT 1 FROM unit_sessions
                 WHERE unit_id = $2 AND is_blocking AND handover_mode AND last_activity >= $3
             )
             RETURNING *",
        )
        .bind(new.user_id)
        .bind(new.unit_id)
        .bind(stale_before)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Self::map_insert_error(
                e,
                AppError::slot_taken(format!(
                    "Unit {} already has a handover receiver",
                    new.unit_id
                )),
            )
        })?
        .ok_or_else(|| {
            AppError::handover_not_open(format!("Unit {} has no open handover", new.unit_id))
        })?;

        info!(session_id = %session.id, unit_id = %session.unit_id, user_id = %session.user_id, "Receiver session created");
        self.emit(SessionChange::Created {
            session_id: session.id,
            user_id: session.user_id,
            unit_id: session.unit_id,
            is_blocking: false,
        });
        Ok(session)
    }

    async fn set_handover_mode(&self, id: SessionId, open: bool) -> AppResult<UnitSession> {
        let updated = if open {
            sqlx::query_as::<_, UnitSession>(
                "UPDATE unit_sessions SET handover_mode = TRUE
                 WHERE id = $1 AND is_blocking
                 RETURNING *",
            )
            .bind(id)
            .fetch_optional(&self.pool)
            .await
        } else {
            sqlx::query_as::<_, UnitSession>(
                "UPDATE unit_sessions s SET handover_mode = FALSE
                 WHERE s.id = $1 AND s.is_blocking
                   AND NOT EXISTS (
                       SELECT 1 FROM unit_sessions r
                       WHERE r.unit_id = s.unit_id AND r.is_handover_receiver
                   )
                 RETURNING *",
            )
            .bind(id)
            .fetch_optional(&self.pool)
            .await
        }
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to update handover mode", e)
        })?;

        let session = match updated {
            Some(session) => session,
            None => {
                // Disambiguate: missing row vs. guarded-out update.
                let existing = self.find_by_id(id).await?;
                return match existing {
                    None => Err(AppError::not_found(format!("Session {id} not found"))),
                    Some(s) if !s.is_blocking => Err(AppError::conflict(
                        "Handover mode can only change on the blocking session",
                    )),
                    Some(_) => Err(AppError::conflict(
                        "Cannot close handover while a receiver has joined",
                    )),
                };
            }
        };

        info!(session_id = %id, unit_id = %session.unit_id, open = open, "Handover mode changed");
        self.emit(Self::updated_event(&session));
        Ok(session)
    }

    async fn promote_receiver(&self, receiver_id: SessionId) -> AppResult<UnitSession> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to begin transaction", e)
        })?;

        let receiver = sqlx::query_as::<_, UnitSession>(
            "SELECT * FROM unit_sessions WHERE id = $1 FOR UPDATE",
        )
        .bind(receiver_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to lock receiver", e))?
        .ok_or_else(|| AppError::not_found(format!("Session {receiver_id} not found")))?;

        if !receiver.is_handover_receiver {
            return Err(AppError::conflict(
                "Only a handover receiver can assume the shift",
            ));
        }

        let outgoing_id: Option<SessionId> = sqlx::query_scalar(
            "DELETE FROM unit_sessions
             WHERE unit_id = $1 AND is_blocking
             RETURNING id",
        )
        .bind(receiver.unit_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to remove outgoing session", e)
        })?;

        let Some(outgoing_id) = outgoing_id else {
            // Dropping the transaction rolls it back.
            return Err(AppError::stale_session(format!(
                "Outgoing blocking session for unit {} is gone",
                receiver.unit_id
            )));
        };

        let promoted = sqlx::query_as::<_, UnitSession>(
            "UPDATE unit_sessions
             SET is_blocking = TRUE, is_handover_receiver = FALSE,
                 handover_mode = FALSE, last_activity = NOW()
             WHERE id = $1
             RETURNING *",
        )
        .bind(receiver_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to promote receiver", e))?;

        tx.commit().await.map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to commit assumption", e)
        })?;

        info!(
            session_id = %promoted.id,
            unit_id = %promoted.unit_id,
            outgoing_session = %outgoing_id,
            "Shift assumed"
        );
        self.emit(SessionChange::Deleted {
            session_id: outgoing_id,
            unit_id: promoted.unit_id,
        });
        self.emit(Self::updated_event(&promoted));
        Ok(promoted)
    }

    async fn touch(&self, id: SessionId, at: DateTime<Utc>) -> AppResult<bool> {
        let updated = sqlx::query_as::<_, UnitSession>(
            "UPDATE unit_sessions SET last_activity = $2 WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(at)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to update last activity", e)
        })?;

        match updated {
            Some(session) => {
                self.emit(Self::updated_event(&session));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_if_exists(&self, id: SessionId) -> AppResult<bool> {
        let unit_id: Option<UnitId> =
            sqlx::query_scalar("DELETE FROM unit_sessions WHERE id = $1 RETURNING unit_id")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| {
                    AppError::with_source(ErrorKind::Database, "Failed to delete session", e)
                })?;

        match unit_id {
            Some(unit_id) => {
                info!(session_id = %id, unit_id = %unit_id, "Session deleted");
                self.emit(SessionChange::Deleted {
                    session_id: id,
                    unit_id,
                });
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_stale_before(&self, cutoff: DateTime<Utc>) -> AppResult<u64> {
        let removed: Vec<(SessionId, UnitId)> = sqlx::query_as(
            "DELETE FROM unit_sessions WHERE last_activity < $1 RETURNING id, unit_id",
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to sweep sessions", e))?;

        for (session_id, unit_id) in &removed {
            self.emit(SessionChange::Deleted {
                session_id: *session_id,
                unit_id: *unit_id,
            });
        }

        if !removed.is_empty() {
            info!(removed = removed.len(), "Swept stale sessions");
        }
        Ok(removed.len() as u64)
    }

    fn subscribe(&self) -> broadcast::Receiver<SessionChange> {
        self.changes.subscribe()
    }
}
