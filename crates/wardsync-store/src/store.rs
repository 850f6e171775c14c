//! Session store trait for unit-session coordination.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

use wardsync_core::events::SessionChange;
use wardsync_core::result::AppResult;
use wardsync_core::types::{SessionId, UnitId, UserId};
use wardsync_entity::session::{NewUnitSession, UnitSession};

/// Trait for conditional, atomic session persistence.
///
/// Every conditional operation evaluates its predicate and applies its
/// write as a single atomic step inside the store; callers must never
/// implement any of these as a read followed by a separate write. The
/// coordinator holds no state of its own across requests, so correctness
/// rests entirely on these guarantees.
///
/// `stale_before` parameters carry the read-time expiry cutoff: rows whose
/// `last_activity` is older than the cutoff are excluded from occupancy
/// predicates even though they still physically exist.
#[async_trait]
pub trait SessionStore: Send + Sync + 'static {
    /// Find a session by ID.
    async fn find_by_id(&self, id: SessionId) -> AppResult<Option<UnitSession>>;

    /// List all sessions for a unit, stale rows included.
    async fn find_by_unit(&self, unit_id: UnitId) -> AppResult<Vec<UnitSession>>;

    /// List all sessions held by a clinician.
    async fn find_by_user(&self, user_id: UserId) -> AppResult<Vec<UnitSession>>;

    /// List every session row in the store.
    async fn find_all(&self) -> AppResult<Vec<UnitSession>>;

    /// Atomically create a blocking session, succeeding only if the unit
    /// has no blocking session with `last_activity >= stale_before`.
    ///
    /// A stale blocking row for the unit is purged in the same atomic
    /// step, so an abandoned session never blocks a fresh start. Fails
    /// with `UnitOccupied` when a live blocking session exists.
    async fn insert_blocking_if_free(
        &self,
        new: NewUnitSession,
        stale_before: DateTime<Utc>,
    ) -> AppResult<UnitSession>;

    /// Atomically create a receiver session, succeeding only if the unit
    /// has a live blocking session with `handover_mode = true` and no
    /// existing receiver.
    ///
    /// Fails with `HandoverNotOpen` when no live handover is open, and
    /// with `SlotTaken` when a receiver has already joined.
    async fn insert_receiver_if_open(
        &self,
        new: NewUnitSession,
        stale_before: DateTime<Utc>,
    ) -> AppResult<UnitSession>;

    /// Set or clear `handover_mode` on a blocking session.
    ///
    /// Opening fails with `NotFound` when the row is missing and with
    /// `Conflict` when the session is not blocking. Closing additionally
    /// fails with `Conflict` while a receiver session exists for the unit.
    async fn set_handover_mode(&self, id: SessionId, open: bool) -> AppResult<UnitSession>;

    /// Atomically promote a receiver to the unit's new blocking holder.
    ///
    /// In one transaction: deletes the unit's outgoing blocking session
    /// and flips the receiver to `is_blocking = true`, clearing the
    /// receiver and handover flags. Fails with `NotFound` when the
    /// receiver row is missing and with `StaleSession` when the outgoing
    /// blocking session is already gone.
    async fn promote_receiver(&self, receiver_id: SessionId) -> AppResult<UnitSession>;

    /// Refresh a session's `last_activity`. Returns `false` when the row
    /// no longer exists.
    async fn touch(&self, id: SessionId, at: DateTime<Utc>) -> AppResult<bool>;

    /// Delete a session if it exists. Returns `true` when a row was
    /// removed; an absent row is a no-op, never an error.
    async fn delete_if_exists(&self, id: SessionId) -> AppResult<bool>;

    /// Delete every session whose `last_activity` is older than the
    /// cutoff. Used only by the reconciliation sweep. Returns the number
    /// of rows removed.
    async fn delete_stale_before(&self, cutoff: DateTime<Utc>) -> AppResult<u64>;

    /// Subscribe to the change feed. Events are delivered in commit order.
    fn subscribe(&self) -> broadcast::Receiver<SessionChange>;
}
