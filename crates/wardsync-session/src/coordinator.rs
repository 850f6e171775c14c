//! Unit session coordinator.
//!
//! Drives the per-unit occupancy state machine: acquisition of the
//! exclusive blocking slot, opening and closing a shift handover,
//! receiver join, assumption, and release. The coordinator keeps no
//! state of its own between calls; every conditional decision is a
//! single atomic operation against the [`SessionStore`], and the unit's
//! state is derived from the session set on every read.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use wardsync_core::error::AppError;
use wardsync_core::result::AppResult;
use wardsync_core::types::{SessionId, UnitId};
use wardsync_entity::session::{NewUnitSession, UnitSession};
use wardsync_store::SessionStore;

use crate::access::AccessPolicy;
use crate::context::CallerContext;
use crate::expiry::{Countdown, ExpiryPolicy};
use crate::heartbeat::ActivityHeartbeat;

/// Result of a `start` or `join_as_receiver` call.
#[derive(Debug, Clone)]
pub enum StartOutcome {
    /// A session row was created; the caller now holds it.
    Granted(UnitSession),
    /// The caller's role bypasses exclusivity; no row was created and
    /// none is needed.
    Bypassed,
}

impl StartOutcome {
    /// The granted session, if one was created.
    pub fn session(&self) -> Option<&UnitSession> {
        match self {
            Self::Granted(session) => Some(session),
            Self::Bypassed => None,
        }
    }
}

/// Occupancy state of a unit, derived from its live session set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitState {
    /// No live blocking session.
    Free,
    /// One live blocking session, handover closed.
    Occupied,
    /// The holder has opened the unit for handover; no receiver yet.
    HandoverOpen,
    /// A receiver has joined and the assumption is pending.
    HandoverPending,
}

/// Derives a unit's state from its sessions, ignoring rows whose
/// `last_activity` predates the cutoff.
pub fn derive_unit_state(
    sessions: &[UnitSession],
    stale_before: chrono::DateTime<Utc>,
) -> UnitState {
    let mut blocking: Option<&UnitSession> = None;
    let mut has_receiver = false;
    for session in sessions {
        if session.is_stale_before(stale_before) {
            continue;
        }
        if session.is_blocking {
            blocking = Some(session);
        } else if session.is_handover_receiver {
            has_receiver = true;
        }
    }
    match blocking {
        None => UnitState::Free,
        Some(holder) if has_receiver => {
            debug_assert!(holder.handover_mode);
            UnitState::HandoverPending
        }
        Some(holder) if holder.handover_mode => UnitState::HandoverOpen,
        Some(_) => UnitState::Occupied,
    }
}

/// Coordinates exclusive unit occupancy and shift handover.
#[derive(Clone)]
pub struct SessionCoordinator {
    store: Arc<dyn SessionStore>,
    access: AccessPolicy,
    expiry: ExpiryPolicy,
    heartbeat: ActivityHeartbeat,
}

impl SessionCoordinator {
    /// Creates a new coordinator over the given store and policies.
    pub fn new(
        store: Arc<dyn SessionStore>,
        access: AccessPolicy,
        expiry: ExpiryPolicy,
        heartbeat: ActivityHeartbeat,
    ) -> Self {
        Self {
            store,
            access,
            expiry,
            heartbeat,
        }
    }

    /// Claims the unit's exclusive blocking slot for the caller.
    ///
    /// Privileged callers bypass exclusivity entirely: no row is created
    /// and `Bypassed` is returned. For everyone else this is a single
    /// conditional insert; a live blocking session for the unit yields
    /// `UnitOccupied`, while a stale one is purged in the same step.
    pub async fn start(&self, ctx: &CallerContext, unit_id: UnitId) -> AppResult<StartOutcome> {
        if self.access.can_bypass_exclusivity(&ctx.role) {
            info!(user_id = %ctx.user_id, unit_id = %unit_id, role = %ctx.role, "Exclusivity bypassed, no session created");
            return Ok(StartOutcome::Bypassed);
        }

        let session = self
            .store
            .insert_blocking_if_free(
                NewUnitSession {
                    user_id: ctx.user_id,
                    unit_id,
                },
                self.expiry.stale_cutoff(Utc::now()),
            )
            .await?;

        info!(session_id = %session.id, user_id = %ctx.user_id, unit_id = %unit_id, "Unit session started");
        Ok(StartOutcome::Granted(session))
    }

    /// Opens the caller's blocking session for handover.
    ///
    /// Holder-only: privilege does not substitute for ownership here,
    /// since handover is a voluntary act of the outgoing clinician.
    pub async fn open_handover(
        &self,
        ctx: &CallerContext,
        session_id: SessionId,
    ) -> AppResult<UnitSession> {
        let session = self.require_session(session_id).await?;
        self.access.require_owner(ctx, session.user_id)?;

        let updated = self.store.set_handover_mode(session_id, true).await?;
        info!(session_id = %session_id, unit_id = %updated.unit_id, "Handover opened");
        Ok(updated)
    }

    /// Closes handover on the caller's blocking session.
    ///
    /// Fails with `Conflict` once a receiver has joined; the handover can
    /// then only complete through assumption or the receiver releasing.
    pub async fn close_handover(
        &self,
        ctx: &CallerContext,
        session_id: SessionId,
    ) -> AppResult<UnitSession> {
        let session = self.require_session(session_id).await?;
        self.access.require_owner(ctx, session.user_id)?;

        let updated = self.store.set_handover_mode(session_id, false).await?;
        info!(session_id = %session_id, unit_id = %updated.unit_id, "Handover closed");
        Ok(updated)
    }

    /// Joins a unit in open handover as the incoming receiver.
    ///
    /// Privileged callers bypass, as with [`start`](Self::start). The
    /// receiver slot is singular: a second joiner gets `SlotTaken`.
    pub async fn join_as_receiver(
        &self,
        ctx: &CallerContext,
        unit_id: UnitId,
    ) -> AppResult<StartOutcome> {
        if self.access.can_bypass_exclusivity(&ctx.role) {
            info!(user_id = %ctx.user_id, unit_id = %unit_id, role = %ctx.role, "Exclusivity bypassed, not joining handover");
            return Ok(StartOutcome::Bypassed);
        }

        let session = self
            .store
            .insert_receiver_if_open(
                NewUnitSession {
                    user_id: ctx.user_id,
                    unit_id,
                },
                self.expiry.stale_cutoff(Utc::now()),
            )
            .await?;

        info!(session_id = %session.id, user_id = %ctx.user_id, unit_id = %unit_id, "Joined handover as receiver");
        Ok(StartOutcome::Granted(session))
    }

    /// Completes the handover: the receiver assumes the unit.
    ///
    /// Deletes the outgoing blocking session and promotes the receiver in
    /// one store transaction. Only the receiver themselves or a
    /// privileged caller may confirm. `StaleSession` means the outgoing
    /// holder disappeared first; the receiver must rejoin via `start`.
    pub async fn confirm_assumption(
        &self,
        ctx: &CallerContext,
        receiver_session_id: SessionId,
    ) -> AppResult<UnitSession> {
        let receiver = self.require_session(receiver_session_id).await?;
        self.access.require_owner_or_privileged(ctx, receiver.user_id)?;

        if !receiver.is_handover_receiver {
            return Err(AppError::conflict(
                "Only a handover receiver session can assume a unit",
            ));
        }

        let promoted = self.store.promote_receiver(receiver_session_id).await?;
        info!(
            session_id = %promoted.id,
            unit_id = %promoted.unit_id,
            user_id = %promoted.user_id,
            "Handover assumption confirmed"
        );
        Ok(promoted)
    }

    /// Releases a session. Idempotent: releasing an already-gone session
    /// returns `Ok(false)`.
    ///
    /// Clinicians release their own sessions; privileged callers may
    /// release anyone's.
    pub async fn release(&self, ctx: &CallerContext, session_id: SessionId) -> AppResult<bool> {
        let Some(session) = self.store.find_by_id(session_id).await? else {
            return Ok(false);
        };
        self.access.require_owner_or_privileged(ctx, session.user_id)?;

        let removed = self.store.delete_if_exists(session_id).await?;
        self.heartbeat.forget(session_id);
        if removed {
            info!(session_id = %session_id, unit_id = %session.unit_id, "Unit session released");
        }
        Ok(removed)
    }

    /// Forcibly disconnects another clinician's session. Privileged-only.
    pub async fn force_disconnect(
        &self,
        ctx: &CallerContext,
        session_id: SessionId,
    ) -> AppResult<bool> {
        self.access.require_privileged(ctx)?;

        let removed = self.store.delete_if_exists(session_id).await?;
        self.heartbeat.forget(session_id);
        if removed {
            warn!(session_id = %session_id, admin = %ctx.user_id, "Session force-disconnected");
        }
        Ok(removed)
    }

    /// Signals holder activity. Debounced; see [`ActivityHeartbeat`].
    pub async fn touch(&self, session_id: SessionId) -> AppResult<bool> {
        self.heartbeat.touch(session_id).await
    }

    /// The caller's live session, if any. Stale rows are invisible here
    /// even though they may still physically exist.
    pub async fn current_session(&self, ctx: &CallerContext) -> AppResult<Option<UnitSession>> {
        let cutoff = self.expiry.stale_cutoff(Utc::now());
        let sessions = self.store.find_by_user(ctx.user_id).await?;
        Ok(sessions.into_iter().find(|s| !s.is_stale_before(cutoff)))
    }

    /// Whether the caller's role is exempt from unit exclusivity.
    pub fn can_bypass_exclusivity(&self, ctx: &CallerContext) -> bool {
        self.access.can_bypass_exclusivity(&ctx.role)
    }

    /// Whether the unit currently has an open handover (with or without
    /// a receiver).
    pub async fn is_unit_in_handover(&self, unit_id: UnitId) -> AppResult<bool> {
        Ok(matches!(
            self.unit_state(unit_id).await?,
            UnitState::HandoverOpen | UnitState::HandoverPending
        ))
    }

    /// The unit's occupancy state, derived from its live sessions.
    pub async fn unit_state(&self, unit_id: UnitId) -> AppResult<UnitState> {
        let sessions = self.store.find_by_unit(unit_id).await?;
        Ok(derive_unit_state(
            &sessions,
            self.expiry.stale_cutoff(Utc::now()),
        ))
    }

    /// Countdown state for the session's header display.
    pub fn remaining_time(&self, session: &UnitSession) -> Countdown {
        self.expiry.countdown(session.last_activity, Utc::now())
    }

    /// Every live session in the system. Privileged-only; backs the admin
    /// occupancy monitor.
    pub async fn list_active_sessions(&self, ctx: &CallerContext) -> AppResult<Vec<UnitSession>> {
        self.access.require_privileged(ctx)?;

        let cutoff = self.expiry.stale_cutoff(Utc::now());
        let mut sessions = self.store.find_all().await?;
        sessions.retain(|s| !s.is_stale_before(cutoff));
        Ok(sessions)
    }

    async fn require_session(&self, session_id: SessionId) -> AppResult<UnitSession> {
        self.store
            .find_by_id(session_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Session {session_id} not found")))
    }
}
