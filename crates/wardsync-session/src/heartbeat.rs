//! Debounced activity heartbeat.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use dashmap::DashMap;
use tracing::debug;

use wardsync_core::config::session::SessionConfig;
use wardsync_core::result::AppResult;
use wardsync_core::types::SessionId;
use wardsync_store::SessionStore;

/// Debounces `last_activity` refreshes to at most one store write per
/// session per debounce window.
///
/// The UI may call [`touch`](ActivityHeartbeat::touch) on every click,
/// keypress, or scroll; most calls return without touching the store.
/// The debounce key is the session, and the debounce state is local to
/// this process — two tabs holding the same session each debounce
/// independently, which only means the store sees at most one write per
/// window per tab.
#[derive(Clone)]
pub struct ActivityHeartbeat {
    /// Session persistence.
    store: Arc<dyn SessionStore>,
    /// Minimum interval between store writes for one session.
    window: Duration,
    /// Last flush instant per session.
    last_flush: Arc<DashMap<SessionId, Instant>>,
}

impl std::fmt::Debug for ActivityHeartbeat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivityHeartbeat")
            .field("window", &self.window)
            .finish()
    }
}

impl ActivityHeartbeat {
    /// Creates a heartbeat from configuration.
    pub fn from_config(store: Arc<dyn SessionStore>, config: &SessionConfig) -> Self {
        Self::new(
            store,
            Duration::from_secs(config.heartbeat_debounce_seconds),
        )
    }

    /// Creates a heartbeat with an explicit debounce window.
    pub fn new(store: Arc<dyn SessionStore>, window: Duration) -> Self {
        Self {
            store,
            window,
            last_flush: Arc::new(DashMap::new()),
        }
    }

    /// Signals that the session's holder is still active.
    ///
    /// Returns `true` when the activity was flushed to the store, `false`
    /// when it was absorbed by the debounce window or the session row no
    /// longer exists.
    pub async fn touch(&self, session_id: SessionId) -> AppResult<bool> {
        let now = Instant::now();

        if let Some(last) = self.last_flush.get(&session_id) {
            if now.duration_since(*last) < self.window {
                return Ok(false);
            }
        }

        // Record the flush before the write so a burst of calls during a
        // slow store round trip still collapses into one write.
        self.last_flush.insert(session_id, now);

        let updated = match self.store.touch(session_id, Utc::now()).await {
            Ok(updated) => updated,
            Err(err) => {
                // A failed write must not count as a flush, or a transient
                // store error would mute the heartbeat for a full window.
                self.last_flush.remove(&session_id);
                return Err(err);
            }
        };
        if !updated {
            // Row is gone (released or force-disconnected); nothing to
            // refresh and nothing worth surfacing to the caller.
            debug!(session_id = %session_id, "Heartbeat for absent session ignored");
            self.last_flush.remove(&session_id);
        }
        Ok(updated)
    }

    /// Drops the debounce state for a session that no longer exists.
    pub fn forget(&self, session_id: SessionId) {
        self.last_flush.remove(&session_id);
    }
}
