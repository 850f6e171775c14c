//! Reconciliation sweep for abandoned session rows.
//!
//! Read-time expiry already hides stale rows from every occupancy
//! predicate, so the sweep is housekeeping, not correctness: it deletes
//! rows whose holder has been gone long past the inactivity threshold
//! so the table and the change feed stay small.

use std::sync::Arc;

use chrono::{Duration, Utc};
use tokio_cron_scheduler::{Job as CronJob, JobScheduler};
use tracing::{debug, error, info};

use wardsync_core::config::session::SweepConfig;
use wardsync_core::error::AppError;
use wardsync_core::result::AppResult;
use wardsync_store::SessionStore;

use crate::expiry::ExpiryPolicy;

/// Deletes session rows abandoned longer than `inactivity + grace`.
#[derive(Clone)]
pub struct SessionSweeper {
    store: Arc<dyn SessionStore>,
    expiry: ExpiryPolicy,
    grace: Duration,
}

impl std::fmt::Debug for SessionSweeper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionSweeper")
            .field("grace", &self.grace)
            .finish()
    }
}

impl SessionSweeper {
    /// Creates a sweeper from configuration.
    pub fn from_config(
        store: Arc<dyn SessionStore>,
        expiry: ExpiryPolicy,
        config: &SweepConfig,
    ) -> Self {
        Self::new(store, expiry, Duration::minutes(config.grace_minutes as i64))
    }

    /// Creates a sweeper with an explicit grace period beyond the
    /// inactivity threshold.
    pub fn new(store: Arc<dyn SessionStore>, expiry: ExpiryPolicy, grace: Duration) -> Self {
        Self {
            store,
            expiry,
            grace,
        }
    }

    /// Runs one sweep pass. Returns the number of rows deleted.
    pub async fn run_sweep(&self) -> AppResult<u64> {
        let cutoff = self.expiry.stale_cutoff(Utc::now()) - self.grace;
        let removed = self.store.delete_stale_before(cutoff).await?;
        if removed > 0 {
            info!(removed, %cutoff, "Swept abandoned unit sessions");
        } else {
            debug!(%cutoff, "Sweep pass found nothing to remove");
        }
        Ok(removed)
    }
}

/// Cron wrapper running the sweeper on a fixed schedule.
pub struct SweepScheduler {
    scheduler: JobScheduler,
}

impl std::fmt::Debug for SweepScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SweepScheduler").finish()
    }
}

impl SweepScheduler {
    /// Creates a scheduler with the sweep registered on the configured
    /// cron expression.
    pub async fn new(sweeper: SessionSweeper, config: &SweepConfig) -> AppResult<Self> {
        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| AppError::internal(format!("Failed to create scheduler: {}", e)))?;

        let schedule = config.schedule.clone();
        let job = CronJob::new_async(schedule.as_str(), move |_uuid, _lock| {
            let sweeper = sweeper.clone();
            Box::pin(async move {
                if let Err(e) = sweeper.run_sweep().await {
                    error!("Session sweep failed: {}", e);
                }
            })
        })
        .map_err(|e| AppError::internal(format!("Failed to create sweep schedule: {}", e)))?;

        scheduler
            .add(job)
            .await
            .map_err(|e| AppError::internal(format!("Failed to add sweep schedule: {}", e)))?;

        info!(schedule = %schedule, "Registered: session sweep");
        Ok(Self { scheduler })
    }

    /// Starts the scheduler.
    pub async fn start(&self) -> AppResult<()> {
        self.scheduler
            .start()
            .await
            .map_err(|e| AppError::internal(format!("Failed to start scheduler: {}", e)))?;

        info!("Sweep scheduler started");
        Ok(())
    }

    /// Shuts the scheduler down.
    pub async fn shutdown(&mut self) -> AppResult<()> {
        self.scheduler
            .shutdown()
            .await
            .map_err(|e| AppError::internal(format!("Failed to shutdown scheduler: {}", e)))?;

        info!("Sweep scheduler shut down");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wardsync_core::types::{UnitId, UserId};
    use wardsync_entity::session::NewUnitSession;
    use wardsync_store::MemorySessionStore;

    fn policy() -> ExpiryPolicy {
        ExpiryPolicy::new(Duration::minutes(30), Duration::minutes(5))
    }

    async fn insert_with_age(store: &MemorySessionStore, unit_id: UnitId, age_minutes: i64) {
        let session = store
            .insert_blocking_if_free(
                NewUnitSession {
                    user_id: UserId::new(),
                    unit_id,
                },
                Utc::now() - Duration::minutes(30),
            )
            .await
            .unwrap();
        store
            .touch(session.id, Utc::now() - Duration::minutes(age_minutes))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_sweep_removes_only_long_abandoned_rows() {
        let store = Arc::new(MemorySessionStore::new());
        // Past threshold + grace: swept.
        insert_with_age(&store, UnitId::new(), 120).await;
        // Stale but within grace: hidden from occupancy yet kept.
        insert_with_age(&store, UnitId::new(), 45).await;
        // Fresh: kept.
        insert_with_age(&store, UnitId::new(), 5).await;

        let sweeper = SessionSweeper::new(Arc::clone(&store) as _, policy(), Duration::minutes(60));
        assert_eq!(sweeper.run_sweep().await.unwrap(), 1);
        assert_eq!(store.find_all().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_sweep_on_empty_store_is_a_noop() {
        let store = Arc::new(MemorySessionStore::new());
        let sweeper = SessionSweeper::new(store, policy(), Duration::minutes(60));
        assert_eq!(sweeper.run_sweep().await.unwrap(), 0);
    }
}
