//! WardSync Server — ICU unit-session coordination service.
//!
//! Main entry point that wires the store, coordinator, and sweep
//! together and runs until a shutdown signal arrives.

use std::sync::Arc;

use tracing_subscriber::{EnvFilter, fmt};

use wardsync_core::config::AppConfig;
use wardsync_core::error::AppError;
use wardsync_session::{
    AccessPolicy, ActivityHeartbeat, ExpiryPolicy, SessionCoordinator, SessionSweeper,
    SweepScheduler,
};
use wardsync_store::{DatabasePool, PostgresSessionStore, SessionStore, UnitDirectory};

#[tokio::main]
async fn main() {
    let config = match load_configuration() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    init_logging(&config);

    if let Err(e) = run(config).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}

/// Load configuration from file and environment
fn load_configuration() -> Result<AppConfig, AppError> {
    let env = std::env::var("WARDSYNC_ENV").unwrap_or_else(|_| "development".to_string());
    AppConfig::load(&env)
}

/// Initialize tracing/logging
fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .init();
        }
        _ => {
            fmt()
                .pretty()
                .with_env_filter(filter)
                .with_target(true)
                .init();
        }
    }
}

/// Main server run function
async fn run(config: AppConfig) -> Result<(), AppError> {
    tracing::info!("Starting WardSync v{}", env!("CARGO_PKG_VERSION"));

    // ── Step 1: Database connection + migrations ─────────────────
    let db_pool = DatabasePool::connect(&config.database).await?;
    wardsync_store::migration::run_migrations(db_pool.pool()).await?;

    // ── Step 2: Store and coordination core ──────────────────────
    let store: Arc<dyn SessionStore> = Arc::new(PostgresSessionStore::new(db_pool.pool().clone()));
    let expiry = ExpiryPolicy::from_config(&config.session);
    let heartbeat = ActivityHeartbeat::from_config(Arc::clone(&store), &config.session);
    let coordinator = SessionCoordinator::new(
        Arc::clone(&store),
        AccessPolicy::new(),
        expiry,
        heartbeat,
    );
    tracing::info!("Session coordinator initialized");

    // ── Step 3: Occupancy monitor ────────────────────────────────
    // Logs each unit's derived state as the change feed moves.
    let monitor = {
        let mut feed = store.subscribe();
        let coordinator = coordinator.clone();
        let units = UnitDirectory::new(db_pool.pool().clone());
        tokio::spawn(async move {
            loop {
                match feed.recv().await {
                    Ok(change) => {
                        let unit_id = change.unit_id();
                        let name = match units.find_by_id(unit_id).await {
                            Ok(Some(unit)) => unit.name,
                            _ => unit_id.to_string(),
                        };
                        match coordinator.unit_state(unit_id).await {
                            Ok(state) => {
                                tracing::info!(unit = %name, state = ?state, "Unit occupancy changed")
                            }
                            Err(e) => tracing::warn!("Failed to derive unit state: {}", e),
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Occupancy monitor lagged behind the change feed");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    };

    // ── Step 4: Reconciliation sweep ─────────────────────────────
    let mut sweep_scheduler = if config.session.sweep.enabled {
        let sweeper = SessionSweeper::from_config(Arc::clone(&store), expiry, &config.session.sweep);
        let scheduler = SweepScheduler::new(sweeper, &config.session.sweep).await?;
        scheduler.start().await?;
        Some(scheduler)
    } else {
        tracing::info!("Reconciliation sweep disabled");
        None
    };

    tracing::info!("WardSync server running");

    // ── Step 5: Graceful shutdown ────────────────────────────────
    shutdown_signal().await;
    tracing::info!("Shutdown signal received, starting graceful shutdown...");

    if let Some(scheduler) = sweep_scheduler.as_mut() {
        scheduler.shutdown().await?;
    }
    monitor.abort();
    db_pool.close().await;

    tracing::info!("WardSync server shut down gracefully");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
