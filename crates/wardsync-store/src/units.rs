//! Read-only access to the unit directory.

use sqlx::PgPool;

use wardsync_core::error::{AppError, ErrorKind};
use wardsync_core::result::AppResult;
use wardsync_core::types::UnitId;
use wardsync_entity::Unit;

/// Read-only lookup of ICU units.
///
/// Unit administration lives outside this service; the coordination core
/// only needs names and identifiers for the unit picker and logs.
#[derive(Debug, Clone)]
pub struct UnitDirectory {
    pool: PgPool,
}

impl UnitDirectory {
    /// Create a directory over an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Find a unit by ID.
    pub async fn find_by_id(&self, id: UnitId) -> AppResult<Option<Unit>> {
        sqlx::query_as::<_, Unit>("SELECT * FROM units WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to find unit", e))
    }

    /// List every unit, ordered by name for the unit picker.
    pub async fn list(&self) -> AppResult<Vec<Unit>> {
        sqlx::query_as::<_, Unit>("SELECT * FROM units ORDER BY name ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to list units", e))
    }
}
