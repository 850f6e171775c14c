//! ICU unit entity model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use wardsync_core::types::UnitId;

/// One ICU ward.
///
/// Read-only to the coordination core: occupancy is entirely a property of
/// the session set for the unit's key, never stored on the unit itself.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Unit {
    /// Unique unit identifier.
    pub id: UnitId,
    /// Display name shown in the unit picker.
    pub name: String,
    /// Number of beds in the unit.
    pub bed_count: i32,
    /// When the unit was registered.
    pub created_at: DateTime<Utc>,
}
