//! # wardsync-entity
//!
//! Domain entity models for WardSync. Every struct in this crate
//! represents a database table row or a domain value object. All entities
//! derive `Debug`, `Clone`, `Serialize`, `Deserialize`, and database
//! entities additionally derive `sqlx::FromRow`.

pub mod session;
pub mod unit;
pub mod user;

pub use session::{NewUnitSession, UnitSession};
pub use unit::Unit;
pub use user::ClinicianRole;
