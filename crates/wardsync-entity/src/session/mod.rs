//! Unit session entity.

pub mod model;

pub use model::{NewUnitSession, UnitSession};
