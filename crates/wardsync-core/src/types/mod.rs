//! Shared value types used across WardSync crates.

pub mod id;

pub use id::{SessionId, UnitId, UserId};
