//! # wardsync-core
//!
//! Core crate for WardSync, the ICU unit-session coordination service.
//! Contains configuration schemas, typed identifiers, change-feed events,
//! and the unified error system.
//!
//! This crate has **no** internal dependencies on other WardSync crates.

pub mod config;
pub mod error;
pub mod events;
pub mod result;
pub mod types;

pub use error::AppError;
pub use result::AppResult;
