//! Unified application error types for WardSync.
//!
//! All crates map their internal errors into [`AppError`] for consistent
//! propagation through the ? operator. Session-coordination outcomes that
//! callers branch on (occupancy conflicts, handover state, permission
//! checks) get their own [`ErrorKind`] so the UI layer can translate them
//! without string matching.

use std::fmt;
use thiserror::Error;

/// Top-level error kind categorization used across the entire application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ErrorKind {
    /// A `start` was attempted on a unit with a live blocking session.
    UnitOccupied,
    /// A receiver tried to join a unit whose handover is not open.
    HandoverNotOpen,
    /// A second receiver tried to join a unit already in handover.
    SlotTaken,
    /// The caller lacks the role or ownership required for the operation.
    PermissionDenied,
    /// The operation references a session row that no longer exists.
    StaleSession,
    /// The session store is temporarily unreachable.
    StoreUnavailable,
    /// The requested resource was not found.
    NotFound,
    /// A conflict occurred (duplicate entry, concurrent modification, etc.).
    Conflict,
    /// Input validation failed.
    Validation,
    /// A database error occurred.
    Database,
    /// A configuration error occurred.
    Configuration,
    /// A serialization/deserialization error occurred.
    Serialization,
    /// An internal error occurred.
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnitOccupied => write!(f, "UNIT_OCCUPIED"),
            Self::HandoverNotOpen => write!(f, "HANDOVER_NOT_OPEN"),
            Self::SlotTaken => write!(f, "SLOT_TAKEN"),
            Self::PermissionDenied => write!(f, "PERMISSION_DENIED"),
            Self::StaleSession => write!(f, "STALE_SESSION"),
            Self::StoreUnavailable => write!(f, "STORE_UNAVAILABLE"),
            Self::NotFound => write!(f, "NOT_FOUND"),
            Self::Conflict => write!(f, "CONFLICT"),
            Self::Validation => write!(f, "VALIDATION"),
            Self::Database => write!(f, "DATABASE"),
            Self::Configuration => write!(f, "CONFIGURATION"),
            Self::Serialization => write!(f, "SERIALIZATION"),
            Self::Internal => write!(f, "INTERNAL"),
        }
    }
}

/// The unified application error used throughout WardSync.
///
/// All crate-specific errors are mapped into `AppError` using `From` impls
/// or explicit `.map_err()` calls. The coordinator never retries or
/// swallows an error; translation into user-visible messages is the UI
/// consumer's responsibility.
#[derive(Debug, Error)]
#[error("{kind}: {message}")]
pub struct AppError {
    /// The category of error.
    pub kind: ErrorKind,
    /// A human-readable error message.
    pub message: String,
    /// Optional underlying cause.
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl AppError {
    /// Create a new application error.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// Create a new application error with an underlying cause.
    pub fn with_source(
        kind: ErrorKind,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a unit-occupied error.
    pub fn unit_occupied(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnitOccupied, message)
    }

    /// Create a handover-not-open error.
    pub fn handover_not_open(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::HandoverNotOpen, message)
    }

    /// Create a slot-taken error.
    pub fn slot_taken(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::SlotTaken, message)
    }

    /// Create a permission-denied error.
    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::PermissionDenied, message)
    }

    /// Create a stale-session error.
    pub fn stale_session(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::StaleSession, message)
    }

    /// Create a store-unavailable error.
    pub fn store_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::StoreUnavailable, message)
    }

    /// Create a not-found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    /// Create a conflict error.
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, message)
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    /// Create a database error.
    pub fn database(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Database, message)
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Configuration, message)
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }
}

impl Clone for AppError {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind,
            message: self.message.clone(),
            source: None,
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::with_source(
            ErrorKind::Serialization,
            format!("JSON serialization error: {err}"),
            err,
        )
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        Self::with_source(
            ErrorKind::Configuration,
            format!("Configuration error: {err}"),
            err,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_codes() {
        assert_eq!(ErrorKind::UnitOccupied.to_string(), "UNIT_OCCUPIED");
        assert_eq!(ErrorKind::SlotTaken.to_string(), "SLOT_TAKEN");
        assert_eq!(ErrorKind::StaleSession.to_string(), "STALE_SESSION");
    }

    #[test]
    fn test_display_includes_kind_and_message() {
        let err = AppError::unit_occupied("unit already has a holder");
        assert_eq!(err.to_string(), "UNIT_OCCUPIED: unit already has a holder");
    }

    #[test]
    fn test_clone_drops_source() {
        let io = std::io::Error::other("boom");
        let err = AppError::with_source(ErrorKind::Database, "query failed", io);
        let cloned = err.clone();
        assert_eq!(cloned.kind, ErrorKind::Database);
        assert!(cloned.source.is_none());
    }
}
