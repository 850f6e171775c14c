//! Caller context passed into every coordinator operation.

use wardsync_core::types::UserId;
use wardsync_entity::user::ClinicianRole;

/// Identity of the clinician performing an operation.
///
/// Authentication happens outside this core; by the time a request
/// reaches the coordinator, the caller's id and role are established.
#[derive(Debug, Clone, Copy)]
pub struct CallerContext {
    /// The authenticated clinician.
    pub user_id: UserId,
    /// The clinician's role.
    pub role: ClinicianRole,
}

impl CallerContext {
    /// Creates a new caller context.
    pub fn new(user_id: UserId, role: ClinicianRole) -> Self {
        Self { user_id, role }
    }
}
