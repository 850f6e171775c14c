//! Access policy — maps clinician roles to exclusivity regimes.

use wardsync_core::error::AppError;
use wardsync_core::types::UserId;
use wardsync_entity::user::ClinicianRole;

use crate::context::CallerContext;

/// The two regimes a caller can fall under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessRegime {
    /// The caller must hold a blocking session to read/write unit-scoped
    /// clinical data for a unit.
    Exclusive,
    /// The caller never needs a session; coordinator writes are no-ops
    /// and all units are readable regardless of who holds them.
    Bypass,
}

/// Enforces role-based access to session coordination operations.
#[derive(Debug, Clone, Default)]
pub struct AccessPolicy;

impl AccessPolicy {
    /// Creates a new policy with the default role mapping.
    pub fn new() -> Self {
        Self
    }

    /// Returns the regime the given role falls under.
    pub fn regime_for(&self, role: &ClinicianRole) -> AccessRegime {
        if role.is_privileged() {
            AccessRegime::Bypass
        } else {
            AccessRegime::Exclusive
        }
    }

    /// Whether the role is exempt from unit exclusivity.
    pub fn can_bypass_exclusivity(&self, role: &ClinicianRole) -> bool {
        self.regime_for(role) == AccessRegime::Bypass
    }

    /// Checks that the caller holds a privileged role.
    ///
    /// Returns `Ok(())` if allowed, or `Err(PermissionDenied)` if not.
    pub fn require_privileged(&self, ctx: &CallerContext) -> Result<(), AppError> {
        if ctx.role.is_privileged() {
            Ok(())
        } else {
            Err(AppError::permission_denied(format!(
                "Role '{}' cannot administer other clinicians' sessions",
                ctx.role
            )))
        }
    }

    /// Whether the caller may release the session owned by `owner`.
    ///
    /// Everyone may release their own session; only privileged roles may
    /// release someone else's (administrative force-disconnect).
    pub fn can_release(&self, ctx: &CallerContext, owner: UserId) -> bool {
        ctx.user_id == owner || ctx.role.is_privileged()
    }

    /// Checks that the caller owns the session or holds a privileged role.
    pub fn require_owner_or_privileged(
        &self,
        ctx: &CallerContext,
        owner: UserId,
    ) -> Result<(), AppError> {
        if self.can_release(ctx, owner) {
            Ok(())
        } else {
            Err(AppError::permission_denied(
                "Only the session holder or a privileged role may do this",
            ))
        }
    }

    /// Checks that the caller owns the session. Privilege does not help
    /// here; handover transitions belong to the holder alone.
    pub fn require_owner(&self, ctx: &CallerContext, owner: UserId) -> Result<(), AppError> {
        if ctx.user_id == owner {
            Ok(())
        } else {
            Err(AppError::permission_denied(
                "Only the session holder may do this",
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(role: ClinicianRole) -> CallerContext {
        CallerContext::new(UserId::new(), role)
    }

    #[test]
    fn test_default_roles_are_exclusive() {
        let policy = AccessPolicy::new();
        assert_eq!(
            policy.regime_for(&ClinicianRole::Physician),
            AccessRegime::Exclusive
        );
        assert_eq!(
            policy.regime_for(&ClinicianRole::Nurse),
            AccessRegime::Exclusive
        );
    }

    #[test]
    fn test_privileged_roles_bypass() {
        let policy = AccessPolicy::new();
        assert!(policy.can_bypass_exclusivity(&ClinicianRole::Coordinator));
        assert!(policy.can_bypass_exclusivity(&ClinicianRole::Admin));
        assert!(!policy.can_bypass_exclusivity(&ClinicianRole::Physician));
    }

    #[test]
    fn test_release_ownership() {
        let policy = AccessPolicy::new();
        let physician = ctx(ClinicianRole::Physician);
        let coordinator = ctx(ClinicianRole::Coordinator);
        let other = UserId::new();

        assert!(policy.can_release(&physician, physician.user_id));
        assert!(!policy.can_release(&physician, other));
        assert!(policy.can_release(&coordinator, other));
    }

    #[test]
    fn test_require_privileged() {
        let policy = AccessPolicy::new();
        assert!(policy.require_privileged(&ctx(ClinicianRole::Admin)).is_ok());
        assert!(
            policy
                .require_privileged(&ctx(ClinicianRole::Nurse))
                .is_err()
        );
    }
}
