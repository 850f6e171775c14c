//! Clinician role enumeration.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Roles a clinician can carry on the dashboard.
///
/// Roles are ordered by privilege level: Admin > Coordinator > Physician >
/// Nurse. Coordinator and Admin are exempt from unit exclusivity (the
/// bypass regime) and may administer other clinicians' sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "clinician_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ClinicianRole {
    /// Full system administrator.
    Admin,
    /// Unit coordinator; supervises shifts across all units.
    Coordinator,
    /// Attending or on-call physician.
    Physician,
    /// ICU nurse.
    Nurse,
}

impl ClinicianRole {
    /// Return the privilege level (higher = more privileged).
    pub fn privilege_level(&self) -> u8 {
        match self {
            Self::Admin => 4,
            Self::Coordinator => 3,
            Self::Physician => 2,
            Self::Nurse => 1,
        }
    }

    /// Check if this role has at least the given role's privileges.
    pub fn has_at_least(&self, other: &ClinicianRole) -> bool {
        self.privilege_level() >= other.privilege_level()
    }

    /// Check if this role is exempt from unit exclusivity.
    pub fn is_privileged(&self) -> bool {
        matches!(self, Self::Admin | Self::Coordinator)
    }

    /// Return the role as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Coordinator => "coordinator",
            Self::Physician => "physician",
            Self::Nurse => "nurse",
        }
    }
}

impl fmt::Display for ClinicianRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ClinicianRole {
    type Err = wardsync_core::AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "admin" => Ok(Self::Admin),
            "coordinator" => Ok(Self::Coordinator),
            "physician" => Ok(Self::Physician),
            "nurse" => Ok(Self::Nurse),
            _ => Err(wardsync_core::AppError::validation(format!(
                "Invalid clinician role: '{s}'. Expected one of: admin, coordinator, physician, nurse"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_privilege_ordering() {
        assert!(ClinicianRole::Admin.has_at_least(&ClinicianRole::Nurse));
        assert!(ClinicianRole::Coordinator.has_at_least(&ClinicianRole::Physician));
        assert!(!ClinicianRole::Nurse.has_at_least(&ClinicianRole::Physician));
    }

    #[test]
    fn test_privileged_roles() {
        assert!(ClinicianRole::Admin.is_privileged());
        assert!(ClinicianRole::Coordinator.is_privileged());
        assert!(!ClinicianRole::Physician.is_privileged());
        assert!(!ClinicianRole::Nurse.is_privileged());
    }

    #[test]
    fn test_from_str() {
        assert_eq!(
            "coordinator".parse::<ClinicianRole>().unwrap(),
            ClinicianRole::Coordinator
        );
        assert_eq!(
            "PHYSICIAN".parse::<ClinicianRole>().unwrap(),
            ClinicianRole::Physician
        );
        assert!("janitor".parse::<ClinicianRole>().is_err());
    }
}
