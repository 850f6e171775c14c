//! Clinician role enumeration.

pub mod role;

pub use role::ClinicianRole;
