//! # wardsync-session
//!
//! The unit-session coordination core: the session coordinator state
//! machine, activity heartbeat, read-time expiry policy, role-based
//! access policy, and the reconciliation sweep.
//!
//! ## Modules
//!
//! - `coordinator` — acquisition, handover, assumption, and release of a
//!   unit's exclusive slot
//! - `heartbeat` — debounced last-activity refresh
//! - `expiry` — pure staleness and countdown computation
//! - `access` — exclusivity regimes per clinician role
//! - `sweep` — periodic deletion of long-abandoned session rows
//! - `context` — caller identity passed into every operation

pub mod access;
pub mod context;
pub mod coordinator;
pub mod expiry;
pub mod heartbeat;
pub mod sweep;

pub use access::{AccessPolicy, AccessRegime};
pub use context::CallerContext;
pub use coordinator::{SessionCoordinator, StartOutcome, UnitState};
pub use expiry::{Countdown, ExpiryPolicy};
pub use heartbeat::ActivityHeartbeat;
pub use sweep::{SessionSweeper, SweepScheduler};
