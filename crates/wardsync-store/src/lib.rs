//! # wardsync-store
//!
//! Session persistence for WardSync: the [`SessionStore`] trait plus a
//! PostgreSQL backend (production) and an in-memory backend (tests and
//! single-node development). Both backends provide the same conditional
//! write semantics and broadcast [`SessionChange`] events after every
//! committed mutation.
//!
//! [`SessionChange`]: wardsync_core::events::SessionChange

pub mod connection;
pub mod memory;
pub mod migration;
pub mod postgres;
pub mod store;
pub mod units;

pub use connection::DatabasePool;
pub use memory::MemorySessionStore;
pub use postgres::PostgresSessionStore;
pub use store::SessionStore;
pub use units::UnitDirectory;
