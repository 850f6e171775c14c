//! ICU unit entity.

pub mod model;

pub use model::Unit;
