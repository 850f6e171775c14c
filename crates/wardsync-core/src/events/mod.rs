//! Domain events broadcast over the session store's change feed.

pub mod session;

pub use session::SessionChange;
