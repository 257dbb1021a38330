//! Registry module
//!
//! Tracks which certificate fields are currently published and when each was
//! last confirmed.

mod expiry;
mod tallies;

pub use expiry::ExpiryRegistry;
pub use tallies::{RemovalCause, Tallies, TallySnapshot};
