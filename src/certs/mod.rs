//! Certificate module
//!
//! Extracts certificate expiry times from credential data.

mod extractor;

pub use extractor::search_expiries;
