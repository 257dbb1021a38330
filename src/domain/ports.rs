//! Domain Ports
//!
//! The abstractions the core depends on. Adapters in [`crate::adapters`]
//! provide the concrete implementations.
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                 Domain Layer                  │
//! │        ExpirySink        │        Clock       │
//! └──────────────────────────────────────────────┘
//!                         │
//!                         ▼
//! ┌──────────────────────────────────────────────┐
//! │               Adapters (Impls)                │
//! │  PrometheusExpirySink │ InMemoryExpirySink    │
//! │  SystemClock          │ ManualClock           │
//! └──────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};

use super::credential::ObservationKey;

// =============================================================================
// Metric Sink Port
// =============================================================================

/// Destination for published expiry values.
///
/// One series exists per [`ObservationKey`]. Implementations must be safe to
/// call from several threads; the registry serializes calls for the same key.
pub trait ExpirySink: Send + Sync {
    /// Publish `not_after` as the value of the series for `key`.
    fn set(&self, key: &ObservationKey, not_after: DateTime<Utc>);

    /// Drop the series for `key`. Returns whether the series existed.
    fn delete(&self, key: &ObservationKey) -> bool;
}

// =============================================================================
// Clock Port
// =============================================================================

/// Source of wall-clock time for last-seen stamps and staleness cutoffs.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}
