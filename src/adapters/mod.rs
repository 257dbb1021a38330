//! Infrastructure Adapters
//!
//! Implementations of the domain ports and the mapping from Kubernetes
//! objects onto domain types.
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                  Domain Ports                    │
//! │            ExpirySink    │    Clock              │
//! └─────────────────────────────────────────────────┘
//!                          │
//!                          ▼
//! ┌─────────────────────────────────────────────────┐
//! │              Adapters (This Module)              │
//! │  PrometheusExpirySink │ InMemoryExpirySink       │
//! │  SystemClock │ ManualClock │ Secret conversion   │
//! └─────────────────────────────────────────────────┘
//! ```

mod clock;
pub mod kubernetes;
mod memory;
pub mod prometheus;

pub use self::clock::{ManualClock, SystemClock};
pub use self::memory::InMemoryExpirySink;
pub use self::prometheus::PrometheusExpirySink;
