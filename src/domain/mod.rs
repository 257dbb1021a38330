//! Domain Layer
//!
//! Value objects describing watched credentials and the ports the core
//! publishes through.
//!
//! - **Credential** (`credential.rs`) - Object identity, kinds and observation keys
//! - **Ports** (`ports.rs`) - Trait abstractions for the metric sink and the clock

pub mod credential;
pub mod ports;

pub use credential::{
    CredentialKind, CredentialObject, ObjectKey, Observation, ObservationKey,
};
pub use ports::{Clock, ExpirySink};
