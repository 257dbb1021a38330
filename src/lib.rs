//! kcertwatch - Certificate Expiry Exporter
//!
//! A Kubernetes operator that watches Secrets, finds the PEM-encoded X.509
//! certificates stored in them and exports each certificate's `notAfter`
//! time as a Prometheus gauge:
//!
//! ```text
//! kcertwatch_cert_expire_time_seconds{secret_namespace, secret_name, secret_field}
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐    ┌──────────────┐    ┌──────────────┐    ┌──────────────┐
//! │    Secret    │───▶│    Secret    │───▶│    Expiry    │───▶│  Prometheus  │
//! │   Informer   │    │  Reconciler  │    │   Registry   │    │    Gauge     │
//! └──────────────┘    └──────────────┘    └──────────────┘    └──────────────┘
//!                                                ▲
//!                                     ┌──────────┴───┐
//!                                     │   Garbage    │
//!                                     │  Collector   │
//!                                     └──────────────┘
//! ```
//!
//! # Modules
//!
//! - [`adapters`] - Prometheus sink, in-memory sink, clocks, Secret conversion
//! - [`certs`] - Certificate discovery in Secret data
//! - [`controller`] - Informer, reconciler and garbage collector
//! - [`domain`] - Value types and ports
//! - [`error`] - Error types
//! - [`registry`] - Authoritative set of live observations
//! - [`telemetry`] - Logging setup and log line counters

pub mod adapters;
pub mod certs;
pub mod controller;
pub mod domain;
pub mod error;
pub mod registry;
pub mod telemetry;

// Re-export commonly used types
pub use controller::{GarbageCollector, GcConfig, InformerConfig, SecretInformer, SecretReconciler};
pub use domain::{CredentialKind, CredentialObject, ObjectKey, ObservationKey};
pub use error::{Error, Result};
pub use registry::ExpiryRegistry;
