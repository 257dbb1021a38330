//! Controller module
//!
//! Keeps certificate expiry observations in step with the Secrets in the
//! cluster:
//!
//! ```text
//! watch events → SecretInformer → SecretReconciler → ExpiryRegistry
//!                                                        ↑
//!                                    GarbageCollector ───┘
//! ```

pub mod gc;
pub mod informer;
pub mod reconciler;

#[cfg(test)]
mod proptest;

pub use gc::{GarbageCollector, GcConfig};
pub use informer::{InformerConfig, SecretInformer};
pub use reconciler::SecretReconciler;
