//! Secret Reconciler
//!
//! Turns add/update/delete notifications for credential objects into
//! registry mutations.

use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::certs::search_expiries;
use crate::domain::{Clock, CredentialObject, ObservationKey};
use crate::registry::ExpiryRegistry;

/// Receives watch notifications and keeps the registry in step with them.
pub struct SecretReconciler {
    registry: Arc<ExpiryRegistry>,
    clock: Arc<dyn Clock>,
}

impl SecretReconciler {
    pub fn new(registry: Arc<ExpiryRegistry>, clock: Arc<dyn Clock>) -> Arc<Self> {
        Arc::new(Self { registry, clock })
    }

    pub fn registry(&self) -> &Arc<ExpiryRegistry> {
        &self.registry
    }

    /// Called when an object is created, or re-delivered by a resync.
    ///
    /// Publishes every certificate field found and stamps it as seen now.
    /// If the data cannot be searched the object's existing observations are
    /// left as they are.
    pub fn on_add(&self, object: &CredentialObject) {
        if !object.kind.is_watched() {
            trace!(kind = %object.kind, "ignoring {}", object.key());
            return;
        }
        trace!("add {}", object.key());

        let expiries = match search_expiries(&object.data) {
            Ok(expiries) => expiries,
            Err(e) => {
                warn!(
                    namespace = %object.namespace,
                    name = %object.name,
                    "{}: {}",
                    object.key(),
                    e
                );
                return;
            }
        };

        let seen_at = self.clock.now();
        let object_key = object.key();
        for (field, not_after) in expiries {
            debug!(
                namespace = %object.namespace,
                name = %object.name,
                field = %field,
                %not_after,
                "add cert"
            );
            self.registry
                .upsert(ObservationKey::for_field(&object_key, field), not_after, seen_at);
        }
    }

    /// Called when an object is deleted. Drops every observation of it.
    pub fn on_delete(&self, object: &CredentialObject) {
        trace!("delete {}", object.key());
        let removed = self.registry.remove_object(&object.key());
        if removed > 0 {
            debug!(
                namespace = %object.namespace,
                name = %object.name,
                removed,
                "deleted observations"
            );
        }
    }

    /// Called when an object changes. The new field set fully replaces the
    /// old one.
    pub fn on_update(&self, old: &CredentialObject, new: &CredentialObject) {
        trace!("update {}", new.key());
        self.on_delete(old);
        self.on_add(new);
    }
}

impl std::fmt::Debug for SecretReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretReconciler")
            .field("registry", &self.registry)
            .finish()
    }
}
