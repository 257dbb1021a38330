//! Secret Informer
//!
//! The Kubernetes watch only reports the current state of an object. This
//! keeps the last delivered version of every watched Secret so the reconciler
//! can be driven with add, update(old, new) and delete notifications, and so
//! objects that vanished while the watch was down are noticed on relist.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::{Stream, StreamExt};
use k8s_openapi::api::core::v1::Secret;
use kube::api::Api;
use kube::runtime::watcher::{self, Event};
use kube::runtime::WatchStreamExt;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace, warn};

use super::reconciler::SecretReconciler;
use crate::domain::{CredentialObject, ObjectKey};

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the informer
#[derive(Debug, Clone)]
pub struct InformerConfig {
    /// Interval at which every known object is re-delivered as an add
    pub resync_period: Duration,
}

impl Default for InformerConfig {
    fn default() -> Self {
        Self {
            resync_period: Duration::from_secs(300),
        }
    }
}

// =============================================================================
// Informer
// =============================================================================

/// Local cache of watched Secrets feeding a [`SecretReconciler`].
pub struct SecretInformer {
    reconciler: Arc<SecretReconciler>,
    known: HashMap<ObjectKey, CredentialObject>,
    /// Keys seen since the current relist started, if one is in progress
    relist: Option<HashSet<ObjectKey>>,
    synced: Arc<AtomicBool>,
}

impl SecretInformer {
    pub fn new(reconciler: Arc<SecretReconciler>) -> Self {
        Self {
            reconciler,
            known: HashMap::new(),
            relist: None,
            synced: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag that turns true once the first full list has been processed.
    pub fn synced_flag(&self) -> Arc<AtomicBool> {
        self.synced.clone()
    }

    pub fn has_synced(&self) -> bool {
        self.synced.load(Ordering::Acquire)
    }

    /// Number of objects in the local cache.
    pub fn known_len(&self) -> usize {
        self.known.len()
    }

    /// Apply one watch event.
    pub fn handle(&mut self, event: Event<Secret>) {
        match event {
            Event::Init => {
                debug!("Secret relist started");
                self.relist = Some(HashSet::new());
            }
            Event::InitApply(secret) => {
                let object = CredentialObject::from(&secret);
                if let Some(seen) = self.relist.as_mut() {
                    seen.insert(object.key());
                }
                self.apply(object);
            }
            Event::InitDone => self.finish_relist(),
            Event::Apply(secret) => self.apply(CredentialObject::from(&secret)),
            Event::Delete(secret) => self.delete(CredentialObject::from(&secret)),
        }
    }

    /// Re-deliver every cached object as an add, refreshing its last-seen time.
    pub fn resync(&self) -> usize {
        for object in self.known.values() {
            self.reconciler.on_add(object);
        }
        self.known.len()
    }

    fn apply(&mut self, object: CredentialObject) {
        if !object.kind.is_watched() {
            trace!(kind = %object.kind, "skipping {}", object.key());
            return;
        }

        match self.known.insert(object.key(), object.clone()) {
            Some(old) => self.reconciler.on_update(&old, &object),
            None => self.reconciler.on_add(&object),
        }
    }

    fn delete(&mut self, object: CredentialObject) {
        let key = object.key();
        match self.known.remove(&key) {
            Some(last_known) => self.reconciler.on_delete(&last_known),
            // Nothing of an unwatched kind was ever published.
            None if !object.kind.is_watched() => trace!("skipping delete of {}", key),
            None => self.reconciler.on_delete(&object),
        }
    }

    fn finish_relist(&mut self) {
        let Some(seen) = self.relist.take() else {
            return;
        };

        let vanished: Vec<ObjectKey> = self
            .known
            .keys()
            .filter(|key| !seen.contains(key))
            .cloned()
            .collect();

        for key in vanished {
            if let Some(object) = self.known.remove(&key) {
                info!("{} disappeared while the watch was down", key);
                self.reconciler.on_delete(&object);
            }
        }

        if !self.synced.swap(true, Ordering::AcqRel) {
            info!(objects = self.known.len(), "Secret cache synced");
        } else {
            debug!(objects = self.known.len(), "Secret relist done");
        }
    }

    /// Watch `api` until `shutdown` is cancelled.
    pub async fn run(self, api: Api<Secret>, config: InformerConfig, shutdown: CancellationToken) {
        let stream = watcher::watcher(api, watcher::Config::default()).default_backoff();
        self.run_stream(stream, config, shutdown).await;
    }

    /// Drive the informer from an event stream until it ends or `shutdown`
    /// is cancelled. The event in progress is always handled to completion.
    #[instrument(skip_all)]
    pub async fn run_stream<S>(mut self, stream: S, config: InformerConfig, shutdown: CancellationToken)
    where
        S: Stream<Item = Result<Event<Secret>, watcher::Error>>,
    {
        info!(resync_period = ?config.resync_period, "Starting Secret informer");

        futures::pin_mut!(stream);
        let mut resync = interval(config.resync_period);
        resync.set_missed_tick_behavior(MissedTickBehavior::Delay);
        resync.tick().await;

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    info!("Secret informer shutting down");
                    break;
                }
                event = stream.next() => match event {
                    Some(Ok(event)) => self.handle(event),
                    Some(Err(e)) => warn!("Secret watch error: {}", e),
                    None => {
                        warn!("Secret watch stream ended");
                        break;
                    }
                },
                _ = resync.tick() => {
                    let objects = self.resync();
                    debug!(objects, "resynced Secrets");
                }
            }
        }
    }
}

impl std::fmt::Debug for SecretInformer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretInformer")
            .field("known", &self.known.len())
            .field("relisting", &self.relist.is_some())
            .field("synced", &self.has_synced())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{InMemoryExpirySink, ManualClock};
    use crate::registry::ExpiryRegistry;
    use chrono::{TimeZone, Utc};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use k8s_openapi::ByteString;
    use std::collections::BTreeMap;

    const ROOT_PEM: &[u8] = include_bytes!("../../tests/testdata/root.pem");
    const TLS_PEM: &[u8] = include_bytes!("../../tests/testdata/tls.pem");

    fn secret(name: &str, type_: &str, fields: &[(&str, &[u8])]) -> Secret {
        let data: BTreeMap<String, ByteString> = fields
            .iter()
            .map(|(k, v)| (k.to_string(), ByteString(v.to_vec())))
            .collect();
        Secret {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("default".to_string()),
                ..Default::default()
            },
            type_: Some(type_.to_string()),
            data: Some(data),
            ..Default::default()
        }
    }

    fn informer() -> (Arc<ExpiryRegistry>, SecretInformer) {
        let registry = ExpiryRegistry::new(Arc::new(InMemoryExpirySink::new())).unwrap();
        let clock = Arc::new(ManualClock::new(Utc.timestamp_opt(1_700_000_000, 0).unwrap()));
        let reconciler = SecretReconciler::new(registry.clone(), clock);
        (registry, SecretInformer::new(reconciler))
    }

    fn fields(registry: &ExpiryRegistry, name: &str) -> Vec<String> {
        registry.fields_of(&ObjectKey::new("default", name))
    }

    #[test]
    fn test_apply_then_apply_is_an_update() {
        let (registry, mut informer) = informer();

        informer.handle(Event::Apply(secret(
            "web",
            "Opaque",
            &[("ca.crt", ROOT_PEM), ("tls.crt", TLS_PEM)],
        )));
        informer.handle(Event::Apply(secret("web", "Opaque", &[("tls.crt", TLS_PEM)])));

        assert_eq!(fields(&registry, "web"), vec!["tls.crt"]);
        let tallies = registry.tallies();
        assert_eq!(tallies.added, 3);
        assert_eq!(tallies.deleted, 2);
    }

    #[test]
    fn test_unchanged_apply_is_still_an_update() {
        let (registry, mut informer) = informer();
        let web = secret("web", "Opaque", &[("tls.crt", TLS_PEM)]);

        informer.handle(Event::Apply(web.clone()));
        informer.handle(Event::Apply(web));

        assert_eq!(fields(&registry, "web"), vec!["tls.crt"]);
        assert_eq!(registry.tallies().deleted, 1);
        assert_eq!(registry.tallies().added, 2);
    }

    #[test]
    fn test_delete_clears_cache_and_registry() {
        let (registry, mut informer) = informer();
        let web = secret("web", "kubernetes.io/tls", &[("tls.crt", TLS_PEM)]);

        informer.handle(Event::Apply(web.clone()));
        informer.handle(Event::Delete(web));

        assert!(registry.is_empty());
        assert_eq!(informer.known_len(), 0);
    }

    #[test]
    fn test_unwatched_kinds_are_not_cached() {
        let (registry, mut informer) = informer();

        informer.handle(Event::Apply(secret(
            "token",
            "kubernetes.io/service-account-token",
            &[("ca.crt", ROOT_PEM)],
        )));

        assert!(registry.is_empty());
        assert_eq!(informer.known_len(), 0);
    }

    #[test]
    fn test_relist_deletes_vanished_objects_and_marks_synced() {
        let (registry, mut informer) = informer();
        assert!(!informer.has_synced());

        informer.handle(Event::Init);
        informer.handle(Event::InitApply(secret("kept", "Opaque", &[("tls.crt", TLS_PEM)])));
        informer.handle(Event::InitApply(secret("gone", "Opaque", &[("ca.crt", ROOT_PEM)])));
        informer.handle(Event::InitDone);
        assert!(informer.has_synced());
        assert_eq!(registry.len(), 2);

        // Watch reconnects after "gone" was deleted without a notification.
        informer.handle(Event::Init);
        informer.handle(Event::InitApply(secret("kept", "Opaque", &[("tls.crt", TLS_PEM)])));
        informer.handle(Event::InitDone);

        assert_eq!(fields(&registry, "kept"), vec!["tls.crt"]);
        assert!(fields(&registry, "gone").is_empty());
        assert_eq!(informer.known_len(), 1);
        // One for the re-listed "kept" update, one for "gone".
        assert_eq!(registry.tallies().deleted, 2);
    }

    #[test]
    fn test_resync_redelivers_known_objects() {
        let (registry, mut informer) = informer();
        informer.handle(Event::Apply(secret("web", "Opaque", &[("tls.crt", TLS_PEM)])));
        informer.handle(Event::Apply(secret("api", "Opaque", &[("ca.crt", ROOT_PEM)])));

        assert_eq!(informer.resync(), 2);

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.tallies().added, 4);
        assert_eq!(registry.tallies().deleted, 0);
    }

    #[tokio::test]
    async fn test_run_stream_processes_events_until_end() {
        let (registry, informer) = informer();
        let synced = informer.synced_flag();
        let events: Vec<Result<Event<Secret>, watcher::Error>> = vec![
            Ok(Event::Init),
            Ok(Event::InitApply(secret("web", "Opaque", &[("tls.crt", TLS_PEM)]))),
            Ok(Event::InitDone),
            Ok(Event::Apply(secret("api", "Opaque", &[("ca.crt", ROOT_PEM)]))),
        ];

        informer
            .run_stream(
                futures::stream::iter(events),
                InformerConfig::default(),
                CancellationToken::new(),
            )
            .await;

        assert!(synced.load(Ordering::Acquire));
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn test_run_stream_stops_on_shutdown() {
        let (_registry, informer) = informer();
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        // A stream that never yields; only cancellation can end the loop.
        informer
            .run_stream(
                futures::stream::pending::<Result<Event<Secret>, watcher::Error>>(),
                InformerConfig::default(),
                shutdown,
            )
            .await;
    }
}
