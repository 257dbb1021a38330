//! Expiry Registry
//!
//! Authoritative map from observed certificate field to the time it was last
//! confirmed present. Every mutation of the map is paired with the matching
//! call on the [`ExpirySink`] while holding the write lock, so the map and the
//! published series never diverge for a key.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::{debug, warn};

use super::tallies::{RemovalCause, Tallies, TallySnapshot};
use crate::domain::{ExpirySink, ObjectKey, Observation, ObservationKey};
use crate::error::Result;

/// Registry of observed certificate fields.
pub struct ExpiryRegistry {
    entries: RwLock<HashMap<ObservationKey, DateTime<Utc>>>,
    sink: Arc<dyn ExpirySink>,
    tallies: Tallies,
}

impl ExpiryRegistry {
    /// Create an empty registry publishing to `sink`.
    pub fn new(sink: Arc<dyn ExpirySink>) -> Result<Arc<Self>> {
        Ok(Self::with_tallies(sink, Tallies::new()?))
    }

    /// Create an empty registry that records into existing `tallies`.
    pub fn with_tallies(sink: Arc<dyn ExpirySink>, tallies: Tallies) -> Arc<Self> {
        Arc::new(Self {
            entries: RwLock::new(HashMap::new()),
            sink,
            tallies,
        })
    }

    /// Publish `not_after` for `key` and record it as seen at `seen_at`.
    ///
    /// Re-upserting an existing key only refreshes it; last-seen never moves
    /// backwards.
    pub fn upsert(&self, key: ObservationKey, not_after: DateTime<Utc>, seen_at: DateTime<Utc>) {
        let mut entries = self.entries.write();
        self.sink.set(&key, not_after);

        let last_seen = entries.entry(key).or_insert(seen_at);
        if seen_at > *last_seen {
            *last_seen = seen_at;
        }
        self.tallies.record_add();
    }

    /// Remove `key` and its series. Returns false if the key was not tracked.
    pub fn remove(&self, key: &ObservationKey, cause: RemovalCause) -> bool {
        let mut entries = self.entries.write();
        if entries.remove(key).is_none() {
            return false;
        }
        self.unpublish(key, cause);
        true
    }

    /// Remove every entry for which `matches(key, last_seen)` holds.
    ///
    /// Candidates are gathered under the read lock, then removed one at a time
    /// under the write lock after re-checking `matches` against the current
    /// state. An entry refreshed after the scan no longer matches and stays.
    pub fn remove_where<F>(&self, matches: F, cause: RemovalCause) -> usize
    where
        F: Fn(&ObservationKey, DateTime<Utc>) -> bool,
    {
        let candidates: Vec<ObservationKey> = self
            .entries
            .read()
            .iter()
            .filter(|(key, last_seen)| matches(key, **last_seen))
            .map(|(key, _)| key.clone())
            .collect();

        let mut removed = 0;
        for key in candidates {
            let mut entries = self.entries.write();
            match entries.get(&key) {
                Some(last_seen) if matches(&key, *last_seen) => {
                    entries.remove(&key);
                }
                _ => continue,
            }
            self.unpublish(&key, cause);
            removed += 1;
        }
        removed
    }

    /// Remove all observations taken from `object`.
    pub fn remove_object(&self, object: &ObjectKey) -> usize {
        self.remove_where(|key, _| key.belongs_to(object), RemovalCause::Deleted)
    }

    /// Remove all observations last seen strictly before `cutoff`.
    pub fn remove_stale(&self, cutoff: DateTime<Utc>) -> usize {
        self.remove_where(|_, last_seen| last_seen < cutoff, RemovalCause::Collected)
    }

    /// Copy of all current observations.
    pub fn snapshot(&self) -> Vec<Observation> {
        self.entries
            .read()
            .iter()
            .map(|(key, last_seen)| Observation {
                key: key.clone(),
                last_seen: *last_seen,
            })
            .collect()
    }

    /// Keys currently tracked for `object`, sorted.
    pub fn fields_of(&self, object: &ObjectKey) -> Vec<String> {
        let mut fields: Vec<String> = self
            .entries
            .read()
            .keys()
            .filter(|key| key.belongs_to(object))
            .map(|key| key.field.clone())
            .collect();
        fields.sort();
        fields
    }

    pub fn last_seen(&self, key: &ObservationKey) -> Option<DateTime<Utc>> {
        self.entries.read().get(key).copied()
    }

    pub fn contains(&self, key: &ObservationKey) -> bool {
        self.entries.read().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn tallies(&self) -> TallySnapshot {
        self.tallies.snapshot()
    }

    /// Must be called with the write lock held.
    fn unpublish(&self, key: &ObservationKey, cause: RemovalCause) {
        debug!(
            namespace = %key.namespace,
            name = %key.name,
            field = %key.field,
            %cause,
            "delete cert"
        );
        if !self.sink.delete(key) {
            warn!(
                namespace = %key.namespace,
                name = %key.name,
                field = %key.field,
                %cause,
                "metric series was already gone"
            );
        }
        self.tallies.record_removal(cause);
    }
}

impl std::fmt::Debug for ExpiryRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExpiryRegistry")
            .field("entries", &self.len())
            .field("tallies", &self.tallies())
            .finish()
    }
}
