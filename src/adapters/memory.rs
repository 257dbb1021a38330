//! In-Memory Expiry Sink
//!
//! Keeps published series in a map for inspection during tests.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::domain::{ExpirySink, ObservationKey};

/// In-memory expiry sink for testing.
///
/// Values are stored as unix seconds, the same unit the Prometheus sink
/// publishes.
#[derive(Debug, Default)]
pub struct InMemoryExpirySink {
    series: RwLock<HashMap<ObservationKey, i64>>,
}

impl InMemoryExpirySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Published value for `key`, in unix seconds.
    pub fn value(&self, key: &ObservationKey) -> Option<i64> {
        self.series.read().get(key).copied()
    }

    /// All published series, sorted by key.
    pub fn series(&self) -> Vec<(ObservationKey, i64)> {
        let mut series: Vec<_> = self
            .series
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        series.sort();
        series
    }

    pub fn len(&self) -> usize {
        self.series.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.read().is_empty()
    }
}

impl ExpirySink for InMemoryExpirySink {
    fn set(&self, key: &ObservationKey, not_after: DateTime<Utc>) {
        self.series.write().insert(key.clone(), not_after.timestamp());
    }

    fn delete(&self, key: &ObservationKey) -> bool {
        self.series.write().remove(key).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_in_memory_sink() {
        let sink = InMemoryExpirySink::new();
        assert!(sink.is_empty());

        let a = ObservationKey::new("ns", "web", "a");
        let b = ObservationKey::new("ns", "web", "b");
        sink.set(&b, Utc.timestamp_opt(20, 0).unwrap());
        sink.set(&a, Utc.timestamp_opt(10, 0).unwrap());

        assert_eq!(sink.len(), 2);
        assert_eq!(sink.value(&a), Some(10));
        assert_eq!(sink.series(), vec![(a.clone(), 10), (b.clone(), 20)]);

        assert!(sink.delete(&a));
        assert!(!sink.delete(&a));
        assert_eq!(sink.len(), 1);
    }
}
