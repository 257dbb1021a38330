//! Diagnostic tallies of registry mutations.

use prometheus::{IntCounter, Registry};

use crate::error::Result;

/// Why an observation left the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalCause {
    /// The owning object was deleted (or replaced by an update)
    Deleted,
    /// The garbage collector found it stale
    Collected,
}

impl std::fmt::Display for RemovalCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RemovalCause::Deleted => write!(f, "delete"),
            RemovalCause::Collected => write!(f, "gc"),
        }
    }
}

/// Counts of adds, deletes and GC deletes.
///
/// Backed by Prometheus counters so the same values can be scraped; they
/// carry no meaning for correctness.
#[derive(Clone)]
pub struct Tallies {
    added: IntCounter,
    deleted: IntCounter,
    collected: IntCounter,
}

impl Tallies {
    pub fn new() -> Result<Self> {
        Ok(Self {
            added: IntCounter::new(
                "kcertwatch_observations_added_total",
                "Number of certificate fields added or refreshed.",
            )?,
            deleted: IntCounter::new(
                "kcertwatch_observations_deleted_total",
                "Number of certificate fields removed by delete notifications.",
            )?,
            collected: IntCounter::new(
                "kcertwatch_observations_collected_total",
                "Number of certificate fields removed by garbage collection.",
            )?,
        })
    }

    /// Register the counters with `registry` for exposition.
    pub fn register(&self, registry: &Registry) -> Result<()> {
        registry.register(Box::new(self.added.clone()))?;
        registry.register(Box::new(self.deleted.clone()))?;
        registry.register(Box::new(self.collected.clone()))?;
        Ok(())
    }

    pub(crate) fn record_add(&self) {
        self.added.inc();
    }

    pub(crate) fn record_removal(&self, cause: RemovalCause) {
        match cause {
            RemovalCause::Deleted => self.deleted.inc(),
            RemovalCause::Collected => self.collected.inc(),
        }
    }

    pub fn snapshot(&self) -> TallySnapshot {
        TallySnapshot {
            added: self.added.get(),
            deleted: self.deleted.get(),
            collected: self.collected.get(),
        }
    }
}

impl std::fmt::Debug for Tallies {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Tallies").field(&self.snapshot()).finish()
    }
}

/// Point-in-time copy of the tallies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TallySnapshot {
    pub added: u64,
    pub deleted: u64,
    pub collected: u64,
}
