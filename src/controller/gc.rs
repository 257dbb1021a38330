//! Garbage Collector
//!
//! Periodically drops observations that have not been refreshed within the
//! staleness window. Delete notifications are the primary removal path; this
//! catches the ones lost across watch reconnects.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::domain::Clock;
use crate::error::{Error, Result};
use crate::registry::ExpiryRegistry;

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the garbage collector
#[derive(Debug, Clone)]
pub struct GcConfig {
    /// Tick period P. Observations older than 2P are collected.
    pub period: Duration,
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            period: Duration::from_secs(300),
        }
    }
}

impl GcConfig {
    pub fn new(period: Duration) -> Result<Self> {
        if period.is_zero() {
            return Err(Error::Config("GC period must be positive".to_string()));
        }
        Ok(Self { period })
    }

    /// Age beyond which an observation is presumed orphaned: two periods, so
    /// one late refresh is tolerated.
    pub fn staleness(&self) -> Duration {
        self.period.saturating_mul(2)
    }
}

// =============================================================================
// Garbage Collector
// =============================================================================

/// Sweeps stale observations out of the registry.
pub struct GarbageCollector {
    config: GcConfig,
    registry: Arc<ExpiryRegistry>,
    clock: Arc<dyn Clock>,
}

impl GarbageCollector {
    pub fn new(config: GcConfig, registry: Arc<ExpiryRegistry>, clock: Arc<dyn Clock>) -> Arc<Self> {
        Arc::new(Self {
            config,
            registry,
            clock,
        })
    }

    /// Run one sweep with the configured staleness window.
    pub fn collect(&self) -> usize {
        self.collect_older_than(self.config.staleness())
    }

    /// Run one sweep removing observations last seen more than `age` ago.
    #[instrument(skip(self))]
    pub fn collect_older_than(&self, age: Duration) -> usize {
        let Some(cutoff) = cutoff(self.clock.now(), age) else {
            return 0;
        };

        let removed = self.registry.remove_stale(cutoff);
        if removed > 0 {
            info!(removed, %cutoff, "collected stale certificate observations");
        } else {
            debug!(%cutoff, "nothing to collect");
        }
        removed
    }

    /// Sweep once per period until `shutdown` is cancelled.
    #[instrument(skip(self, shutdown))]
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        info!(
            period = ?self.config.period,
            staleness = ?self.config.staleness(),
            "Starting garbage collector"
        );

        let mut tick = interval(self.config.period);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; nothing can be stale yet.
        tick.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Garbage collector shutting down");
                    break;
                }
                _ = tick.tick() => {
                    self.collect();
                }
            }
        }
    }
}

/// `now - age`, or `None` if that lies before the earliest representable time
/// (in which case nothing can be older).
fn cutoff(now: DateTime<Utc>, age: Duration) -> Option<DateTime<Utc>> {
    let age = TimeDelta::from_std(age).ok()?;
    now.checked_sub_signed(age)
}
