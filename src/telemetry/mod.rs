//! Telemetry
//!
//! Logging setup for the binary and a layer that counts emitted log lines
//! per level so they can be scraped alongside the expiry metrics.

use prometheus::{IntCounter, Opts, Registry};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::filter::Directive;
use tracing_subscriber::layer::Context;
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Layer};

use crate::adapters::prometheus::SUBSYSTEM;
use crate::error::{Error, Result};

// =============================================================================
// Log line counters
// =============================================================================

/// Counts log events at error, warn and info level.
#[derive(Clone)]
pub struct LogCounterLayer {
    errors: IntCounter,
    warnings: IntCounter,
    info: IntCounter,
}

impl LogCounterLayer {
    pub fn new() -> Result<Self> {
        Ok(Self {
            errors: IntCounter::with_opts(
                Opts::new("logged_errors", "Number of error log lines emitted").subsystem(SUBSYSTEM),
            )?,
            warnings: IntCounter::with_opts(
                Opts::new("logged_warnings", "Number of warning log lines emitted")
                    .subsystem(SUBSYSTEM),
            )?,
            info: IntCounter::with_opts(
                Opts::new("logged_info", "Number of info log lines emitted").subsystem(SUBSYSTEM),
            )?,
        })
    }

    pub fn register(&self, registry: &Registry) -> Result<()> {
        registry.register(Box::new(self.errors.clone()))?;
        registry.register(Box::new(self.warnings.clone()))?;
        registry.register(Box::new(self.info.clone()))?;
        Ok(())
    }

    pub fn errors(&self) -> u64 {
        self.errors.get()
    }

    pub fn warnings(&self) -> u64 {
        self.warnings.get()
    }

    pub fn info(&self) -> u64 {
        self.info.get()
    }
}

impl<S: Subscriber> Layer<S> for LogCounterLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        match *event.metadata().level() {
            Level::ERROR => self.errors.inc(),
            Level::WARN => self.warnings.inc(),
            Level::INFO => self.info.inc(),
            _ => {}
        }
    }
}

impl std::fmt::Debug for LogCounterLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogCounterLayer")
            .field("errors", &self.errors())
            .field("warnings", &self.warnings())
            .field("info", &self.info())
            .finish()
    }
}

// =============================================================================
// Logging Setup
// =============================================================================

/// Map a `--log-level` value onto a level; unknown values fall back to info.
pub fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

fn directive(raw: &str) -> Result<Directive> {
    raw.parse()
        .map_err(|e| Error::Config(format!("invalid log directive {:?}: {}", raw, e)))
}

/// Build the filter: `RUST_LOG` first, then the level, then quieter
/// defaults for the HTTP and client stacks.
pub fn env_filter(level: Level) -> Result<EnvFilter> {
    Ok(EnvFilter::from_default_env()
        .add_directive(level.into())
        .add_directive(directive("hyper=warn")?)
        .add_directive(directive("kube=info")?)
        .add_directive(directive("tower=warn")?))
}

/// Install the global subscriber.
pub fn init_logging(level: &str, json: bool, counters: LogCounterLayer) -> Result<()> {
    let filter = env_filter(parse_level(level))?;

    let installed = if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(counters)
            .with(fmt::layer().json())
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(counters)
            .with(fmt::layer().with_target(true))
            .try_init()
    };

    installed.map_err(|e| Error::Internal(format!("failed to install log subscriber: {}", e)))
}
