//! Engine context: everything the cache and collector read but never own.
//!
//! A `Context` is cheap to clone and is threaded explicitly through every
//! operation. Two contexts in one process are fully independent, which is
//! how the tests run side by side.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{error, warn};

use crate::config::Config;
use crate::l2me::map::SubmitMap;
use crate::param::{Descriptor, Param, ParamTable};
use crate::pool::{ElementPool, InstrumentedPool, SlabPool, StatsSink};
use crate::select::Presets;
use crate::Result;

// ============================================================================
// Reporter
// ============================================================================

/// Receiver of unexpected-condition reports (programmer and structural
/// errors). Reporting never replaces the safe default an operation falls
/// back to.
pub trait Reporter: Send + Sync {
    fn report(&self, fatal: bool, location: &'static str, message: &str, p1: i64, p2: i64);
}

/// Default reporter: logs through `tracing`, optionally panicking on fatal
/// reports.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter {
    pub abort_on_fatal: bool,
}

impl Reporter for TracingReporter {
    fn report(&self, fatal: bool, location: &'static str, message: &str, p1: i64, p2: i64) {
        if fatal {
            error!(location, p1, p2, "{message}");
            if self.abort_on_fatal {
                panic!("fatal condition at {location}: {message} ({p1}, {p2})");
            }
        } else {
            warn!(location, p1, p2, "{message}");
        }
    }
}

/// One captured report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub fatal: bool,
    pub location: &'static str,
    pub message: String,
    pub p1: i64,
    pub p2: i64,
}

/// Reporter that keeps every report, for assertions in tests and for
/// callers that surface diagnostics themselves.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    reports: Mutex<Vec<Report>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<Report> {
        self.reports.lock().clone()
    }

    pub fn fatal_count(&self) -> usize {
        self.reports.lock().iter().filter(|r| r.fatal).count()
    }

    pub fn clear(&self) {
        self.reports.lock().clear();
    }
}

impl Reporter for RecordingReporter {
    fn report(&self, fatal: bool, location: &'static str, message: &str, p1: i64, p2: i64) {
        self.reports.lock().push(Report { fatal, location, message: message.to_string(), p1, p2 });
    }
}

// ============================================================================
// Context
// ============================================================================

/// Shared, immutable engine state plus the pluggable collaborators.
#[derive(Clone)]
pub struct Context {
    config: Arc<Config>,
    params: Arc<ParamTable>,
    submit_map: Arc<SubmitMap>,
    presets: Arc<Presets>,
    reporter: Arc<dyn Reporter>,
    pool: Arc<dyn ElementPool>,
}

impl Context {
    /// Build a context over the built-in tables.
    ///
    /// Verifies the descriptor table and the submit map ordering, builds the
    /// selection presets, and creates a `SlabPool` sized from `config`.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let params = ParamTable::builtin()?;
        let submit_map = SubmitMap::builtin(&params)?;
        let presets = Presets::new(&params);
        let pool: Arc<dyn ElementPool> = Arc::new(SlabPool::new(config.pool_blocks));
        let reporter: Arc<dyn Reporter> = Arc::new(TracingReporter { abort_on_fatal: config.abort_on_fatal });
        Ok(Self {
            config: Arc::new(config),
            params: Arc::new(params),
            submit_map: Arc::new(submit_map),
            presets: Arc::new(presets),
            reporter,
            pool,
        })
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn with_pool(mut self, pool: Arc<dyn ElementPool>) -> Self {
        self.pool = pool;
        self
    }

    /// Route the current pool's allocations and frees through `sink`.
    pub fn with_stats(mut self, sink: Arc<dyn StatsSink>) -> Self {
        self.pool = Arc::new(InstrumentedPool::new(self.pool, sink));
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn params(&self) -> &ParamTable {
        &self.params
    }

    #[inline]
    pub fn describe(&self, param: Param) -> &Descriptor {
        self.params.describe(param)
    }

    pub fn submit_map(&self) -> &SubmitMap {
        &self.submit_map
    }

    pub fn presets(&self) -> &Presets {
        &self.presets
    }

    pub fn pool(&self) -> &Arc<dyn ElementPool> {
        &self.pool
    }

    /// Report an unexpected condition.
    pub fn report(&self, fatal: bool, location: &'static str, message: &str, p1: i64, p2: i64) {
        self.reporter.report(fatal, location, message, p1, p2);
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("config", &self.config)
            .field("params", &self.params.len())
            .field("submit_map", &self.submit_map.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_reporter_collects() {
        let recorder = Arc::new(RecordingReporter::new());
        let ctx = Context::new(Config::default()).unwrap().with_reporter(recorder.clone());
        ctx.report(false, "here", "something odd", 1, 2);
        ctx.report(true, "there", "something bad", 3, 4);
        assert_eq!(recorder.reports().len(), 2);
        assert_eq!(recorder.fatal_count(), 1);
        assert_eq!(recorder.reports()[0].location, "here");
    }

    #[test]
    #[should_panic(expected = "fatal condition")]
    fn test_tracing_reporter_aborts_when_asked() {
        TracingReporter { abort_on_fatal: true }.report(true, "loc", "boom", 0, 0);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = Config { max_concat_words: 1, ..Config::default() };
        assert!(Context::new(config).is_err());
    }
}
