//! feed/config.rs
//! Write configuration: strategy, concurrency limit, failure policy.
//!
//! Loadable from JSON, e.g.
//!
//! ```json
//! { "concurrency": { "bounded": 1024 }, "on_failure": "collect_all", "workers": 8 }
//! ```

use std::path::Path;
use std::time::Duration;
use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_RECORD_SIZE_HINT, MAX_BOUNDED_WINDOW, MAX_WORKERS, MIN_WORKERS};
use crate::types::FeedError;

/// How record buffers reach the envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Encode and append on the calling thread, in order.
    Sequential,
    /// Baseline: every worker locks the envelope and appends as soon as it finishes.
    /// Body order follows completion order, not input order, so it is refused unless
    /// `allow_unordered` is set.
    SharedLock,
    /// Fan out into an index-addressed slot array, barrier, append in index order.
    #[default]
    Slotted,
}

/// Bound on encoded buffers held between dispatch and merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Concurrency {
    /// All N buffers may be live at once; maximum throughput.
    #[default]
    Unbounded,
    /// At most k buffers live at once; records are processed in windows of k.
    Bounded(usize),
}

impl Concurrency {
    /// Number of records dispatched per barrier for a batch of `total` records.
    pub fn window_len(&self, total: usize) -> usize {
        match *self {
            Concurrency::Unbounded => total.max(1),
            Concurrency::Bounded(k) => k.max(1),
        }
    }

    /// Derive a bounded window from a fraction of currently available memory.
    ///
    /// `record_size_hint` is the expected size of one encoded record in bytes.
    pub fn from_memory_budget(record_size_hint: u64, mem_fraction: f64, hard_cap: usize) -> Self {
        let mut sys = sysinfo::System::new();
        sys.refresh_memory();

        let avail_bytes = sys.available_memory();
        let budget = (avail_bytes as f64 * mem_fraction.clamp(0.0, 1.0)) as u64;
        let per_record = if record_size_hint == 0 { DEFAULT_RECORD_SIZE_HINT } else { record_size_hint };

        let window = (budget / per_record)
            .min(hard_cap.min(MAX_BOUNDED_WINDOW) as u64)
            .max(1);

        log::debug!(
            "[CONFIG] memory budget {} bytes of {} available -> bounded({})",
            budget, avail_bytes, window
        );
        Concurrency::Bounded(window as usize)
    }
}

/// What to report when records fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Report the first failing record by index; stop dispatching further windows.
    #[default]
    AbortOnFirst,
    /// Encode everything and report every failing record.
    CollectAll,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WriteConfig {
    pub strategy: Strategy,
    pub concurrency: Concurrency,
    pub on_failure: FailurePolicy,
    /// Worker threads; `None` derives the count from available cores.
    pub workers: Option<usize>,
    /// Skip tasks that have not started yet once any record fails.
    pub cancel_on_failure: bool,
    /// Per-batch deadline in milliseconds.
    pub timeout_ms: Option<u64>,
    /// Opt-in for strategies whose body order is not input order.
    pub allow_unordered: bool,
}

impl WriteConfig {
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn bounded(limit: usize) -> Self {
        Self { concurrency: Concurrency::Bounded(limit), ..Self::default() }
    }

    pub fn sequential() -> Self {
        Self { strategy: Strategy::Sequential, ..Self::default() }
    }

    /// Completion-order baseline, for comparisons only.
    pub fn shared_lock_baseline() -> Self {
        Self { strategy: Strategy::SharedLock, allow_unordered: true, ..Self::default() }
    }

    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers);
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.on_failure = policy;
        self
    }

    pub fn with_cancel_on_failure(mut self, cancel: bool) -> Self {
        self.cancel_on_failure = cancel;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        // Rounded up: a sub-millisecond timeout stays non-zero.
        let ms = timeout.as_micros().div_ceil(1_000);
        self.timeout_ms = Some(u64::try_from(ms).unwrap_or(u64::MAX));
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    pub fn validate(&self) -> Result<(), FeedError> {
        if let Concurrency::Bounded(k) = self.concurrency {
            if k == 0 {
                return Err(FeedError::Config("bounded concurrency limit must be at least 1".into()));
            }
        }

        if let Some(w) = self.workers {
            if !(MIN_WORKERS..=MAX_WORKERS).contains(&w) {
                return Err(FeedError::Config(format!(
                    "invalid workers count: {w}, must be within {MIN_WORKERS}..={MAX_WORKERS}"
                )));
            }
        }

        if self.timeout_ms == Some(0) {
            return Err(FeedError::Config("timeout_ms must be greater than zero".into()));
        }

        if self.strategy == Strategy::SharedLock && !self.allow_unordered {
            return Err(FeedError::Config(
                "shared_lock writes records in completion order; set allow_unordered to use it".into(),
            ));
        }

        if self.strategy == Strategy::Sequential && self.cancel_on_failure {
            log::debug!("[CONFIG] cancel_on_failure has no effect with the sequential strategy");
        }

        Ok(())
    }

    pub fn from_json_str(s: &str) -> Result<Self, FeedError> {
        let config: WriteConfig =
            serde_json::from_str(s).map_err(|e| FeedError::Config(format!("unreadable config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, FeedError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn to_json(&self) -> Result<String, FeedError> {
        serde_json::to_string_pretty(self).map_err(|e| FeedError::Config(e.to_string()))
    }
}
