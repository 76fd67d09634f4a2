use crate::constants::{MAX_WORKERS, MIN_WORKERS};
use crate::feed::config::WriteConfig;

/// Worker pool sizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParallelismProfile {
    pub workers: usize,
}

impl ParallelismProfile {
    pub fn single_threaded() -> Self {
        Self { workers: 1 }
    }

    pub fn new(workers: usize) -> Self {
        Self { workers: workers.clamp(MIN_WORKERS, MAX_WORKERS) }
    }

    /// One worker per core, leaving one core for the caller (which blocks at the
    /// barrier and then assembles).
    pub fn dynamic() -> Self {
        let cores = num_cpus::get();
        Self::new(cores.saturating_sub(1))
    }

    pub fn from_config(config: &WriteConfig) -> Self {
        let profile = match config.workers {
            Some(w) => Self::new(w),
            None => Self::dynamic(),
        };
        log::debug!("[PROFILE] workers={}", profile.workers);
        profile
    }

    /// Workers actually worth spawning for a window of `records`.
    pub fn workers_for(&self, records: usize) -> usize {
        self.workers.min(records).max(1)
    }
}

impl Default for ParallelismProfile {
    fn default() -> Self {
        Self::dynamic()
    }
}
