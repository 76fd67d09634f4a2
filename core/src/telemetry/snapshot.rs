//! telemetry/snapshot.rs

use std::time::Duration;
use serde::{Serialize, Deserialize};

use crate::telemetry::counters::TelemetryCounters;
use crate::telemetry::timers::{TelemetryTimer, StageTimes, Stage};

/// Immutable summary of one feed write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    pub records_total: u64,
    pub records_encoded: u64,
    pub records_failed: u64,
    pub records_skipped: u64,
    pub windows_dispatched: u64,
    pub bytes_body: u64,
    pub bytes_overhead: u64,
    /// Highest number of encoded buffers alive at once.
    pub peak_live_buffers: usize,
    pub worker_count: usize,
    pub throughput_records_per_sec: f64,
    pub elapsed: Duration,
    pub stage_times: StageTimes,
}

impl TelemetrySnapshot {
    pub fn from(
        counters: &TelemetryCounters,
        timer: &TelemetryTimer,
        peak_live_buffers: usize,
        worker_count: usize,
    ) -> Self {
        let elapsed = timer.elapsed();

        let throughput = if elapsed.as_secs_f64() > 0.0 {
            counters.records_encoded as f64 / elapsed.as_secs_f64()
        } else {
            0.0
        };

        Self {
            records_total: counters.records_total,
            records_encoded: counters.records_encoded,
            records_failed: counters.records_failed,
            records_skipped: counters.records_skipped,
            windows_dispatched: counters.windows_dispatched,
            bytes_body: counters.bytes_body,
            bytes_overhead: counters.bytes_overhead,
            peak_live_buffers,
            worker_count,
            throughput_records_per_sec: throughput,
            elapsed,
            stage_times: timer.stage_times.clone(),
        }
    }

    pub fn total_stage_time(&self) -> Duration {
        self.stage_times.total()
    }

    pub fn has_all_stages(&self, expected: &[Stage]) -> bool {
        self.stage_times.has_all(expected)
    }

    /// Internal consistency:
    /// - every record is accounted for
    /// - stage time never exceeds wall time
    pub fn sanity_check(&self) -> bool {
        self.records_encoded + self.records_failed + self.records_skipped == self.records_total
            && self.total_stage_time() <= self.elapsed
    }

    pub fn output_bytes(&self) -> u64 {
        self.bytes_body + self.bytes_overhead
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
