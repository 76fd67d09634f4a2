//! telemetry/counters.rs
//! Counters collected while a feed is written.
//!
//! Converted into an immutable `TelemetrySnapshot` once the write finishes.

use std::sync::atomic::{AtomicUsize, Ordering};
use serde::{Deserialize, Serialize};

/// Deterministic counters for one feed write.
#[derive(Default, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TelemetryCounters {
    pub records_total: u64,
    pub records_encoded: u64,
    pub records_failed: u64,
    pub records_skipped: u64,
    pub windows_dispatched: u64,
    pub bytes_body: u64,
    pub bytes_overhead: u64,
}

impl TelemetryCounters {
    /// Record a start or end marker as overhead.
    pub fn add_marker(&mut self, marker_len: usize) {
        self.bytes_overhead += marker_len as u64;
    }

    /// Record one buffer appended to the body.
    pub fn add_body(&mut self, len: usize) {
        self.bytes_body += len as u64;
    }

    pub fn bytes_total(&self) -> u64 {
        self.bytes_body + self.bytes_overhead
    }
}

/// Live/peak gauge of encoded buffers held in memory.
///
/// Incremented when a task stores a buffer in its slot, decremented when the
/// assembler (or a discard) drops it.
#[derive(Debug, Default)]
pub struct BufferGauge {
    live: AtomicUsize,
    peak: AtomicUsize,
}

impl BufferGauge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquire(&self) {
        let now = self.live.fetch_add(1, Ordering::AcqRel) + 1;
        self.peak.fetch_max(now, Ordering::AcqRel);
    }

    pub fn release(&self) {
        self.live.fetch_sub(1, Ordering::AcqRel);
    }

    pub fn live(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::Acquire)
    }
}
