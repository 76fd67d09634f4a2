//! feed/slots.rs
//! Index-addressed result slots shared between the dispatcher and the assembler.
//!
//! Slot `i` is written by exactly one task (the one encoding record `i`) and read
//! only after the barrier. No slot is ever resized or reordered.

use std::sync::Arc;

use crate::feed::framing::EncodedBuffer;
use crate::model::EncodeError;
use crate::telemetry::BufferGauge;

/// An encoded buffer counted against the live-buffer gauge until dropped.
#[derive(Debug)]
pub struct LiveBuffer {
    buffer: EncodedBuffer,
    gauge: Arc<BufferGauge>,
}

impl LiveBuffer {
    pub fn new(buffer: EncodedBuffer, gauge: Arc<BufferGauge>) -> Self {
        gauge.acquire();
        Self { buffer, gauge }
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.buffer.as_bytes()
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

impl Drop for LiveBuffer {
    fn drop(&mut self) {
        self.gauge.release();
    }
}

/// Why a task left its record unencoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// A sibling record failed and cancellation was requested.
    Cancelled,
    /// The batch deadline passed before the task started.
    TimedOut,
}

#[derive(Debug)]
pub enum Slot {
    Pending,
    Ready(LiveBuffer),
    Failed(EncodeError),
    Skipped(SkipReason),
}

impl Slot {
    pub fn is_pending(&self) -> bool {
        matches!(self, Slot::Pending)
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Slot::Ready(_))
    }

    /// Store a task's result. Each slot accepts exactly one result.
    pub fn fill(&mut self, outcome: Slot) {
        assert!(self.is_pending(), "slot written twice");
        assert!(!outcome.is_pending(), "slot filled with Pending");
        *self = outcome;
    }

    /// Move the result out, leaving `Pending` behind.
    pub(crate) fn take(&mut self) -> Slot {
        std::mem::replace(self, Slot::Pending)
    }
}

/// Slots for one dispatched window, positioned at `base_index` in the batch.
#[derive(Debug)]
pub struct SlotArray {
    base_index: usize,
    slots: Vec<Slot>,
}

impl SlotArray {
    pub fn new(base_index: usize, len: usize) -> Self {
        let slots = (0..len).map(|_| Slot::Pending).collect();
        Self { base_index, slots }
    }

    pub(crate) fn from_slots(base_index: usize, slots: Vec<Slot>) -> Self {
        Self { base_index, slots }
    }

    pub fn base_index(&self) -> usize {
        self.base_index
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Slot for batch index `index`.
    pub fn get(&self, index: usize) -> Option<&Slot> {
        index.checked_sub(self.base_index).and_then(|i| self.slots.get(i))
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Slot> {
        self.slots.iter()
    }

    pub(crate) fn into_slots(self) -> std::vec::IntoIter<Slot> {
        self.slots.into_iter()
    }

    /// Tally the slots.
    pub fn outcome(&self) -> BatchOutcome {
        let mut out = BatchOutcome { total: self.slots.len(), ..BatchOutcome::default() };
        for slot in &self.slots {
            match slot {
                Slot::Pending => out.pending += 1,
                Slot::Ready(_) => out.encoded += 1,
                Slot::Failed(e) => out.failures.push(e.clone()),
                Slot::Skipped(SkipReason::Cancelled) => out.cancelled += 1,
                Slot::Skipped(SkipReason::TimedOut) => out.timed_out += 1,
            }
        }
        out
    }
}

/// Per-batch summary of slot states. `failures` is kept in index order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub total: usize,
    pub encoded: usize,
    pub failures: Vec<EncodeError>,
    pub cancelled: usize,
    pub timed_out: usize,
    pub pending: usize,
}

impl BatchOutcome {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty() && self.cancelled == 0 && self.timed_out == 0 && self.pending == 0
    }

    pub fn first_failure(&self) -> Option<&EncodeError> {
        self.failures.first()
    }

    pub fn skipped(&self) -> usize {
        self.cancelled + self.timed_out + self.pending
    }

    /// Fold in the outcome of a later window.
    pub fn merge(&mut self, other: BatchOutcome) {
        self.total += other.total;
        self.encoded += other.encoded;
        self.failures.extend(other.failures);
        self.cancelled += other.cancelled;
        self.timed_out += other.timed_out;
        self.pending += other.pending;
    }

    /// Count a record that was dispatched but skipped.
    pub fn note_skip(&mut self, reason: SkipReason) {
        match reason {
            SkipReason::Cancelled => self.cancelled += 1,
            SkipReason::TimedOut => self.timed_out += 1,
        }
    }

    /// Account for records never dispatched.
    pub fn skip_remaining(&mut self, count: usize, reason: SkipReason) {
        self.total += count;
        match reason {
            SkipReason::Cancelled => self.cancelled += count,
            SkipReason::TimedOut => self.timed_out += count,
        }
    }
}
