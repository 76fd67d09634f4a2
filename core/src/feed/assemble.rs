//! feed/assemble.rs
//! Ordered merge of filled slots into the envelope.
//!
//! Runs only after the barrier. Buffers are appended strictly by index and each one
//! is released right after its append.

use log::{debug, trace};
use thiserror::Error;

use crate::feed::envelope::Envelope;
use crate::feed::slots::{SkipReason, Slot, SlotArray};
use crate::model::EncodeError;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AssembleError {
    #[error(transparent)]
    Failed(EncodeError),

    #[error("record {index} was skipped ({reason:?})")]
    Skipped { index: usize, reason: SkipReason },
}

impl AssembleError {
    pub fn index(&self) -> usize {
        match self {
            AssembleError::Failed(e) => e.index,
            AssembleError::Skipped { index, .. } => *index,
        }
    }
}

/// Appends successive windows of slots, in order, into one envelope.
pub struct OrderedAssembler<'a> {
    envelope: &'a mut Envelope,
    next_index: usize,
    bytes_appended: u64,
}

impl<'a> OrderedAssembler<'a> {
    pub fn new(envelope: &'a mut Envelope) -> Self {
        Self { envelope, next_index: 0, bytes_appended: 0 }
    }

    /// Index the next window must start at.
    pub fn next_index(&self) -> usize {
        self.next_index
    }

    pub fn bytes_appended(&self) -> u64 {
        self.bytes_appended
    }

    /// Append every buffer of `slots` in index order. Returns the body bytes
    /// appended for this window.
    ///
    /// If any slot is not ready, nothing is appended and the lowest such index is
    /// reported; all buffers of the window are released either way.
    pub fn assemble(&mut self, slots: SlotArray) -> Result<u64, AssembleError> {
        assert_eq!(
            slots.base_index(),
            self.next_index,
            "windows must be assembled in order"
        );
        assert!(
            slots.iter().all(|s| !s.is_pending()),
            "assembler reached a pending slot before the barrier"
        );

        let base = slots.base_index();
        if let Some(err) = first_unready(&slots) {
            debug!("[ASSEMBLE] window at {} rejected: {}", base, err);
            return Err(err);
        }

        let mut appended = 0u64;
        for slot in slots.into_slots() {
            if let Slot::Ready(buffer) = slot {
                self.envelope.append_body(buffer.as_bytes());
                appended += buffer.len() as u64;
                self.next_index += 1;
                // `buffer` dropped here: released before the next append.
            }
        }

        self.bytes_appended += appended;
        trace!("[ASSEMBLE] window at {} appended {} bytes", base, appended);
        Ok(appended)
    }
}

fn first_unready(slots: &SlotArray) -> Option<AssembleError> {
    slots.iter().enumerate().find_map(|(offset, slot)| match slot {
        Slot::Ready(_) | Slot::Pending => None,
        Slot::Failed(e) => Some(AssembleError::Failed(e.clone())),
        Slot::Skipped(reason) => Some(AssembleError::Skipped { index: slots.base_index() + offset, reason: *reason }),
    })
}

/// Assemble a single slot array covering the whole batch.
pub fn assemble(slots: SlotArray, envelope: &mut Envelope) -> Result<u64, AssembleError> {
    OrderedAssembler::new(envelope).assemble(slots)
}
