//! feed/baseline.rs
//! Comparison strategies for the slotted writer.
//!
//! - `run_sequential`: one thread, encode-then-append in input order.
//! - `run_shared_lock`: workers append straight into a mutex-guarded envelope as
//!   they finish. Body order follows completion order, so this does not preserve
//!   input order; it exists to measure the cost of doing so.

use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

use crossbeam::channel::bounded;
use log::{debug, warn};

use crate::constants::JOB_QUEUE_DEPTH_PER_WORKER;
use crate::feed::config::FailurePolicy;
use crate::feed::dispatch::DispatchControl;
use crate::feed::envelope::Envelope;
use crate::feed::framing::encode_record;
use crate::feed::parallelism::ParallelismProfile;
use crate::feed::slots::{BatchOutcome, LiveBuffer, SkipReason};
use crate::model::{Model, Record, RecordEncoder};
use crate::telemetry::BufferGauge;

pub fn run_sequential<E>(
    records: &[Record],
    model: &Model,
    encoder: &E,
    envelope: &mut Envelope,
    policy: FailurePolicy,
    control: &DispatchControl,
    gauge: &Arc<BufferGauge>,
) -> BatchOutcome
where
    E: RecordEncoder + ?Sized,
{
    let mut outcome = BatchOutcome::default();

    for (index, record) in records.iter().enumerate() {
        if let Some(reason) = control.skip_reason() {
            outcome.skip_remaining(records.len() - index, reason);
            break;
        }
        outcome.total += 1;
        match encode_record(index, record, model, encoder) {
            Ok(buffer) => {
                outcome.encoded += 1;
                if outcome.failures.is_empty() {
                    let live = LiveBuffer::new(buffer, gauge.clone());
                    envelope.append_body(live.as_bytes());
                }
            }
            Err(e) => {
                warn!("[SEQUENTIAL] {e}");
                outcome.failures.push(e);
                if policy == FailurePolicy::AbortOnFirst {
                    outcome.skip_remaining(records.len() - index - 1, SkipReason::Cancelled);
                    break;
                }
            }
        }
    }

    outcome
}

struct Shared<'a> {
    envelope: &'a mut Envelope,
    outcome: BatchOutcome,
}

pub fn run_shared_lock<E>(
    records: &[Record],
    model: &Model,
    encoder: &E,
    envelope: &mut Envelope,
    profile: ParallelismProfile,
    control: &DispatchControl,
    gauge: &Arc<BufferGauge>,
) -> BatchOutcome
where
    E: RecordEncoder + ?Sized,
{
    if records.is_empty() {
        return BatchOutcome::default();
    }

    let workers = profile.workers_for(records.len());
    let shared = Mutex::new(Shared {
        envelope,
        outcome: BatchOutcome { total: records.len(), ..BatchOutcome::default() },
    });
    debug!("[SHARED-LOCK] {} records on {} workers", records.len(), workers);

    thread::scope(|scope| {
        let (job_tx, job_rx) = bounded::<(usize, &Record)>(workers * JOB_QUEUE_DEPTH_PER_WORKER);

        for worker_id in 0..workers {
            let rx = job_rx.clone();
            let shared = &shared;
            scope.spawn(move || {
                for (index, record) in rx.iter() {
                    if let Some(reason) = control.skip_reason() {
                        let mut guard = shared.lock().unwrap_or_else(PoisonError::into_inner);
                        guard.outcome.note_skip(reason);
                        continue;
                    }
                    let result = encode_record(index, record, model, encoder);

                    let mut guard = shared.lock().unwrap_or_else(PoisonError::into_inner);
                    match result {
                        Ok(buffer) => {
                            guard.outcome.encoded += 1;
                            if guard.outcome.failures.is_empty() {
                                let live = LiveBuffer::new(buffer, gauge.clone());
                                guard.envelope.append_body(live.as_bytes());
                            }
                        }
                        Err(e) => {
                            warn!("[SHARED-LOCK-{worker_id}] {e}");
                            guard.outcome.failures.push(e);
                            control.record_failure();
                        }
                    }
                }
            });
        }
        drop(job_rx);

        for job in records.iter().enumerate() {
            if job_tx.send(job).is_err() {
                break;
            }
        }
        drop(job_tx);
    });

    let mut outcome = shared.into_inner().unwrap_or_else(PoisonError::into_inner).outcome;
    outcome.failures.sort_by_key(|e| e.index);
    outcome
}
