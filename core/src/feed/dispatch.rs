//! feed/dispatch.rs
//! Parallel fan-out of record encoding into a slot array.
//!
//! The calling thread feeds jobs into a bounded channel; each job carries the record
//! and a mutable borrow of the one slot it may write. A worker fills the slot and
//! hands the borrow back; once every borrow of a window is back, that window is
//! past its barrier. One scoped pool serves all windows of a batch.

use std::sync::atomic::{AtomicBool, Ordering};
use std::ops::ControlFlow;
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use crossbeam::channel::{bounded, Receiver, Sender};
use log::{debug, trace, warn};

use crate::constants::JOB_QUEUE_DEPTH_PER_WORKER;
use crate::feed::framing::encode_record;
use crate::feed::parallelism::ParallelismProfile;
use crate::feed::slots::{BatchOutcome, LiveBuffer, SkipReason, Slot, SlotArray};
use crate::model::{Model, Record, RecordEncoder};
use crate::telemetry::BufferGauge;

/// Cooperative stop signals shared by all tasks of one batch.
///
/// Tasks already encoding always finish; only tasks that have not started yet
/// observe a cancel or an expired deadline and skip their record.
#[derive(Debug, Default)]
pub struct DispatchControl {
    cancel_on_failure: bool,
    deadline: Option<Instant>,
    cancelled: AtomicBool,
    timed_out: AtomicBool,
}

impl DispatchControl {
    pub fn new(cancel_on_failure: bool, deadline: Option<Instant>) -> Self {
        Self { cancel_on_failure, deadline, ..Self::default() }
    }

    /// Ask every not-yet-started task to skip its record.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    pub fn is_timed_out(&self) -> bool {
        self.timed_out.load(Ordering::Acquire)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub(crate) fn skip_reason(&self) -> Option<SkipReason> {
        if self.is_cancelled() {
            return Some(SkipReason::Cancelled);
        }
        if self.is_timed_out() {
            return Some(SkipReason::TimedOut);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => {
                self.timed_out.store(true, Ordering::Release);
                Some(SkipReason::TimedOut)
            }
            _ => None,
        }
    }

    pub(crate) fn record_failure(&self) {
        if self.cancel_on_failure {
            self.cancel();
        }
    }
}

struct Job<'a> {
    index: usize,
    record: &'a Record,
    slot: &'a mut Slot,
}

/// Runs encode tasks on a scoped worker pool and fills slots by index.
pub struct Dispatcher<'a, E: ?Sized> {
    model: &'a Model,
    encoder: &'a E,
    profile: ParallelismProfile,
    gauge: Arc<BufferGauge>,
    control: &'a DispatchControl,
}

impl<'a, E> Dispatcher<'a, E>
where
    E: RecordEncoder + ?Sized,
{
    pub fn new(
        model: &'a Model,
        encoder: &'a E,
        profile: ParallelismProfile,
        gauge: Arc<BufferGauge>,
        control: &'a DispatchControl,
    ) -> Self {
        Self { model, encoder, profile, gauge, control }
    }

    /// Encode `records` (batch positions `base_index..`) into a fresh slot array.
    ///
    /// Returns after the barrier; the outcome tallies every slot.
    pub fn dispatch(&self, records: &[Record], base_index: usize) -> (SlotArray, BatchOutcome) {
        let mut result = None;
        self.run_windows(records, base_index, records.len(), |slots, outcome| {
            result = Some((slots, outcome));
            ControlFlow::Break(())
        });
        result.unwrap_or_else(|| {
            let slots = SlotArray::new(base_index, 0);
            let outcome = slots.outcome();
            (slots, outcome)
        })
    }

    /// Encode `records` in consecutive windows of `window` records on one worker pool.
    ///
    /// The next window is not dispatched until `on_window` has taken the previous
    /// one, so at most `window` encoded buffers are alive at any time. Returns how
    /// many records were dispatched before `on_window` broke off.
    pub fn dispatch_windows<F>(&self, records: &[Record], window: usize, on_window: F) -> usize
    where
        F: FnMut(SlotArray, BatchOutcome) -> ControlFlow<()>,
    {
        self.run_windows(records, 0, window, on_window)
    }

    fn run_windows<F>(&self, records: &[Record], base_index: usize, window: usize, mut on_window: F) -> usize
    where
        F: FnMut(SlotArray, BatchOutcome) -> ControlFlow<()>,
    {
        if records.is_empty() {
            return 0;
        }
        let window = window.clamp(1, records.len());
        let workers = self.profile.workers_for(window);
        debug!(
            "[DISPATCH] {} records from {} in windows of {} on {} workers",
            records.len(), base_index, window, workers
        );

        let mut cells: Vec<Slot> = (0..records.len()).map(|_| Slot::Pending).collect();
        let mut dispatched = 0usize;

        thread::scope(|scope| {
            let (job_tx, job_rx) = bounded::<Job<'_>>(workers * JOB_QUEUE_DEPTH_PER_WORKER);
            // Holds a full window.
            let (done_tx, done_rx) = bounded::<Job<'_>>(window);

            for worker_id in 0..workers {
                let rx = job_rx.clone();
                let done = done_tx.clone();
                scope.spawn(move || self.run_worker(worker_id, rx, done));
            }
            drop(job_rx);
            drop(done_tx);

            for (w, (chunk, chunk_cells)) in records.chunks(window).zip(cells.chunks_mut(window)).enumerate() {
                let base = base_index + w * window;

                let mut sent = 0usize;
                for (offset, (record, slot)) in chunk.iter().zip(chunk_cells.iter_mut()).enumerate() {
                    // Only fails once every worker is gone, i.e. one of them panicked;
                    // the scope re-raises that panic on exit.
                    if job_tx.send(Job { index: base + offset, record, slot }).is_err() {
                        break;
                    }
                    sent += 1;
                }

                // Window barrier: every slot borrow handed out comes back filled.
                let mut returned: Vec<Option<&mut Slot>> = (0..chunk.len()).map(|_| None).collect();
                for _ in 0..sent {
                    match done_rx.recv() {
                        Ok(job) => returned[job.index - base] = Some(job.slot),
                        Err(_) => break,
                    }
                }
                dispatched += chunk.len();

                let slots = SlotArray::from_slots(
                    base,
                    returned.into_iter().map(|cell| cell.map_or(Slot::Pending, Slot::take)).collect(),
                );
                let outcome = slots.outcome();
                debug!(
                    "[DISPATCH] barrier reached at {}: encoded={} failed={} cancelled={} timed_out={}",
                    base,
                    outcome.encoded,
                    outcome.failures.len(),
                    outcome.cancelled,
                    outcome.timed_out
                );

                if on_window(slots, outcome).is_break() {
                    break;
                }
            }
            drop(job_tx);
        });

        dispatched
    }

    fn run_worker<'s>(&self, worker_id: usize, rx: Receiver<Job<'s>>, done: Sender<Job<'s>>) {
        let mut handled = 0usize;

        for job in rx.iter() {
            let filled = match self.control.skip_reason() {
                Some(reason) => Slot::Skipped(reason),
                None => match encode_record(job.index, job.record, self.model, self.encoder) {
                    Ok(buffer) => Slot::Ready(LiveBuffer::new(buffer, self.gauge.clone())),
                    Err(e) => {
                        warn!("[WORKER-{worker_id}] {e}");
                        self.control.record_failure();
                        Slot::Failed(e)
                    }
                },
            };
            job.slot.fill(filled);
            handled += 1;
            if done.send(job).is_err() {
                break;
            }
        }

        trace!("[WORKER-{worker_id}] channel closed after {handled} records");
    }
}

/// One-shot fan-out of a whole batch with `workers` threads.
pub fn dispatch<E>(records: &[Record], model: &Model, encoder: &E, workers: usize) -> (SlotArray, BatchOutcome)
where
    E: RecordEncoder + ?Sized,
{
    let control = DispatchControl::default();
    let gauge = Arc::new(BufferGauge::new());
    Dispatcher::new(model, encoder, ParallelismProfile::new(workers), gauge, &control).dispatch(records, 0)
}
