//! feed/core.rs
//! Stable public API: write one batch of records as one feed.

use std::io::Write;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use log::{debug, info, warn};

use crate::constants::DEFAULT_RECORD_SIZE_HINT;
use crate::feed::assemble::OrderedAssembler;
use crate::feed::baseline::{run_sequential, run_shared_lock};
use crate::feed::config::{FailurePolicy, Strategy, WriteConfig};
use crate::feed::dispatch::{DispatchControl, Dispatcher};
use crate::feed::envelope::Envelope;
use crate::feed::io::{open_output, OutputSink};
use crate::feed::parallelism::ParallelismProfile;
use crate::feed::slots::{BatchOutcome, SkipReason};
use crate::headers::FeedHeader;
use crate::model::{Model, Record, RecordEncoder};
use crate::telemetry::{BufferGauge, Stage, TelemetryCounters, TelemetrySnapshot, TelemetryTimer};
use crate::types::FeedError;

#[derive(Debug, Clone)]
pub struct FeedReport {
    pub snapshot: TelemetrySnapshot,
    /// Bytes handed to the sink, markers included.
    pub bytes_written: u64,
    /// The finished feed, when written to `OutputSink::Memory`.
    pub output: Option<Bytes>,
}

/// Write `records` as one feed into `sink`.
///
/// Body order always equals input order. On any failure nothing reaches `sink`.
pub fn write_feed<E, W>(
    records: &[Record],
    model: &Model,
    encoder: &E,
    config: &WriteConfig,
    sink: &mut W,
) -> Result<FeedReport, FeedError>
where
    E: RecordEncoder + ?Sized,
    W: Write + ?Sized,
{
    config.validate()?;

    let mut timer = TelemetryTimer::new();
    let mut counters = TelemetryCounters { records_total: records.len() as u64, ..TelemetryCounters::default() };
    let profile = ParallelismProfile::from_config(config);
    let gauge = Arc::new(BufferGauge::new());
    let control = DispatchControl::new(config.cancel_on_failure, config.timeout().map(|t| timer.start_time + t));

    info!(
        "[FEED] writing {} records to {} ({:?}, {:?}, {} workers)",
        records.len(), model.entity_set(), config.strategy, config.concurrency, profile.workers
    );

    let header = FeedHeader::new(encoder.payload_format(), records.len() as u64, model.context_url());
    let mut envelope = Envelope::for_records(records.len(), DEFAULT_RECORD_SIZE_HINT as usize);
    counters.add_marker(envelope.open(&header)?);

    let outcome = match config.strategy {
        Strategy::Sequential => {
            counters.windows_dispatched = 1;
            timer.time(Stage::Encode, || {
                run_sequential(records, model, encoder, &mut envelope, config.on_failure, &control, &gauge)
            })
        }
        Strategy::SharedLock => {
            counters.windows_dispatched = 1;
            timer.time(Stage::Encode, || {
                run_shared_lock(records, model, encoder, &mut envelope, profile, &control, &gauge)
            })
        }
        Strategy::Slotted => run_slotted(
            records, model, encoder, config, profile, &control, &gauge, &mut envelope, &mut counters, &mut timer,
        ),
    };

    counters.records_encoded = outcome.encoded as u64;
    counters.records_failed = outcome.failures.len() as u64;
    counters.records_skipped = outcome.skipped() as u64;

    if let Some(err) = batch_error(outcome, config, &timer) {
        warn!("[FEED] write abandoned, nothing written: {}", err);
        return Err(err);
    }

    counters.add_body(envelope.body_len() as usize);
    counters.add_marker(envelope.close());

    let bytes_written = timer.time(Stage::Write, || envelope.commit(sink))?;
    timer.finish();

    let snapshot = TelemetrySnapshot::from(&counters, &timer, gauge.peak(), profile.workers);
    info!(
        "[FEED] wrote {} records, {} bytes in {:?} (peak live buffers {})",
        snapshot.records_encoded, bytes_written, snapshot.elapsed, snapshot.peak_live_buffers
    );
    debug!("[FEED] stages: {}", snapshot.stage_times.summary());

    Ok(FeedReport { snapshot, bytes_written, output: None })
}

/// Same as `write_feed`, for a normalized sink.
pub fn write_feed_to<E>(
    records: &[Record],
    model: &Model,
    encoder: &E,
    config: &WriteConfig,
    sink: OutputSink,
) -> Result<FeedReport, FeedError>
where
    E: RecordEncoder + ?Sized,
{
    match open_output(sink) {
        Some(mut writer) => write_feed(records, model, encoder, config, &mut writer),
        None => {
            let mut buf = Vec::new();
            let mut report = write_feed(records, model, encoder, config, &mut buf)?;
            report.output = Some(Bytes::from(buf));
            Ok(report)
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn run_slotted<E>(
    records: &[Record],
    model: &Model,
    encoder: &E,
    config: &WriteConfig,
    profile: ParallelismProfile,
    control: &DispatchControl,
    gauge: &Arc<BufferGauge>,
    envelope: &mut Envelope,
    counters: &mut TelemetryCounters,
    timer: &mut TelemetryTimer,
) -> BatchOutcome
where
    E: RecordEncoder + ?Sized,
{
    let dispatcher = Dispatcher::new(model, encoder, profile, gauge.clone(), control);
    let window = config.concurrency.window_len(records.len());
    let mut assembler = OrderedAssembler::new(envelope);
    let mut total = BatchOutcome::default();
    let mut mark = Instant::now();

    let dispatched = dispatcher.dispatch_windows(records, window, |slots, outcome| {
        timer.add_stage_time(Stage::Encode, mark.elapsed());
        counters.windows_dispatched += 1;
        total.merge(outcome);

        if total.is_success() {
            if let Err(e) = timer.time(Stage::Assemble, || assembler.assemble(slots)) {
                debug!("[FEED] assembly stopped: {}", e);
            }
            mark = Instant::now();
            return ControlFlow::Continue(());
        }
        // Buffers of a failed window are released before the next window starts.
        drop(slots);
        mark = Instant::now();

        if control.is_timed_out() || control.is_cancelled() || config.on_failure == FailurePolicy::AbortOnFirst {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    });

    let rest = records.len() - dispatched;
    if rest > 0 {
        let reason = if control.is_timed_out() { SkipReason::TimedOut } else { SkipReason::Cancelled };
        total.skip_remaining(rest, reason);
    }

    total
}

fn batch_error(outcome: BatchOutcome, config: &WriteConfig, timer: &TelemetryTimer) -> Option<FeedError> {
    if outcome.is_success() {
        return None;
    }

    let total = outcome.total;
    if !outcome.failures.is_empty() {
        let failed = outcome.failures.len();
        let mut failures = outcome.failures;
        if config.on_failure == FailurePolicy::AbortOnFirst {
            failures.truncate(1);
        }
        return Some(FeedError::PartialBatchFailure { failures, failed, total });
    }

    if outcome.timed_out > 0 {
        return Some(FeedError::BarrierTimeout {
            limit: config.timeout().unwrap_or_default(),
            elapsed: Instant::now().duration_since(timer.start_time),
            completed: outcome.encoded,
            total,
        });
    }

    Some(FeedError::PartialBatchFailure { failures: Vec::new(), failed: 0, total })
}
