//! telemetry/timers.rs
//! Wall-clock timing of the write stages.
//!
//! Stages repeat once per window in bounded mode; their times accumulate.

use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, Instant};
use serde::{Deserialize, Serialize};

/// Write stages, in pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Stage {
    /// Fan-out up to the barrier.
    Encode,
    /// Ordered append into the envelope.
    Assemble,
    /// Commit of the finished feed to the sink.
    Write,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Encode => "encode",
            Stage::Assemble => "assemble",
            Stage::Write => "write",
        })
    }
}

/// Accumulated time per stage, kept in pipeline order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageTimes(BTreeMap<Stage, Duration>);

impl StageTimes {
    pub fn add(&mut self, stage: Stage, dur: Duration) {
        *self.0.entry(stage).or_default() += dur;
    }

    pub fn get(&self, stage: Stage) -> Duration {
        self.0.get(&stage).copied().unwrap_or_default()
    }

    pub fn total(&self) -> Duration {
        self.0.values().sum()
    }

    pub fn has_all(&self, expected: &[Stage]) -> bool {
        expected.iter().all(|s| self.0.contains_key(s))
    }

    pub fn iter(&self) -> impl Iterator<Item = (Stage, Duration)> + '_ {
        self.0.iter().map(|(s, d)| (*s, *d))
    }

    /// `encode=1.234ms assemble=0.101ms ...`
    pub fn summary(&self) -> String {
        self.iter()
            .map(|(stage, dur)| format!("{}={:.3}ms", stage, dur.as_secs_f64() * 1_000.0))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Start-to-finish timer for one feed write.
#[derive(Clone, Debug)]
pub struct TelemetryTimer {
    pub start_time: Instant,
    pub end_time: Option<Instant>,
    pub stage_times: StageTimes,
}

impl Default for TelemetryTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl TelemetryTimer {
    pub fn new() -> Self {
        Self { start_time: Instant::now(), end_time: None, stage_times: StageTimes::default() }
    }

    pub fn finish(&mut self) {
        self.end_time = Some(Instant::now());
    }

    pub fn add_stage_time(&mut self, stage: Stage, dur: Duration) {
        self.stage_times.add(stage, dur);
    }

    /// Run `f` and charge its wall time to `stage`.
    pub fn time<T>(&mut self, stage: Stage, f: impl FnOnce() -> T) -> T {
        let started = Instant::now();
        let out = f();
        self.add_stage_time(stage, started.elapsed());
        out
    }

    /// Time since start, frozen once `finish` has been called.
    pub fn elapsed(&self) -> Duration {
        self.end_time.unwrap_or_else(Instant::now).duration_since(self.start_time)
    }
}
