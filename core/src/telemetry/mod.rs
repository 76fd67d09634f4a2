//! telemetry/mod.rs
//! Counters, stage timers and immutable snapshots for feed writes.

pub mod counters;
pub mod snapshot;
pub mod timers;

pub use counters::{BufferGauge, TelemetryCounters};
pub use snapshot::TelemetrySnapshot;
pub use timers::{Stage, StageTimes, TelemetryTimer};
