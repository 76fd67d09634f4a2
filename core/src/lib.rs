//! feed-core
//!
//! Parallel, order-preserving writer for framed record feeds.
//! Records are encoded concurrently; the feed body always lists them in input order.

#![forbid(unsafe_code)]

// Shared and top level
pub mod constants;
pub mod types;
pub mod utils;

pub mod headers;
pub mod model;
pub mod telemetry;

// Writer
pub mod feed;

// -----------------------------------------------------------------------------
// Prelude (Rust users)
// -----------------------------------------------------------------------------
pub mod prelude {
    pub use crate::feed::{
        decode_feed, write_feed, write_feed_to, Concurrency, FailurePolicy, FeedReport, OutputSink, Strategy,
        WriteConfig,
    };
    pub use crate::model::{
        ComplexType, ComplexValue, EncodeFailure, EntityType, EnumType, JsonEntryEncoder, Model, PropertyDef,
        PropertyKind, Record, RecordEncoder, Value,
    };
    pub use crate::telemetry::TelemetrySnapshot;
    pub use crate::types::FeedError;
}
