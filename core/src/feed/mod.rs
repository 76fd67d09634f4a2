//! feed/mod.rs
//! Parallel, order-preserving feed writer.
//!
//! ```text
//! records ──► Dispatcher ──► SlotArray ──► barrier ──► OrderedAssembler ──► Envelope ──► sink
//!             (worker pool)  (slot i = record i)        (index order)        (markers)
//! ```

pub mod config;
pub mod parallelism;
pub mod framing;
pub mod slots;
pub mod dispatch;
pub mod assemble;
pub mod envelope;
pub mod baseline;
pub mod io;
pub mod core;

pub use config::{Concurrency, FailurePolicy, Strategy, WriteConfig};
pub use parallelism::ParallelismProfile;
pub use framing::{decode_feed, encode_record, frame_record, EncodedBuffer, FeedView, FrameError, TaskOutcome, RECORD_PREFIX_LEN};
pub use slots::{BatchOutcome, LiveBuffer, SkipReason, Slot, SlotArray};
pub use dispatch::{dispatch, DispatchControl, Dispatcher};
pub use assemble::{assemble, AssembleError, OrderedAssembler};
pub use envelope::{Envelope, EnvelopeState};
pub use baseline::{run_sequential, run_shared_lock};
pub use io::{open_output, DeferredFile, OutputSink};
pub use self::core::{write_feed, write_feed_to, FeedReport};
