/// Start-of-feed magic.
/// "FED1" = Framed Entry Document v1
pub const MAGIC_FEED: [u8; 4] = *b"FED1";
/// End-of-feed magic.
pub const MAGIC_FEED_END: [u8; 4] = *b"FEND";
pub const FEED_VERSION: u16 = 1;

/// Upper bound on a single record payload (framed with a u32 length prefix).
pub const MAX_RECORD_LEN: usize = 64 * 1024 * 1024; // 64 MiB
/// Upper bound on the context URL carried in the start marker.
pub const MAX_CONTEXT_LEN: usize = 4096;

/// Worker thread bounds.
pub const MIN_WORKERS: usize = 1;
pub const MAX_WORKERS: usize = 256;

/// Channel capacity per worker between the dispatcher and the pool.
pub const JOB_QUEUE_DEPTH_PER_WORKER: usize = 4;

/// Fallback estimate for one encoded record when sizing a bounded window from memory.
pub const DEFAULT_RECORD_SIZE_HINT: u64 = 512;
/// Hard cap for a memory-derived bounded window.
pub const MAX_BOUNDED_WINDOW: usize = 1 << 20;

/// Payload format identifiers (mirrored in the start marker).
pub mod format_ids {
    pub const OPAQUE: u16 = 0x00FF;
    pub const JSON: u16   = 0x0001;
}
