// ## 📂 File: `src/headers/encode.rs`
//! src/headers/encode.rs
//!
//! Marker encoding. Field order must match `decode.rs` exactly.

use crate::headers::types::{FeedHeader, FeedTrailer, HeaderError};

/// Serialize the start marker (fixed prefix + context bytes).
///
/// Validates first so a malformed header never reaches a sink.
pub fn encode_header_le(h: &FeedHeader) -> Result<Vec<u8>, HeaderError> {
    h.validate()?;

    let mut out = Vec::with_capacity(h.encoded_len());

    out.extend_from_slice(&h.magic);                                   // 0..4   magic
    out.extend_from_slice(&h.version.to_le_bytes());                   // 4..6   version
    out.extend_from_slice(&h.flags.bits().to_le_bytes());              // 6..8   flags
    out.extend_from_slice(&h.payload_format.to_le_bytes());            // 8..10  payload format
    out.extend_from_slice(&h.reserved.to_le_bytes());                  // 10..12 reserved
    out.extend_from_slice(&h.record_count.to_le_bytes());              // 12..20 record count
    out.extend_from_slice(&(h.context.len() as u32).to_le_bytes());    // 20..24 context length
    out.extend_from_slice(h.context.as_bytes());                       // 24..   context

    debug_assert_eq!(out.len(), h.encoded_len(), "encoding wrote incorrect length");
    Ok(out)
}

/// Serialize the end marker into its fixed buffer.
#[inline]
pub fn encode_trailer_le(t: &FeedTrailer) -> [u8; FeedTrailer::LEN] {
    let mut out = [0u8; FeedTrailer::LEN];
    out[0..4].copy_from_slice(&t.magic);                         // 0..4   magic
    out[4..12].copy_from_slice(&t.record_count.to_le_bytes());   // 4..12  record count
    out[12..20].copy_from_slice(&t.body_len.to_le_bytes());      // 12..20 body length
    out[20..24].copy_from_slice(&t.body_crc32.to_le_bytes());    // 20..24 body crc32
    out
}
