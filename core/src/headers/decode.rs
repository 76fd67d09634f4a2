// ## 📂 File: `src/headers/decode.rs`
//! src/headers/decode.rs
//!
//! Marker decoding. Field order must match `encode.rs` exactly; decoded markers are
//! validated before they are returned.

use byteorder::{ByteOrder, LittleEndian};

use crate::headers::types::{FeedFlags, FeedHeader, FeedTrailer, HeaderError};

/// Decode a start marker from the front of `buf`.
///
/// Returns the header and the number of bytes it occupied, so the caller can
/// continue with the body.
pub fn decode_header_le(buf: &[u8]) -> Result<(FeedHeader, usize), HeaderError> {
    if buf.len() < FeedHeader::FIXED_LEN {
        return Err(HeaderError::BufferTooShort { have: buf.len(), need: FeedHeader::FIXED_LEN });
    }

    let mut magic = [0u8; 4];
    magic.copy_from_slice(&buf[0..4]);                       // 0..4   magic
    let version        = LittleEndian::read_u16(&buf[4..6]);   // 4..6   version
    let raw_flags      = LittleEndian::read_u16(&buf[6..8]);   // 6..8   flags
    let payload_format = LittleEndian::read_u16(&buf[8..10]);  // 8..10  payload format
    let reserved       = LittleEndian::read_u16(&buf[10..12]); // 10..12 reserved
    let record_count   = LittleEndian::read_u64(&buf[12..20]); // 12..20 record count
    let context_len    = LittleEndian::read_u32(&buf[20..24]) as usize; // 20..24

    let flags = FeedFlags::from_bits(raw_flags)
        .ok_or(HeaderError::UnknownFlags { raw: raw_flags })?;

    let total = FeedHeader::FIXED_LEN + context_len;
    if buf.len() < total {
        return Err(HeaderError::BufferTooShort { have: buf.len(), need: total });
    }
    let context = std::str::from_utf8(&buf[FeedHeader::FIXED_LEN..total])
        .map_err(|_| HeaderError::ContextNotUtf8)?
        .to_owned();

    let h = FeedHeader { magic, version, flags, payload_format, reserved, record_count, context };
    h.validate()?;

    Ok((h, total))
}

/// Decode an end marker from exactly `FeedTrailer::LEN` bytes.
pub fn decode_trailer_le(buf: &[u8]) -> Result<FeedTrailer, HeaderError> {
    if buf.len() < FeedTrailer::LEN {
        return Err(HeaderError::BufferTooShort { have: buf.len(), need: FeedTrailer::LEN });
    }

    let mut magic = [0u8; 4];
    magic.copy_from_slice(&buf[0..4]);
    let t = FeedTrailer {
        magic,
        record_count: LittleEndian::read_u64(&buf[4..12]),
        body_len: LittleEndian::read_u64(&buf[12..20]),
        body_crc32: LittleEndian::read_u32(&buf[20..24]),
    };
    t.validate()?;

    Ok(t)
}
