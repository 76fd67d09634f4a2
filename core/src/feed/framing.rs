//! feed/framing.rs
//! Record framing and whole-feed decoding.
//!
//! Wire layout:
//!
//! ```text
//! [ start marker | record* | end marker ]
//! record = u32 LE payload length | payload
//! ```

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use bytes::{BufMut, Bytes, BytesMut};

use crate::constants::MAX_RECORD_LEN;
use crate::headers::{decode_header_le, decode_trailer_le, FeedFlags, FeedHeader, FeedTrailer, HeaderError};
use crate::model::{EncodeError, EncodeErrorKind, EncodeFailure, Model, Record, RecordEncoder};
use crate::utils::compute_crc32;

/// Length prefix in front of every record payload.
pub const RECORD_PREFIX_LEN: usize = 4;

/// One framed record: length prefix plus payload, ready to append as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedBuffer(Bytes);

impl EncodedBuffer {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn payload(&self) -> &[u8] {
        &self.0[RECORD_PREFIX_LEN..]
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_bytes(self) -> Bytes {
        self.0
    }
}

/// Result of encoding one record in one task.
pub type TaskOutcome = Result<EncodedBuffer, EncodeError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    Marker(HeaderError),
    RecordTooLarge { len: usize, max: usize },
    Truncated { offset: usize, need: usize, have: usize },
    RecordCountMismatch { declared: u64, actual: u64 },
    BodyLengthMismatch { declared: u64, actual: u64 },
    ChecksumMismatch { expected: u32, actual: u32 },
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameError::Marker(e) =>
                write!(f, "bad marker: {}", e),
            FrameError::RecordTooLarge { len, max } =>
                write!(f, "record too large: {} bytes (max {})", len, max),
            FrameError::Truncated { offset, need, have } =>
                write!(f, "truncated at offset {}: need {} bytes, have {}", offset, need, have),
            FrameError::RecordCountMismatch { declared, actual } =>
                write!(f, "record count mismatch: declared {}, found {}", declared, actual),
            FrameError::BodyLengthMismatch { declared, actual } =>
                write!(f, "body length mismatch: declared {}, found {}", declared, actual),
            FrameError::ChecksumMismatch { expected, actual } =>
                write!(f, "body checksum mismatch: expected {:#010x}, got {:#010x}", expected, actual),
        }
    }
}

impl std::error::Error for FrameError {}

impl From<HeaderError> for FrameError {
    fn from(e: HeaderError) -> Self {
        FrameError::Marker(e)
    }
}

/// Prefix `payload` with its length.
pub fn frame_record(payload: &[u8]) -> Result<EncodedBuffer, FrameError> {
    if payload.len() > MAX_RECORD_LEN {
        return Err(FrameError::RecordTooLarge { len: payload.len(), max: MAX_RECORD_LEN });
    }
    let mut buf = BytesMut::with_capacity(RECORD_PREFIX_LEN + payload.len());
    buf.put_u32_le(payload.len() as u32);
    buf.put_slice(payload);
    Ok(EncodedBuffer(buf.freeze()))
}

/// Encode and frame one record. Encoder panics are caught here and reported as
/// `EncodeErrorKind::Panicked` for this index only.
pub fn encode_record<E>(index: usize, record: &Record, model: &Model, encoder: &E) -> TaskOutcome
where
    E: RecordEncoder + ?Sized,
{
    let result = panic::catch_unwind(AssertUnwindSafe(|| encoder.encode(record, model)));

    match result {
        Ok(Ok(payload)) => frame_record(&payload).map_err(|e| EncodeFailure::malformed(e.to_string()).at(index)),
        Ok(Err(failure)) => Err(failure.at(index)),
        Err(panic) => Err(EncodeError {
            index,
            kind: EncodeErrorKind::Panicked,
            message: panic_message(panic.as_ref()),
        }),
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "encoder panicked".to_string()
    }
}

/// Borrowed view over a decoded feed.
#[derive(Debug)]
pub struct FeedView<'a> {
    pub header: FeedHeader,
    /// Record payloads in body order, without their length prefixes.
    pub records: Vec<&'a [u8]>,
    pub trailer: FeedTrailer,
}

impl FeedView<'_> {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Decode and fully verify a feed: markers, record framing, declared counts,
/// body length and body checksum.
pub fn decode_feed(wire: &[u8]) -> Result<FeedView<'_>, FrameError> {
    let (header, body_start) = decode_header_le(wire)?;

    let have = wire.len() - body_start;
    if have < FeedTrailer::LEN {
        return Err(FrameError::Truncated { offset: body_start, need: FeedTrailer::LEN, have });
    }
    let body_end = wire.len() - FeedTrailer::LEN;
    let body = &wire[body_start..body_end];
    let trailer = decode_trailer_le(&wire[body_end..])?;

    let records = split_records(body, body_start)?;
    let found = records.len() as u64;

    if trailer.body_len != body.len() as u64 {
        return Err(FrameError::BodyLengthMismatch { declared: trailer.body_len, actual: body.len() as u64 });
    }
    if trailer.record_count != found {
        return Err(FrameError::RecordCountMismatch { declared: trailer.record_count, actual: found });
    }
    if header.flags.contains(FeedFlags::HAS_RECORD_COUNT) && header.record_count != found {
        return Err(FrameError::RecordCountMismatch { declared: header.record_count, actual: found });
    }
    if header.flags.contains(FeedFlags::HAS_BODY_CRC32) {
        let actual = compute_crc32(body);
        if actual != trailer.body_crc32 {
            return Err(FrameError::ChecksumMismatch { expected: trailer.body_crc32, actual });
        }
    }

    Ok(FeedView { header, records, trailer })
}

fn split_records(body: &[u8], base_offset: usize) -> Result<Vec<&[u8]>, FrameError> {
    let mut records = Vec::new();
    let mut pos = 0usize;

    while pos < body.len() {
        let rest = &body[pos..];
        if rest.len() < RECORD_PREFIX_LEN {
            return Err(FrameError::Truncated { offset: base_offset + pos, need: RECORD_PREFIX_LEN, have: rest.len() });
        }
        let len = u32::from_le_bytes([rest[0], rest[1], rest[2], rest[3]]) as usize;
        if len > MAX_RECORD_LEN {
            return Err(FrameError::RecordTooLarge { len, max: MAX_RECORD_LEN });
        }
        let payload = &rest[RECORD_PREFIX_LEN..];
        if payload.len() < len {
            return Err(FrameError::Truncated {
                offset: base_offset + pos + RECORD_PREFIX_LEN,
                need: len,
                have: payload.len(),
            });
        }
        records.push(&payload[..len]);
        pos += RECORD_PREFIX_LEN + len;
    }

    Ok(records)
}
