// ## 📂 File: `src/headers/types.rs`

//! headers/types.rs
//! Start-of-feed and end-of-feed markers.
//!
//! - Little-endian for every multi-byte integer.
//! - The start marker has a fixed prefix followed by a variable-length context URL.
//! - The end marker is fixed length and carries what the body actually contained,
//!   so a reader can check the declared count and the body checksum.

use std::fmt;
use num_enum::TryFromPrimitive;

use crate::constants::{FEED_VERSION, MAGIC_FEED, MAGIC_FEED_END, MAX_CONTEXT_LEN, format_ids};
use crate::utils::fmt_bytes;

bitflags::bitflags! {
    /// Presence bits for the optional start/end marker fields.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FeedFlags: u16 {
        /// `record_count` in the start marker is meaningful
        const HAS_RECORD_COUNT = 0b0000_0001;

        /// End marker carries a CRC32 over the body
        const HAS_BODY_CRC32 = 0b0000_0010;
    }
}

/// Encoding of each record payload inside the body.
#[repr(u16)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, TryFromPrimitive)]
pub enum PayloadFormat {
    Json   = format_ids::JSON,
    Opaque = format_ids::OPAQUE,
}

impl PayloadFormat {
    pub fn verify(raw: u16) -> Result<(), HeaderError> {
        match raw {
            x if x == PayloadFormat::Json as u16   => Ok(()),
            x if x == PayloadFormat::Opaque as u16 => Ok(()),
            _ => Err(HeaderError::UnknownPayloadFormat { raw }),
        }
    }
}

/// Start marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedHeader {
    pub magic: [u8; 4],        // "FED1"
    pub version: u16,          // wire version
    pub flags: FeedFlags,      // presence bits
    pub payload_format: u16,   // PayloadFormat id
    pub reserved: u16,         // must be zero
    pub record_count: u64,     // declared number of records
    pub context: String,       // context URL of the feed, may be empty
}

impl FeedHeader {
    /// Fixed prefix length; the context bytes follow.
    pub const FIXED_LEN: usize = 4 // magic
        + 2                        // version
        + 2                        // flags
        + 2                        // payload_format
        + 2                        // reserved
        + 8                        // record_count
        + 4;                       // context_len

    pub fn new(payload_format: PayloadFormat, record_count: u64, context: impl Into<String>) -> Self {
        Self {
            magic: MAGIC_FEED,
            version: FEED_VERSION,
            flags: FeedFlags::HAS_RECORD_COUNT | FeedFlags::HAS_BODY_CRC32,
            payload_format: payload_format as u16,
            reserved: 0,
            record_count,
            context: context.into(),
        }
    }

    /// Total encoded length including the context bytes.
    pub fn encoded_len(&self) -> usize {
        Self::FIXED_LEN + self.context.len()
    }

    pub fn format(&self) -> Option<PayloadFormat> {
        PayloadFormat::try_from(self.payload_format).ok()
    }

    pub fn validate(&self) -> Result<(), HeaderError> {
        if self.magic != MAGIC_FEED {
            return Err(HeaderError::InvalidMagic { have: self.magic, need: MAGIC_FEED });
        }
        if self.version == 0 || self.version > FEED_VERSION {
            return Err(HeaderError::InvalidVersion { have: self.version });
        }
        PayloadFormat::verify(self.payload_format)?;
        if self.reserved != 0 {
            return Err(HeaderError::ReservedNonZero { have: self.reserved });
        }
        if self.context.len() > MAX_CONTEXT_LEN {
            return Err(HeaderError::ContextTooLong { have: self.context.len(), max: MAX_CONTEXT_LEN });
        }
        Ok(())
    }
}

/// End marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedTrailer {
    pub magic: [u8; 4],     // "FEND"
    pub record_count: u64,  // records actually appended
    pub body_len: u64,      // body bytes between the markers
    pub body_crc32: u32,    // CRC32 over the body
}

impl FeedTrailer {
    pub const LEN: usize = 4 // magic
        + 8                  // record_count
        + 8                  // body_len
        + 4;                 // body_crc32

    pub fn new(record_count: u64, body_len: u64, body_crc32: u32) -> Self {
        Self { magic: MAGIC_FEED_END, record_count, body_len, body_crc32 }
    }

    pub fn validate(&self) -> Result<(), HeaderError> {
        if self.magic != MAGIC_FEED_END {
            return Err(HeaderError::InvalidMagic { have: self.magic, need: MAGIC_FEED_END });
        }
        Ok(())
    }
}

pub fn enum_name_or_hex<T>(raw: T::Primitive) -> String
where
    T: TryFromPrimitive + fmt::Debug,
    T::Primitive: fmt::LowerHex,
{
    match T::try_from_primitive(raw) {
        Ok(variant) => format!("{:?}", variant),
        Err(_) => format!("0x{:x}", raw),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderError {
    /// Buffer too short to contain the marker.
    BufferTooShort { have: usize, need: usize },

    /// Invalid magic marker.
    InvalidMagic { have: [u8; 4], need: [u8; 4] },

    /// Zero or newer-than-supported version.
    InvalidVersion { have: u16 },

    /// Unknown payload format id.
    UnknownPayloadFormat { raw: u16 },

    /// Unknown bits in the flags field.
    UnknownFlags { raw: u16 },

    /// Reserved field must be zero.
    ReservedNonZero { have: u16 },

    /// Context URL exceeds the wire limit.
    ContextTooLong { have: usize, max: usize },

    /// Context URL is not UTF-8.
    ContextNotUtf8,
}

impl fmt::Display for HeaderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use HeaderError::*;
        match self {
            BufferTooShort { have, need } =>
                write!(f, "marker buffer too short: {} < {}", have, need),
            InvalidMagic { have, need } =>
                write!(f, "invalid magic: expected {}, got {}", fmt_bytes(need), fmt_bytes(have)),
            InvalidVersion { have } =>
                write!(f, "invalid version: {}", have),
            UnknownPayloadFormat { raw } =>
                write!(f, "unknown payload format: {}", enum_name_or_hex::<PayloadFormat>(*raw)),
            UnknownFlags { raw } =>
                write!(f, "unknown flag bits: 0x{:04x}", raw),
            ReservedNonZero { have } =>
                write!(f, "reserved field must be zero, got 0x{:04x}", have),
            ContextTooLong { have, max } =>
                write!(f, "context too long: {} > {}", have, max),
            ContextNotUtf8 =>
                write!(f, "context is not valid UTF-8"),
        }
    }
}

impl std::error::Error for HeaderError {}
