//! feed/envelope.rs
//! Start/end framing of one feed.
//!
//! The envelope moves `Unopened -> Open -> Closed` exactly once. Body bytes can only
//! be appended while open. Calling an operation in the wrong state is a programming
//! error and panics with "framing violation".
//!
//! Output is staged in memory and only handed to a sink by `commit` once closed, so
//! an abandoned envelope never leaves a partial feed behind.

use std::io::{self, Write};
use bytes::{Bytes, BytesMut};
use crc32fast::Hasher;

use crate::feed::framing::RECORD_PREFIX_LEN;
use crate::headers::{encode_header_le, encode_trailer_le, FeedFlags, FeedHeader, FeedTrailer, HeaderError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeState {
    Unopened,
    Open,
    Closed,
}

#[derive(Debug)]
pub struct Envelope {
    state: EnvelopeState,
    out: BytesMut,
    body_len: u64,
    records: u64,
    declared: Option<u64>,
    crc: Hasher,
}

impl Default for Envelope {
    fn default() -> Self {
        Self::new()
    }
}

impl Envelope {
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Staging buffer sized for `records` frames of about `record_size_hint` payload
    /// bytes each, plus a trailer.
    pub fn for_records(records: usize, record_size_hint: usize) -> Self {
        let per_record = RECORD_PREFIX_LEN.saturating_add(record_size_hint);
        Self::with_capacity(records.saturating_mul(per_record).saturating_add(FeedTrailer::LEN))
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            state: EnvelopeState::Unopened,
            out: BytesMut::with_capacity(capacity),
            body_len: 0,
            records: 0,
            declared: None,
            crc: Hasher::new(),
        }
    }

    pub fn state(&self) -> EnvelopeState {
        self.state
    }

    /// Bytes the staging buffer can hold without reallocating.
    pub fn capacity(&self) -> usize {
        self.out.capacity()
    }

    /// Write the start marker. Returns its length.
    pub fn open(&mut self, header: &FeedHeader) -> Result<usize, HeaderError> {
        self.expect_state(EnvelopeState::Unopened, "open");
        let marker = encode_header_le(header)?;
        self.out.extend_from_slice(&marker);
        if header.flags.contains(FeedFlags::HAS_RECORD_COUNT) {
            self.declared = Some(header.record_count);
        }
        self.state = EnvelopeState::Open;
        Ok(marker.len())
    }

    /// Append one framed record to the body.
    pub fn append_body(&mut self, bytes: &[u8]) {
        self.expect_state(EnvelopeState::Open, "append_body");
        self.out.extend_from_slice(bytes);
        self.crc.update(bytes);
        self.body_len += bytes.len() as u64;
        self.records += 1;
    }

    /// Write the end marker. Returns its length.
    pub fn close(&mut self) -> usize {
        self.expect_state(EnvelopeState::Open, "close");
        if let Some(declared) = self.declared {
            assert_eq!(
                declared, self.records,
                "framing violation: start marker declared {} records, body has {}",
                declared, self.records
            );
        }
        let crc = std::mem::take(&mut self.crc).finalize();
        let trailer = FeedTrailer::new(self.records, self.body_len, crc);
        self.out.extend_from_slice(&encode_trailer_le(&trailer));
        self.state = EnvelopeState::Closed;
        FeedTrailer::LEN
    }

    pub fn body_len(&self) -> u64 {
        self.body_len
    }

    pub fn records_appended(&self) -> u64 {
        self.records
    }

    /// Bytes staged so far, markers included.
    pub fn staged_len(&self) -> usize {
        self.out.len()
    }

    /// The finished feed.
    pub fn into_bytes(self) -> Bytes {
        self.expect_state(EnvelopeState::Closed, "into_bytes");
        self.out.freeze()
    }

    /// Hand the finished feed to `sink` in one write and flush it.
    pub fn commit<W: Write + ?Sized>(self, sink: &mut W) -> io::Result<u64> {
        let bytes = self.into_bytes();
        sink.write_all(&bytes)?;
        sink.flush()?;
        Ok(bytes.len() as u64)
    }

    fn expect_state(&self, expected: EnvelopeState, op: &str) {
        assert!(
            self.state == expected,
            "framing violation: {} called while {:?} (expected {:?})",
            op, self.state, expected
        );
    }
}
