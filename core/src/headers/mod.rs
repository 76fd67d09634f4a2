//! headers/mod.rs
//! Start and end markers of a feed.
//!
//! The start marker declares the payload format, the expected record count and the
//! feed's context URL. The end marker records what was really appended: count, body
//! length and a CRC32 of the body.

pub mod types;
pub mod encode;
pub mod decode;

pub use types::*;
pub use encode::*;
pub use decode::*;
