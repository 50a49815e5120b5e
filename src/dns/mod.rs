//! DNS Wire Format Module
//!
//! Binary encoding and decoding of DNS messages (RFC 1035 Section 4).
//!
//! ## Supported sections
//!
//! - Header: always 12 bytes, big-endian
//! - Question: name, type, class
//! - Answer: name, type, class, TTL, opaque rdata
//!
//! Names are always written fully expanded. Compression pointers are
//! understood on decode only.

mod header;
mod message;
mod name;
mod response;

pub use header::{Header, HEADER_SIZE, FLAG_QR, FLAG_RD, RCODE_NOERROR, RCODE_NOTIMP, RCODE_SERVFAIL};
pub use message::{Message, Query, Record};
pub use name::{decode_name, encode_name};
pub use response::{build_forwarded_response, build_local_response, LocalAnswers, DEFAULT_ANSWER_TTL};

/// Record type A (host address)
pub const TYPE_A: u16 = 1;

/// Class IN (the Internet)
pub const CLASS_IN: u16 = 1;

// =============================================================================
// ERRORS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DnsError {
    #[error("Truncated message: needed {needed} bytes at offset {offset}")]
    Truncated { offset: usize, needed: usize },

    #[error("Unsupported label type 0x{0:02x}")]
    BadLabelType(u8),

    #[error("Compression pointer loop at offset {0}")]
    PointerLoop(usize),

    #[error("Empty label in name")]
    EmptyLabel,

    #[error("Label too long: {0} bytes (max 63)")]
    LabelTooLong(usize),

    #[error("Name too long: {0} bytes (max 255)")]
    NameTooLong(usize),

    #[error("Record data too long: {0} bytes")]
    DataTooLong(usize),
}

/// Borrow `needed` bytes at `offset`, or fail with `Truncated`
pub(crate) fn take(buf: &[u8], offset: usize, needed: usize) -> Result<&[u8], DnsError> {
    offset
        .checked_add(needed)
        .and_then(|end| buf.get(offset..end))
        .ok_or(DnsError::Truncated { offset, needed })
}

pub(crate) fn read_u16(buf: &[u8], offset: usize) -> Result<u16, DnsError> {
    let b = take(buf, offset, 2)?;
    Ok(u16::from_be_bytes([b[0], b[1]]))
}

pub(crate) fn read_u32(buf: &[u8], offset: usize) -> Result<u32, DnsError> {
    let b = take(buf, offset, 4)?;
    Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
}
