//! Domain Name Codec
//!
//! Names travel as a sequence of length-prefixed labels terminated by a zero
//! byte. On decode a label slot may instead hold a 2-byte compression pointer
//! (top bits `11`) whose low 14 bits are an absolute offset into the message.

use super::{read_u16, take, DnsError};

/// Maximum label length (RFC 1035 Section 2.3.4)
const MAX_LABEL_LEN: usize = 63;

/// Maximum encoded name length, including length bytes and the root
const MAX_NAME_LEN: usize = 255;

/// Maximum pointer hops followed while decoding a single name
const MAX_POINTER_HOPS: usize = 16;

const POINTER_MASK: u8 = 0xC0;
const POINTER_OFFSET_MASK: u16 = 0x3FFF;

/// Append the wire form of `name` to `out`
///
/// Labels are never compressed. An empty name (or ".") is the root.
pub fn encode_name(name: &str, out: &mut Vec<u8>) -> Result<(), DnsError> {
    let start = out.len();
    let result = write_labels(name, out);
    if result.is_err() {
        out.truncate(start);
    }
    result
}

fn write_labels(name: &str, out: &mut Vec<u8>) -> Result<(), DnsError> {
    let name = name.strip_suffix('.').unwrap_or(name);
    let start = out.len();

    if !name.is_empty() {
        for label in name.split('.') {
            if label.is_empty() {
                return Err(DnsError::EmptyLabel);
            }
            if label.len() > MAX_LABEL_LEN {
                return Err(DnsError::LabelTooLong(label.len()));
            }
            out.push(label.len() as u8);
            out.extend_from_slice(label.as_bytes());
        }
    }
    out.push(0);

    let written = out.len() - start;
    if written > MAX_NAME_LEN {
        return Err(DnsError::NameTooLong(written));
    }

    Ok(())
}

/// Decode the name starting at `start`
///
/// Returns the dot-joined name and the offset of the first byte after it.
/// For an uncompressed name that is just past the zero terminator; once a
/// pointer is met it is just past the 2-byte pointer, whatever the pointed-to
/// tail looks like.
pub fn decode_name(buf: &[u8], start: usize) -> Result<(String, usize), DnsError> {
    decode_name_at(buf, start, 0)
}

fn decode_name_at(buf: &[u8], start: usize, hops: usize) -> Result<(String, usize), DnsError> {
    let mut labels: Vec<String> = Vec::new();
    let mut cursor = start;

    loop {
        let len = take(buf, cursor, 1)?[0];

        match len & POINTER_MASK {
            POINTER_MASK => {
                let target = (read_u16(buf, cursor)? & POINTER_OFFSET_MASK) as usize;
                // Only backward references can be legitimate
                if hops >= MAX_POINTER_HOPS || target >= cursor {
                    return Err(DnsError::PointerLoop(cursor));
                }

                let (tail, _) = decode_name_at(buf, target, hops + 1)?;
                if !tail.is_empty() {
                    labels.push(tail);
                }
                return Ok((labels.join("."), cursor + 2));
            }
            0x00 => {
                if len == 0 {
                    return Ok((labels.join("."), cursor + 1));
                }

                let len = len as usize;
                let label = take(buf, cursor + 1, len)?;
                labels.push(String::from_utf8_lossy(label).into_owned());
                cursor += 1 + len;
            }
            _ => return Err(DnsError::BadLabelType(len)),
        }
    }
}
