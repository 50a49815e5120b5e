//! DNS Message Header
//!
//! ```text
//!   0  1  2  3  4  5  6  7  8  9 10 11 12 13 14 15
//! +--+-----------+--+--+--+--+--------+-----------+
//! |QR|  Opcode   |AA|TC|RD|RA|   Z    |   RCODE   |
//! +--+-----------+--+--+--+--+--------+-----------+
//! ```

use super::{read_u16, take, DnsError};

/// Header size in bytes
pub const HEADER_SIZE: usize = 12;

/// DNS flags
pub const FLAG_QR: u16 = 0x8000; // Query/Response
pub const FLAG_AA: u16 = 0x0400; // Authoritative Answer
pub const FLAG_TC: u16 = 0x0200; // Truncated
pub const FLAG_RD: u16 = 0x0100; // Recursion Desired
pub const FLAG_RA: u16 = 0x0080; // Recursion Available

const OPCODE_SHIFT: u16 = 11;
const OPCODE_MASK: u16 = 0x7800;
const Z_MASK: u16 = 0x0070;
const RCODE_MASK: u16 = 0x000F;

/// Response codes
pub const RCODE_NOERROR: u8 = 0;
pub const RCODE_SERVFAIL: u8 = 2;
pub const RCODE_NOTIMP: u8 = 4;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Header {
    /// Correlation token, echoed in responses
    pub id: u16,
    pub flags: u16,
    pub question_count: u16,
    pub answer_count: u16,
    pub authority_count: u16,
    pub additional_count: u16,
}

impl Header {
    pub fn decode(buf: &[u8]) -> Result<Self, DnsError> {
        take(buf, 0, HEADER_SIZE)?;

        Ok(Self {
            id: read_u16(buf, 0)?,
            flags: read_u16(buf, 2)?,
            question_count: read_u16(buf, 4)?,
            answer_count: read_u16(buf, 6)?,
            authority_count: read_u16(buf, 8)?,
            additional_count: read_u16(buf, 10)?,
        })
    }

    pub fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.id.to_be_bytes());
        out.extend_from_slice(&self.flags.to_be_bytes());
        out.extend_from_slice(&self.question_count.to_be_bytes());
        out.extend_from_slice(&self.answer_count.to_be_bytes());
        out.extend_from_slice(&self.authority_count.to_be_bytes());
        out.extend_from_slice(&self.additional_count.to_be_bytes());
    }

    pub fn is_response(&self) -> bool {
        self.flags & FLAG_QR != 0
    }

    pub fn opcode(&self) -> u8 {
        ((self.flags & OPCODE_MASK) >> OPCODE_SHIFT) as u8
    }

    pub fn set_opcode(&mut self, opcode: u8) {
        self.flags = (self.flags & !OPCODE_MASK) | ((u16::from(opcode) << OPCODE_SHIFT) & OPCODE_MASK);
    }

    pub fn is_authoritative(&self) -> bool {
        self.flags & FLAG_AA != 0
    }

    pub fn is_truncated(&self) -> bool {
        self.flags & FLAG_TC != 0
    }

    pub fn recursion_desired(&self) -> bool {
        self.flags & FLAG_RD != 0
    }

    pub fn recursion_available(&self) -> bool {
        self.flags & FLAG_RA != 0
    }

    pub fn z(&self) -> u8 {
        ((self.flags & Z_MASK) >> 4) as u8
    }

    pub fn rcode(&self) -> u8 {
        (self.flags & RCODE_MASK) as u8
    }

    pub fn set_rcode(&mut self, rcode: u8) {
        self.flags = (self.flags & !RCODE_MASK) | (u16::from(rcode) & RCODE_MASK);
    }

    /// Response header for `request`: ID echoed, QR set, Opcode and RD
    /// copied, every other flag cleared and counts zeroed.
    pub fn response_to(request: &Header, rcode: u8) -> Self {
        let mut header = Self {
            id: request.id,
            flags: FLAG_QR | (request.flags & (OPCODE_MASK | FLAG_RD)),
            ..Default::default()
        };
        header.set_rcode(rcode);
        header
    }
}
