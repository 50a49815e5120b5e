//! DNS Message
//!
//! A header followed by the question and answer sections. Authority and
//! additional sections are neither parsed nor emitted.

use super::{
    decode_name, encode_name, read_u16, read_u32, take, DnsError, Header, HEADER_SIZE,
};

/// A single question entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    /// Dot-joined labels, no trailing dot
    pub name: String,
    pub record_type: u16,
    pub class: u16,
}

impl Query {
    pub fn new(name: impl Into<String>, record_type: u16, class: u16) -> Self {
        Self {
            name: name.into(),
            record_type,
            class,
        }
    }
}

/// A single resource record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub name: String,
    pub record_type: u16,
    pub class: u16,
    pub ttl: u32,
    /// Raw rdata, interpreted according to `record_type`
    pub data: Vec<u8>,
}

impl Record {
    /// Length of the rdata as carried in RDLENGTH
    pub fn data_length(&self) -> u16 {
        self.data.len() as u16
    }
}

/// A DNS message
///
/// The header counts always follow the section lengths: use
/// [`Message::push_question`] and [`Message::push_answer`] to change them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    header: Header,
    questions: Vec<Query>,
    answers: Vec<Record>,
}

impl Message {
    /// Create an empty message carrying `header`'s ID and flags
    pub fn new(header: Header) -> Self {
        Self {
            header: Header {
                question_count: 0,
                answer_count: 0,
                authority_count: 0,
                additional_count: 0,
                ..header
            },
            questions: Vec::new(),
            answers: Vec::new(),
        }
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn id(&self) -> u16 {
        self.header.id
    }

    pub fn questions(&self) -> &[Query] {
        &self.questions
    }

    pub fn answers(&self) -> &[Record] {
        &self.answers
    }

    pub fn set_rcode(&mut self, rcode: u8) {
        self.header.set_rcode(rcode);
    }

    pub fn push_question(&mut self, query: Query) {
        self.questions.push(query);
        self.header.question_count = self.questions.len() as u16;
    }

    pub fn push_answer(&mut self, record: Record) {
        self.answers.push(record);
        self.header.answer_count = self.answers.len() as u16;
    }

    /// Consume the message, yielding its sections
    pub fn into_parts(self) -> (Header, Vec<Query>, Vec<Record>) {
        (self.header, self.questions, self.answers)
    }

    /// Parse a message from its wire form
    pub fn decode(buf: &[u8]) -> Result<Self, DnsError> {
        let header = Header::decode(buf)?;
        let mut message = Self::new(header);
        let mut offset = HEADER_SIZE;

        for _ in 0..header.question_count {
            let (name, next) = decode_name(buf, offset)?;
            let record_type = read_u16(buf, next)?;
            let class = read_u16(buf, next + 2)?;
            offset = next + 4;

            message.push_question(Query {
                name,
                record_type,
                class,
            });
        }

        for _ in 0..header.answer_count {
            let (name, next) = decode_name(buf, offset)?;
            let record_type = read_u16(buf, next)?;
            let class = read_u16(buf, next + 2)?;
            let ttl = read_u32(buf, next + 4)?;
            let data_length = read_u16(buf, next + 8)? as usize;
            let data = take(buf, next + 10, data_length)?.to_vec();
            offset = next + 10 + data_length;

            message.push_answer(Record {
                name,
                record_type,
                class,
                ttl,
                data,
            });
        }

        Ok(message)
    }

    /// Serialize to wire form, every name fully expanded
    pub fn encode(&self) -> Result<Vec<u8>, DnsError> {
        let mut out = Vec::with_capacity(512);
        self.header.encode(&mut out);

        for query in &self.questions {
            encode_name(&query.name, &mut out)?;
            out.extend_from_slice(&query.record_type.to_be_bytes());
            out.extend_from_slice(&query.class.to_be_bytes());
        }

        for record in &self.answers {
            if record.data.len() > u16::MAX as usize {
                return Err(DnsError::DataTooLong(record.data.len()));
            }
            encode_name(&record.name, &mut out)?;
            out.extend_from_slice(&record.record_type.to_be_bytes());
            out.extend_from_slice(&record.class.to_be_bytes());
            out.extend_from_slice(&record.ttl.to_be_bytes());
            out.extend_from_slice(&record.data_length().to_be_bytes());
            out.extend_from_slice(&record.data);
        }

        Ok(out)
    }
}
