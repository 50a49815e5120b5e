//! Response Builder
//!
//! Derives a response from a decoded request, either from locally known
//! answers or from a reply obtained through the upstream resolver.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use super::{Header, Message, Query, Record, CLASS_IN, RCODE_NOERROR, RCODE_NOTIMP, TYPE_A};

/// Default TTL for locally synthesized answers (seconds)
pub const DEFAULT_ANSWER_TTL: u32 = 60;

/// Answers served without an upstream resolver
///
/// Names listed in the static table resolve to their configured address.
/// Anything else gets a placeholder A record whose four bytes all equal the
/// question's 1-based position in the request.
#[derive(Debug, Clone)]
pub struct LocalAnswers {
    /// Lowercased name -> address
    records: BTreeMap<String, Ipv4Addr>,

    /// TTL for every synthesized record
    ttl: u32,
}

impl Default for LocalAnswers {
    fn default() -> Self {
        Self {
            records: BTreeMap::new(),
            ttl: DEFAULT_ANSWER_TTL,
        }
    }
}

impl LocalAnswers {
    pub fn new<'a>(records: impl IntoIterator<Item = (&'a String, &'a Ipv4Addr)>, ttl: u32) -> Self {
        Self {
            records: records
                .into_iter()
                .map(|(name, addr)| (normalize(name), *addr))
                .collect(),
            ttl,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// A record answering `query`, the `ordinal`-th question (1-based)
    pub fn answer(&self, query: &Query, ordinal: usize) -> Record {
        let data = match self.lookup(query) {
            Some(addr) => addr.octets().to_vec(),
            None => vec![ordinal as u8; 4],
        };

        Record {
            name: query.name.clone(),
            record_type: TYPE_A,
            class: CLASS_IN,
            ttl: self.ttl,
            data,
        }
    }

    fn lookup(&self, query: &Query) -> Option<Ipv4Addr> {
        if query.record_type != TYPE_A {
            return None;
        }
        self.records.get(&normalize(&query.name)).copied()
    }
}

fn normalize(name: &str) -> String {
    name.trim_end_matches('.').to_ascii_lowercase()
}

/// Build the local response to `request`
///
/// Every question is echoed and answered. Opcode 0 gets RCODE NOERROR, any
/// other opcode NOTIMP.
pub fn build_local_response(request: &Message, answers: &LocalAnswers) -> Message {
    let standard_query = request.header().opcode() == 0;
    let rcode = if standard_query { RCODE_NOERROR } else { RCODE_NOTIMP };

    let mut response = Message::new(Header::response_to(request.header(), rcode));

    for query in request.questions() {
        response.push_question(query.clone());
    }
    for (i, query) in request.questions().iter().enumerate() {
        response.push_answer(answers.answer(query, i + 1));
    }

    response
}

/// Build the response to `request` from the resolver's `reply`
///
/// The resolver's RCODE, questions and answers are kept as they are. ID,
/// Opcode and RD come from the request. A reply without a question section
/// gets the request's questions echoed instead.
pub fn build_forwarded_response(request: &Message, reply: Message) -> Message {
    let (reply_header, questions, records) = reply.into_parts();
    let mut response = Message::new(Header::response_to(request.header(), reply_header.rcode()));

    if questions.is_empty() {
        for query in request.questions() {
            response.push_question(query.clone());
        }
    }
    for query in questions {
        response.push_question(query);
    }
    for record in records {
        response.push_answer(record);
    }

    response
}
