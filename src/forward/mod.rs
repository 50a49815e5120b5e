//! Forwarding Coordinator
//!
//! Relays questions to an upstream resolver and turns its replies into
//! responses for the client.
//!
//! ## Multi-question requests
//!
//! Resolvers in practice only accept one question per message, so a request
//! with several questions is handled in three steps:
//!
//! 1. Split into one sub-request per question (original header, QDCOUNT=1)
//! 2. Forward each sub-request on its own
//! 3. Merge the sub-responses back in the original question order
//!
//! A sub-request that fails keeps its question in the merged response but
//! contributes no answers, and the merged RCODE becomes SERVFAIL.

mod upstream;

pub use upstream::{ForwardError, UdpUpstream, Upstream};

use std::sync::Arc;
use tracing::{debug, warn};

use crate::api::Metrics;
use crate::dns::{
    build_forwarded_response, build_local_response, Header, LocalAnswers, Message, RCODE_SERVFAIL,
};

/// Relays requests through an [`Upstream`]
pub struct Forwarder {
    upstream: Box<dyn Upstream>,
    metrics: Arc<Metrics>,
}

impl Forwarder {
    pub fn new(upstream: Box<dyn Upstream>, metrics: Arc<Metrics>) -> Self {
        Self { upstream, metrics }
    }

    /// Produce the response to `request`, contacting the upstream once per
    /// question. Never fails: forwarding problems become SERVFAIL.
    pub async fn resolve(&self, request: &Message) -> Message {
        match request.questions().len() {
            0 => build_local_response(request, &LocalAnswers::default()),
            1 => match self.forward(request).await {
                Ok(response) => response,
                Err(e) => {
                    warn!("Forwarding query {} failed: {}", request.id(), e);
                    servfail_response(request)
                }
            },
            count => {
                debug!("Splitting query {} into {} sub-requests", request.id(), count);

                let mut outcomes = Vec::with_capacity(count);
                for sub_request in split_questions(request) {
                    let outcome = self.forward(&sub_request).await;
                    if let Err(e) = &outcome {
                        warn!(
                            "Forwarding question {:?} of query {} failed: {}",
                            sub_request.questions()[0].name,
                            request.id(),
                            e
                        );
                    }
                    outcomes.push((sub_request, outcome));
                }

                merge_answers(request, outcomes)
            }
        }
    }

    /// Forward one (sub-)request and derive its response
    async fn forward(&self, request: &Message) -> Result<Message, ForwardError> {
        self.metrics.inc_forwarded_questions();

        match self.upstream.exchange(request).await {
            Ok(reply) => Ok(build_forwarded_response(request, reply)),
            Err(e) => {
                self.metrics.inc_forward_failures();
                Err(e)
            }
        }
    }
}

/// One single-question copy of `request` per question, in order
pub fn split_questions(request: &Message) -> Vec<Message> {
    request
        .questions()
        .iter()
        .map(|query| {
            let mut sub_request = Message::new(*request.header());
            sub_request.push_question(query.clone());
            sub_request
        })
        .collect()
}

/// Combine per-question outcomes into one response
///
/// Header ID and flags come from the first successful sub-response, or from
/// `request` when every forward failed. Questions and answers are
/// concatenated in the order of `outcomes`.
pub fn merge_answers(
    request: &Message,
    outcomes: Vec<(Message, Result<Message, ForwardError>)>,
) -> Message {
    let base = outcomes
        .iter()
        .find_map(|(_, outcome)| outcome.as_ref().ok())
        .map(|response| *response.header())
        .unwrap_or_else(|| Header::response_to(request.header(), RCODE_SERVFAIL));

    let mut merged = Message::new(base);
    let mut failed = false;

    for (sub_request, outcome) in outcomes {
        match outcome {
            Ok(response) => {
                let (_, questions, answers) = response.into_parts();
                for query in questions {
                    merged.push_question(query);
                }
                for record in answers {
                    merged.push_answer(record);
                }
            }
            Err(_) => {
                failed = true;
                let (_, questions, _) = sub_request.into_parts();
                for query in questions {
                    merged.push_question(query);
                }
            }
        }
    }

    if failed {
        merged.set_rcode(RCODE_SERVFAIL);
    }

    merged
}

/// SERVFAIL response echoing the request's questions
fn servfail_response(request: &Message) -> Message {
    let mut response = Message::new(Header::response_to(request.header(), RCODE_SERVFAIL));
    for query in request.questions() {
        response.push_question(query.clone());
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::{Query, Record, CLASS_IN, FLAG_RD, RCODE_NOERROR, TYPE_A};
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Resolver stub answering every name with 10.0.0.N, failing for some
    /// and replying with a bare SERVFAIL header for others
    struct MockUpstream {
        failing: HashSet<String>,
        bare: HashSet<String>,
        seen: Arc<Mutex<Vec<Message>>>,
    }

    impl MockUpstream {
        fn new(failing: &[&str]) -> Self {
            Self {
                failing: failing.iter().map(|s| s.to_string()).collect(),
                bare: HashSet::new(),
                seen: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn with_bare_servfail(mut self, names: &[&str]) -> Self {
            self.bare = names.iter().map(|s| s.to_string()).collect();
            self
        }
    }

    #[async_trait]
    impl Upstream for MockUpstream {
        async fn exchange(&self, query: &Message) -> Result<Message, ForwardError> {
            let mut seen = self.seen.lock().unwrap();
            seen.push(query.clone());

            let question = query.questions()[0].clone();
            if self.failing.contains(&question.name) {
                return Err(ForwardError::Timeout(Duration::from_secs(1)));
            }
            if self.bare.contains(&question.name) {
                return Ok(Message::new(Header {
                    id: query.id(),
                    flags: 0x8002,
                    ..Default::default()
                }));
            }

            let mut reply = Message::new(Header {
                id: query.id(),
                flags: 0x8180,
                ..Default::default()
            });
            reply.push_question(question.clone());
            reply.push_answer(Record {
                name: question.name,
                record_type: TYPE_A,
                class: CLASS_IN,
                ttl: 300,
                data: vec![10, 0, 0, seen.len() as u8],
            });
            Ok(reply)
        }
    }

    fn request(names: &[&str]) -> Message {
        let mut message = Message::new(Header {
            id: 0xABCD,
            flags: FLAG_RD,
            ..Default::default()
        });
        for name in names {
            message.push_question(Query::new(*name, TYPE_A, CLASS_IN));
        }
        message
    }

    fn forwarder(upstream: MockUpstream) -> (Forwarder, Arc<Metrics>) {
        let metrics = Arc::new(Metrics::new());
        (Forwarder::new(Box::new(upstream), metrics.clone()), metrics)
    }

    fn names(message: &Message) -> Vec<&str> {
        message.questions().iter().map(|q| q.name.as_str()).collect()
    }

    #[test]
    fn test_split_questions() {
        let req = request(&["a.com", "b.com", "c.com"]);
        let subs = split_questions(&req);

        assert_eq!(subs.len(), 3);
        for (sub, query) in subs.iter().zip(req.questions()) {
            assert_eq!(sub.id(), req.id());
            assert_eq!(sub.header().flags, req.header().flags);
            assert_eq!(sub.header().question_count, 1);
            assert_eq!(sub.questions(), std::slice::from_ref(query));
        }
    }

    #[tokio::test]
    async fn test_split_and_merge_two_questions() {
        let (forwarder, metrics) = forwarder(MockUpstream::new(&[]));
        let res = forwarder.resolve(&request(&["a.com", "b.com"])).await;

        assert_eq!(res.id(), 0xABCD);
        assert_eq!(res.header().question_count, 2);
        assert_eq!(res.header().answer_count, 2);
        assert_eq!(names(&res), vec!["a.com", "b.com"]);
        assert_eq!(res.answers()[0].name, "a.com");
        assert_eq!(res.answers()[0].data, vec![10, 0, 0, 1]);
        assert_eq!(res.answers()[1].name, "b.com");
        assert_eq!(res.answers()[1].data, vec![10, 0, 0, 2]);
        assert_eq!(res.header().rcode(), RCODE_NOERROR);
        assert_eq!(metrics.snapshot().forwarded_questions, 2);
    }

    #[tokio::test]
    async fn test_each_sub_request_carries_one_question() {
        let upstream = MockUpstream::new(&[]);
        let seen = upstream.seen.clone();
        let (forwarder, _) = forwarder(upstream);
        forwarder.resolve(&request(&["a.com", "b.com", "c.com"])).await;

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 3);
        for (sub, name) in seen.iter().zip(["a.com", "b.com", "c.com"]) {
            assert_eq!(sub.id(), 0xABCD);
            assert_eq!(sub.header().question_count, 1);
            assert_eq!(sub.header().answer_count, 0);
            assert_eq!(names(sub), vec![name]);
        }
    }

    #[tokio::test]
    async fn test_failed_question_surfaces_as_servfail() {
        let (forwarder, metrics) = forwarder(MockUpstream::new(&["b.com"]));
        let res = forwarder.resolve(&request(&["a.com", "b.com", "c.com"])).await;

        assert_eq!(names(&res), vec!["a.com", "b.com", "c.com"]);
        assert_eq!(res.header().question_count, 3);
        assert_eq!(res.header().answer_count, 2);
        assert_eq!(res.answers()[0].name, "a.com");
        assert_eq!(res.answers()[1].name, "c.com");
        assert_eq!(res.header().rcode(), RCODE_SERVFAIL);
        assert_eq!(metrics.snapshot().forward_failures, 1);
    }

    #[tokio::test]
    async fn test_reply_without_question_keeps_order() {
        let upstream = MockUpstream::new(&[]).with_bare_servfail(&["a.com"]);
        let (forwarder, _) = forwarder(upstream);
        let res = forwarder.resolve(&request(&["a.com", "b.com"])).await;

        assert_eq!(res.header().question_count, 2);
        assert_eq!(names(&res), vec!["a.com", "b.com"]);
        assert_eq!(res.header().answer_count, 1);
        assert_eq!(res.answers()[0].name, "b.com");
        // Header comes from the first successful exchange
        assert_eq!(res.header().rcode(), RCODE_SERVFAIL);
    }

    #[tokio::test]
    async fn test_all_failed_uses_request_header() {
        let (forwarder, _) = forwarder(MockUpstream::new(&["a.com", "b.com"]));
        let res = forwarder.resolve(&request(&["a.com", "b.com"])).await;

        assert_eq!(res.id(), 0xABCD);
        assert!(res.header().is_response());
        assert!(res.header().recursion_desired());
        assert_eq!(res.header().rcode(), RCODE_SERVFAIL);
        assert_eq!(names(&res), vec!["a.com", "b.com"]);
        assert!(res.answers().is_empty());
    }

    #[tokio::test]
    async fn test_single_question_forwarded_directly() {
        let (forwarder, metrics) = forwarder(MockUpstream::new(&[]));
        let res = forwarder.resolve(&request(&["solo.example"])).await;

        assert_eq!(res.header().question_count, 1);
        assert_eq!(res.header().answer_count, 1);
        assert_eq!(res.answers()[0].ttl, 300);
        assert_eq!(metrics.snapshot().forwarded_questions, 1);
    }

    #[tokio::test]
    async fn test_single_question_failure() {
        let (forwarder, _) = forwarder(MockUpstream::new(&["solo.example"]));
        let res = forwarder.resolve(&request(&["solo.example"])).await;

        assert_eq!(res.id(), 0xABCD);
        assert_eq!(res.header().rcode(), RCODE_SERVFAIL);
        assert_eq!(names(&res), vec!["solo.example"]);
        assert!(res.answers().is_empty());
    }

    #[tokio::test]
    async fn test_no_questions_not_forwarded() {
        let (forwarder, metrics) = forwarder(MockUpstream::new(&[]));
        let res = forwarder.resolve(&request(&[])).await;

        assert_eq!(res.id(), 0xABCD);
        assert_eq!(res.header().question_count, 0);
        assert_eq!(res.header().rcode(), RCODE_NOERROR);
        assert_eq!(metrics.snapshot().forwarded_questions, 0);
    }
}
