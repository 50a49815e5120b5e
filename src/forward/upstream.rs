//! Upstream Resolver Session
//!
//! One connected UDP socket to the resolver, reused across requests. Each
//! exchange is bounded: every attempt waits at most `timeout` for a reply and
//! at most `attempts` sends are made.

use async_trait::async_trait;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::dns::{DnsError, Message, Query};

/// Something that can answer a DNS query
#[async_trait]
pub trait Upstream: Send + Sync {
    /// Send `query` and wait for the matching reply
    async fn exchange(&self, query: &Message) -> Result<Message, ForwardError>;
}

/// UDP session to a single resolver
pub struct UdpUpstream {
    socket: UdpSocket,
    timeout: Duration,
    attempts: u32,
    max_packet_size: usize,
}

impl UdpUpstream {
    /// Bind an ephemeral local socket and connect it to `resolver` (`host:port`)
    pub async fn connect(
        resolver: &str,
        timeout: Duration,
        attempts: u32,
        max_packet_size: usize,
    ) -> Result<Self, ForwardError> {
        let addr = tokio::net::lookup_host(resolver).await?.next().ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("resolver address {} did not resolve", resolver),
            )
        })?;

        let local: SocketAddr = if addr.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let socket = UdpSocket::bind(local).await?;
        socket.connect(addr).await?;

        Ok(Self {
            socket,
            timeout,
            attempts: attempts.max(1),
            max_packet_size,
        })
    }

    pub fn peer_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.peer_addr()
    }

    /// Wait for a reply to `query` until `deadline`, skipping stale ones
    async fn await_reply(&self, query: &Message, deadline: Instant) -> Result<Message, ForwardError> {
        let mut buf = vec![0u8; self.max_packet_size];
        let mut last_err = ForwardError::Timeout(self.timeout);

        loop {
            let len = match tokio::time::timeout_at(deadline, self.socket.recv(&mut buf)).await {
                Ok(result) => result?,
                Err(_) => return Err(last_err),
            };
            trace!("Upstream reply: {}", hex::encode(&buf[..len]));

            match Message::decode(&buf[..len]) {
                Ok(reply) if is_reply_to(query, &reply) => return Ok(reply),
                Ok(reply) => {
                    debug!("Discarding stale upstream reply (id {})", reply.id());
                }
                Err(e) => {
                    debug!("Malformed upstream reply: {}", e);
                    last_err = ForwardError::Malformed(e);
                }
            }
        }
    }
}

#[async_trait]
impl Upstream for UdpUpstream {
    async fn exchange(&self, query: &Message) -> Result<Message, ForwardError> {
        let bytes = query.encode()?;
        let mut last_err = ForwardError::Timeout(self.timeout);

        for attempt in 1..=self.attempts {
            let sent = self.socket.send(&bytes).await?;
            debug!("Forwarded {} bytes upstream (attempt {}/{})", sent, attempt, self.attempts);

            let deadline = Instant::now() + self.timeout;
            match self.await_reply(query, deadline).await {
                Ok(reply) => return Ok(reply),
                Err(e) => {
                    debug!("Upstream attempt {} failed: {}", attempt, e);
                    last_err = e;
                }
            }
        }

        Err(last_err)
    }
}

/// A reply matches when the ID agrees and the question is echoed
/// (resolvers may change the letter case, or omit it on some errors)
fn is_reply_to(query: &Message, reply: &Message) -> bool {
    reply.id() == query.id()
        && (reply.questions().is_empty() || same_questions(query.questions(), reply.questions()))
}

fn same_questions(a: &[Query], b: &[Query]) -> bool {
    a.len() == b.len()
        && a.iter().zip(b).all(|(x, y)| {
            x.record_type == y.record_type
                && x.class == y.class
                && x.name.eq_ignore_ascii_case(&y.name)
        })
}

// =============================================================================
// ERRORS
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    #[error("Resolver I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Resolver did not answer within {0:?}")]
    Timeout(Duration),

    #[error("Malformed resolver exchange: {0}")]
    Malformed(#[from] DnsError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::{Header, CLASS_IN, FLAG_QR, TYPE_A};

    fn query(id: u16, name: &str) -> Message {
        let mut message = Message::new(Header { id, ..Default::default() });
        message.push_question(Query::new(name, TYPE_A, CLASS_IN));
        message
    }

    fn reply_to(query: &Message) -> Message {
        let mut reply = Message::new(Header { id: query.id(), flags: FLAG_QR, ..Default::default() });
        for q in query.questions() {
            reply.push_question(q.clone());
        }
        reply
    }

    #[test]
    fn test_reply_matching() {
        let q = query(10, "Example.COM");
        assert!(is_reply_to(&q, &reply_to(&q)));
        assert!(is_reply_to(&q, &reply_to(&query(10, "example.com"))));
        assert!(!is_reply_to(&q, &reply_to(&query(11, "example.com"))));
        assert!(!is_reply_to(&q, &reply_to(&query(10, "other.com"))));
        assert!(is_reply_to(&q, &Message::new(Header { id: 10, ..Default::default() })));
    }

    #[tokio::test]
    async fn test_exchange_skips_stale_replies() {
        let resolver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = resolver.local_addr().unwrap().to_string();
        let upstream = UdpUpstream::connect(&addr, Duration::from_secs(2), 1, 512)
            .await
            .unwrap();

        let server = tokio::spawn(async move {
            let mut buf = [0u8; 512];
            let (len, from) = resolver.recv_from(&mut buf).await.unwrap();
            let q = Message::decode(&buf[..len]).unwrap();

            // junk, then a reply for another id, then the real one
            resolver.send_to(&[1, 2, 3], from).await.unwrap();
            let stale = reply_to(&query(q.id().wrapping_add(1), "stale.example"));
            resolver.send_to(&stale.encode().unwrap(), from).await.unwrap();
            resolver.send_to(&reply_to(&q).encode().unwrap(), from).await.unwrap();
        });

        let q = query(4242, "example.com");
        let reply = upstream.exchange(&q).await.unwrap();
        assert_eq!(reply.id(), 4242);
        assert_eq!(reply.questions(), q.questions());
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_exchange_times_out_and_retries() {
        let resolver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = resolver.local_addr().unwrap().to_string();
        let upstream = UdpUpstream::connect(&addr, Duration::from_millis(100), 2, 512)
            .await
            .unwrap();

        let q = query(1, "silent.example");
        let err = upstream.exchange(&q).await.unwrap_err();
        assert!(matches!(err, ForwardError::Timeout(_)));

        // Both attempts reached the resolver
        let mut buf = [0u8; 512];
        for _ in 0..2 {
            let (len, _) = resolver.recv_from(&mut buf).await.unwrap();
            assert_eq!(Message::decode(&buf[..len]).unwrap(), q);
        }
    }
}
