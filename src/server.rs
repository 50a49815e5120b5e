//! UDP Request Loop
//!
//! Receives one datagram at a time, handles it completely (including any
//! upstream round-trips) and replies before reading the next one. The single
//! upstream session is therefore never shared between in-flight requests.

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tracing::{debug, error, info, trace, warn};

use crate::api::Metrics;
use crate::dns::{build_local_response, DnsError, Header, LocalAnswers, Message, RCODE_SERVFAIL};
use crate::forward::Forwarder;

/// How requests are answered
pub enum Mode {
    /// Synthesized answers, no upstream
    Local(LocalAnswers),

    /// Everything relayed to the upstream resolver
    Forward(Forwarder),
}

/// Turns request datagrams into response datagrams
pub struct Relay {
    mode: Mode,
    metrics: Arc<Metrics>,
}

impl Relay {
    pub fn new(mode: Mode, metrics: Arc<Metrics>) -> Self {
        Self { mode, metrics }
    }

    /// Decode `datagram`, answer it and encode the response
    ///
    /// Only a datagram that does not decode is an error; the caller should
    /// drop it.
    pub async fn handle_datagram(&self, datagram: &[u8]) -> Result<Vec<u8>, DnsError> {
        let request = Message::decode(datagram)?;
        debug!(
            "Query {}: {:?}",
            request.id(),
            request.questions().iter().map(|q| q.name.as_str()).collect::<Vec<_>>()
        );

        let response = match &self.mode {
            Mode::Local(answers) => {
                self.metrics.inc_local_responses();
                build_local_response(&request, answers)
            }
            Mode::Forward(forwarder) => forwarder.resolve(&request).await,
        };

        match response.encode() {
            Ok(bytes) => Ok(bytes),
            Err(e) => {
                // e.g. an upstream name that does not fit back into 255 bytes
                warn!("Cannot encode response to query {}: {}", request.id(), e);
                self.metrics.inc_send_errors();
                Message::new(Header::response_to(request.header(), RCODE_SERVFAIL)).encode()
            }
        }
    }
}

/// Run the request loop on `socket` until the socket fails to be usable
pub async fn run_server(socket: UdpSocket, relay: Relay, max_packet_size: usize) -> anyhow::Result<()> {
    info!("🌐 DNS relay listening on {}", socket.local_addr()?);

    let mut buf = vec![0u8; max_packet_size];

    loop {
        let (len, src) = match socket.recv_from(&mut buf).await {
            Ok(received) => received,
            Err(e) => {
                error!("DNS socket error: {}", e);
                continue;
            }
        };

        relay.metrics.inc_datagrams_received();
        debug!("Received {} bytes from {}", len, src);

        let response = match relay.handle_datagram(&buf[..len]).await {
            Ok(response) => response,
            Err(e) => {
                relay.metrics.inc_malformed_datagrams();
                debug!("Dropping malformed datagram from {}: {}", src, e);
                trace!("Malformed datagram: {}", hex::encode(&buf[..len]));
                continue;
            }
        };

        send_response(&socket, &relay.metrics, &response, src).await;
    }
}

async fn send_response(socket: &UdpSocket, metrics: &Metrics, response: &[u8], dst: SocketAddr) {
    match socket.send_to(response, dst).await {
        Ok(size) => {
            metrics.inc_responses_sent();
            debug!("Written {} bytes to {}", size, dst);
        }
        Err(e) => {
            metrics.inc_send_errors();
            warn!("Failed to send response to {}: {}", dst, e);
        }
    }
}
