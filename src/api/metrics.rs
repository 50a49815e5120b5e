//! Metrics Collection
//!
//! Counters for the relay's request loop, exported as Prometheus text or JSON.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Metrics collector for the relay
#[derive(Default)]
pub struct Metrics {
    /// Start time for uptime calculation
    start_time: Option<Instant>,

    /// Datagrams received on the listening socket
    pub datagrams_received: AtomicU64,

    /// Datagrams dropped because they did not decode
    pub malformed_datagrams: AtomicU64,

    /// Requests answered without the upstream resolver
    pub local_responses: AtomicU64,

    /// Questions (or sub-requests) sent upstream
    pub forwarded_questions: AtomicU64,

    /// Upstream exchanges that failed
    pub forward_failures: AtomicU64,

    /// Responses written back to clients
    pub responses_sent: AtomicU64,

    /// Responses that could not be encoded or sent
    pub send_errors: AtomicU64,
}

/// Point-in-time copy of the counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub uptime_secs: u64,
    pub datagrams_received: u64,
    pub malformed_datagrams: u64,
    pub local_responses: u64,
    pub forwarded_questions: u64,
    pub forward_failures: u64,
    pub responses_sent: u64,
    pub send_errors: u64,
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> Self {
        Self {
            start_time: Some(Instant::now()),
            ..Default::default()
        }
    }

    /// Get uptime in seconds
    pub fn uptime_secs(&self) -> u64 {
        self.start_time
            .map(|t| t.elapsed().as_secs())
            .unwrap_or(0)
    }

    pub fn inc_datagrams_received(&self) {
        self.datagrams_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_malformed_datagrams(&self) {
        self.malformed_datagrams.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_local_responses(&self) {
        self.local_responses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_forwarded_questions(&self) {
        self.forwarded_questions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_forward_failures(&self) {
        self.forward_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_responses_sent(&self) {
        self.responses_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_send_errors(&self) {
        self.send_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            uptime_secs: self.uptime_secs(),
            datagrams_received: self.datagrams_received.load(Ordering::Relaxed),
            malformed_datagrams: self.malformed_datagrams.load(Ordering::Relaxed),
            local_responses: self.local_responses.load(Ordering::Relaxed),
            forwarded_questions: self.forwarded_questions.load(Ordering::Relaxed),
            forward_failures: self.forward_failures.load(Ordering::Relaxed),
            responses_sent: self.responses_sent.load(Ordering::Relaxed),
            send_errors: self.send_errors.load(Ordering::Relaxed),
        }
    }

    /// Export metrics in Prometheus format
    pub fn to_prometheus(&self) -> String {
        let s = self.snapshot();
        let series: [(&str, &str, &str, u64); 8] = [
            ("uptime_seconds", "gauge", "Relay uptime in seconds", s.uptime_secs),
            ("datagrams_total", "counter", "Datagrams received", s.datagrams_received),
            ("malformed_total", "counter", "Datagrams that failed to decode", s.malformed_datagrams),
            ("local_responses_total", "counter", "Requests answered locally", s.local_responses),
            ("forwarded_total", "counter", "Questions forwarded upstream", s.forwarded_questions),
            ("forward_failures_total", "counter", "Failed upstream exchanges", s.forward_failures),
            ("responses_total", "counter", "Responses sent to clients", s.responses_sent),
            ("send_errors_total", "counter", "Responses that could not be encoded or sent", s.send_errors),
        ];

        let mut output = String::new();
        for (name, kind, help, value) in series {
            output.push_str(&format!(
                "# HELP dns_relay_{name} {help}\n\
                 # TYPE dns_relay_{name} {kind}\n\
                 dns_relay_{name} {value}\n\n"
            ));
        }
        output
    }

    /// Export metrics as JSON
    pub fn to_json(&self) -> serde_json::Value {
        let s = self.snapshot();
        serde_json::json!({
            "uptime_secs": s.uptime_secs,
            "datagrams": {
                "received": s.datagrams_received,
                "malformed": s.malformed_datagrams,
            },
            "responses": {
                "local": s.local_responses,
                "sent": s.responses_sent,
                "send_errors": s.send_errors,
            },
            "forwarding": {
                "questions": s.forwarded_questions,
                "failures": s.forward_failures,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_increment() {
        let metrics = Metrics::new();

        metrics.inc_datagrams_received();
        metrics.inc_datagrams_received();
        metrics.inc_malformed_datagrams();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.datagrams_received, 2);
        assert_eq!(snapshot.malformed_datagrams, 1);
        assert_eq!(snapshot.responses_sent, 0);
    }

    #[test]
    fn test_prometheus_format() {
        let metrics = Metrics::new();
        metrics.inc_forwarded_questions();
        metrics.inc_forward_failures();
        metrics.inc_forwarded_questions();

        let output = metrics.to_prometheus();

        assert!(output.contains("dns_relay_forwarded_total 2"));
        assert!(output.contains("dns_relay_forward_failures_total 1"));
        assert!(output.contains("# TYPE dns_relay_uptime_seconds gauge"));
    }

    #[test]
    fn test_json_format() {
        let metrics = Metrics::new();
        metrics.inc_responses_sent();

        let json = metrics.to_json();

        assert_eq!(json["responses"]["sent"], 1);
        assert_eq!(json["forwarding"]["failures"], 0);
    }
}
