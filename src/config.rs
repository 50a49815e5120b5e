//! Relay Configuration
//!
//! Configurable parameters for the relay. Everything has a default, so the
//! configuration file is optional.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use crate::dns::{DEFAULT_ANSWER_TTL, HEADER_SIZE};

/// Main configuration for the relay
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    // === Network ===

    /// Address of the listening UDP socket
    pub bind_addr: String,

    /// Upstream resolver (`host:port`). Without one, answers are local.
    pub resolver: Option<String>,

    /// Largest datagram read or accepted (bytes)
    pub max_packet_size: usize,

    // === Forwarding ===

    /// Time to wait for each upstream reply (milliseconds)
    pub forward_timeout_ms: u64,

    /// Sends per upstream exchange before giving up
    pub forward_attempts: u32,

    // === Local answers ===

    /// TTL of locally synthesized records (seconds)
    pub answer_ttl: u32,

    /// Names answered with a fixed IPv4 address in local mode
    pub static_records: BTreeMap<String, Ipv4Addr>,

    // === Monitoring ===

    /// Port for the HTTP API (disabled when unset)
    pub api_port: Option<u16>,

    /// Interval between status log lines (seconds, 0 disables)
    pub status_interval_secs: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            // Network
            bind_addr: "127.0.0.1:2053".to_string(),
            resolver: None,
            max_packet_size: 512,

            // Forwarding
            forward_timeout_ms: 2000,
            forward_attempts: 2,

            // Local answers
            answer_ttl: DEFAULT_ANSWER_TTL,
            static_records: BTreeMap::new(),

            // Monitoring
            api_port: None,
            status_interval_secs: 60,
        }
    }
}

impl RelayConfig {
    /// Load configuration from TOML file
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    // Builder-style methods for CLI overrides

    pub fn with_bind_addr(mut self, addr: Option<String>) -> Self {
        if let Some(addr) = addr {
            self.bind_addr = addr;
        }
        self
    }

    pub fn with_resolver(mut self, resolver: Option<String>) -> Self {
        if resolver.is_some() {
            self.resolver = resolver;
        }
        self
    }

    pub fn with_api_port(mut self, port: Option<u16>) -> Self {
        if port.is_some() {
            self.api_port = port;
        }
        self
    }

    pub fn forward_timeout(&self) -> Duration {
        Duration::from_millis(self.forward_timeout_ms)
    }

    /// Validate configuration values
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.bind_addr.parse::<SocketAddr>().is_err() {
            anyhow::bail!("bind_addr ({}) must be an IP:port socket address", self.bind_addr);
        }

        if let Some(resolver) = &self.resolver {
            let valid = resolver
                .rsplit_once(':')
                .map(|(host, port)| {
                    // IPv6 hosts need brackets, e.g. [::1]:53
                    let host_ok = if host.contains(':') {
                        host.starts_with('[') && host.ends_with(']')
                    } else {
                        !host.is_empty()
                    };
                    host_ok && port.parse::<u16>().is_ok()
                })
                .unwrap_or(false);
            if !valid {
                anyhow::bail!("resolver ({}) must be in host:port form", resolver);
            }
        }

        if self.max_packet_size < HEADER_SIZE || self.max_packet_size > u16::MAX as usize {
            anyhow::bail!(
                "max_packet_size ({}) must be between {} and {}",
                self.max_packet_size,
                HEADER_SIZE,
                u16::MAX
            );
        }

        if self.forward_timeout_ms == 0 {
            anyhow::bail!("forward_timeout_ms must be greater than 0");
        }

        if self.forward_attempts == 0 {
            anyhow::bail!("forward_attempts must be at least 1");
        }

        for name in self.static_records.keys() {
            let mut wire = Vec::new();
            if let Err(e) = crate::dns::encode_name(name, &mut wire) {
                anyhow::bail!("static record {:?} is not a valid name: {}", name, e);
            }
        }

        Ok(())
    }
}
