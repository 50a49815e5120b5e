//! dns-relay
//!
//! Minimal authoritative/forwarding DNS server over UDP.
//!
//! - [`dns`]: wire-format codec and response derivation
//! - [`forward`]: upstream session, split/merge of multi-question queries
//! - [`server`]: the UDP request loop
//! - [`config`], [`api`]: configuration, metrics and the HTTP API

pub mod api;
pub mod config;
pub mod dns;
pub mod forward;
pub mod server;
