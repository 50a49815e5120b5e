//! HTTP API Module
//!
//! Provides metrics and monitoring endpoints for the relay.

mod routes;
mod metrics;

pub use routes::run_api_server;
pub use metrics::{Metrics, MetricsSnapshot};
