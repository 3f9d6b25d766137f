//! Observability: Prometheus metrics exposed via the HTTP server.

pub mod metrics;
