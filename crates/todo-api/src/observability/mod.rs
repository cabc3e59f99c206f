//! Observability: Prometheus metrics for the Todo API.

pub mod metrics;
