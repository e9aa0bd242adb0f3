//! Brokerlist Telemetry - Observability Infrastructure
//!
//! Structured logging through `tracing` and Prometheus metrics for the API
//! layer.

pub mod metrics;
pub mod middleware;
pub mod tracer;

pub use metrics::{metrics_handler, BrokerlistMetrics, METRICS};
pub use middleware::observability_middleware;
pub use tracer::{init_tracing, DEFAULT_LOG_FILTER};
