//! Observability: structured logging and routing metrics

pub mod logging;
pub mod metrics;

pub use logging::{init_default_logging, init_logging, parse_level, LogFormat};
pub use metrics::{RequestMetrics, RoutingCounts, RoutingMetrics, RoutingMetricsSnapshot};

// Span macros for structured logging
pub use logging::{node_span, request_span};
