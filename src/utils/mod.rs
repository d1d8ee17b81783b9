//! # Utility Modules
//!
//! Supporting utilities shared by the router and transports.
//!
//! ## Components
//! - **Logging**: `tracing-subscriber` setup driven by `LoggingConfig`
//! - **Metrics**: per-router atomic counters with snapshots

pub mod logging;
pub mod metrics;

pub use logging::init_logging;
pub use metrics::{RouterMetrics, RouterMetricsSnapshot};
