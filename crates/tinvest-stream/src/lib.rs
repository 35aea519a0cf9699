/*
[INPUT]:  Public API exports for tinvest-stream crate
[OUTPUT]: Module declarations and public re-exports
[POS]:    Crate root - library entry point
[UPDATE]: When adding new modules or public exports
*/

pub mod config;
pub mod market_data;
pub mod metrics;
pub mod runner;

// Re-export main types for convenience
pub use config::{StreamConfig, SubscriptionConfig};
pub use market_data::{ConnectionState, MarketDataHub};
pub use metrics::{StreamMetrics, StreamMetricsSnapshot};
