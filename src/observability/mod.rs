pub mod collector;
pub mod logging;
pub mod metrics;
pub mod monitor;

pub use collector::{MetricsCollector, MetricsSnapshot, SubscriberSnapshot};
pub use metrics::SubscriberMetrics;
pub use monitor::BusMonitor;
