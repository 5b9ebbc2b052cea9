use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use super::SubscriberMetrics;

#[derive(Debug, Clone)]
pub struct SubscriberSnapshot {
    pub name: String,
    pub delivered: u64,
    pub dropped: u64,
    pub overflow_notices: u64,
}

#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub published: u64,
    pub subscribers: HashMap<String, SubscriberSnapshot>,
}

/// Bus-wide counters plus the metrics of every live subscriber
pub struct MetricsCollector {
    published: Arc<AtomicU64>,
    subscribers: HashMap<String, Arc<SubscriberMetrics>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            published: Arc::new(AtomicU64::new(0)),
            subscribers: HashMap::new(),
        }
    }

    pub fn record_published(&self) {
        self.published.fetch_add(1, Ordering::Relaxed);
    }

    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    pub fn register(&mut self, name: impl Into<String>, metrics: Arc<SubscriberMetrics>) {
        self.subscribers.insert(name.into(), metrics);
    }

    pub fn unregister(&mut self, name: &str) -> Option<Arc<SubscriberMetrics>> {
        self.subscribers.remove(name)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let subscribers = self
            .subscribers
            .iter()
            .map(|(name, metrics)| {
                (
                    name.clone(),
                    SubscriberSnapshot {
                        name: metrics.name().to_string(),
                        delivered: metrics.delivered(),
                        dropped: metrics.dropped(),
                        overflow_notices: metrics.overflow_notices(),
                    },
                )
            })
            .collect();

        MetricsSnapshot {
            published: self.published(),
            subscribers,
        }
    }

    pub fn get_subscriber_metrics(&self, name: &str) -> Option<Arc<SubscriberMetrics>> {
        self.subscribers.get(name).cloned()
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}
