use std::sync::atomic::{AtomicU64, Ordering};

/// Delivery counters for one bus subscriber
pub struct SubscriberMetrics {
    name: String,
    delivered: AtomicU64,
    dropped: AtomicU64,
    overflow_notices: AtomicU64,
}

impl SubscriberMetrics {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            delivered: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            overflow_notices: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn overflow_notices(&self) -> u64 {
        self.overflow_notices.load(Ordering::Relaxed)
    }

    pub fn record_delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    /// Oldest unread frame evicted to make room for a newer one
    pub fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_overflow_notice(&self) {
        self.overflow_notices.fetch_add(1, Ordering::Relaxed);
    }
}
