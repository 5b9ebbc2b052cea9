//! Broadcast bus: single ingress for frames, fan-out to many subscribers.
//!
//! Every subscriber owns a bounded queue. `publish` walks the subscriber list
//! under one lock, so all subscribers observe frames in publish order. A full
//! queue never blocks the producer: the subscriber's oldest unread frame is
//! evicted and a single overflow notice is reported before its next frame.

pub mod subscription;

pub use subscription::{BusEvent, Subscription, SubscriptionId};

use crate::core::{Frame, SimClock};
use crate::observability::{BusMonitor, MetricsCollector, MetricsSnapshot, SubscriberMetrics};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use subscription::SubscriberShared;

/// Default per-subscriber queue depth
pub const DEFAULT_CAPACITY: usize = 1024;

struct SubscriberSlot {
    id: SubscriptionId,
    name: String,
    tx: Sender<Frame>,
    /// Bus-side receiver used only to evict the oldest frame on overflow
    evict_rx: Receiver<Frame>,
    shared: Arc<SubscriberShared>,
}

struct Registry {
    slots: Vec<SubscriberSlot>,
    collector: MetricsCollector,
}

pub(crate) struct BusInner {
    capacity: usize,
    clock: SimClock,
    next_id: AtomicU64,
    closed: AtomicBool,
    registry: Mutex<Registry>,
}

impl BusInner {
    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn remove(&self, id: SubscriptionId) -> bool {
        let mut registry = self.registry();
        let Some(pos) = registry.slots.iter().position(|slot| slot.id == id) else {
            return false;
        };
        let slot = registry.slots.remove(pos);
        registry.collector.unregister(&slot.name);
        slot.shared.close();
        tracing::debug!(subscriber = %slot.id, name = %slot.name, "unsubscribed from bus");
        true
    }
}

/// Cloneable handle to the broadcast bus
#[derive(Clone)]
pub struct FrameBus {
    inner: Arc<BusInner>,
}

impl FrameBus {
    pub fn new(capacity: usize) -> Self {
        Self::with_clock(capacity, SimClock::new())
    }

    pub fn with_clock(capacity: usize, clock: SimClock) -> Self {
        Self {
            inner: Arc::new(BusInner {
                capacity: capacity.max(1),
                clock,
                next_id: AtomicU64::new(1),
                closed: AtomicBool::new(false),
                registry: Mutex::new(Registry {
                    slots: Vec::new(),
                    collector: MetricsCollector::new(),
                }),
            }),
        }
    }

    /// Clock every producer on this bus stamps frames with
    pub fn clock(&self) -> SimClock {
        self.inner.clock
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Queue `frame` for every subscriber. Never blocks; returns the number
    /// of subscribers reached.
    pub fn publish(&self, frame: Frame) -> usize {
        if self.inner.closed.load(Ordering::Acquire) {
            return 0;
        }

        let registry = self.inner.registry();
        registry.collector.record_published();

        for slot in &registry.slots {
            Self::deliver(slot, frame);
        }

        tracing::trace!(
            id = %frame.id,
            data = %frame.data,
            source = ?frame.source,
            subscribers = registry.slots.len(),
            "frame published"
        );
        registry.slots.len()
    }

    fn deliver(slot: &SubscriberSlot, frame: Frame) {
        match slot.tx.try_send(frame) {
            Ok(()) => {}
            Err(TrySendError::Full(frame)) => {
                if slot.evict_rx.try_recv().is_ok() {
                    Self::note_drop(slot);
                }
                if slot.tx.try_send(frame).is_err() {
                    Self::note_drop(slot);
                }
            }
            Err(TrySendError::Disconnected(_)) => return,
        }
        slot.shared.notify.notify_one();
    }

    fn note_drop(slot: &SubscriberSlot) {
        let previous = slot.shared.pending_drops.fetch_add(1, Ordering::AcqRel);
        slot.shared.metrics.record_dropped();
        if previous == 0 {
            tracing::debug!(subscriber = %slot.id, name = %slot.name, "subscriber queue overflow");
        }
    }

    pub fn subscribe(&self) -> Subscription {
        let id = self.next_id();
        self.register(id, format!("subscriber-{}", id.0))
    }

    /// Subscribe with a name used in metrics reports
    pub fn subscribe_named(&self, name: impl Into<String>) -> Subscription {
        let id = self.next_id();
        self.register(id, name.into())
    }

    fn next_id(&self) -> SubscriptionId {
        SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn register(&self, id: SubscriptionId, mut name: String) -> Subscription {
        let (tx, rx) = bounded(self.inner.capacity);

        let mut registry = self.inner.registry();
        if registry.collector.get_subscriber_metrics(&name).is_some() {
            name = format!("{}#{}", name, id.0);
        }

        let metrics = Arc::new(SubscriberMetrics::new(name.clone()));
        let shared = Arc::new(SubscriberShared::new(metrics.clone()));
        if self.inner.closed.load(Ordering::Acquire) {
            shared.close();
        } else {
            registry.collector.register(name.clone(), metrics);
            registry.slots.push(SubscriberSlot {
                id,
                name: name.clone(),
                tx,
                evict_rx: rx.clone(),
                shared: shared.clone(),
            });
        }
        drop(registry);

        tracing::debug!(subscriber = %id, name = %name, "subscribed to bus");
        Subscription {
            id,
            name,
            rx,
            shared,
            bus: Arc::downgrade(&self.inner),
        }
    }

    /// Stop delivery to `subscription` and release its queue. Idempotent.
    pub fn unsubscribe(&self, subscription: &Subscription) -> bool {
        self.inner.remove(subscription.id)
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.registry().slots.len()
    }

    /// Disconnect every subscriber; later publishes are ignored
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let mut registry = self.inner.registry();
        for slot in registry.slots.drain(..) {
            slot.shared.close();
        }
        tracing::info!("frame bus closed");
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.inner.registry().collector.snapshot()
    }

    pub fn report(&self) -> String {
        BusMonitor::new(self.metrics()).generate_report()
    }
}
