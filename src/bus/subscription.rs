use crate::core::Frame;
use crate::observability::SubscriberMetrics;
use crossbeam_channel::Receiver;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::Notify;

use super::BusInner;

/// Identifier of one bus subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub(crate) u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// What a subscriber reads from its queue
#[derive(Debug, Clone, PartialEq)]
pub enum BusEvent {
    Frame(Frame),
    /// Frames were evicted since the last read; reported once per episode
    Overflow { dropped: u64 },
}

/// State shared between the bus-side slot and the consumer handle
pub(crate) struct SubscriberShared {
    pub(crate) notify: Notify,
    pub(crate) pending_drops: AtomicU64,
    pub(crate) closed: AtomicBool,
    pub(crate) metrics: Arc<SubscriberMetrics>,
}

impl SubscriberShared {
    pub(crate) fn new(metrics: Arc<SubscriberMetrics>) -> Self {
        Self {
            notify: Notify::new(),
            pending_drops: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            metrics,
        }
    }

    pub(crate) fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_one();
    }
}

/// Consumer handle returned by [`FrameBus::subscribe`](super::FrameBus::subscribe).
///
/// Dropping the handle unsubscribes it.
pub struct Subscription {
    pub(crate) id: SubscriptionId,
    pub(crate) name: String,
    pub(crate) rx: Receiver<Frame>,
    pub(crate) shared: Arc<SubscriberShared>,
    pub(crate) bus: Weak<BusInner>,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// Frames currently queued for this subscriber
    pub fn pending(&self) -> usize {
        self.rx.len()
    }

    /// Non-blocking read. A pending overflow notice is returned before the
    /// next frame.
    pub fn try_recv(&self) -> Option<BusEvent> {
        if self.is_closed() {
            return None;
        }

        let dropped = self.shared.pending_drops.swap(0, Ordering::AcqRel);
        if dropped > 0 {
            self.shared.metrics.record_overflow_notice();
            return Some(BusEvent::Overflow { dropped });
        }

        match self.rx.try_recv() {
            Ok(frame) => {
                self.shared.metrics.record_delivered();
                Some(BusEvent::Frame(frame))
            }
            Err(_) => None,
        }
    }

    /// Wait for the next event. Returns `None` once unsubscribed or the bus
    /// is closed.
    pub async fn recv(&self) -> Option<BusEvent> {
        loop {
            if let Some(event) = self.try_recv() {
                return Some(event);
            }
            if self.is_closed() {
                return None;
            }
            self.shared.notify.notified().await;
        }
    }

    /// Like [`recv`](Self::recv) but skips overflow notices
    pub async fn recv_frame(&self) -> Option<Frame> {
        loop {
            match self.recv().await? {
                BusEvent::Frame(frame) => return Some(frame),
                BusEvent::Overflow { .. } => continue,
            }
        }
    }

    /// Drain every queued frame without waiting
    pub fn drain_frames(&self) -> Vec<Frame> {
        let mut frames = Vec::new();
        while let Some(event) = self.try_recv() {
            if let BusEvent::Frame(frame) = event {
                frames.push(frame);
            }
        }
        frames
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("pending", &self.pending())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.remove(self.id);
        }
    }
}
