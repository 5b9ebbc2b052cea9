//! Traffic monitor: a long-lived bus subscriber that keeps per-id last-seen
//! payloads, bounded history, and simple traffic analysis.

pub mod filter;
pub mod history;

pub use filter::{FilterMode, FrameFilter};
pub use history::{FrequencyReport, ObservedFrame, TrafficHistory};

use crate::bus::{BusEvent, FrameBus};
use crate::core::{CanId, Frame, Payload, SimResult};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_HISTORY_PER_ID: usize = 100;
pub const DEFAULT_RECENT_CAPACITY: usize = 200;
const CORRELATION_LIMIT: usize = 10;

/// Cloneable handle to the shared monitor state
#[derive(Clone)]
pub struct TrafficMonitor {
    bus: FrameBus,
    history: Arc<Mutex<TrafficHistory>>,
    task: Arc<Mutex<Option<(CancellationToken, JoinHandle<()>)>>>,
}

impl TrafficMonitor {
    pub fn new(bus: FrameBus) -> Self {
        Self::with_capacity(bus, DEFAULT_HISTORY_PER_ID, DEFAULT_RECENT_CAPACITY)
    }

    pub fn with_capacity(bus: FrameBus, history_per_id: usize, recent_capacity: usize) -> Self {
        Self {
            bus,
            history: Arc::new(Mutex::new(TrafficHistory::new(history_per_id, recent_capacity))),
            task: Arc::new(Mutex::new(None)),
        }
    }

    fn state(&self) -> MutexGuard<'_, TrafficHistory> {
        self.history
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Subscribe to the bus and record every frame until [`stop`](Self::stop)
    pub fn start(&self) -> bool {
        let mut task = self.task.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if task.as_ref().is_some_and(|(_, handle)| !handle.is_finished()) {
            return false;
        }

        let subscription = self.bus.subscribe_named("traffic-monitor");
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let monitor = self.clone();

        let handle = tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = token.cancelled() => break,
                    event = subscription.recv() => event,
                };
                match event {
                    Some(BusEvent::Frame(frame)) => {
                        monitor.process(frame);
                    }
                    Some(BusEvent::Overflow { dropped }) => {
                        tracing::warn!(dropped, "traffic monitor fell behind the bus");
                    }
                    None => break,
                }
            }
            tracing::debug!("traffic monitor task exited");
        });

        *task = Some((cancel, handle));
        tracing::info!("traffic monitor started");
        true
    }

    pub fn stop(&self) -> bool {
        let task = self
            .task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        match task {
            Some((cancel, _)) => {
                cancel.cancel();
                tracing::info!("traffic monitor stopped");
                true
            }
            None => false,
        }
    }

    /// Record one frame; returns the annotated frame if it passed the filters
    pub fn process(&self, frame: Frame) -> Option<ObservedFrame> {
        self.state().record(frame)
    }

    /// Copy of the last payload seen for every id
    pub fn baseline(&self) -> HashMap<CanId, Payload> {
        self.state().last_seen().clone()
    }

    pub fn last_seen(&self, id: CanId) -> Option<Payload> {
        self.state().last_seen().get(&id).copied()
    }

    pub fn history(&self, id: CanId) -> Vec<Frame> {
        self.state().history(id)
    }

    pub fn recent(&self) -> Vec<Frame> {
        self.state().recent()
    }

    pub fn set_filter_mode(&self, mode: FilterMode) {
        self.state().filter.set_mode(mode);
    }

    pub fn add_id_filter(&self, id: CanId, include: bool) {
        self.state().filter.add_id(id, include);
    }

    pub fn add_data_filter(&self, pattern: &str, include: bool) -> SimResult<()> {
        self.state().filter.add_data_pattern(pattern, include)
    }

    pub fn clear_filters(&self) {
        self.state().filter.clear();
    }

    /// Message rate of `id` (or of all traffic) over the last `window` seconds
    pub fn analyze_frequency(&self, id: Option<CanId>, window: f64) -> FrequencyReport {
        let now = self.bus.clock().now();
        self.state().frequency(id, window, now)
    }

    /// Top ids seen within `window` seconds of a `target` frame
    pub fn correlated_ids(&self, target: CanId, window: f64) -> Vec<CanId> {
        self.state().correlated(target, window, CORRELATION_LIMIT)
    }
}
