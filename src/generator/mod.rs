//! Synthetic background traffic.
//!
//! A single timer task drives every virtual sender from a min-heap of due
//! instants. Plan changes arrive over a watch channel and take effect after
//! the emission currently being waited on has fired.

pub mod events;
pub mod noise;
pub mod plan;

pub use events::{EventCatalog, VirtualEvent};
pub use noise::{NoiseSchedule, VirtualSender};
pub use plan::GeneratorPlan;

use crate::bus::FrameBus;
use crate::core::{CanId, Frame, FrameSource, Payload, SimResult};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;

struct RunningTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Emits believable background frames onto the bus
pub struct TrafficGenerator {
    bus: FrameBus,
    plan_tx: watch::Sender<GeneratorPlan>,
    events: Arc<Mutex<EventCatalog>>,
    task: Mutex<Option<RunningTask>>,
}

impl TrafficGenerator {
    pub fn new(bus: FrameBus, plan: GeneratorPlan) -> SimResult<Self> {
        Self::with_events(bus, plan, EventCatalog::with_defaults())
    }

    pub fn with_events(bus: FrameBus, plan: GeneratorPlan, events: EventCatalog) -> SimResult<Self> {
        plan.validate()?;
        let (plan_tx, _) = watch::channel(plan);
        Ok(Self {
            bus,
            plan_tx,
            events: Arc::new(Mutex::new(events)),
            task: Mutex::new(None),
        })
    }

    fn task(&self) -> MutexGuard<'_, Option<RunningTask>> {
        self.task.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn catalog(&self) -> MutexGuard<'_, EventCatalog> {
        lock_catalog(&self.events)
    }

    pub fn plan(&self) -> GeneratorPlan {
        self.plan_tx.borrow().clone()
    }

    /// Replace the generation plan. A running generator adopts it after its
    /// pending emission fires.
    pub fn configure(&self, plan: GeneratorPlan) -> SimResult<()> {
        plan.validate()?;
        tracing::info!(
            rate = plan.rate,
            jitter = plan.jitter,
            senders = plan.sender_count,
            seed = plan.seed,
            "generator plan replaced"
        );
        self.plan_tx.send_replace(plan);
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.task()
            .as_ref()
            .map(|task| !task.handle.is_finished())
            .unwrap_or(false)
    }

    /// Start emitting. Returns `false` if already running.
    pub fn start(&self) -> bool {
        let mut task = self.task();
        if task.as_ref().is_some_and(|t| !t.handle.is_finished()) {
            return false;
        }

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_generator(
            self.bus.clone(),
            self.plan_tx.subscribe(),
            self.events.clone(),
            cancel.clone(),
        ));
        *task = Some(RunningTask { cancel, handle });
        tracing::info!("traffic generator started");
        true
    }

    /// Stop emitting, pre-empting the pending wait. Returns `false` if
    /// already stopped.
    pub fn stop(&self) -> bool {
        match self.task().take() {
            Some(task) => {
                task.cancel.cancel();
                tracing::info!("traffic generator stopped");
                true
            }
            None => false,
        }
    }

    /// Stop and wait for the timer task to exit
    pub async fn shutdown(&self) {
        let task = self.task().take();
        if let Some(task) = task {
            task.cancel.cancel();
            let _ = task.handle.await;
        }
    }

    /// Switch a vehicle event on and publish its `on` frame immediately
    pub fn activate_event(&self, name: &str) -> SimResult<Frame> {
        let event = self.catalog().activate(name)?;
        tracing::info!(event = %event.name, id = %event.id, "vehicle event activated");
        Ok(self.emit(event.id, event.on_data))
    }

    /// Switch a vehicle event off, publishing its `off` frame if it was on
    pub fn deactivate_event(&self, name: &str) -> SimResult<Option<Frame>> {
        let Some(event) = self.catalog().deactivate(name)? else {
            tracing::debug!(event = name, "vehicle event already inactive");
            return Ok(None);
        };
        tracing::info!(event = %event.name, id = %event.id, "vehicle event deactivated");
        Ok(Some(self.emit(event.id, event.off_data)))
    }

    pub fn add_event(&self, name: &str, id: CanId, on_data: Payload, off_data: Option<Payload>) {
        self.catalog()
            .insert(VirtualEvent::new(name, id, on_data, off_data));
    }

    pub fn events(&self) -> Vec<VirtualEvent> {
        self.catalog().list().into_iter().cloned().collect()
    }

    pub fn active_events(&self) -> Vec<String> {
        self.catalog()
            .active_events()
            .into_iter()
            .map(|event| event.name.clone())
            .collect()
    }

    fn emit(&self, id: CanId, data: Payload) -> Frame {
        let frame = Frame::new(id, data, self.bus.clock().now(), FrameSource::Live);
        self.bus.publish(frame);
        frame
    }
}

impl Drop for TrafficGenerator {
    fn drop(&mut self) {
        if let Some(task) = self.task().take() {
            task.cancel.cancel();
        }
    }
}

fn lock_catalog(events: &Mutex<EventCatalog>) -> MutexGuard<'_, EventCatalog> {
    events.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

async fn run_generator(
    bus: FrameBus,
    mut plan_rx: watch::Receiver<GeneratorPlan>,
    events: Arc<Mutex<EventCatalog>>,
    cancel: CancellationToken,
) {
    let plan = plan_rx.borrow_and_update().clone();
    let mut schedule = NoiseSchedule::new(&plan, Instant::now());
    let clock = bus.clock();

    loop {
        let Some(due) = schedule.next_due() else {
            break;
        };

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = sleep_until(due) => {}
        }

        let active: Vec<VirtualEvent> = lock_catalog(&events)
            .active_events()
            .into_iter()
            .cloned()
            .collect();

        if let Some((id, data)) = schedule.fire(&active) {
            bus.publish(Frame::new(id, data, clock.now(), FrameSource::Live));
        }

        if plan_rx.has_changed().unwrap_or(false) {
            let plan = plan_rx.borrow_and_update().clone();
            schedule = NoiseSchedule::new(&plan, due);
            tracing::debug!(senders = schedule.senders().len(), "generator adopted new plan");
        }
    }

    tracing::debug!("generator task exited");
}
