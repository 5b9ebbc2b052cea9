use super::session::{CalibrationResults, CalibrationSession, EndReason};
use super::CalibrationConfig;
use crate::bus::{BusEvent, FrameBus, Subscription};
use crate::control::ServerMessage;
use crate::core::{CanId, Frame, FrameSource, Payload, SimError, SimResult};
use crate::monitor::TrafficMonitor;
use crate::storage::LabelStore;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;
use tokio::time::{sleep_until, Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Calibration lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationState {
    #[default]
    Idle,
    Armed,
    Observing,
    Scoring,
}

impl CalibrationState {
    pub fn can_transition_to(&self, target: CalibrationState) -> bool {
        use CalibrationState::*;

        matches!(
            (self, target),
            (Idle, Armed)
                | (Armed, Observing)
                | (Observing, Scoring)
                | (Scoring, Idle)
                // cancel
                | (Armed, Idle)
                | (Observing, Idle)
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Armed => "Armed",
            Self::Observing => "Observing",
            Self::Scoring => "Scoring",
        }
    }
}

/// Status snapshot of the open window
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
    pub event_name: String,
    pub state: CalibrationState,
    /// Seconds since the window opened
    pub elapsed: f64,
    pub window: f64,
    pub diff_count: usize,
}

#[derive(Default)]
struct ControllerInner {
    state: CalibrationState,
    session: Option<CalibrationSession>,
    results: Option<CalibrationResults>,
    generation: u64,
    cancel: Option<CancellationToken>,
}

impl ControllerInner {
    fn transition(&mut self, target: CalibrationState) {
        debug_assert!(
            self.state.can_transition_to(target),
            "illegal calibration transition {:?} -> {:?}",
            self.state,
            target
        );
        tracing::debug!(from = self.state.name(), to = target.name(), "calibration transition");
        self.state = target;
    }
}

struct Shared {
    bus: FrameBus,
    config: CalibrationConfig,
    status: broadcast::Sender<ServerMessage>,
    inner: Mutex<ControllerInner>,
}

impl Shared {
    fn inner(&self) -> MutexGuard<'_, ControllerInner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn record(&self, generation: u64, frame: &Frame) {
        let mut inner = self.inner();
        if inner.generation != generation || inner.state != CalibrationState::Observing {
            return;
        }
        if let Some(session) = inner.session.as_mut() {
            if session.observe(frame) {
                tracing::trace!(id = %frame.id, data = %frame.data, "calibration diff");
            }
        }
    }

    /// Close the window and score. `generation` guards against a stale
    /// window timer ending a newer session.
    fn finish(&self, generation: Option<u64>, ended_by: EndReason) -> Option<CalibrationResults> {
        let mut inner = self.inner();
        if inner.state != CalibrationState::Observing {
            return None;
        }
        if generation.is_some_and(|g| g != inner.generation) {
            return None;
        }

        let session = inner.session.take()?;
        if let Some(cancel) = inner.cancel.take() {
            cancel.cancel();
        }
        inner.transition(CalibrationState::Scoring);
        let diffs = session.diff_count();
        let results = session.finish(ended_by, self.config.max_candidates);
        inner.results = Some(results.clone());
        inner.transition(CalibrationState::Idle);
        drop(inner);

        tracing::info!(
            event = %results.event_name,
            diffs,
            candidates = results.candidates.len(),
            ended_by = ?ended_by,
            "calibration scored"
        );
        let _ = self
            .status
            .send(ServerMessage::CalibrationResults(results.clone()));
        Some(results)
    }
}

/// Owns the single calibration session
#[derive(Clone)]
pub struct CalibrationController {
    shared: Arc<Shared>,
    monitor: TrafficMonitor,
    labels: Arc<dyn LabelStore>,
}

impl CalibrationController {
    pub fn new(
        bus: FrameBus,
        monitor: TrafficMonitor,
        labels: Arc<dyn LabelStore>,
        config: CalibrationConfig,
        status: broadcast::Sender<ServerMessage>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                bus,
                config,
                status,
                inner: Mutex::new(ControllerInner::default()),
            }),
            monitor,
            labels,
        }
    }

    pub fn config(&self) -> &CalibrationConfig {
        &self.shared.config
    }

    pub fn state(&self) -> CalibrationState {
        self.shared.inner().state
    }

    /// Last scored results, kept until confirm, cancel or the next start
    pub fn results(&self) -> Option<CalibrationResults> {
        self.shared.inner().results.clone()
    }

    pub fn session_summary(&self) -> Option<SessionSummary> {
        let inner = self.shared.inner();
        let session = inner.session.as_ref()?;
        let now = self.shared.bus.clock().now();
        Some(SessionSummary {
            event_name: session.event_name().to_string(),
            state: inner.state,
            elapsed: (now - session.window_start()).max(0.0),
            window: session.window_end() - session.window_start(),
            diff_count: session.diff_count(),
        })
    }

    /// Arm a session for `event_name` and open its observation window
    pub fn start(&self, event_name: &str) -> SimResult<()> {
        let event_name = event_name.trim();
        if event_name.is_empty() {
            return Err(SimError::InvalidRequest("event_name is empty".to_string()));
        }

        let mut inner = self.shared.inner();
        if inner.state != CalibrationState::Idle {
            tracing::warn!(
                event = event_name,
                state = inner.state.name(),
                "calibration start rejected"
            );
            return Err(SimError::SessionConflict);
        }

        inner.results = None;
        inner.transition(CalibrationState::Armed);

        let baseline = self.monitor.baseline();
        let subscription = self.shared.bus.subscribe_named("calibration");
        let clock = self.shared.bus.clock();
        let window_start = clock.now();
        let window = self.shared.config.window_secs;
        let session = CalibrationSession::new(event_name, baseline, window_start, window);
        let baseline_ids = session.baseline_len();

        inner.session = Some(session);
        inner.generation += 1;
        let cancel = CancellationToken::new();
        inner.cancel = Some(cancel.clone());
        inner.transition(CalibrationState::Observing);
        let generation = inner.generation;
        drop(inner);

        let deadline = Instant::now() + Duration::from_secs_f64(window);
        tokio::spawn(observe(
            self.shared.clone(),
            subscription,
            generation,
            deadline,
            cancel,
        ));

        tracing::info!(
            event = event_name,
            baseline_ids,
            window_secs = window,
            "calibration window opened"
        );
        Ok(())
    }

    /// End an open window early and score it. `None` when nothing is
    /// observing.
    pub fn stop(&self) -> Option<CalibrationResults> {
        let results = self.shared.finish(None, EndReason::Stopped);
        if results.is_none() {
            tracing::debug!("calibration stop ignored, no open window");
        }
        results
    }

    /// Feed a hand-built frame into the open window
    pub fn inject(&self, id: CanId, data: Payload) -> SimResult<()> {
        let mut inner = self.shared.inner();
        if inner.state != CalibrationState::Observing {
            return Err(SimError::NotObserving);
        }
        let frame = Frame::new(id, data, self.shared.bus.clock().now(), FrameSource::Live);
        if let Some(session) = inner.session.as_mut() {
            session.observe(&frame);
        }
        tracing::debug!(%id, %data, "frame injected into calibration window");
        Ok(())
    }

    /// Accept one pattern as the outcome for `event_name` and hand it to the
    /// label store. Clears the stored results on success.
    pub async fn confirm(
        &self,
        event_name: &str,
        id: CanId,
        data: Payload,
        vehicle_ref: Option<&str>,
    ) -> SimResult<()> {
        let has_results = self
            .shared
            .inner()
            .results
            .as_ref()
            .is_some_and(|results| results.event_name == event_name);
        if !has_results {
            return Err(SimError::NoActiveResults);
        }

        self.labels.put(event_name, id, data, vehicle_ref).await?;

        let mut inner = self.shared.inner();
        if inner
            .results
            .as_ref()
            .is_some_and(|results| results.event_name == event_name)
        {
            inner.results = None;
        }
        drop(inner);

        tracing::info!(event = event_name, %id, %data, "calibration confirmed");
        Ok(())
    }

    /// Discard any session and stored results. Safe to call repeatedly.
    pub fn cancel(&self) -> bool {
        let mut inner = self.shared.inner();
        inner.results = None;
        if inner.state == CalibrationState::Idle {
            return false;
        }

        if let Some(cancel) = inner.cancel.take() {
            cancel.cancel();
        }
        inner.session = None;
        inner.transition(CalibrationState::Idle);
        tracing::info!("calibration cancelled");
        true
    }
}

async fn observe(
    shared: Arc<Shared>,
    subscription: Subscription,
    generation: u64,
    deadline: Instant,
    cancel: CancellationToken,
) {
    let window_elapsed = sleep_until(deadline);
    tokio::pin!(window_elapsed);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = &mut window_elapsed => {
                shared.finish(Some(generation), EndReason::WindowElapsed);
                break;
            }
            event = subscription.recv() => match event {
                Some(BusEvent::Frame(frame)) => shared.record(generation, &frame),
                Some(BusEvent::Overflow { dropped }) => {
                    tracing::warn!(dropped, "calibration observer missed frames");
                }
                None => break,
            },
        }
    }

    tracing::debug!(generation, "calibration observer exited");
}
