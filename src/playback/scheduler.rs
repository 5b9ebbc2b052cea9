use super::state::{PlaybackPhase, PlaybackProgress, PlaybackRun};
use super::PlaybackConfig;
use crate::bus::FrameBus;
use crate::control::ServerMessage;
use crate::core::{Frame, FrameSource, Sequence, SimError, SimResult};
use crate::storage::SequenceStore;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{broadcast, watch};
use tokio::time::{interval, sleep_until, Duration, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Outcome of one emission attempt
enum Emitted {
    Next(usize),
    /// Paused between the timer firing and the emission; wait again
    Paused,
    Finished,
    /// The run was stopped or replaced
    Gone,
}

#[derive(Default)]
struct SchedulerInner {
    run: Option<PlaybackRun>,
    /// Final snapshot of the last run that ended
    last: Option<PlaybackProgress>,
    generation: u64,
}

struct Shared {
    bus: FrameBus,
    store: Arc<dyn SequenceStore>,
    status: broadcast::Sender<ServerMessage>,
    config: PlaybackConfig,
    inner: Mutex<SchedulerInner>,
}

impl Shared {
    fn inner(&self) -> MutexGuard<'_, SchedulerInner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn push_status(&self, progress: PlaybackProgress) {
        let _ = self.status.send(ServerMessage::PlaybackStatus(progress));
    }

    /// `(paused, paused_total)` of the run if it is still `generation`
    fn pause_state(&self, generation: u64) -> Option<(bool, Duration)> {
        let inner = self.inner();
        let run = inner.run.as_ref().filter(|run| run.generation == generation)?;
        Some((run.is_paused(), run.paused_total(Instant::now())))
    }

    fn live_progress(&self, generation: u64) -> Option<PlaybackProgress> {
        let inner = self.inner();
        let run = inner.run.as_ref().filter(|run| run.generation == generation)?;
        Some(run.live_progress(Instant::now()))
    }

    /// End run `generation` without completing it, e.g. on a step that cannot
    /// be scheduled
    fn abort(&self, generation: u64, reason: &str) {
        let mut inner = self.inner();
        if inner.run.as_ref().map(|run| run.generation) != Some(generation) {
            return;
        }
        let Some(run) = inner.run.take() else {
            return;
        };
        run.cancel.cancel();
        let progress = run.progress(Instant::now(), PlaybackPhase::Stopped);
        inner.last = Some(progress.clone());
        drop(inner);

        tracing::warn!(
            sequence = %progress.sequence_name,
            index = progress.current_index,
            reason,
            "playback aborted"
        );
        self.push_status(progress);
    }

    /// Publish step `index` and advance. Runs under the run lock so a
    /// concurrent `stop` either precedes the frame or follows it entirely.
    fn emit(&self, generation: u64, index: usize) -> Emitted {
        let mut inner = self.inner();
        let Some(run) = inner
            .run
            .as_mut()
            .filter(|run| run.generation == generation)
        else {
            return Emitted::Gone;
        };
        if run.is_paused() {
            return Emitted::Paused;
        }
        let Some(step) = run.sequence.steps.get(index).copied() else {
            return Emitted::Gone;
        };

        let frame = Frame::new(step.id, step.data, self.bus.clock().now(), FrameSource::Playback);
        self.bus.publish(frame);
        run.current_index = index + 1;

        if run.current_index < run.sequence.len() {
            return Emitted::Next(run.current_index);
        }

        run.iterations += 1;
        if run.looping {
            run.current_index = 0;
            tracing::debug!(
                sequence = %run.sequence.name,
                iterations = run.iterations,
                "playback looped"
            );
            return Emitted::Next(0);
        }

        let progress = run.progress(Instant::now(), PlaybackPhase::Completed);
        if let Some(run) = inner.run.take() {
            run.cancel.cancel();
        }
        inner.last = Some(progress.clone());
        drop(inner);

        tracing::info!(sequence = %progress.sequence_name, frames = progress.total, "playback completed");
        self.push_status(progress);
        Emitted::Finished
    }
}

/// Replays stored sequences onto the bus, one run at a time
#[derive(Clone)]
pub struct PlaybackScheduler {
    shared: Arc<Shared>,
}

impl PlaybackScheduler {
    pub fn new(
        bus: FrameBus,
        store: Arc<dyn SequenceStore>,
        config: PlaybackConfig,
        status: broadcast::Sender<ServerMessage>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                bus,
                store,
                status,
                config,
                inner: Mutex::new(SchedulerInner::default()),
            }),
        }
    }

    pub fn is_active(&self) -> bool {
        self.shared.inner().run.is_some()
    }

    /// Start replaying `name`. `looping = None` uses the sequence's own
    /// default.
    pub async fn start(&self, name: &str, looping: Option<bool>) -> SimResult<PlaybackProgress> {
        if self.is_active() {
            tracing::warn!(sequence = name, "playback start rejected, run active");
            return Err(SimError::SessionConflict);
        }

        let sequence = self
            .shared
            .store
            .load(name)
            .await?
            .ok_or_else(|| SimError::SequenceNotFound(name.to_string()))?;
        if sequence.is_empty() {
            return Err(SimError::EmptySequence(name.to_string()));
        }
        self.launch(sequence, looping)
    }

    /// Start replaying a sequence that is not held by the store
    pub fn start_sequence(&self, sequence: Sequence, looping: Option<bool>) -> SimResult<PlaybackProgress> {
        if sequence.is_empty() {
            return Err(SimError::EmptySequence(sequence.name));
        }
        self.launch(sequence, looping)
    }

    fn launch(&self, sequence: Sequence, looping: Option<bool>) -> SimResult<PlaybackProgress> {
        sequence.validate()?;
        let looping = looping.unwrap_or(sequence.default_loop);
        if looping && sequence.total_duration() <= 0.0 {
            return Err(SimError::InvalidRequest(format!(
                "sequence {:?} cannot loop with zero total delay",
                sequence.name
            )));
        }

        let mut inner = self.shared.inner();
        if inner.run.is_some() {
            return Err(SimError::SessionConflict);
        }
        inner.generation += 1;
        let generation = inner.generation;

        let (run, pause_rx) = PlaybackRun::new(Arc::new(sequence), looping, generation);
        let progress = run.live_progress(Instant::now());
        let sequence = run.sequence.clone();
        let cancel = run.cancel.clone();
        let started = run.started();
        inner.run = Some(run);
        inner.last = None;
        drop(inner);

        tokio::spawn(drive(
            self.shared.clone(),
            generation,
            sequence.clone(),
            started,
            cancel.clone(),
            pause_rx,
        ));
        tokio::spawn(report(self.shared.clone(), generation, cancel));

        tracing::info!(
            sequence = %sequence.name,
            steps = sequence.len(),
            looping,
            "playback started"
        );
        Ok(progress)
    }

    /// Halt the run immediately, even mid-wait. Returns whether a run was
    /// stopped.
    pub fn stop(&self) -> bool {
        let mut inner = self.shared.inner();
        let Some(run) = inner.run.take() else {
            return false;
        };
        run.cancel.cancel();
        let progress = run.progress(Instant::now(), PlaybackPhase::Stopped);
        inner.last = Some(progress.clone());
        drop(inner);

        tracing::info!(
            sequence = %progress.sequence_name,
            index = progress.current_index,
            "playback stopped"
        );
        self.shared.push_status(progress);
        true
    }

    /// Returns `false` when there is no run or it is already paused
    pub fn pause(&self) -> bool {
        self.toggle(true)
    }

    /// Returns `false` when there is no run or it is not paused
    pub fn resume(&self) -> bool {
        self.toggle(false)
    }

    fn toggle(&self, pause: bool) -> bool {
        let mut inner = self.shared.inner();
        let Some(run) = inner.run.as_mut() else {
            return false;
        };
        let now = Instant::now();
        let changed = if pause { run.pause(now) } else { run.resume(now) };
        if !changed {
            return false;
        }
        let progress = run.live_progress(now);
        drop(inner);

        tracing::info!(
            sequence = %progress.sequence_name,
            index = progress.current_index,
            paused = pause,
            "playback toggled"
        );
        self.shared.push_status(progress);
        true
    }

    /// Live progress of the active run, or the final snapshot of the last one
    pub fn progress(&self) -> Option<PlaybackProgress> {
        let inner = self.shared.inner();
        match inner.run.as_ref() {
            Some(run) => Some(run.live_progress(Instant::now())),
            None => inner.last.clone(),
        }
    }
}

/// Timer loop for one run. Each step waits for an absolute deadline measured
/// from the previous emission; paused time pushes the deadline back.
async fn drive(
    shared: Arc<Shared>,
    generation: u64,
    sequence: Arc<Sequence>,
    started: Instant,
    cancel: CancellationToken,
    mut pause_rx: watch::Receiver<bool>,
) {
    let mut index = 0;
    let mut anchor = started;
    let mut pause_base = Duration::ZERO;

    loop {
        let Some(step) = sequence.steps.get(index) else {
            break;
        };
        let delay = match step.wait() {
            Ok(delay) => delay,
            Err(e) => {
                shared.abort(generation, &e.to_string());
                break;
            }
        };

        let Some((paused, paused_total)) = shared.pause_state(generation) else {
            break;
        };
        if paused {
            tokio::select! {
                _ = cancel.cancelled() => break,
                changed = pause_rx.changed() => if changed.is_err() { break },
            }
            continue;
        }

        let deadline = anchor + delay + paused_total.saturating_sub(pause_base);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            changed = pause_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                continue;
            }
            _ = sleep_until(deadline) => {}
        }

        match shared.emit(generation, index) {
            Emitted::Next(next) => {
                index = next;
                anchor = deadline;
                pause_base = paused_total;
            }
            Emitted::Paused => continue,
            Emitted::Finished | Emitted::Gone => break,
        }
    }

    tracing::debug!(generation, "playback task exited");
}

async fn report(shared: Arc<Shared>, generation: u64, cancel: CancellationToken) {
    let mut ticker = interval(shared.config.progress_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }
        let Some(progress) = shared.live_progress(generation) else {
            break;
        };
        shared.push_status(progress);
    }
}
