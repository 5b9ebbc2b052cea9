use crate::core::Sequence;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Reported run phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackPhase {
    Playing,
    Paused,
    Completed,
    Stopped,
}

/// Snapshot of a run, queryable at any time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackProgress {
    pub sequence_name: String,
    pub current_index: usize,
    pub total: usize,
    /// Unpaused seconds since start
    pub elapsed: f64,
    pub paused: bool,
    pub looping: bool,
    /// Completed passes over the sequence
    pub iterations: u64,
    pub state: PlaybackPhase,
}

/// The single active playback run
pub(crate) struct PlaybackRun {
    pub(crate) sequence: Arc<Sequence>,
    pub(crate) current_index: usize,
    pub(crate) looping: bool,
    pub(crate) iterations: u64,
    pub(crate) generation: u64,
    pub(crate) cancel: CancellationToken,
    pause_tx: watch::Sender<bool>,
    started: Instant,
    paused_at: Option<Instant>,
    paused_total: Duration,
}

impl PlaybackRun {
    /// The receiver observes pause toggles and closes when the run is
    /// dropped.
    pub(crate) fn new(
        sequence: Arc<Sequence>,
        looping: bool,
        generation: u64,
    ) -> (Self, watch::Receiver<bool>) {
        let (pause_tx, pause_rx) = watch::channel(false);
        let run = Self {
            sequence,
            current_index: 0,
            looping,
            iterations: 0,
            generation,
            cancel: CancellationToken::new(),
            pause_tx,
            started: Instant::now(),
            paused_at: None,
            paused_total: Duration::ZERO,
        };
        (run, pause_rx)
    }

    pub(crate) fn started(&self) -> Instant {
        self.started
    }

    pub(crate) fn is_paused(&self) -> bool {
        self.paused_at.is_some()
    }

    /// Returns `false` if already paused
    pub(crate) fn pause(&mut self, now: Instant) -> bool {
        if self.paused_at.is_some() {
            return false;
        }
        self.paused_at = Some(now);
        self.pause_tx.send_replace(true);
        true
    }

    /// Returns `false` if not paused
    pub(crate) fn resume(&mut self, now: Instant) -> bool {
        match self.paused_at.take() {
            Some(since) => {
                self.paused_total += now.saturating_duration_since(since);
                self.pause_tx.send_replace(false);
                true
            }
            None => false,
        }
    }

    /// Total paused time, including an ongoing pause
    pub(crate) fn paused_total(&self, now: Instant) -> Duration {
        match self.paused_at {
            Some(since) => self.paused_total + now.saturating_duration_since(since),
            None => self.paused_total,
        }
    }

    /// Unpaused time since start; frozen while paused
    pub(crate) fn elapsed(&self, now: Instant) -> Duration {
        let until = self.paused_at.unwrap_or(now);
        until
            .saturating_duration_since(self.started)
            .saturating_sub(self.paused_total)
    }

    pub(crate) fn progress(&self, now: Instant, state: PlaybackPhase) -> PlaybackProgress {
        PlaybackProgress {
            sequence_name: self.sequence.name.clone(),
            current_index: self.current_index,
            total: self.sequence.len(),
            elapsed: self.elapsed(now).as_secs_f64(),
            paused: self.is_paused(),
            looping: self.looping,
            iterations: self.iterations,
            state,
        }
    }

    pub(crate) fn live_progress(&self, now: Instant) -> PlaybackProgress {
        let phase = if self.is_paused() {
            PlaybackPhase::Paused
        } else {
            PlaybackPhase::Playing
        };
        self.progress(now, phase)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SequenceStep;

    fn run() -> PlaybackRun {
        let step = SequenceStep::new("0x1".parse().unwrap(), "FF".parse().unwrap(), 1.0).unwrap();
        let sequence = Sequence::new("test", vec![step]).unwrap();
        PlaybackRun::new(Arc::new(sequence), false, 1).0
    }

    #[tokio::test(start_paused = true)]
    async fn test_elapsed_freezes_while_paused() {
        let mut run = run();
        tokio::time::advance(Duration::from_secs(2)).await;

        assert!(run.pause(Instant::now()));
        assert!(!run.pause(Instant::now()));
        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(run.elapsed(Instant::now()), Duration::from_secs(2));
        assert_eq!(run.paused_total(Instant::now()), Duration::from_secs(5));

        assert!(run.resume(Instant::now()));
        assert!(!run.resume(Instant::now()));
        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(run.elapsed(Instant::now()), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_progress_snapshot() {
        let mut run = run();
        run.pause(Instant::now());
        let progress = run.live_progress(Instant::now());
        assert_eq!(progress.state, PlaybackPhase::Paused);
        assert!(progress.paused);
        assert_eq!(progress.total, 1);
        assert_eq!(progress.sequence_name, "test");
    }
}
