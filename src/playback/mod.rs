//! Timed replay of stored sequences with pause, resume, stop and loop.

pub mod scheduler;
pub mod state;

pub use scheduler::PlaybackScheduler;
pub use state::{PlaybackPhase, PlaybackProgress};

use serde::{Deserialize, Serialize};
use tokio::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Period of pushed `playback_status` updates while a run is active
    pub progress_interval_ms: u64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            progress_interval_ms: 250,
        }
    }
}

impl PlaybackConfig {
    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms.max(1))
    }
}
