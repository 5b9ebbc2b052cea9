//! Calibration: diff live traffic against a baseline during a short window
//! and rank the ids most likely caused by a user action.

pub mod controller;
pub mod session;

pub use controller::{CalibrationController, CalibrationState, SessionSummary};
pub use session::{CalibrationResults, CalibrationSession, Candidate, DiffEntry, EndReason};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Observation window length in seconds
    pub window_secs: f64,
    pub max_candidates: usize,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            window_secs: 5.0,
            max_candidates: 10,
        }
    }
}
