use crate::core::{SimError, SimResult};
use serde::{Deserialize, Serialize};
use tokio::time::Duration;

/// Highest aggregate rate the generator accepts, frames per second
pub const MAX_RATE: f64 = 10_000.0;

/// Five stock senders plus 256 derived ids `0x600..=0x6FF`
pub const MAX_SENDERS: usize = 5 + 0x100;

/// Longest gap between two emissions of the same sender
pub const MAX_SENDER_PERIOD: Duration = Duration::from_secs(3600);

/// How the traffic generator shapes background traffic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorPlan {
    /// Aggregate frames per second across all senders
    pub rate: f64,
    /// Per-emission jitter as a fraction of a sender's period, in [0, 1)
    pub jitter: f64,
    /// Number of independent virtual senders
    pub sender_count: usize,
    /// Seed for payload and jitter generation
    pub seed: u64,
}

impl Default for GeneratorPlan {
    fn default() -> Self {
        Self {
            rate: 10.0,
            jitter: 0.05,
            sender_count: 5,
            seed: 0x5EED_CA4B,
        }
    }
}

impl GeneratorPlan {
    pub fn validate(&self) -> SimResult<()> {
        if !self.rate.is_finite() || self.rate <= 0.0 || self.rate > MAX_RATE {
            return Err(SimError::InvalidConfig(format!(
                "rate must be in (0, {}], got {}",
                MAX_RATE, self.rate
            )));
        }
        if !(0.0..1.0).contains(&self.jitter) {
            return Err(SimError::InvalidConfig(format!(
                "jitter must be in [0, 1), got {}",
                self.jitter
            )));
        }
        if self.sender_count == 0 || self.sender_count > MAX_SENDERS {
            return Err(SimError::InvalidConfig(format!(
                "sender_count must be in 1..={}, got {}",
                MAX_SENDERS, self.sender_count
            )));
        }
        match Duration::try_from_secs_f64(self.sender_count as f64 / self.rate) {
            Ok(period) if period <= MAX_SENDER_PERIOD => Ok(()),
            _ => Err(SimError::InvalidConfig(format!(
                "{} senders at {} frames/s exceed the {}s sender period limit",
                self.sender_count,
                self.rate,
                MAX_SENDER_PERIOD.as_secs()
            ))),
        }
    }

    /// Emission period of a single sender, clamped to [`MAX_SENDER_PERIOD`]
    pub fn sender_period(&self) -> Duration {
        Duration::try_from_secs_f64(self.sender_count as f64 / self.rate)
            .unwrap_or(MAX_SENDER_PERIOD)
            .min(MAX_SENDER_PERIOD)
    }
}
