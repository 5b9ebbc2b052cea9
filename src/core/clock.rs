use tokio::time::{Duration, Instant};

/// Monotonic simulation clock shared by every producer on a bus.
///
/// Timestamps are fractional seconds since the clock was created. Built on
/// `tokio::time::Instant` so paused-time tests observe consistent stamps.
#[derive(Debug, Clone, Copy)]
pub struct SimClock {
    epoch: Instant,
}

impl SimClock {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }

    /// Seconds elapsed since the epoch
    pub fn now(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }

    /// Timestamp corresponding to an instant observed on this clock
    pub fn timestamp_of(&self, instant: Instant) -> f64 {
        instant.saturating_duration_since(self.epoch).as_secs_f64()
    }

    /// Instant corresponding to a timestamp on this clock
    pub fn instant_at(&self, timestamp: f64) -> Instant {
        self.epoch + Duration::from_secs_f64(timestamp.max(0.0))
    }
}

impl Default for SimClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_clock_follows_tokio_time() {
        let clock = SimClock::new();
        assert_eq!(clock.now(), 0.0);

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!((clock.now() - 1.5).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_instant_roundtrip() {
        let clock = SimClock::new();
        let at = clock.instant_at(2.25);
        assert!((clock.timestamp_of(at) - 2.25).abs() < 1e-9);
    }
}
