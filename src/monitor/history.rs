use super::FrameFilter;
use crate::core::{CanId, Frame, Payload};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};

/// Frame annotated by the monitor
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObservedFrame {
    pub frame: Frame,
    /// Payload differs from the previous accepted frame with the same id
    pub change_detected: bool,
}

/// Message rate over a trailing time window
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrequencyReport {
    /// `None` means all ids
    pub id: Option<CanId>,
    pub frequency: f64,
    pub count: usize,
    pub window: f64,
}

/// Bookkeeping behind the traffic monitor
#[derive(Debug)]
pub struct TrafficHistory {
    last_seen: HashMap<CanId, Payload>,
    per_id: HashMap<CanId, VecDeque<Frame>>,
    recent: VecDeque<Frame>,
    history_per_id: usize,
    recent_capacity: usize,
    pub(crate) filter: FrameFilter,
}

impl TrafficHistory {
    pub fn new(history_per_id: usize, recent_capacity: usize) -> Self {
        Self {
            last_seen: HashMap::new(),
            per_id: HashMap::new(),
            recent: VecDeque::with_capacity(recent_capacity),
            history_per_id: history_per_id.max(2),
            recent_capacity: recent_capacity.max(1),
            filter: FrameFilter::new(),
        }
    }

    /// Record a frame. Last-seen data is updated unconditionally; history
    /// only keeps frames the filter accepts.
    pub fn record(&mut self, frame: Frame) -> Option<ObservedFrame> {
        self.last_seen.insert(frame.id, frame.data);

        if !self.filter.accepts(&frame) {
            return None;
        }

        let capacity = self.history_per_id;
        let history = self
            .per_id
            .entry(frame.id)
            .or_insert_with(|| VecDeque::with_capacity(capacity));
        let change_detected = history
            .back()
            .is_some_and(|previous| previous.data != frame.data);

        if history.len() == capacity {
            history.pop_front();
        }
        history.push_back(frame);

        if self.recent.len() == self.recent_capacity {
            self.recent.pop_front();
        }
        self.recent.push_back(frame);

        if change_detected {
            tracing::debug!(id = %frame.id, data = %frame.data, "payload change detected");
        }
        Some(ObservedFrame {
            frame,
            change_detected,
        })
    }

    pub fn last_seen(&self) -> &HashMap<CanId, Payload> {
        &self.last_seen
    }

    pub fn history(&self, id: CanId) -> Vec<Frame> {
        self.per_id
            .get(&id)
            .map(|frames| frames.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn recent(&self) -> Vec<Frame> {
        self.recent.iter().copied().collect()
    }

    /// `(count - 1) / (last - first)` Hz over frames no older than
    /// `now - window`
    pub fn frequency(&self, id: Option<CanId>, window: f64, now: f64) -> FrequencyReport {
        let since = now - window;
        let timestamps: Vec<f64> = match id {
            Some(id) => self
                .per_id
                .get(&id)
                .map(|frames| {
                    frames
                        .iter()
                        .map(|f| f.timestamp)
                        .filter(|ts| *ts >= since)
                        .collect()
                })
                .unwrap_or_default(),
            None => self
                .recent
                .iter()
                .map(|f| f.timestamp)
                .filter(|ts| *ts >= since)
                .collect(),
        };

        let count = timestamps.len();
        let first = timestamps.iter().copied().fold(f64::INFINITY, f64::min);
        let last = timestamps.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let frequency = if count > 1 && last > first {
            (count - 1) as f64 / (last - first)
        } else {
            0.0
        };

        FrequencyReport {
            id,
            frequency,
            count,
            window,
        }
    }

    /// Ids that most often appear within `window` seconds of `target`
    pub fn correlated(&self, target: CanId, window: f64, limit: usize) -> Vec<CanId> {
        let Some(target_frames) = self.per_id.get(&target) else {
            return Vec::new();
        };
        let target_times: Vec<f64> = target_frames.iter().map(|f| f.timestamp).collect();

        let mut counts: HashMap<CanId, usize> = HashMap::new();
        for frame in self.recent.iter().filter(|f| f.id != target) {
            let near = target_times
                .iter()
                .any(|t| (t - frame.timestamp).abs() <= window);
            if near {
                *counts.entry(frame.id).or_default() += 1;
            }
        }

        let mut ranked: Vec<(CanId, usize)> = counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        ranked.into_iter().take(limit).map(|(id, _)| id).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::FrameSource;

    fn frame(id: &str, data: &str, ts: f64) -> Frame {
        Frame::parse(id, data, ts, FrameSource::Live).unwrap()
    }

    #[test]
    fn test_change_detection() {
        let mut history = TrafficHistory::new(100, 200);
        assert!(!history.record(frame("0x100", "00", 0.0)).unwrap().change_detected);
        assert!(!history.record(frame("0x100", "00", 0.1)).unwrap().change_detected);
        assert!(history.record(frame("0x100", "01", 0.2)).unwrap().change_detected);
    }

    #[test]
    fn test_bounded_buffers() {
        let mut history = TrafficHistory::new(3, 4);
        for i in 0..10 {
            history.record(frame("0x100", "00", i as f64));
        }
        assert_eq!(history.history("0x100".parse().unwrap()).len(), 3);
        assert_eq!(history.recent().len(), 4);
        assert_eq!(history.recent()[0].timestamp, 6.0);
    }

    #[test]
    fn test_filtered_frames_still_update_last_seen() {
        let mut history = TrafficHistory::new(100, 200);
        history.filter.add_id("0x1A2".parse().unwrap(), true);

        assert!(history.record(frame("0x100", "AB", 0.0)).is_none());
        let id: CanId = "0x100".parse().unwrap();
        assert_eq!(history.last_seen()[&id].to_hex(), "AB");
        assert!(history.history(id).is_empty());
    }

    #[test]
    fn test_frequency() {
        let mut history = TrafficHistory::new(100, 200);
        for i in 0..11 {
            history.record(frame("0x100", "00", i as f64 * 0.1));
        }
        let report = history.frequency(Some("0x100".parse().unwrap()), 10.0, 1.0);
        assert_eq!(report.count, 11);
        assert!((report.frequency - 10.0).abs() < 1e-6);

        let single = history.frequency(Some("0x200".parse().unwrap()), 10.0, 1.0);
        assert_eq!(single.count, 0);
        assert_eq!(single.frequency, 0.0);
    }

    #[test]
    fn test_correlated_ids() {
        let mut history = TrafficHistory::new(100, 200);
        history.record(frame("0x1A2", "AA", 1.0));
        history.record(frame("0x300", "00", 1.1));
        history.record(frame("0x300", "00", 1.2));
        history.record(frame("0x200", "00", 1.3));
        history.record(frame("0x400", "00", 5.0));

        let ids = history.correlated("0x1A2".parse().unwrap(), 0.5, 10);
        let expected: Vec<CanId> = vec!["0x300".parse().unwrap(), "0x200".parse().unwrap()];
        assert_eq!(ids, expected);
    }
}
