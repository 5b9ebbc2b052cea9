use crate::core::{CanId, Frame, Payload};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;

/// Mismatch bookkeeping for one id during a window
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DiffEntry {
    pub count: u32,
    pub first_seen: f64,
    pub last_data: Payload,
}

/// Ranked guess that an id/payload pattern caused the calibrated event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: CanId,
    pub data: Payload,
    pub count: u32,
    pub score: f64,
    pub first_seen: f64,
}

/// How an observation window was closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    Stopped,
    WindowElapsed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationResults {
    pub event_name: String,
    pub candidates: Vec<Candidate>,
    pub ended_by: EndReason,
}

/// One calibration attempt: the baseline it was armed with and the diffs
/// observed inside its window.
#[derive(Debug)]
pub struct CalibrationSession {
    event_name: String,
    baseline: HashMap<CanId, Payload>,
    window_start: f64,
    window_end: f64,
    diffs: HashMap<CanId, DiffEntry>,
}

impl CalibrationSession {
    pub fn new(
        event_name: impl Into<String>,
        baseline: HashMap<CanId, Payload>,
        window_start: f64,
        window_secs: f64,
    ) -> Self {
        Self {
            event_name: event_name.into(),
            baseline,
            window_start,
            window_end: window_start + window_secs,
            diffs: HashMap::new(),
        }
    }

    pub fn event_name(&self) -> &str {
        &self.event_name
    }

    pub fn window_start(&self) -> f64 {
        self.window_start
    }

    pub fn window_end(&self) -> f64 {
        self.window_end
    }

    pub fn baseline_len(&self) -> usize {
        self.baseline.len()
    }

    pub fn diff_count(&self) -> usize {
        self.diffs.len()
    }

    pub fn diff(&self, id: CanId) -> Option<&DiffEntry> {
        self.diffs.get(&id)
    }

    /// Compare a frame against the baseline. Returns whether it counted as a
    /// diff. Ids missing from the baseline always count.
    pub fn observe(&mut self, frame: &Frame) -> bool {
        if frame.timestamp < self.window_start || frame.timestamp > self.window_end {
            return false;
        }
        if self.baseline.get(&frame.id) == Some(&frame.data) {
            return false;
        }

        self.diffs
            .entry(frame.id)
            .and_modify(|entry| {
                entry.count += 1;
                entry.last_data = frame.data;
            })
            .or_insert(DiffEntry {
                count: 1,
                first_seen: frame.timestamp,
                last_data: frame.data,
            });
        true
    }

    /// Rank the diffs: `score = count / max_count`, ordered by count desc,
    /// then earliest `first_seen`, then ascending id.
    pub fn score(&self, max_candidates: usize) -> Vec<Candidate> {
        let max_count = self.diffs.values().map(|d| d.count).max().unwrap_or(0);
        if max_count == 0 {
            return Vec::new();
        }

        let mut candidates: Vec<Candidate> = self
            .diffs
            .iter()
            .map(|(id, diff)| Candidate {
                id: *id,
                data: diff.last_data,
                count: diff.count,
                score: diff.count as f64 / max_count as f64,
                first_seen: diff.first_seen,
            })
            .collect();

        candidates.sort_by(rank);
        candidates.truncate(max_candidates);
        candidates
    }

    pub fn finish(self, ended_by: EndReason, max_candidates: usize) -> CalibrationResults {
        let candidates = self.score(max_candidates);
        CalibrationResults {
            event_name: self.event_name,
            candidates,
            ended_by,
        }
    }
}

fn rank(a: &Candidate, b: &Candidate) -> Ordering {
    b.count
        .cmp(&a.count)
        .then_with(|| a.first_seen.total_cmp(&b.first_seen))
        .then_with(|| a.id.cmp(&b.id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::FrameSource;

    fn frame(id: &str, data: &str, ts: f64) -> Frame {
        Frame::parse(id, data, ts, FrameSource::Live).unwrap()
    }

    fn baseline(entries: &[(&str, &str)]) -> HashMap<CanId, Payload> {
        entries
            .iter()
            .map(|(id, data)| (id.parse().unwrap(), data.parse().unwrap()))
            .collect()
    }

    #[test]
    fn test_matching_frames_produce_no_candidates() {
        let mut session = CalibrationSession::new("Horn", baseline(&[("0x100", "00")]), 0.0, 5.0);
        assert!(!session.observe(&frame("0x100", "00", 1.0)));
        assert!(session.score(10).is_empty());
    }

    #[test]
    fn test_single_changing_id_scores_one() {
        let mut session = CalibrationSession::new("Horn", baseline(&[("0x100", "00")]), 0.0, 5.0);
        session.observe(&frame("0x100", "01", 2.0));
        session.observe(&frame("0x100", "01", 2.0));

        let candidates = session.score(10);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].count, 2);
        assert_eq!(candidates[0].score, 1.0);
        assert_eq!(candidates[0].data.to_hex(), "01");
    }

    #[test]
    fn test_unknown_id_counts_as_diff() {
        let mut session = CalibrationSession::new("Horn", HashMap::new(), 0.0, 5.0);
        assert!(session.observe(&frame("0x7FF", "", 0.5)));
        assert_eq!(session.diff("0x7FF".parse().unwrap()).unwrap().count, 1);
    }

    #[test]
    fn test_frames_outside_window_ignored() {
        let mut session = CalibrationSession::new("Horn", HashMap::new(), 10.0, 5.0);
        assert!(!session.observe(&frame("0x100", "01", 9.9)));
        assert!(!session.observe(&frame("0x100", "01", 15.1)));
        assert_eq!(session.diff_count(), 0);
    }

    #[test]
    fn test_ordering_by_count_then_first_seen_then_id() {
        let mut session = CalibrationSession::new("Brake", HashMap::new(), 0.0, 5.0);
        session.observe(&frame("0x300", "01", 1.0));
        session.observe(&frame("0x200", "01", 1.0));
        session.observe(&frame("0x100", "01", 2.0));
        session.observe(&frame("0x400", "01", 3.0));
        session.observe(&frame("0x400", "02", 3.5));

        let ids: Vec<u32> = session.score(10).iter().map(|c| c.id.raw()).collect();
        assert_eq!(ids, vec![0x400, 0x200, 0x300, 0x100]);

        let candidates = session.score(10);
        assert_eq!(candidates[0].score, 1.0);
        assert_eq!(candidates[1].score, 0.5);
        assert_eq!(candidates[0].data.to_hex(), "02");
    }

    #[test]
    fn test_truncated_to_max_candidates() {
        let mut session = CalibrationSession::new("Horn", HashMap::new(), 0.0, 5.0);
        for id in 0..20u32 {
            session.observe(&Frame::new(
                CanId::new(0x100 + id).unwrap(),
                Payload::empty(),
                1.0,
                FrameSource::Live,
            ));
        }
        assert_eq!(session.score(10).len(), 10);
        assert_eq!(session.finish(EndReason::Stopped, 3).candidates.len(), 3);
    }
}
