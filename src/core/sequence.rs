use super::{CanId, Payload, SimError, SimResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Longest wait allowed between two steps: one day
pub const MAX_STEP_DELAY: f64 = 86_400.0;

fn default_delay() -> f64 {
    0.1
}

/// One step of a replayable sequence
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SequenceStep {
    pub id: CanId,
    pub data: Payload,
    /// Seconds to wait after the previous emission
    #[serde(default = "default_delay")]
    pub delay: f64,
}

impl SequenceStep {
    pub fn new(id: CanId, data: Payload, delay: f64) -> SimResult<Self> {
        let step = Self { id, data, delay };
        step.wait()?;
        Ok(step)
    }

    /// The step's delay as a `Duration`, at most [`MAX_STEP_DELAY`]
    pub fn wait(&self) -> SimResult<Duration> {
        match Duration::try_from_secs_f64(self.delay) {
            Ok(wait) if self.delay <= MAX_STEP_DELAY => Ok(wait),
            _ => Err(SimError::InvalidRequest(format!(
                "step delay must be between 0 and {} seconds, got {}",
                MAX_STEP_DELAY, self.delay
            ))),
        }
    }
}

/// Named, ordered list of frames with inter-frame delays
#[derive(Debug, Clone, PartialEq)]
pub struct Sequence {
    pub name: String,
    pub steps: Vec<SequenceStep>,
    pub default_loop: bool,
}

/// Summary used by sequence listings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceInfo {
    pub name: String,
    pub message_count: usize,
    pub total_duration: f64,
}

/// Export format: `{name, messages: [{id, data, delay}], default_loop}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequenceWire {
    pub name: String,
    pub messages: Vec<SequenceStep>,
    #[serde(default)]
    pub default_loop: bool,
}

impl Sequence {
    pub fn new(name: impl Into<String>, steps: Vec<SequenceStep>) -> SimResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(SimError::InvalidRequest("sequence name is empty".to_string()));
        }
        let sequence = Self {
            name,
            steps,
            default_loop: false,
        };
        sequence.validate()?;
        Ok(sequence)
    }

    /// Check every step delay. Needed for sequences built field by field.
    pub fn validate(&self) -> SimResult<()> {
        for step in &self.steps {
            step.wait()?;
        }
        Ok(())
    }

    pub fn with_loop(mut self, default_loop: bool) -> Self {
        self.default_loop = default_loop;
        self
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Sum of all step delays, i.e. the length of one pass
    pub fn total_duration(&self) -> f64 {
        self.steps.iter().map(|s| s.delay).sum()
    }

    pub fn info(&self) -> SequenceInfo {
        SequenceInfo {
            name: self.name.clone(),
            message_count: self.steps.len(),
            total_duration: self.total_duration(),
        }
    }

    pub fn to_wire(&self) -> SequenceWire {
        SequenceWire {
            name: self.name.clone(),
            messages: self.steps.clone(),
            default_loop: self.default_loop,
        }
    }

    pub fn from_wire(wire: SequenceWire) -> SimResult<Self> {
        Ok(Self::new(wire.name, wire.messages)?.with_loop(wire.default_loop))
    }

    pub fn export_json(&self) -> SimResult<String> {
        serde_json::to_string_pretty(&self.to_wire())
            .map_err(|e| SimError::InvalidRequest(format!("failed to encode sequence: {}", e)))
    }

    pub fn import_json(json: &str) -> SimResult<Self> {
        let wire: SequenceWire = serde_json::from_str(json)
            .map_err(|e| SimError::InvalidRequest(format!("malformed sequence: {}", e)))?;
        Self::from_wire(wire)
    }

    /// Import a JSON array of exported sequences
    pub fn import_many_json(json: &str) -> SimResult<Vec<Self>> {
        let wires: Vec<SequenceWire> = serde_json::from_str(json)
            .map_err(|e| SimError::InvalidRequest(format!("malformed sequence list: {}", e)))?;
        wires.into_iter().map(Self::from_wire).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(id: &str, data: &str, delay: f64) -> SequenceStep {
        SequenceStep::new(id.parse().unwrap(), data.parse().unwrap(), delay).unwrap()
    }

    #[test]
    fn test_rejects_negative_delay() {
        let result = SequenceStep::new(CanId::new(1).unwrap(), Payload::empty(), -0.5);
        assert!(result.is_err());
    }

    #[test]
    fn test_rejects_delay_beyond_a_day() {
        let id = CanId::new(1).unwrap();
        assert!(SequenceStep::new(id, Payload::empty(), MAX_STEP_DELAY).is_ok());
        let err = SequenceStep::new(id, Payload::empty(), 1e20).unwrap_err();
        assert_eq!(err.kind(), "InvalidRequest");
        assert!(SequenceStep::new(id, Payload::empty(), f64::NAN).is_err());
    }

    #[test]
    fn test_total_duration() {
        let seq = Sequence::new(
            "Horn Test",
            vec![step("0x1A2", "FF", 0.3), step("0x1A2", "00", 0.5)],
        )
        .unwrap();
        assert!((seq.total_duration() - 0.8).abs() < 1e-9);
        assert_eq!(seq.info().message_count, 2);
    }

    #[test]
    fn test_missing_delay_defaults() {
        let seq = Sequence::import_json(
            r#"{"name": "short", "messages": [{"id": "0x10", "data": "01"}]}"#,
        )
        .unwrap();
        assert_eq!(seq.steps[0].delay, 0.1);
        assert!(!seq.default_loop);
    }

    #[test]
    fn test_import_rejects_bad_payload() {
        let err = Sequence::import_json(
            r#"{"name": "bad", "messages": [{"id": "0x10", "data": "0"}]}"#,
        )
        .unwrap_err();
        assert_eq!(err.kind(), "InvalidRequest");
    }
}
