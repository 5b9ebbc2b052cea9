use crate::calibration::CalibrationResults;
use crate::core::{Frame, FrameSource};
use crate::playback::PlaybackProgress;
use serde::{Deserialize, Serialize};

/// Outbound frame representation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameWire {
    /// `0x`-prefixed hex
    pub id: String,
    /// Even-length upper-case hex
    pub data: String,
    pub timestamp: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub change_detected: bool,
    pub source: FrameSource,
}

impl FrameWire {
    pub fn new(frame: &Frame, change_detected: bool, label: Option<String>) -> Self {
        Self {
            id: frame.id.to_string(),
            data: frame.data.to_hex(),
            timestamp: frame.timestamp,
            label,
            change_detected,
            source: frame.source,
        }
    }
}

impl From<&Frame> for FrameWire {
    fn from(frame: &Frame) -> Self {
        Self::new(frame, false, None)
    }
}

/// Messages pushed to clients without a request, as `{type, data}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerMessage {
    CanMessage(FrameWire),
    PlaybackStatus(PlaybackProgress),
    CalibrationResults(CalibrationResults),
    /// Frames this client missed because it fell behind
    Overflow { dropped: u64 },
}

impl ServerMessage {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_can_message_shape() {
        let frame = Frame::parse("0x1A2", "aaffbbcc", 2.5, FrameSource::Playback).unwrap();
        let msg = ServerMessage::CanMessage(FrameWire::new(&frame, true, Some("Horn".into())));
        let json = serde_json::to_value(&msg).unwrap();

        assert_eq!(json["type"], "can_message");
        assert_eq!(json["data"]["id"], "0x1A2");
        assert_eq!(json["data"]["data"], "AAFFBBCC");
        assert_eq!(json["data"]["label"], "Horn");
        assert_eq!(json["data"]["change_detected"], true);
        assert_eq!(json["data"]["source"], "playback");
    }

    #[test]
    fn test_overflow_shape() {
        let json = serde_json::to_value(ServerMessage::Overflow { dropped: 3 }).unwrap();
        assert_eq!(json, serde_json::json!({"type": "overflow", "data": {"dropped": 3}}));
    }

    #[test]
    fn test_label_omitted_when_absent() {
        let frame = Frame::parse("0x100", "00", 0.0, FrameSource::Live).unwrap();
        let json = serde_json::to_value(FrameWire::from(&frame)).unwrap();
        assert!(json.get("label").is_none());
    }
}
