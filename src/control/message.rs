use crate::core::{SimError, SimResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Every command the simulator accepts, tagged by `type`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ControlMessage {
    #[serde(rename = "start_calibration")]
    StartCalibration { event_name: String },

    #[serde(rename = "stop_calibration")]
    StopCalibration,

    #[serde(rename = "cancel_calibration")]
    CancelCalibration,

    #[serde(rename = "confirm_calibration")]
    ConfirmCalibration {
        event_name: String,
        can_id: String,
        data: String,
        #[serde(default)]
        vehicle_id: Option<String>,
    },

    /// Manual injection into the open calibration window
    #[serde(rename = "calibration_message")]
    CalibrationMessage { id: String, data: String },

    #[serde(rename = "playback.start")]
    PlaybackStart {
        name: String,
        #[serde(rename = "loop", default)]
        looping: Option<bool>,
    },

    #[serde(rename = "playback.stop")]
    PlaybackStop,

    #[serde(rename = "playback.pause")]
    PlaybackPause,

    #[serde(rename = "playback.resume")]
    PlaybackResume,

    #[serde(rename = "playback.progress")]
    PlaybackProgress,

    #[serde(rename = "generator.start")]
    GeneratorStart,

    #[serde(rename = "generator.stop")]
    GeneratorStop,

    #[serde(rename = "generator.configure")]
    GeneratorConfigure {
        rate: f64,
        jitter: f64,
        sender_count: usize,
        #[serde(default)]
        seed: Option<u64>,
    },

    #[serde(rename = "event.activate")]
    EventActivate { name: String },

    #[serde(rename = "event.deactivate")]
    EventDeactivate { name: String },
}

impl ControlMessage {
    pub fn parse(json: &str) -> SimResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| SimError::InvalidRequest(format!("malformed control message: {}", e)))
    }

    /// Wire name of the message type, for logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::StartCalibration { .. } => "start_calibration",
            Self::StopCalibration => "stop_calibration",
            Self::CancelCalibration => "cancel_calibration",
            Self::ConfirmCalibration { .. } => "confirm_calibration",
            Self::CalibrationMessage { .. } => "calibration_message",
            Self::PlaybackStart { .. } => "playback.start",
            Self::PlaybackStop => "playback.stop",
            Self::PlaybackPause => "playback.pause",
            Self::PlaybackResume => "playback.resume",
            Self::PlaybackProgress => "playback.progress",
            Self::GeneratorStart => "generator.start",
            Self::GeneratorStop => "generator.stop",
            Self::GeneratorConfigure { .. } => "generator.configure",
            Self::EventActivate { .. } => "event.activate",
            Self::EventDeactivate { .. } => "event.deactivate",
        }
    }
}

/// Answer to one control message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlReply {
    pub success: bool,
    /// Error kind, e.g. `"SequenceNotFound"`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Human-readable error detail
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ControlReply {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
            message: None,
            data: None,
        }
    }

    pub fn with_data(data: impl Serialize) -> Self {
        Self {
            data: serde_json::to_value(data).ok(),
            ..Self::ok()
        }
    }

    pub fn error(err: &SimError) -> Self {
        Self {
            success: false,
            error: Some(err.kind().to_string()),
            message: Some(err.to_string()),
            data: None,
        }
    }
}

impl From<SimResult<ControlReply>> for ControlReply {
    fn from(result: SimResult<ControlReply>) -> Self {
        result.unwrap_or_else(|err| Self::error(&err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tagged_messages() {
        let msg = ControlMessage::parse(r#"{"type": "playback.start", "name": "Horn Test", "loop": true}"#)
            .unwrap();
        assert_eq!(
            msg,
            ControlMessage::PlaybackStart {
                name: "Horn Test".into(),
                looping: Some(true)
            }
        );

        let msg = ControlMessage::parse(r#"{"type": "playback.start", "name": "x"}"#).unwrap();
        assert!(matches!(msg, ControlMessage::PlaybackStart { looping: None, .. }));

        let msg = ControlMessage::parse(r#"{"type": "stop_calibration"}"#).unwrap();
        assert_eq!(msg.kind(), "stop_calibration");
    }

    #[test]
    fn test_unknown_type_is_invalid_request() {
        let err = ControlMessage::parse(r#"{"type": "reboot"}"#).unwrap_err();
        assert_eq!(err.kind(), "InvalidRequest");
        assert!(ControlMessage::parse("not json").is_err());
    }

    #[test]
    fn test_reply_shape() {
        let reply = ControlReply::error(&SimError::SequenceNotFound("nope".into()));
        let json = serde_json::to_value(&reply).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "SequenceNotFound");
        assert!(json.get("data").is_none());

        let ok = serde_json::to_value(ControlReply::ok()).unwrap();
        assert_eq!(ok, serde_json::json!({"success": true}));
    }
}
