use thiserror::Error;

/// Errors returned by the simulator core to the control-message handler.
///
/// None of these terminate the process; a rejected operation leaves any
/// active session or run untouched.
#[derive(Debug, Error)]
pub enum SimError {
    /// Malformed identifier or payload
    #[error("invalid frame: {0}")]
    InvalidFrame(String),

    /// A calibration session or playback run is already active
    #[error("a session is already active")]
    SessionConflict,

    /// Confirm issued before scoring produced results for the event
    #[error("no calibration results available for confirmation")]
    NoActiveResults,

    #[error("calibration window is not open")]
    NotObserving,

    #[error("sequence not found: {0}")]
    SequenceNotFound(String),

    #[error("sequence has no steps: {0}")]
    EmptySequence(String),

    #[error("unknown vehicle event: {0}")]
    UnknownEvent(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Failure reported by a storage collaborator
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl SimError {
    /// Stable name used in `{success: false, error: ...}` replies
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidFrame(_) => "InvalidFrame",
            Self::SessionConflict => "SessionConflict",
            Self::NoActiveResults => "NoActiveResults",
            Self::NotObserving => "NotObserving",
            Self::SequenceNotFound(_) => "SequenceNotFound",
            Self::EmptySequence(_) => "EmptySequence",
            Self::UnknownEvent(_) => "UnknownEvent",
            Self::InvalidConfig(_) => "InvalidConfig",
            Self::InvalidRequest(_) => "InvalidRequest",
            Self::Storage(_) => "StorageError",
        }
    }
}

pub type SimResult<T> = std::result::Result<T, SimError>;
