pub mod clock;
pub mod error;
pub mod frame;
pub mod sequence;

pub use clock::SimClock;
pub use error::{SimError, SimResult};
pub use frame::{CanId, Frame, FrameSource, Payload};
pub use sequence::{Sequence, SequenceInfo, SequenceStep, SequenceWire};
