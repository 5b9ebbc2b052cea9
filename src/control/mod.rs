//! JSON control surface: inbound commands, replies, and pushed messages.

pub mod message;
pub mod wire;

pub use message::{ControlMessage, ControlReply};
pub use wire::{FrameWire, ServerMessage};
