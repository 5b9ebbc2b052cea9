pub mod bus;
pub mod calibration;
pub mod config;
pub mod control;
pub mod core;
pub mod engine;
pub mod generator;
pub mod monitor;
pub mod observability;
pub mod playback;
pub mod storage;

pub use config::SimulatorConfig;
pub use engine::{ClientFeed, Simulator};
