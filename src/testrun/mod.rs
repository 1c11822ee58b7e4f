pub mod commands;
pub mod config;
pub mod controller;
pub mod rejection;
pub mod state;

pub use config::EngineConfig;
pub use controller::{EngineEvent, StopReason, TestRunController};
pub use rejection::Rejection;
pub use state::{EngineSnapshot, EngineState, EngineStatus, LiveDataPoint};
