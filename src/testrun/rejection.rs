use thiserror::Error;

/// Operator input the engine refuses. State is unchanged when one is returned.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Rejection {
    #[error("stop the current test before changing filters")]
    FilterLocked,
    #[error("a test is already running")]
    AlreadyRunning,
    #[error("select a filter before starting a test")]
    NoFilterSelected,
    #[error("test duration must be greater than zero seconds")]
    InvalidDuration,
    #[error("unknown filter {0}")]
    UnknownFilter(String),
}
