use thiserror::Error;

/// Errors raised while training.
///
/// A user-requested quit is not an error: the training loop reports it as
/// [`crate::trainer::RunOutcome::UserQuit`].
#[derive(Error, Debug)]
pub enum TrainError {
    // Malformed telemetry or sensor snapshot
    #[error("Invalid input: {0}")]
    InputValidation(String),

    // The agent picked an action outside the action table
    #[error("Invalid action {0}: expected an index in 0..=5")]
    InvalidAction(usize),

    // Connection or actor failure reported by the simulator gateway
    #[error("Simulator failure: {0}")]
    Simulator(String),

    #[error("Agent error: {0}")]
    Agent(#[from] candle_core::Error),

    #[error("Display error: {0}")]
    Display(String),

    #[error("Report error: {0}")]
    Report(#[from] polars::error::PolarsError),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Device error: {0}")]
    Device(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TrainError>;
