//! Online DQN training of a lane-keeping driving policy.
//!
//! Telemetry from a simulator is discretized into a one-hot [`state::State`],
//! an [`agent::Agent`] picks one of six driving actions, and the
//! [`reward::RewardEvaluator`] scores the result. [`trainer::TrainingLoop`]
//! runs the episodes, checkpoints the agent and guarantees teardown.

pub mod action;
pub mod agent;
pub mod config;
pub mod data;
pub mod device;
pub mod display;
pub mod error;
pub mod experience;
pub mod mlp;
pub mod report;
pub mod reward;
pub mod shutdown;
pub mod simulator;
pub mod state;
pub mod trainer;

pub use error::{Result, TrainError};
