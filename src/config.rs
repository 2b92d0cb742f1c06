use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

/// Main configuration structure, fixed for the lifetime of a run.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub training: TrainingConfig,
    pub reward: RewardConfig,
    pub encoder: EncoderConfig,
    pub agent: AgentConfig,
    pub device: DeviceConfig,
    pub simulator: SimulatorConfig,
    pub display: DisplayConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub episodes: usize,
    /// Checkpoint whenever `episode % checkpoint_every == 0`.
    pub checkpoint_every: usize,
    /// Pause after each episode reset.
    pub settle_delay_ms: u64,
    /// Upper bound on the initial wait for the simulator.
    pub sim_ready_timeout_secs: u64,
    /// Unset means episodes end only on a termination condition.
    pub max_episode_steps: Option<usize>,
    pub reward_history_path: PathBuf,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            episodes: 100_000,
            checkpoint_every: 50,
            settle_delay_ms: 500,
            sim_ready_timeout_secs: 60,
            max_episode_steps: None,
            reward_history_path: PathBuf::from("output/reward_history.csv"),
        }
    }
}

impl TrainingConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn sim_ready_timeout(&self) -> Duration {
        Duration::from_secs(self.sim_ready_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RewardConfig {
    /// Accepted for compatibility; no reward term reads it.
    pub desired_speed: f64,
    pub max_middle_dis: f64,
    pub degree_limit: f64,
    pub stationary_penalty: f64,
    pub shaping_scale: f64,
    pub shaping_decay_degrees: f64,
    pub terminal_reward: f64,
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            desired_speed: 20.0,
            max_middle_dis: 4.0,
            degree_limit: 80.0,
            stationary_penalty: -1.5,
            shaping_scale: 1.5,
            shaping_decay_degrees: 15.0,
            terminal_reward: -10.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    pub heading_min: f64,
    pub heading_max: f64,
    pub heading_buckets: usize,
    pub distance_min: f64,
    pub distance_max: f64,
    pub distance_buckets: usize,
    /// Probability above which a perception output counts as detected.
    pub perception_threshold: f32,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            heading_min: -60.0,
            heading_max: 60.0,
            heading_buckets: 10,
            distance_min: 0.6,
            distance_max: 3.6,
            distance_buckets: 5,
            perception_threshold: 0.8,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub lr: f64,
    pub gamma: f32,
    pub epsilon: f32,
    pub epsilon_end: f32,
    pub epsilon_dec: f32,
    pub batch_size: usize,
    pub mem_size: usize,
    pub hidden: Vec<usize>,
    pub target_sync_steps: usize,
    pub checkpoint_path: PathBuf,
    pub resume: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            lr: 0.0005,
            gamma: 0.99,
            epsilon: 0.3,
            epsilon_end: 0.1,
            epsilon_dec: 0.96,
            batch_size: 16,
            mem_size: 10_000,
            hidden: vec![256, 256],
            target_sync_steps: 1_000,
            checkpoint_path: PathBuf::from("output/dqn.safetensors"),
            resume: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub prefer_cuda: bool,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self { prefer_cuda: true }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    /// Simulated seconds per applied control.
    pub tick_secs: f64,
    /// Ticks after `initial()` before the simulator reports ready.
    pub warmup_ticks: u32,
    pub max_speed: f64,
    pub acceleration: f64,
    pub brake_deceleration: f64,
    pub drag: f64,
    /// Heading change per second at full steer and max speed, degrees.
    pub steer_rate: f64,
    /// Uniform heading drift per tick, degrees.
    pub heading_noise: f64,
    /// Lateral offset at which the vehicle hits the curb.
    pub curb_offset: f64,
    /// Offset at which lane invasion is reported.
    pub lane_half_width: f64,
    pub frame_width: usize,
    pub frame_height: usize,
    pub seed: u64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            tick_secs: 0.05,
            warmup_ticks: 3,
            max_speed: 40.0,
            acceleration: 20.0,
            brake_deceleration: 60.0,
            drag: 4.0,
            steer_rate: 90.0,
            heading_noise: 1.0,
            curb_offset: 4.5,
            lane_half_width: 1.75,
            frame_width: 40,
            frame_height: 30,
            seed: 7,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Log the HUD every `log_every` frames; 0 disables HUD logging.
    pub log_every: u64,
    /// Training stops once this file exists.
    pub stop_file: Option<PathBuf>,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            log_every: 100,
            stop_file: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from an optional TOML file, then override with
    /// environment variables (`LANE_DQN__TRAINING__EPISODES`, etc.).
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .add_source(File::from(path.as_ref()).required(false))
            .add_source(
                Environment::with_prefix("LANE_DQN")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }
}
