use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use lane_dqn::{
    agent::DqnAgent,
    config::AppConfig,
    device,
    display::ConsoleDisplay,
    reward::RewardEvaluator,
    shutdown::{self, ShutdownFlag},
    simulator::KinematicSimulator,
    state::StateEncoder,
    trainer::{RunOutcome, TrainingLoop},
};

#[derive(Parser, Debug)]
#[command(name = "lane_dqn", about = "Train a lane-keeping DQN driving policy")]
struct Cli {
    /// TOML configuration file; missing files fall back to defaults
    #[arg(long, default_value = "config/default.toml")]
    config: PathBuf,

    /// Override `training.episodes`
    #[arg(long)]
    episodes: Option<usize>,

    /// Log filter, e.g. `info` or `lane_dqn=debug`
    #[arg(long, env = "LANE_DQN_LOG")]
    log_level: Option<String>,
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut cfg = AppConfig::load_from(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    if let Some(episodes) = cli.episodes {
        cfg.training.episodes = episodes;
    }
    init_logging(cli.log_level.as_deref().unwrap_or(&cfg.logging.level));

    let device = device::init(&cfg.device)?;
    info!(?device, "Compute device selected");

    let encoder = StateEncoder::new(&cfg.encoder)?;
    let mut agent = DqnAgent::new(&cfg.agent, encoder.width())?;
    if cfg.agent.resume && cfg.agent.checkpoint_path.exists() {
        agent.load_model()?;
    }

    let trainer = TrainingLoop::new(
        KinematicSimulator::new(cfg.simulator.clone()),
        agent,
        ConsoleDisplay::new(&cfg.display),
        encoder,
        RewardEvaluator::new(cfg.reward.clone()),
        cfg.training.clone(),
    );

    let stop = ShutdownFlag::new();
    shutdown::listen_for_signals(stop.clone())?;
    let mut trainer = trainer.with_shutdown(stop);

    match trainer.run() {
        Ok(summary) => {
            match summary.outcome {
                RunOutcome::Completed => info!(
                    episodes = summary.history.len(),
                    best = summary.history.best().unwrap_or_default(),
                    "Run complete"
                ),
                RunOutcome::UserQuit => info!(
                    episodes = summary.history.len(),
                    "Run stopped by operator"
                ),
                RunOutcome::Interrupted => info!(
                    episodes = summary.history.len(),
                    "Run stopped by termination signal"
                ),
            }
            Ok(())
        }
        Err(err) => {
            error!(error = %err, "Training run failed");
            Err(err.into())
        }
    }
}
