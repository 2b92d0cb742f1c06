use std::mem;
use std::path::Path;
use std::thread;

use tracing::{debug, info, warn};

use crate::{
    action,
    agent::Agent,
    config::TrainingConfig,
    display::Display,
    error::Result,
    experience::Transition,
    report::RewardHistory,
    reward::RewardEvaluator,
    shutdown::ShutdownFlag,
    simulator::SimulatorGateway,
    state::StateEncoder,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every configured episode ran.
    Completed,
    /// The display reported a quit request; the run stopped mid-episode.
    UserQuit,
    /// The process was asked to terminate; the run stopped mid-episode
    /// after full teardown.
    Interrupted,
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub outcome: RunOutcome,
    /// Totals of the episodes that finished, in order.
    pub history: RewardHistory,
}

enum EpisodeEnd {
    Finished { total: f64, steps: usize },
    Quit,
    Interrupted,
}

/// Owns the teardown of one run.
///
/// Closing releases the display, persists the reward curve and destroys the
/// simulator vehicle, in that order. It happens exactly once: explicitly via
/// [`RunScope::finish`] or [`RunScope::fast_exit`], or from `Drop` when the
/// run unwinds through an error or a panic.
struct RunScope<'r, S: SimulatorGateway, D: Display> {
    sim: &'r mut S,
    display: &'r mut D,
    history: RewardHistory,
    history_path: &'r Path,
    closed: bool,
}

impl<'r, S: SimulatorGateway, D: Display> RunScope<'r, S, D> {
    fn open(sim: &'r mut S, display: &'r mut D, history_path: &'r Path) -> Self {
        Self {
            sim,
            display,
            history: RewardHistory::new(),
            history_path,
            closed: false,
        }
    }

    /// Normal end of run: full teardown including the reward curve.
    fn finish(mut self) -> Result<RewardHistory> {
        self.close(true)?;
        Ok(mem::take(&mut self.history))
    }

    /// Quit requested: release the display and simulator, skip the report.
    fn fast_exit(mut self) -> Result<RewardHistory> {
        self.close(false)?;
        Ok(mem::take(&mut self.history))
    }

    fn close(&mut self, persist_history: bool) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        // every step runs even when an earlier one fails; the first error wins
        let display = self.display.close();
        let report = if persist_history {
            self.history.persist(self.history_path)
        } else {
            Ok(())
        };
        let sim = self.sim.destroy();
        display.and(report).and(sim)
    }
}

impl<S: SimulatorGateway, D: Display> Drop for RunScope<'_, S, D> {
    fn drop(&mut self) {
        if !self.closed {
            warn!(
                episodes = self.history.len(),
                "Run aborted, releasing simulator and display"
            );
            if let Err(err) = self.close(true) {
                warn!(error = %err, "Cleanup after aborted run failed");
            }
        }
    }
}

/// Episodic DQN training against a simulator.
///
/// Per step: choose an action, apply it, refresh the display, score the tick,
/// observe the next state, then store the transition and learn on it.
pub struct TrainingLoop<S, A, D> {
    sim: S,
    agent: A,
    display: D,
    encoder: StateEncoder,
    evaluator: RewardEvaluator,
    cfg: TrainingConfig,
    shutdown: ShutdownFlag,
}

impl<S, A, D> TrainingLoop<S, A, D>
where
    S: SimulatorGateway,
    A: Agent,
    D: Display,
{
    pub fn new(
        sim: S,
        agent: A,
        display: D,
        encoder: StateEncoder,
        evaluator: RewardEvaluator,
        cfg: TrainingConfig,
    ) -> Self {
        Self {
            sim,
            agent,
            display,
            encoder,
            evaluator,
            cfg,
            shutdown: ShutdownFlag::new(),
        }
    }

    /// Stop at the next step, with full teardown, once `flag` is raised.
    pub fn with_shutdown(mut self, flag: ShutdownFlag) -> Self {
        self.shutdown = flag;
        self
    }

    pub fn sim(&self) -> &S {
        &self.sim
    }

    pub fn agent(&self) -> &A {
        &self.agent
    }

    pub fn display(&self) -> &D {
        &self.display
    }

    pub fn run(&mut self) -> Result<RunSummary> {
        let Self {
            sim,
            agent,
            display,
            encoder,
            evaluator,
            cfg,
            shutdown,
        } = self;

        sim.initial()?;
        let mut run = RunScope::open(sim, display, &cfg.reward_history_path);
        run.sim.wait_for_sim(cfg.sim_ready_timeout())?;
        info!(episodes = cfg.episodes, "Simulator ready, starting training");

        for episode in 0..cfg.episodes {
            let end = run_episode(
                &mut run, agent, encoder, evaluator, cfg, shutdown, episode,
            )?;
            let (total, steps) = match end {
                EpisodeEnd::Finished { total, steps } => (total, steps),
                EpisodeEnd::Quit => {
                    info!(episode, "Quit requested, stopping run");
                    let history = run.fast_exit()?;
                    return Ok(RunSummary {
                        outcome: RunOutcome::UserQuit,
                        history,
                    });
                }
                EpisodeEnd::Interrupted => {
                    warn!(episode, "Termination requested, stopping run");
                    let history = run.finish()?;
                    return Ok(RunSummary {
                        outcome: RunOutcome::Interrupted,
                        history,
                    });
                }
            };

            run.history.push(total);
            info!(episode, steps, total_reward = total, "Episode finished");

            if cfg.checkpoint_every > 0 && episode % cfg.checkpoint_every == 0 {
                agent.save_model()?;
            }

            run.sim.reset()?;
            thread::sleep(cfg.settle_delay());
        }

        let history = run.finish()?;
        info!(
            episodes = history.len(),
            mean_reward = history.mean().unwrap_or_default(),
            "Training finished"
        );
        Ok(RunSummary {
            outcome: RunOutcome::Completed,
            history,
        })
    }
}

fn run_episode<S, A, D>(
    run: &mut RunScope<'_, S, D>,
    agent: &mut A,
    encoder: &mut StateEncoder,
    evaluator: &RewardEvaluator,
    cfg: &TrainingConfig,
    shutdown: &ShutdownFlag,
    episode: usize,
) -> Result<EpisodeEnd>
where
    S: SimulatorGateway,
    A: Agent,
    D: Display,
{
    let frames = run.sim.camera_data()?;
    let telemetry = run.sim.car_data()?;
    let mut state = encoder.encode_observation(&telemetry, &frames.front)?;
    let mut top_frame = frames.top;

    let mut total = 0.0;
    let mut steps = 0;
    let mut done = false;

    while !done {
        let (action, control) = action::to_control(agent.choose_action(&state)?)?;
        run.sim.control_vehicle(control)?;

        let telemetry = run.sim.car_data()?;
        run.display.clear()?;
        run.display.draw_image(&top_frame)?;
        run.display.draw_text_info(&telemetry, action.label(), episode)?;
        if run.display.should_quit() {
            return Ok(EpisodeEnd::Quit);
        }
        if shutdown.is_raised() {
            return Ok(EpisodeEnd::Interrupted);
        }

        // scored on the tick the action produced, before the next observation
        let sensors = run.sim.sensor_data()?;
        let (reward, terminal) = evaluator.evaluate(&telemetry, &sensors)?;
        steps += 1;
        done = terminal || cfg.max_episode_steps.is_some_and(|max| steps >= max);

        let next_frames = run.sim.camera_data()?;
        let next_telemetry = run.sim.car_data()?;
        let next_state = encoder.encode_observation(&next_telemetry, &next_frames.front)?;

        agent.remember(Transition {
            state,
            action: action.index(),
            reward,
            next_state: next_state.clone(),
            done,
        })?;
        agent.learn()?;

        state = next_state;
        top_frame = next_frames.top;
        total += reward;
        debug!(episode, step = steps, action = action.label(), reward, done, "Step");

        run.display.update()?;
    }

    Ok(EpisodeEnd::Finished { total, steps })
}
