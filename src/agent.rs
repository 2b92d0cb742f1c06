use std::collections::VecDeque;
use std::fs;
use std::path::PathBuf;

use candle_core::{D, Tensor, backprop::GradStore};
use candle_nn::{Optimizer, VarMap, loss};
use rand::{Rng, rng, seq::IteratorRandom};
use tracing::{debug, info};

use crate::{
    action::ACTION_COUNT,
    config::AgentConfig,
    device::device,
    error::Result,
    experience::Transition,
    mlp::MultiLayerPerceptron,
    state::State,
};

/// Learner driven by the training loop.
///
/// The loop treats every call as an opaque, synchronous decision; batching
/// and storage policy are the implementor's business.
pub trait Agent {
    /// Raw action index for `state`; the loop validates it against the action table.
    fn choose_action(&mut self, state: &State) -> Result<usize>;
    /// Store a transition; fails if the agent cannot keep its model consistent.
    fn remember(&mut self, transition: Transition) -> Result<()>;
    fn learn(&mut self) -> Result<()>;
    fn save_model(&mut self) -> Result<()>;
}

/// Scales gradients so their global L2 norm does not exceed `max_norm`.
fn clip_gradients(
    grad_store: &mut GradStore,
    var_map: &VarMap,
    max_norm: f32,
) -> std::result::Result<f32, candle_core::Error> {
    let mut total_norm_sq: f32 = 0.0;
    let mut grads = vec![];

    for var in var_map.all_vars() {
        let tensor = var.as_tensor();
        if let Some(grad) = grad_store.get(tensor) {
            let norm_sq = grad.sqr()?.sum_all()?.to_scalar::<f32>()?;
            total_norm_sq += norm_sq;
            grads.push((var, grad.clone()));
        }
    }

    let total_norm = total_norm_sq.sqrt();
    if total_norm > max_norm {
        let scale = (max_norm / total_norm) as f64;
        for (var, grad) in grads {
            let tensor = var.as_tensor();
            grad_store.insert(tensor, grad.affine(scale, 0.0)?);
        }
    }

    Ok(total_norm)
}

/// Deep Q-network agent with an epsilon-greedy policy and uniform replay.
pub struct DqnAgent {
    policy_mlp: MultiLayerPerceptron,
    target_mlp: MultiLayerPerceptron,

    memory: VecDeque<Transition>,
    mem_size: usize,
    batch_size: usize,
    gamma: f32,
    epsilon: f32,
    epsilon_end: f32,
    epsilon_dec: f32,
    steps_done: usize,
    target_sync_steps: usize,
    input_dim: usize,
    checkpoint_path: PathBuf,
}

impl DqnAgent {
    pub fn new(cfg: &AgentConfig, input_dim: usize) -> Result<Self> {
        let mut topology = Vec::with_capacity(cfg.hidden.len() + 2);
        topology.push(input_dim);
        topology.extend_from_slice(&cfg.hidden);
        topology.push(ACTION_COUNT);

        let policy_mlp = MultiLayerPerceptron::new(&topology, cfg.lr)?;
        let target_mlp = MultiLayerPerceptron::new(&topology, cfg.lr)?;
        target_mlp.copy_weights_from(&policy_mlp)?;

        Ok(Self {
            policy_mlp,
            target_mlp,
            memory: VecDeque::with_capacity(cfg.mem_size),
            mem_size: cfg.mem_size.max(1),
            batch_size: cfg.batch_size.max(1),
            gamma: cfg.gamma,
            epsilon: cfg.epsilon,
            epsilon_end: cfg.epsilon_end,
            epsilon_dec: cfg.epsilon_dec,
            steps_done: 0,
            target_sync_steps: cfg.target_sync_steps.max(1),
            input_dim,
            checkpoint_path: cfg.checkpoint_path.clone(),
        })
    }

    pub fn epsilon(&self) -> f32 {
        self.epsilon
    }

    pub fn memory_len(&self) -> usize {
        self.memory.len()
    }

    /// Restores policy and target weights from the checkpoint file.
    pub fn load_model(&mut self) -> Result<()> {
        self.policy_mlp.load(&self.checkpoint_path)?;
        self.target_mlp.copy_weights_from(&self.policy_mlp)?;
        info!(path = %self.checkpoint_path.display(), "Loaded model checkpoint");
        Ok(())
    }

    fn input_tensor(&self, state: &State) -> std::result::Result<Tensor, candle_core::Error> {
        Tensor::from_slice(&state.features, (1, self.input_dim), device())
    }

    pub fn q_values(&self, state: &State) -> Result<Tensor> {
        let input = self.input_tensor(state)?;
        Ok(self.policy_mlp.output(&input)?)
    }
}

impl Agent for DqnAgent {
    fn choose_action(&mut self, state: &State) -> Result<usize> {
        let mut rng = rng();
        if rng.random::<f32>() < self.epsilon {
            return Ok(rng.random_range(0..ACTION_COUNT));
        }

        let output = self.q_values(state)?;
        let action_index = output.argmax(D::Minus1)?.get(0)?.to_scalar::<u32>()? as usize;
        Ok(action_index)
    }

    fn remember(&mut self, transition: Transition) -> Result<()> {
        if self.memory.len() >= self.mem_size {
            self.memory.pop_front();
        }
        self.memory.push_back(transition);
        self.steps_done += 1;
        if self.steps_done % self.target_sync_steps == 0 {
            self.target_mlp.copy_weights_from(&self.policy_mlp)?;
            debug!(steps = self.steps_done, "Synced target network");
        }
        Ok(())
    }

    fn learn(&mut self) -> Result<()> {
        if self.memory.len() < self.batch_size {
            return Ok(());
        }

        let batch = self.batch_size;
        let dim = self.input_dim;
        let mut rng = rng();
        let sample = self.memory.iter().choose_multiple(&mut rng, batch);

        let mut states = Vec::with_capacity(batch * dim);
        let mut next_states = Vec::with_capacity(batch * dim);
        let mut rewards = Vec::with_capacity(batch);
        let mut dones: Vec<f32> = Vec::with_capacity(batch);
        let mut actions = Vec::with_capacity(batch);
        for transition in sample {
            states.extend_from_slice(&transition.state.features);
            next_states.extend_from_slice(&transition.next_state.features);
            rewards.push(transition.reward as f32);
            dones.push(if transition.done { 1.0 } else { 0.0 });
            actions.push(transition.action as u32);
        }

        let state_tensor = Tensor::from_slice(&states, (batch, dim), device())?;
        let next_state_tensor = Tensor::from_slice(&next_states, (batch, dim), device())?;
        let reward_tensor = Tensor::from_slice(&rewards, (batch, 1), device())?;
        let done_tensor = Tensor::from_slice(&dones, (batch, 1), device())?;
        let action_tensor = Tensor::from_slice(&actions, (batch, 1), device())?;

        let predicted_q_values = self.policy_mlp.output(&state_tensor)?;
        let next_q_values = self.target_mlp.output(&next_state_tensor)?;
        let max_next_q = next_q_values.max(D::Minus1)?.reshape((batch, 1))?;
        let not_done = done_tensor.affine(-1.0, 1.0)?;
        let discounted = max_next_q.affine(self.gamma as f64, 0.0)?.mul(&not_done)?;
        let expected_q_values = reward_tensor.add(&discounted)?;
        let relevant_q_values = predicted_q_values.gather(&action_tensor, D::Minus1)?;
        let loss = loss::mse(&relevant_q_values, &expected_q_values)?;

        let mut grads = loss.backward()?;
        let grad_norm = clip_gradients(&mut grads, &self.policy_mlp.var_map, 1.0)?;
        self.policy_mlp.optimiser.step(&grads)?;

        if self.epsilon > self.epsilon_end {
            self.epsilon = (self.epsilon * self.epsilon_dec).max(self.epsilon_end);
        }
        let loss_value = loss.to_scalar::<f32>()?;
        debug!(
            loss = loss_value,
            grad_norm,
            epsilon = self.epsilon,
            "Learn step"
        );

        Ok(())
    }

    fn save_model(&mut self) -> Result<()> {
        if let Some(parent) = self.checkpoint_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        self.policy_mlp.save(&self.checkpoint_path)?;
        info!(path = %self.checkpoint_path.display(), "Saved model checkpoint");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(dir: &str) -> AgentConfig {
        AgentConfig {
            hidden: vec![8],
            batch_size: 4,
            mem_size: 10,
            target_sync_steps: 3,
            checkpoint_path: std::env::temp_dir()
                .join(format!("lane_dqn_agent_{}_{}", dir, std::process::id()))
                .join("dqn.safetensors"),
            ..AgentConfig::default()
        }
    }

    fn one_hot(width: usize, hot: usize) -> State {
        let mut features = vec![0.0; width];
        features[hot] = 1.0;
        State { features }
    }

    fn transition(i: usize) -> Transition {
        Transition {
            state: one_hot(15, i % 15),
            action: i % ACTION_COUNT,
            reward: 1.0,
            next_state: one_hot(15, (i + 1) % 15),
            done: i % 5 == 4,
        }
    }

    #[test]
    fn greedy_choice_is_a_valid_action() {
        let mut agent = DqnAgent::new(
            &AgentConfig {
                epsilon: 0.0,
                ..config("greedy")
            },
            15,
        )
        .unwrap();
        for hot in 0..15 {
            let action = agent.choose_action(&one_hot(15, hot)).unwrap();
            assert!(action < ACTION_COUNT);
        }
    }

    #[test]
    fn memory_is_bounded_and_evicts_oldest() {
        let mut agent = DqnAgent::new(&config("memory"), 15).unwrap();
        for i in 0..25 {
            agent.remember(transition(i)).unwrap();
        }
        assert_eq!(agent.memory_len(), 10);
        assert_eq!(agent.memory.front(), Some(&transition(15)));
    }

    #[test]
    fn learn_waits_for_a_full_batch_then_decays_epsilon() {
        let mut agent = DqnAgent::new(&config("learn"), 15).unwrap();
        agent.remember(transition(0)).unwrap();
        agent.learn().unwrap();
        assert_eq!(agent.epsilon(), 0.3);

        for i in 1..6 {
            agent.remember(transition(i)).unwrap();
        }
        agent.learn().unwrap();
        assert!((agent.epsilon() - 0.3 * 0.96).abs() < 1e-6);

        for _ in 0..100 {
            agent.learn().unwrap();
        }
        assert!((agent.epsilon() - 0.1).abs() < 1e-6);
    }

    fn q_of(mlp: &MultiLayerPerceptron, state: &State) -> Vec<f32> {
        let input = Tensor::from_slice(&state.features, (1, state.width()), device()).unwrap();
        mlp.output(&input).unwrap().flatten_all().unwrap().to_vec1::<f32>().unwrap()
    }

    #[test]
    fn target_network_syncs_on_the_step_boundary() {
        let mut agent = DqnAgent::new(
            &AgentConfig {
                target_sync_steps: 6,
                ..config("sync")
            },
            15,
        )
        .unwrap();
        for i in 0..4 {
            agent.remember(transition(i)).unwrap();
        }
        for _ in 0..3 {
            agent.learn().unwrap();
        }
        let sample_state = one_hot(15, 1);
        assert_ne!(
            q_of(&agent.policy_mlp, &sample_state),
            q_of(&agent.target_mlp, &sample_state)
        );

        agent.remember(transition(4)).unwrap();
        agent.remember(transition(5)).unwrap();
        assert_eq!(
            q_of(&agent.policy_mlp, &sample_state),
            q_of(&agent.target_mlp, &sample_state)
        );
    }

    #[test]
    fn checkpoint_round_trips_through_disk() {
        let cfg = config("checkpoint");
        let mut agent = DqnAgent::new(&cfg, 15).unwrap();
        agent.save_model().unwrap();
        assert!(cfg.checkpoint_path.exists());

        let mut restored = DqnAgent::new(&cfg, 15).unwrap();
        restored.load_model().unwrap();
        let probe = one_hot(15, 3);
        let q = |agent: &DqnAgent| {
            agent
                .q_values(&probe)
                .unwrap()
                .flatten_all()
                .unwrap()
                .to_vec1::<f32>()
                .unwrap()
        };
        assert_eq!(q(&agent), q(&restored));

        if let Some(dir) = cfg.checkpoint_path.parent() {
            fs::remove_dir_all(dir).ok();
        }
    }
}
