use crate::state::State;

/// One learning sample: `(state, action, reward, next_state, done)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub state: State,
    pub action: usize,
    pub reward: f64,
    pub next_state: State,
    pub done: bool,
}
