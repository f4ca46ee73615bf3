use rand::rngs::StdRng;

use crate::decode::Action;
use crate::error::PolicyError;

/// What the policy sees before each decision.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    /// Source tokens read so far.
    pub read: usize,
    /// Target tokens written so far.
    pub written: usize,
    pub source_len: usize,
    /// Translator confidence in the token it would commit next.
    pub confidence: f32,
}

impl Observation {
    pub fn source_exhausted(&self) -> bool {
        self.read >= self.source_len
    }

    /// WAIT is illegal once the whole source has been read.
    pub fn legal_actions(&self) -> &'static [Action] {
        if self.source_exhausted() {
            &Action::AFTER_SOURCE
        } else {
            &Action::ALL
        }
    }
}

/// The decisions of one sampled episode together with its advantage.
#[derive(Debug, Clone)]
pub struct Trajectory {
    pub observations: Vec<Observation>,
    pub actions: Vec<Action>,
    pub advantage: f32,
}

/// Interface for read/write policies driven by the episode runner.
pub trait Policy {
    /// Policy name for logging and checkpoint metadata.
    fn name(&self) -> &str;

    /// Choose an action. `greedy` disables exploration.
    fn act(&mut self, observation: &Observation, greedy: bool, rng: &mut StdRng) -> Action;

    /// Learn from sampled trajectories. Returns the policy-loss proxy.
    fn update(&mut self, _trajectories: &[Trajectory]) -> f32 {
        0.0
    }

    /// Serialize learnable state to JSON.
    fn training_state_json(&self) -> Result<String, PolicyError>;

    /// Restore state written by [`Policy::training_state_json`].
    fn restore_training_state_json(&mut self, json: &str) -> Result<(), PolicyError>;
}
