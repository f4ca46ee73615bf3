use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use super::agent::{Observation, Policy};
use crate::decode::Action;
use crate::error::PolicyError;

/// Fixed wait-k schedule: stay `k` source tokens ahead of the output, then
/// alternate. Never learns.
pub struct WaitKPolicy {
    k: usize,
}

#[derive(Serialize, Deserialize)]
struct WaitKState {
    k: usize,
}

impl WaitKPolicy {
    pub fn new(k: usize) -> Self {
        WaitKPolicy { k }
    }

    pub fn k(&self) -> usize {
        self.k
    }
}

impl Policy for WaitKPolicy {
    fn name(&self) -> &str {
        "WaitK"
    }

    fn act(&mut self, observation: &Observation, _greedy: bool, _rng: &mut StdRng) -> Action {
        if !observation.source_exhausted() && observation.read < observation.written + self.k {
            Action::Wait
        } else {
            Action::Commit
        }
    }

    fn training_state_json(&self) -> Result<String, PolicyError> {
        Ok(serde_json::to_string(&WaitKState { k: self.k })?)
    }

    fn restore_training_state_json(&mut self, json: &str) -> Result<(), PolicyError> {
        let state: WaitKState = serde_json::from_str(json)?;
        self.k = state.k;
        Ok(())
    }
}
