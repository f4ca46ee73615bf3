//! Read/write policies: the [`Policy`] trait, a fixed wait-k baseline, and a
//! linear softmax policy trained with REINFORCE.

mod agent;
mod linear;
mod wait_k;

use std::fmt;
use std::str::FromStr;

use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::error::PolicyError;

pub use agent::{Observation, Policy, Trajectory};
pub use linear::{LinearPolicy, LinearPolicyState};
pub use wait_k::WaitKPolicy;

/// Which policy implementation to train.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    WaitK,
    #[default]
    Linear,
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyKind::WaitK => write!(f, "wait_k"),
            PolicyKind::Linear => write!(f, "linear"),
        }
    }
}

impl FromStr for PolicyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "wait_k" | "waitk" => Ok(PolicyKind::WaitK),
            "linear" => Ok(PolicyKind::Linear),
            other => Err(format!("unknown policy '{other}' (expected 'wait_k' or 'linear')")),
        }
    }
}

/// Policy hyperparameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    pub kind: PolicyKind,
    /// Lookahead of the wait-k policy.
    pub wait_k: usize,
    pub learning_rate: f32,
    /// Standard deviation of the initial linear weights.
    pub init_std: f32,
    /// Initial logit offset of FINISH, keeping early policies from quitting.
    pub finish_bias: f32,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        PolicyConfig {
            kind: PolicyKind::Linear,
            wait_k: 3,
            learning_rate: 0.05,
            init_std: 0.01,
            finish_bias: -3.0,
        }
    }
}

/// Build the configured policy, drawing initial weights from `rng`.
pub fn build(config: &PolicyConfig, rng: &mut StdRng) -> Result<Box<dyn Policy>, PolicyError> {
    Ok(match config.kind {
        PolicyKind::WaitK => Box::new(WaitKPolicy::new(config.wait_k)),
        PolicyKind::Linear => Box::new(LinearPolicy::new(config, rng)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_parse_policy_kind() {
        assert_eq!("wait-k".parse::<PolicyKind>().unwrap(), PolicyKind::WaitK);
        assert_eq!("Linear".parse::<PolicyKind>().unwrap(), PolicyKind::Linear);
        assert!("dqn".parse::<PolicyKind>().is_err());
    }

    #[test]
    fn test_build_each_kind() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut config = PolicyConfig::default();
        assert_eq!(build(&config, &mut rng).unwrap().name(), "Linear");
        config.kind = PolicyKind::WaitK;
        assert_eq!(build(&config, &mut rng).unwrap().name(), "WaitK");
    }

    #[test]
    fn test_build_rejects_bad_init_std() {
        let mut rng = StdRng::seed_from_u64(0);
        let config = PolicyConfig {
            init_std: -1.0,
            ..Default::default()
        };
        assert!(matches!(build(&config, &mut rng), Err(PolicyError::Config(_))));
    }
}
