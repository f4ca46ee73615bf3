use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Selector for the function that combines quality and delay into a reward.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RewardType {
    /// `Q - w_d * D`
    #[default]
    A,
    /// `Q - w_d * max(D - d*, 0)`
    B,
    /// Like `B`, additionally penalising mean consecutive waits above `c*`.
    C,
    /// Quality only.
    D,
}

impl RewardType {
    pub const fn label(self) -> char {
        match self {
            RewardType::A => 'A',
            RewardType::B => 'B',
            RewardType::C => 'C',
            RewardType::D => 'D',
        }
    }
}

impl fmt::Display for RewardType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl FromStr for RewardType {
    type Err = String;

    /// Accepts the letter (`A`..`D`, any case) or its index (`0`..`3`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "A" | "0" => Ok(RewardType::A),
            "B" | "1" => Ok(RewardType::B),
            "C" | "2" => Ok(RewardType::C),
            "D" | "3" => Ok(RewardType::D),
            other => Err(format!("unknown reward type '{other}' (expected A, B, C or D)")),
        }
    }
}

/// Reward shaping parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardConfig {
    pub kind: RewardType,
    pub delay_weight: f32,
    pub target_delay: f32,
    pub wait_weight: f32,
    pub target_wait: f32,
}

impl Default for RewardConfig {
    fn default() -> Self {
        RewardConfig {
            kind: RewardType::A,
            delay_weight: 0.5,
            target_delay: 0.5,
            wait_weight: 0.1,
            target_wait: 2.0,
        }
    }
}

impl RewardConfig {
    /// Score an episode. `wait_mean` is the mean consecutive-wait run, 0 when
    /// the trace had no WAIT.
    pub fn score(&self, quality: f32, delay: f32, wait_mean: f32) -> f32 {
        let over_delay = (delay - self.target_delay).max(0.0);
        match self.kind {
            RewardType::A => quality - self.delay_weight * delay,
            RewardType::B => quality - self.delay_weight * over_delay,
            RewardType::C => {
                let over_wait = (wait_mean - self.target_wait).max(0.0);
                quality - self.delay_weight * over_delay - self.wait_weight * over_wait
            }
            RewardType::D => quality,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(kind: RewardType) -> RewardConfig {
        RewardConfig {
            kind,
            delay_weight: 1.0,
            target_delay: 0.5,
            wait_weight: 0.5,
            target_wait: 2.0,
        }
    }

    #[test]
    fn test_reward_types() {
        assert!((config(RewardType::A).score(0.8, 0.6, 0.0) - 0.2).abs() < 1e-6);
        assert!((config(RewardType::B).score(0.8, 0.6, 0.0) - 0.7).abs() < 1e-6);
        assert!((config(RewardType::B).score(0.8, 0.4, 0.0) - 0.8).abs() < 1e-6);
        assert!((config(RewardType::C).score(0.8, 0.6, 4.0) - -0.3).abs() < 1e-6);
        assert!((config(RewardType::D).score(0.8, 0.9, 9.0) - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_parse_reward_type() {
        assert_eq!("b".parse::<RewardType>().unwrap(), RewardType::B);
        assert_eq!("3".parse::<RewardType>().unwrap(), RewardType::D);
        assert!("Z".parse::<RewardType>().is_err());
        assert_eq!(RewardType::C.to_string(), "C");
    }
}
