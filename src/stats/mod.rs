//! Episode statistics: latency shape of action traces, BLEU, and reward
//! shaping. Everything here is a pure function of its inputs.

mod bleu;
mod latency;
mod reward;

use serde::{Deserialize, Serialize};

use crate::decode::Action;
use crate::error::StatsError;

pub use bleu::{corpus_bleu, sentence_bleu, BleuStats};
pub use latency::{average_proportion, consecutive_waits, max_lag, WaitRuns};
pub use reward::{RewardConfig, RewardType};

/// Quality, delay and reward of a single episode.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub quality: f32,
    pub delay: f32,
    pub reward: f32,
}

/// Statistics record derived from one scored episode.
#[derive(Debug, Clone, PartialEq)]
pub struct EpisodeStats {
    pub track: Track,
    /// `None` when the trace contains no WAIT.
    pub waits: Option<WaitRuns>,
    pub max_lag: usize,
}

impl EpisodeStats {
    /// Rejects traces with no COMMIT or FINISH, which no valid episode produces.
    pub fn new(track: Track, actions: &[Action]) -> Result<Self, StatsError> {
        if actions.iter().all(|&a| a == Action::Wait) {
            return Err(StatsError::Unscoreable(actions.len()));
        }
        Ok(EpisodeStats {
            track,
            waits: consecutive_waits(actions).ok(),
            max_lag: max_lag(actions),
        })
    }
}

/// Arithmetic mean, 0 for an empty slice.
pub fn mean(values: &[f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f32>() / values.len() as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::Action::{Commit, Finish, Wait};

    const TRACK: Track = Track {
        quality: 0.5,
        delay: 0.5,
        reward: 0.0,
    };

    #[test]
    fn test_episode_stats() {
        let stats = EpisodeStats::new(TRACK, &[Wait, Wait, Commit, Wait, Finish]).unwrap();
        let waits = stats.waits.unwrap();
        assert_eq!(waits.max(), 2);
        assert_eq!(stats.max_lag, 3);
    }

    #[test]
    fn test_all_wait_trace_is_unscoreable() {
        assert_eq!(
            EpisodeStats::new(TRACK, &[Wait, Wait]),
            Err(StatsError::Unscoreable(2))
        );
        assert_eq!(EpisodeStats::new(TRACK, &[]), Err(StatsError::Unscoreable(0)));
    }

    #[test]
    fn test_trace_without_wait_has_no_runs() {
        let stats = EpisodeStats::new(TRACK, &[Commit, Finish]).unwrap();
        assert!(stats.waits.is_none());
        assert_eq!(stats.max_lag, 0);
    }

    #[test]
    fn test_mean() {
        assert_eq!(mean(&[]), 0.0);
        assert!((mean(&[0.1, 0.3, 0.0]) - 0.133_333).abs() < 1e-5);
    }
}
