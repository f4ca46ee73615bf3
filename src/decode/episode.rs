use serde::{Deserialize, Serialize};

use super::Action;
use crate::error::StatsError;
use crate::stats::{EpisodeStats, Track};

/// Source and target positions at the moment a decision was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    /// Index of the last visible source token.
    pub source: usize,
    /// Number of target tokens already written.
    pub target: usize,
}

/// One source sentence translated under the policy.
#[derive(Debug, Clone)]
pub struct Episode {
    /// Position of the sentence within its batch.
    pub sentence: usize,
    pub sample: usize,
    pub source: Vec<String>,
    pub reference: Vec<String>,
    pub tokens: Vec<String>,
    pub actions: Vec<Action>,
    pub cursors: Vec<Cursor>,
    pub track: Track,
}

impl Episode {
    pub fn stats(&self) -> Result<EpisodeStats, StatsError> {
        EpisodeStats::new(self.track, &self.actions)
    }
}

/// Every episode produced for one batch, in sentence-then-sample order.
#[derive(Debug, Clone, Default)]
pub struct Translation {
    pub episodes: Vec<Episode>,
}

impl Translation {
    pub fn tracks(&self) -> impl Iterator<Item = Track> + '_ {
        self.episodes.iter().map(|e| e.track)
    }

    pub fn systems(&self) -> impl Iterator<Item = &[String]> {
        self.episodes.iter().map(|e| e.tokens.as_slice())
    }

    pub fn references(&self) -> impl Iterator<Item = &[String]> {
        self.episodes.iter().map(|e| e.reference.as_slice())
    }
}

/// Summary of one training step, averaged over the batch.
///
/// Short names (`R`, `Q`, `D`, `P`, `A`) are used in progress lines and by
/// the remote display.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StepInfo {
    pub reward: f32,
    pub quality: f32,
    pub delay: f32,
    pub policy_loss: f32,
    /// Only present on finetuning steps.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finetune_cost: Option<f32>,
}

impl StepInfo {
    /// Every populated field with its short name.
    pub fn fields(&self) -> Vec<(&'static str, f32)> {
        let mut fields = vec![
            ("R", self.reward),
            ("Q", self.quality),
            ("D", self.delay),
            ("P", self.policy_loss),
        ];
        if let Some(cost) = self.finetune_cost {
            fields.push(("A", cost));
        }
        fields
    }

    /// Name of the first NaN or infinite field, if any.
    pub fn first_non_finite(&self) -> Option<&'static str> {
        self.fields()
            .into_iter()
            .find(|(_, value)| !value.is_finite())
            .map(|(name, _)| name)
    }
}

/// How to decode a batch outside of training.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeRequest {
    /// Episodes per sentence.
    pub samples: usize,
    pub greedy: bool,
}

impl DecodeRequest {
    /// One deterministic episode per sentence, as used for validation.
    pub fn greedy() -> Self {
        DecodeRequest {
            samples: 1,
            greedy: true,
        }
    }
}
