use serde::{Deserialize, Serialize};

use crate::decode::StepInfo;
use crate::training::validation::ValidationSummary;

pub const CHECKPOINT_VERSION: u32 = 1;

/// One record of the training history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HistoryEntry {
    Step { iteration: usize, info: StepInfo },
    Validation(ValidationSummary),
}

/// Everything needed to resume the training loop.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TrainingState {
    /// Last iteration that was saved; the loop skips everything before it.
    pub iteration: usize,
    pub history: Vec<HistoryEntry>,
}

impl TrainingState {
    pub fn fresh() -> Self {
        Self::default()
    }

    /// Most recent validation result in the history.
    pub fn last_validation(&self) -> Option<&ValidationSummary> {
        self.history.iter().rev().find_map(|entry| match entry {
            HistoryEntry::Validation(summary) => Some(summary),
            HistoryEntry::Step { .. } => None,
        })
    }
}

/// Metadata stored alongside each checkpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointMetadata {
    pub version: u32,
    pub iteration: usize,
    pub timestamp: u64,
    pub policy: String,
    /// Last validation result before this checkpoint, used for pruning.
    #[serde(default)]
    pub validation: Option<ValidationSummary>,
}

impl CheckpointMetadata {
    /// Quality used to rank checkpoints; unvalidated ones rank last.
    pub fn validation_quality(&self) -> f32 {
        self.validation
            .as_ref()
            .map_or(f32::NEG_INFINITY, |v| v.quality)
    }
}
