use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Batch, Corpus};
use crate::error::CorpusError;

/// Locations and batching of the parallel training and validation data.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorpusConfig {
    pub train_source: PathBuf,
    pub train_target: PathBuf,
    pub valid_source: PathBuf,
    pub valid_target: PathBuf,
    pub batch_size: usize,
    pub valid_batch_size: usize,
    /// Training pairs with either side longer than this are dropped.
    pub max_len: usize,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        CorpusConfig {
            train_source: PathBuf::from("data/train.src"),
            train_target: PathBuf::from("data/train.trg"),
            valid_source: PathBuf::from("data/valid.src"),
            valid_target: PathBuf::from("data/valid.trg"),
            batch_size: 1,
            valid_batch_size: 64,
            max_len: 80,
        }
    }
}

/// In-memory parallel corpus read from two whitespace-tokenised text files.
pub struct TextCorpus {
    pairs: Vec<(Vec<String>, Vec<String>)>,
    batch_size: usize,
    cursor: usize,
}

impl TextCorpus {
    /// Read `source` and `target` line by line. Pairs with an empty side, or
    /// with a side longer than `max_len` when given, are dropped.
    pub fn open(
        source: &Path,
        target: &Path,
        batch_size: usize,
        max_len: Option<usize>,
    ) -> Result<Self, CorpusError> {
        let source_lines = read_lines(source)?;
        let target_lines = read_lines(target)?;
        if source_lines.len() != target_lines.len() {
            return Err(CorpusError::LineCountMismatch {
                source_lines: source_lines.len(),
                target_lines: target_lines.len(),
            });
        }

        let limit = max_len.unwrap_or(usize::MAX);
        let total = source_lines.len();
        let pairs: Vec<_> = source_lines
            .into_iter()
            .zip(target_lines)
            .filter(|(s, t)| !s.is_empty() && !t.is_empty() && s.len() <= limit && t.len() <= limit)
            .collect();
        debug!(
            "loaded {} of {} pairs from {}",
            pairs.len(),
            total,
            source.display()
        );

        Self::from_pairs(pairs, batch_size)
    }

    pub fn from_pairs(
        pairs: Vec<(Vec<String>, Vec<String>)>,
        batch_size: usize,
    ) -> Result<Self, CorpusError> {
        if batch_size == 0 {
            return Err(CorpusError::ZeroBatchSize);
        }
        Ok(TextCorpus {
            pairs,
            batch_size,
            cursor: 0,
        })
    }
}

fn read_lines(path: &Path) -> Result<Vec<Vec<String>>, CorpusError> {
    let content = fs::read_to_string(path).map_err(|e| CorpusError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(content
        .lines()
        .map(|line| line.split_whitespace().map(String::from).collect())
        .collect())
}

impl Iterator for TextCorpus {
    type Item = Batch;

    fn next(&mut self) -> Option<Batch> {
        if self.cursor >= self.pairs.len() {
            return None;
        }
        let end = (self.cursor + self.batch_size).min(self.pairs.len());
        let (sources, targets) = self.pairs[self.cursor..end].iter().cloned().unzip();
        self.cursor = end;
        Some(Batch { sources, targets })
    }
}

impl Corpus for TextCorpus {
    fn num(&self) -> usize {
        self.pairs.len()
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn reset(&mut self) {
        self.cursor = 0;
    }
}
