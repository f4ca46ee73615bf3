//! Corpus boundary: batches of parallel token sequences.

mod text;

pub use text::{CorpusConfig, TextCorpus};

/// A batch of aligned source and target token sequences.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batch {
    pub sources: Vec<Vec<String>>,
    pub targets: Vec<Vec<String>>,
}

impl Batch {
    pub fn new(sources: Vec<Vec<String>>, targets: Vec<Vec<String>>) -> Self {
        Batch { sources, targets }
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn pairs(&self) -> impl Iterator<Item = (&[String], &[String])> {
        self.sources
            .iter()
            .zip(&self.targets)
            .map(|(s, t)| (s.as_slice(), t.as_slice()))
    }

    /// Keep only pairs whose source is strictly longer than `min_len`.
    pub fn filter_min_source_len(&self, min_len: usize) -> Batch {
        let (sources, targets) = self
            .sources
            .iter()
            .zip(&self.targets)
            .filter(|(s, _)| s.len() > min_len)
            .map(|(s, t)| (s.clone(), t.clone()))
            .unzip();
        Batch { sources, targets }
    }
}

/// Iterable source of training or validation batches.
pub trait Corpus: Iterator<Item = Batch> {
    /// Total number of sentence pairs.
    fn num(&self) -> usize;
    fn batch_size(&self) -> usize;
    /// Restart iteration from the first batch.
    fn reset(&mut self);
}

/// Join BPE pieces back into words for display (`"trans@@ lation"` -> `"translation"`).
pub fn merge_bpe(tokens: &[String]) -> String {
    let joined = tokens.join(" ").replace("@@ ", "");
    match joined.strip_suffix("@@") {
        Some(stripped) => stripped.to_string(),
        None => joined,
    }
}
