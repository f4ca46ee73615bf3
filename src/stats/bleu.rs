use std::collections::HashMap;

const MAX_ORDER: usize = 4;

/// Sufficient statistics for BLEU: clipped n-gram matches and n-gram totals
/// per order, plus hypothesis and reference lengths.
///
/// Corpus BLEU sums these over every sentence before scoring, which is why it
/// cannot be recovered from per-sentence scores.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BleuStats {
    matches: [usize; MAX_ORDER],
    totals: [usize; MAX_ORDER],
    hypothesis_len: usize,
    reference_len: usize,
}

impl BleuStats {
    pub fn from_pair(reference: &[String], hypothesis: &[String]) -> Self {
        let mut stats = BleuStats {
            hypothesis_len: hypothesis.len(),
            reference_len: reference.len(),
            ..Default::default()
        };
        for n in 1..=MAX_ORDER {
            let reference_counts = ngram_counts(reference, n);
            let hypothesis_counts = ngram_counts(hypothesis, n);
            stats.totals[n - 1] = hypothesis.len().saturating_sub(n - 1);
            stats.matches[n - 1] = hypothesis_counts
                .iter()
                .map(|(gram, &count)| count.min(reference_counts.get(gram).copied().unwrap_or(0)))
                .sum();
        }
        stats
    }

    pub fn accumulate(&mut self, other: &BleuStats) {
        for n in 0..MAX_ORDER {
            self.matches[n] += other.matches[n];
            self.totals[n] += other.totals[n];
        }
        self.hypothesis_len += other.hypothesis_len;
        self.reference_len += other.reference_len;
    }

    fn brevity_penalty(&self) -> f64 {
        if self.hypothesis_len == 0 {
            return 0.0;
        }
        if self.hypothesis_len >= self.reference_len {
            1.0
        } else {
            (1.0 - self.reference_len as f64 / self.hypothesis_len as f64).exp()
        }
    }

    /// Plain BLEU; zero as soon as any order has no match.
    pub fn score(&self) -> f32 {
        let mut log_sum = 0.0f64;
        for n in 0..MAX_ORDER {
            if self.matches[n] == 0 || self.totals[n] == 0 {
                return 0.0;
            }
            log_sum += (self.matches[n] as f64 / self.totals[n] as f64).ln();
        }
        (self.brevity_penalty() * (log_sum / MAX_ORDER as f64).exp()) as f32
    }

    /// Add-one smoothed BLEU for orders above one, suitable for single sentences.
    pub fn smoothed_score(&self) -> f32 {
        if self.matches[0] == 0 {
            return 0.0;
        }
        let mut log_sum = (self.matches[0] as f64 / self.totals[0] as f64).ln();
        for n in 1..MAX_ORDER {
            log_sum += ((self.matches[n] + 1) as f64 / (self.totals[n] + 1) as f64).ln();
        }
        (self.brevity_penalty() * (log_sum / MAX_ORDER as f64).exp()) as f32
    }
}

fn ngram_counts(tokens: &[String], n: usize) -> HashMap<&[String], usize> {
    let mut counts = HashMap::new();
    for gram in tokens.windows(n) {
        *counts.entry(gram).or_insert(0) += 1;
    }
    counts
}

/// Sentence-level quality of one hypothesis against its reference, in [0, 1].
pub fn sentence_bleu(reference: &[String], hypothesis: &[String]) -> f32 {
    BleuStats::from_pair(reference, hypothesis).smoothed_score()
}

/// Corpus-level BLEU over aligned reference/hypothesis lists, in [0, 1].
pub fn corpus_bleu<R, H>(references: &[R], hypotheses: &[H]) -> f32
where
    R: AsRef<[String]>,
    H: AsRef<[String]>,
{
    let mut total = BleuStats::default();
    for (reference, hypothesis) in references.iter().zip(hypotheses) {
        total.accumulate(&BleuStats::from_pair(reference.as_ref(), hypothesis.as_ref()));
    }
    total.score()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toks(s: &str) -> Vec<String> {
        s.split_whitespace().map(String::from).collect()
    }

    #[test]
    fn test_identical_sentence_scores_one() {
        let s = toks("the cat sat on the mat");
        assert!((sentence_bleu(&s, &s) - 1.0).abs() < 1e-6);
        let short = toks("hello world");
        assert!((sentence_bleu(&short, &short) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_empty_or_disjoint_hypothesis_scores_zero() {
        let r = toks("the cat sat on the mat");
        assert_eq!(sentence_bleu(&r, &[]), 0.0);
        assert_eq!(sentence_bleu(&r, &toks("dogs bark loudly")), 0.0);
    }

    #[test]
    fn test_partial_match_between_zero_and_one() {
        let r = toks("the cat sat on the mat");
        let h = toks("the cat sat on a rug");
        let score = sentence_bleu(&r, &h);
        assert!(score > 0.0 && score < 1.0, "score = {score}");
    }

    #[test]
    fn test_short_hypothesis_is_penalized() {
        let r = toks("the cat sat on the mat");
        let full = sentence_bleu(&r, &r);
        let short = sentence_bleu(&r, &toks("the cat sat"));
        assert!(short < full);
    }

    #[test]
    fn test_clipped_matches() {
        let stats = BleuStats::from_pair(&toks("the cat"), &toks("the the the"));
        assert_eq!(stats.matches[0], 1);
        assert_eq!(stats.totals[0], 3);
    }

    #[test]
    fn test_corpus_bleu_identical_corpus() {
        let refs = vec![toks("a b c d e"), toks("f g h i j k")];
        assert!((corpus_bleu(&refs, &refs) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_corpus_bleu_is_not_mean_of_sentences() {
        let refs = vec![toks("a b c d e f"), toks("g h i j k l")];
        let hyps = vec![toks("a b c d e f"), toks("g h x j k y")];
        let corpus = corpus_bleu(&refs, &hyps);
        let mean = (sentence_bleu(&refs[0], &hyps[0]) + sentence_bleu(&refs[1], &hyps[1])) / 2.0;
        assert!(corpus > 0.0);
        assert!((corpus - mean).abs() > 1e-3, "corpus {corpus} vs mean {mean}");
    }
}
