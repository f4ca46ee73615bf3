use std::fs;
use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::corpus::Corpus;
use crate::decode::{DecodeRequest, EpisodeRunner, Translation};
use crate::error::{DecodeError, TrainingError};
use crate::stats::{corpus_bleu, mean};

/// Aggregated result of one validation pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationSummary {
    pub iteration: usize,
    pub quality: f32,
    pub delay: f32,
    pub wait_mean: f32,
    pub wait_max: f32,
    pub max_lag: f32,
    pub corpus_bleu: f32,
    pub sentences: usize,
}

impl ValidationSummary {
    pub fn log(&self) {
        info!(
            "Iter = {}: AVG BLEU = {:.4}, DELAY = {:.4}, WAIT(MEAN) = {:.4}, WAIT(MAX) = {:.4}, MaxLen = {:.4}",
            self.iteration, self.quality, self.delay, self.wait_mean, self.wait_max, self.max_lag
        );
        info!(
            "Iter = {}: Corpus BLEU = {:.4} over {} sentences",
            self.iteration, self.corpus_bleu, self.sentences
        );
    }
}

/// Per-episode values collected over a validation pass.
#[derive(Debug, Default)]
struct ValidationCollections {
    quality: Vec<f32>,
    delay: Vec<f32>,
    // Only episodes that waited at least once.
    wait_mean: Vec<f32>,
    wait_max: Vec<f32>,
    max_lag: Vec<f32>,
    systems: Vec<Vec<String>>,
    references: Vec<Vec<String>>,
}

impl ValidationCollections {
    fn extend(&mut self, translation: Translation) -> Result<(), DecodeError> {
        for episode in translation.episodes {
            let stats = episode.stats()?;
            self.quality.push(stats.track.quality);
            self.delay.push(stats.track.delay);
            if let Some(waits) = &stats.waits {
                self.wait_mean.push(waits.mean());
                self.wait_max.push(waits.max() as f32);
            }
            self.max_lag.push(stats.max_lag as f32);
            self.systems.push(episode.tokens);
            self.references.push(episode.reference);
        }
        Ok(())
    }

    fn summarize(&self, iteration: usize) -> ValidationSummary {
        ValidationSummary {
            iteration,
            quality: mean(&self.quality),
            delay: mean(&self.delay),
            wait_mean: mean(&self.wait_mean),
            wait_max: mean(&self.wait_max),
            max_lag: mean(&self.max_lag),
            corpus_bleu: corpus_bleu(&self.references, &self.systems),
            sentences: self.systems.len(),
        }
    }
}

/// Greedy decoding over the validation corpus.
pub struct Validator {
    output_dir: PathBuf,
}

fn write_lines(path: &Path, lines: &[Vec<String>]) -> Result<(), TrainingError> {
    let mut content = String::new();
    for line in lines {
        content.push_str(&line.join(" "));
        content.push('\n');
    }
    fs::write(path, content).map_err(|e| TrainingError::Output {
        path: path.to_path_buf(),
        source: e,
    })
}

impl Validator {
    /// `test.txt` and `ref.txt` are written to `output_dir`.
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Validator {
            output_dir: output_dir.into(),
        }
    }

    pub fn system_path(&self) -> PathBuf {
        self.output_dir.join("test.txt")
    }

    pub fn reference_path(&self) -> PathBuf {
        self.output_dir.join("ref.txt")
    }

    /// Decode every validation batch once and aggregate the statistics. The
    /// corpus is reset afterwards.
    pub fn run<R, C>(
        &self,
        runner: &mut R,
        corpus: &mut C,
        iteration: usize,
        rng: &mut StdRng,
    ) -> Result<ValidationSummary, TrainingError>
    where
        R: EpisodeRunner + ?Sized,
        C: Corpus + ?Sized,
    {
        let mut collections = ValidationCollections::default();
        let mut batches = 0;
        while let Some(batch) = corpus.next() {
            if batch.is_empty() {
                continue;
            }
            let translation = runner.decode(&batch, DecodeRequest::greedy(), rng)?;
            collections.extend(translation)?;
            batches += 1;
            debug!(
                batch = batches,
                quality = mean(&collections.quality),
                delay = mean(&collections.delay),
                "validation running means"
            );
        }
        corpus.reset();

        fs::create_dir_all(&self.output_dir).map_err(|e| TrainingError::Output {
            path: self.output_dir.clone(),
            source: e,
        })?;
        write_lines(&self.system_path(), &collections.systems)?;
        write_lines(&self.reference_path(), &collections.references)?;

        Ok(collections.summarize(iteration))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::{Batch, TextCorpus};
    use crate::decode::{Action, Cursor, Episode, StepInfo};
    use crate::policy::{Policy, WaitKPolicy};
    use crate::stats::{sentence_bleu, Track};
    use rand::SeedableRng;
    use Action::{Commit, Finish, Wait};

    fn toks(s: &str) -> Vec<String> {
        s.split_whitespace().map(String::from).collect()
    }

    /// Replays fixed tracks and traces, one per sentence in corpus order.
    struct ScriptedRunner {
        script: Vec<(Track, Vec<Action>)>,
        next: usize,
        policy: WaitKPolicy,
    }

    impl ScriptedRunner {
        fn new(script: Vec<(Track, Vec<Action>)>) -> Self {
            ScriptedRunner {
                script,
                next: 0,
                policy: WaitKPolicy::new(1),
            }
        }
    }

    impl EpisodeRunner for ScriptedRunner {
        fn decode(
            &mut self,
            batch: &Batch,
            request: DecodeRequest,
            _rng: &mut StdRng,
        ) -> Result<Translation, DecodeError> {
            assert!(request.greedy);
            assert_eq!(request.samples, 1);
            let mut translation = Translation::default();
            for (sentence, (source, reference)) in batch.pairs().enumerate() {
                let (track, actions) = self.script[self.next].clone();
                self.next += 1;
                translation.episodes.push(Episode {
                    sentence,
                    sample: 0,
                    source: source.to_vec(),
                    reference: reference.to_vec(),
                    tokens: source.to_vec(),
                    cursors: vec![Cursor { source: 0, target: 0 }; actions.len()],
                    actions,
                    track,
                });
            }
            Ok(translation)
        }

        fn train(
            &mut self,
            _batch: &Batch,
            _rng: &mut StdRng,
        ) -> Result<(Translation, StepInfo), DecodeError> {
            unreachable!("validation never trains")
        }

        fn policy(&self) -> &dyn Policy {
            &self.policy
        }

        fn policy_mut(&mut self) -> &mut dyn Policy {
            &mut self.policy
        }
    }

    fn track(quality: f32, delay: f32) -> Track {
        Track {
            quality,
            delay,
            reward: quality - delay,
        }
    }

    fn corpus() -> TextCorpus {
        TextCorpus::from_pairs(
            vec![
                (toks("a b c"), toks("a b c")),
                (toks("d e"), toks("d x")),
                (toks("f g h i"), toks("f g h i")),
            ],
            2,
        )
        .unwrap()
    }

    #[test]
    fn test_summary_means_and_files() {
        let dir = tempfile::tempdir().unwrap();
        let validator = Validator::new(dir.path().join(".translate"));
        let mut runner = ScriptedRunner::new(vec![
            (track(0.8, 0.1), vec![Wait, Wait, Commit, Wait, Finish]),
            (track(0.6, 0.3), vec![Commit, Commit, Finish]),
            (track(1.0, 0.0), vec![Wait, Commit, Commit, Finish]),
        ]);
        let mut corpus = corpus();
        let mut rng = StdRng::seed_from_u64(0);

        let summary = validator.run(&mut runner, &mut corpus, 199, &mut rng).unwrap();
        assert_eq!(summary.iteration, 199);
        assert_eq!(summary.sentences, 3);
        assert!((summary.quality - 0.8).abs() < 1e-6);
        assert!((summary.delay - 0.4 / 3.0).abs() < 1e-6);
        // The no-wait episode does not contribute: runs [2, 1] and [1].
        assert!((summary.wait_mean - 1.25).abs() < 1e-6);
        assert!((summary.wait_max - 1.5).abs() < 1e-6);

        let system = fs::read_to_string(validator.system_path()).unwrap();
        let reference = fs::read_to_string(validator.reference_path()).unwrap();
        assert_eq!(system, "a b c\nd e\nf g h i\n");
        assert_eq!(reference, "a b c\nd x\nf g h i\n");
    }

    #[test]
    fn test_corpus_bleu_is_joint_not_mean() {
        let dir = tempfile::tempdir().unwrap();
        let validator = Validator::new(dir.path());
        let mut runner = ScriptedRunner::new(vec![
            (track(0.0, 0.0), vec![Commit, Finish]); 3
        ]);
        let mut corpus = corpus();
        let mut rng = StdRng::seed_from_u64(0);

        let summary = validator.run(&mut runner, &mut corpus, 0, &mut rng).unwrap();
        let refs = vec![toks("a b c"), toks("d x"), toks("f g h i")];
        let hyps = vec![toks("a b c"), toks("d e"), toks("f g h i")];
        assert!((summary.corpus_bleu - corpus_bleu(&refs, &hyps)).abs() < 1e-6);
        let mean_sentence = hyps
            .iter()
            .zip(&refs)
            .map(|(h, r)| sentence_bleu(r, h))
            .sum::<f32>()
            / 3.0;
        assert!((summary.corpus_bleu - mean_sentence).abs() > 1e-4);
    }

    #[test]
    fn test_corpus_is_reset_after_pass() {
        let dir = tempfile::tempdir().unwrap();
        let validator = Validator::new(dir.path());
        let mut runner = ScriptedRunner::new(vec![
            (track(0.5, 0.5), vec![Wait, Commit, Finish]);
            6
        ]);
        let mut corpus = corpus();
        let mut rng = StdRng::seed_from_u64(0);

        validator.run(&mut runner, &mut corpus, 0, &mut rng).unwrap();
        let second = validator.run(&mut runner, &mut corpus, 1, &mut rng).unwrap();
        assert_eq!(second.sentences, 3);
        assert_eq!(runner.next, 6);
    }

    #[test]
    fn test_empty_corpus_gives_zeros() {
        let dir = tempfile::tempdir().unwrap();
        let validator = Validator::new(dir.path());
        let mut runner = ScriptedRunner::new(Vec::new());
        let mut corpus = TextCorpus::from_pairs(Vec::new(), 4).unwrap();
        let mut rng = StdRng::seed_from_u64(0);

        let summary = validator.run(&mut runner, &mut corpus, 5, &mut rng).unwrap();
        assert_eq!(summary.sentences, 0);
        assert_eq!(summary.quality, 0.0);
        assert_eq!(summary.wait_mean, 0.0);
        assert_eq!(fs::read_to_string(validator.system_path()).unwrap(), "");
    }
}
