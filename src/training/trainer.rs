use std::path::PathBuf;
use std::time::Instant;

use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::checkpoint::{CheckpointManager, HistoryEntry, TrainingState};
use crate::corpus::{merge_bpe, Batch, Corpus};
use crate::decode::{format_trace, Episode, EpisodeRunner, Translation};
use crate::error::TrainingError;
use crate::training::metrics::{TimingMetrics, TrainingMetrics};
use crate::training::monitor::{LogWindow, RemoteDisplay};
use crate::training::validation::{ValidationSummary, Validator};

/// Trainer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerConfig {
    pub workspace: PathBuf,
    pub seed: u64,
    pub save_freq: usize,
    pub sample_freq: usize,
    pub valid_freq: usize,
    pub display_freq: usize,
    pub log_interval: usize,
    /// Training pairs with a source of at most this many tokens are skipped.
    pub min_source_len: usize,
    /// Validate once and stop, to measure the translator's upper bound.
    pub upper: bool,
    /// Push windowed averages to `<workspace>/.log/<run_id>.jsonl`.
    pub remote: bool,
    pub max_iterations: Option<usize>,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        TrainerConfig {
            workspace: PathBuf::from("."),
            seed: 19920206,
            save_freq: 200,
            sample_freq: 10,
            valid_freq: 200,
            display_freq: 50,
            log_interval: 10,
            min_source_len: 1,
            upper: false,
            remote: false,
            max_iterations: None,
        }
    }
}

/// How a call to [`Trainer::train`] ended.
#[derive(Debug, Clone, PartialEq)]
pub enum TrainOutcome {
    /// The corpus was exhausted or the iteration limit reached.
    Completed { iterations: usize },
    /// Validation ran once in upper-bound mode; no training happened.
    UpperBoundProbe { summary: ValidationSummary },
}

/// Iterates over the training corpus, updating the policy batch by batch.
pub struct Trainer {
    config: TrainerConfig,
    run_id: String,
    checkpoints: CheckpointManager,
    validator: Validator,
    samples: usize,
    monitor: Option<Box<dyn RemoteDisplay>>,
}

impl Trainer {
    /// `samples` is the number of episodes the runner produces per sentence.
    pub fn new(
        config: TrainerConfig,
        run_id: impl Into<String>,
        checkpoints: CheckpointManager,
        validator: Validator,
        samples: usize,
    ) -> Self {
        Trainer {
            config,
            run_id: run_id.into(),
            checkpoints,
            validator,
            samples,
            monitor: None,
        }
    }

    pub fn with_monitor(mut self, monitor: Box<dyn RemoteDisplay>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Run the training loop, resuming from the latest checkpoint if any.
    pub fn train<R, C, V>(
        &mut self,
        runner: &mut R,
        train: &mut C,
        valid: &mut V,
        rng: &mut StdRng,
    ) -> Result<TrainOutcome, TrainingError>
    where
        R: EpisodeRunner,
        C: Corpus,
        V: Corpus,
    {
        let mut state = self.checkpoints.load_or_fresh(runner.policy_mut());
        let last_it = state.iteration;
        let total = train.num().div_ceil(train.batch_size().max(1));

        let mut metrics = TrainingMetrics::with_capacity(self.config.log_interval.max(100));
        let mut timing = TimingMetrics::new();
        let mut window = LogWindow::new();
        let mut steps = 0;

        info!(
            run_id = %self.run_id,
            policy = runner.policy().name(),
            batches = total,
            resume_from = last_it,
            "starting training"
        );

        for (it, batch) in train.by_ref().enumerate() {
            if self.config.max_iterations.is_some_and(|max| it >= max) {
                break;
            }
            if it < last_it {
                continue;
            }

            let mut validation = None;
            if it % self.config.valid_freq == self.config.valid_freq - 1 {
                let summary = self.validate(runner, valid, it, rng, &mut timing)?;
                state
                    .history
                    .push(HistoryEntry::Validation(summary.clone()));
                validation = Some(summary);
            }

            if self.config.upper {
                let summary = match validation {
                    Some(summary) => summary,
                    None => self.validate(runner, valid, it, rng, &mut timing)?,
                };
                info!(run_id = %self.run_id, "upper-bound probe finished");
                return Ok(TrainOutcome::UpperBoundProbe { summary });
            }

            let batch = batch.filter_min_source_len(self.config.min_source_len);
            if batch.is_empty() {
                debug!(it, "skipping batch with no usable sentence");
                continue;
            }

            let started = Instant::now();
            let (translation, step) = runner.train(&batch, rng)?;
            timing.record_step(batch.len(), started.elapsed());
            steps += 1;

            if it % self.config.sample_freq == 0 {
                self.log_sample(&batch, &translation);
            }

            metrics.record(step);
            if steps % self.config.log_interval == 0 {
                info!(
                    "{}/{} - {} - {:.1} sent/s ({:.1} ms/step)",
                    it + 1,
                    total,
                    metrics.summary_line(self.config.log_interval),
                    timing.sentences_per_sec(),
                    timing.avg_step_ms(self.config.log_interval),
                );
                timing.reset_window();
            }

            if let Some(field) = step.first_non_finite() {
                error!(it, field, run_id = %self.run_id, "training diverged");
                return Err(TrainingError::Divergence {
                    field: field.to_string(),
                    run_id: self.run_id.clone(),
                });
            }

            if let Some(monitor) = self.monitor.as_mut() {
                window.accumulate(&step);
                if it % self.config.display_freq == self.config.display_freq - 1 {
                    let averages = window.drain_average(self.config.display_freq);
                    monitor
                        .display(it + 1, &averages)
                        .map_err(TrainingError::Monitor)?;
                }
            }

            state.history.push(HistoryEntry::Step {
                iteration: it,
                info: step,
            });
            if it % self.config.save_freq == 0 {
                state.iteration = it;
                self.save(&state, runner, &mut timing)?;
            }
        }

        info!(
            run_id = %self.run_id,
            steps,
            total_steps = metrics.total_steps(),
            "training complete"
        );
        Ok(TrainOutcome::Completed { iterations: steps })
    }

    fn validate<R: EpisodeRunner, V: Corpus>(
        &self,
        runner: &mut R,
        valid: &mut V,
        it: usize,
        rng: &mut StdRng,
        timing: &mut TimingMetrics,
    ) -> Result<ValidationSummary, TrainingError> {
        let started = Instant::now();
        let summary = self.validator.run(runner, valid, it, rng)?;
        summary.log();
        timing.record_overhead(started.elapsed());
        Ok(summary)
    }

    fn save<R: EpisodeRunner>(
        &self,
        state: &TrainingState,
        runner: &R,
        timing: &mut TimingMetrics,
    ) -> Result<(), TrainingError> {
        let started = Instant::now();
        self.checkpoints.save(state, runner.policy())?;
        timing.record_overhead(started.elapsed());
        Ok(())
    }

    /// Among episodes of the first sentence, the one after the first
    /// `ceil(samples / 2)`.
    fn sample_to_log<'a>(&self, translation: &'a Translation) -> Option<&'a Episode> {
        translation
            .episodes
            .iter()
            .filter(|e| e.cursors.first().is_some_and(|c| c.source == 0))
            .nth(self.samples.div_ceil(2))
    }

    /// Log the first sentence of the batch and one of its sampled episodes.
    fn log_sample(&self, batch: &Batch, translation: &Translation) {
        let Some((source, reference)) = batch.pairs().next() else {
            return;
        };
        info!("Source: {}", merge_bpe(source));
        info!("Target: {}", merge_bpe(reference));

        if let Some(episode) = self.sample_to_log(translation) {
            info!(
                "[{}] Sample {}: {}",
                self.run_id,
                episode.sample,
                merge_bpe(&episode.tokens)
            );
            info!(
                "[{}] Actions: {} | Q = {:.4}, D = {:.4}, R = {:.4}",
                self.run_id,
                format_trace(&episode.actions),
                episode.track.quality,
                episode.track.delay,
                episode.track.reward
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::CheckpointManagerConfig;
    use crate::config::Workspace;
    use crate::corpus::TextCorpus;
    use crate::decode::{
        CopyTranslator, DecodeRequest, DecoderConfig, SimultaneousDecoder, StepInfo,
    };
    use crate::error::DecodeError;
    use crate::policy::{Policy, WaitKPolicy};
    use crate::stats::RewardConfig;
    use rand::SeedableRng;
    use std::cell::RefCell;
    use std::collections::BTreeMap;
    use std::io;
    use std::path::Path;
    use std::rc::Rc;

    fn toks(s: &str) -> Vec<String> {
        s.split_whitespace().map(String::from).collect()
    }

    /// Wait-k over the copy model, counting calls and optionally corrupting
    /// the step summary.
    struct CountingRunner {
        inner: SimultaneousDecoder<CopyTranslator>,
        train_calls: usize,
        decode_calls: usize,
        nan_quality: bool,
    }

    impl CountingRunner {
        fn new() -> Self {
            CountingRunner {
                inner: SimultaneousDecoder::new(
                    CopyTranslator::new(),
                    Box::new(WaitKPolicy::new(2)),
                    DecoderConfig {
                        samples: 2,
                        ..Default::default()
                    },
                    RewardConfig::default(),
                ),
                train_calls: 0,
                decode_calls: 0,
                nan_quality: false,
            }
        }
    }

    impl EpisodeRunner for CountingRunner {
        fn decode(
            &mut self,
            batch: &Batch,
            request: DecodeRequest,
            rng: &mut StdRng,
        ) -> Result<Translation, DecodeError> {
            self.decode_calls += 1;
            self.inner.decode(batch, request, rng)
        }

        fn train(
            &mut self,
            batch: &Batch,
            rng: &mut StdRng,
        ) -> Result<(Translation, StepInfo), DecodeError> {
            self.train_calls += 1;
            let (translation, mut info) = self.inner.train(batch, rng)?;
            if self.nan_quality {
                info.quality = f32::NAN;
            }
            Ok((translation, info))
        }

        fn policy(&self) -> &dyn Policy {
            self.inner.policy()
        }

        fn policy_mut(&mut self) -> &mut dyn Policy {
            self.inner.policy_mut()
        }
    }

    #[derive(Clone, Default)]
    struct Recorder(Rc<RefCell<Vec<(usize, BTreeMap<&'static str, f32>)>>>);

    impl RemoteDisplay for Recorder {
        fn display(
            &mut self,
            iteration: usize,
            averages: &BTreeMap<&'static str, f32>,
        ) -> io::Result<()> {
            self.0.borrow_mut().push((iteration, averages.clone()));
            Ok(())
        }
    }

    fn corpus(lines: &[&str]) -> TextCorpus {
        let pairs = lines.iter().map(|l| (toks(l), toks(l))).collect();
        TextCorpus::from_pairs(pairs, 1).unwrap()
    }

    fn config() -> TrainerConfig {
        TrainerConfig {
            save_freq: 1000,
            sample_freq: 1,
            valid_freq: 1000,
            display_freq: 1000,
            log_interval: 1,
            ..Default::default()
        }
    }

    fn trainer(root: &Path, config: TrainerConfig) -> Trainer {
        let ws = Workspace::new(root);
        let checkpoints =
            CheckpointManager::new(&ws, "run-test", CheckpointManagerConfig::default());
        Trainer::new(config, "run-test", checkpoints, Validator::new(ws.translate_dir()), 2)
    }

    #[test]
    fn test_degenerate_batches_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let mut trainer = trainer(
            dir.path(),
            TrainerConfig {
                save_freq: 1,
                ..config()
            },
        );
        let mut runner = CountingRunner::new();
        let mut train = corpus(&["a", "b", "c"]);
        let mut valid = corpus(&["a b"]);
        let mut rng = StdRng::seed_from_u64(0);

        let outcome = trainer.train(&mut runner, &mut train, &mut valid, &mut rng).unwrap();
        assert_eq!(outcome, TrainOutcome::Completed { iterations: 0 });
        assert_eq!(runner.train_calls, 0);
        assert!(trainer.checkpoints.list_checkpoints().unwrap().is_empty());
        assert!(trainer.checkpoints.load().unwrap().is_none());
    }

    #[test]
    fn test_sample_pick_rounds_half_up() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::new(dir.path());
        let checkpoints =
            CheckpointManager::new(&ws, "run-test", CheckpointManagerConfig::default());
        let trainer = Trainer::new(
            config(),
            "run-test",
            checkpoints,
            Validator::new(ws.translate_dir()),
            5,
        );
        let mut decoder = SimultaneousDecoder::new(
            CopyTranslator::new(),
            Box::new(WaitKPolicy::new(2)),
            DecoderConfig::default(),
            RewardConfig::default(),
        );
        let batch = Batch::new(vec![toks("a b c")], vec![toks("a b c")]);
        let mut rng = StdRng::seed_from_u64(0);
        let request = DecodeRequest {
            samples: 5,
            greedy: false,
        };
        let translation = decoder.decode(&batch, request, &mut rng).unwrap();

        let picked = trainer.sample_to_log(&translation).unwrap();
        assert_eq!(picked.sample, 3);
    }

    #[test]
    fn test_divergence_aborts_before_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let mut trainer = trainer(
            dir.path(),
            TrainerConfig {
                save_freq: 1,
                ..config()
            },
        );
        let mut runner = CountingRunner::new();
        runner.nan_quality = true;
        let mut train = corpus(&["a b c", "d e f"]);
        let mut valid = corpus(&["a b"]);
        let mut rng = StdRng::seed_from_u64(0);

        let err = trainer
            .train(&mut runner, &mut train, &mut valid, &mut rng)
            .unwrap_err();
        match err {
            TrainingError::Divergence { field, run_id } => {
                assert_eq!(field, "Q");
                assert_eq!(run_id, "run-test");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(runner.train_calls, 1);
        assert!(trainer.checkpoints.list_checkpoints().unwrap().is_empty());
    }

    #[test]
    fn test_resume_skips_saved_iterations() {
        let dir = tempfile::tempdir().unwrap();
        let lines = ["a b", "c d", "e f", "g h", "i j"];
        let cfg = TrainerConfig {
            save_freq: 2,
            ..config()
        };
        let mut valid = corpus(&["a b"]);
        let mut rng = StdRng::seed_from_u64(0);

        let mut first = trainer(dir.path(), cfg.clone());
        let mut runner = CountingRunner::new();
        first
            .train(&mut runner, &mut corpus(&lines), &mut valid, &mut rng)
            .unwrap();
        assert_eq!(runner.train_calls, 5);
        let saved = first.checkpoints.load().unwrap().unwrap();
        assert_eq!(saved.state.iteration, 4);

        let mut second = trainer(dir.path(), cfg);
        let mut runner = CountingRunner::new();
        let outcome = second
            .train(&mut runner, &mut corpus(&lines), &mut valid, &mut rng)
            .unwrap();
        assert_eq!(outcome, TrainOutcome::Completed { iterations: 1 });
        assert_eq!(runner.train_calls, 1);
    }

    #[test]
    fn test_max_iterations_stops_loop() {
        let dir = tempfile::tempdir().unwrap();
        let mut trainer = trainer(
            dir.path(),
            TrainerConfig {
                max_iterations: Some(2),
                ..config()
            },
        );
        let mut runner = CountingRunner::new();
        let mut train = corpus(&["a b", "c d", "e f", "g h"]);
        let mut valid = corpus(&["a b"]);
        let mut rng = StdRng::seed_from_u64(0);

        let outcome = trainer.train(&mut runner, &mut train, &mut valid, &mut rng).unwrap();
        assert_eq!(outcome, TrainOutcome::Completed { iterations: 2 });
    }

    #[test]
    fn test_upper_bound_probe_validates_and_stops() {
        let dir = tempfile::tempdir().unwrap();
        let mut trainer = trainer(
            dir.path(),
            TrainerConfig {
                upper: true,
                ..config()
            },
        );
        let mut runner = CountingRunner::new();
        let mut train = corpus(&["a b", "c d"]);
        let mut valid = corpus(&["a b c", "d e"]);
        let mut rng = StdRng::seed_from_u64(0);

        let outcome = trainer.train(&mut runner, &mut train, &mut valid, &mut rng).unwrap();
        match outcome {
            TrainOutcome::UpperBoundProbe { summary } => {
                assert_eq!(summary.iteration, 0);
                assert_eq!(summary.sentences, 2);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(runner.train_calls, 0);
        assert!(runner.decode_calls > 0);
    }

    #[test]
    fn test_periodic_validation_recorded_in_history() {
        let dir = tempfile::tempdir().unwrap();
        let mut trainer = trainer(
            dir.path(),
            TrainerConfig {
                valid_freq: 2,
                save_freq: 3,
                ..config()
            },
        );
        let mut runner = CountingRunner::new();
        let mut train = corpus(&["a b", "c d", "e f", "g h"]);
        let mut valid = corpus(&["a b c"]);
        let mut rng = StdRng::seed_from_u64(0);

        trainer.train(&mut runner, &mut train, &mut valid, &mut rng).unwrap();

        // Saved at iteration 3, after validations at 1 and 3.
        let saved = trainer.checkpoints.load().unwrap().unwrap();
        let validated: Vec<usize> = saved
            .state
            .history
            .iter()
            .filter_map(|e| match e {
                HistoryEntry::Validation(s) => Some(s.iteration),
                HistoryEntry::Step { .. } => None,
            })
            .collect();
        assert_eq!(validated, vec![1, 3]);
        assert_eq!(saved.metadata.validation.map(|v| v.iteration), Some(3));
        assert!(dir.path().join(".translate").join("test.txt").exists());
    }

    #[test]
    fn test_remote_display_pushes_window_averages() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = Recorder::default();
        let mut trainer = trainer(
            dir.path(),
            TrainerConfig {
                display_freq: 2,
                ..config()
            },
        )
        .with_monitor(Box::new(recorder.clone()));
        let mut runner = CountingRunner::new();
        let mut train = corpus(&["a b", "c d", "e f", "g h", "i j"]);
        let mut valid = corpus(&["a b"]);
        let mut rng = StdRng::seed_from_u64(0);

        trainer.train(&mut runner, &mut train, &mut valid, &mut rng).unwrap();

        let pushes = recorder.0.borrow();
        let iterations: Vec<usize> = pushes.iter().map(|(it, _)| *it).collect();
        assert_eq!(iterations, vec![2, 4]);
        for (_, averages) in pushes.iter() {
            assert!(averages.contains_key("R"));
            assert!(averages.contains_key("Q"));
            assert!(!averages.contains_key("A"));
        }
    }
}
