use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::episode::{Cursor, DecodeRequest, Episode, StepInfo, Translation};
use super::translator::{SourceView, Translator};
use super::Action;
use crate::corpus::Batch;
use crate::error::DecodeError;
use crate::policy::{Observation, Policy, Trajectory};
use crate::stats::{self, average_proportion, consecutive_waits, sentence_bleu, RewardConfig, Track};

/// Drives batches of sentences through WAIT/COMMIT/FINISH decisions.
pub trait EpisodeRunner {
    /// Translate without learning.
    fn decode(
        &mut self,
        batch: &Batch,
        request: DecodeRequest,
        rng: &mut StdRng,
    ) -> Result<Translation, DecodeError>;

    /// Sample episodes, update the policy, and summarise the step.
    fn train(&mut self, batch: &Batch, rng: &mut StdRng)
        -> Result<(Translation, StepInfo), DecodeError>;

    fn policy(&self) -> &dyn Policy;

    fn policy_mut(&mut self) -> &mut dyn Policy;
}

/// Decoder hyperparameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    /// Sampled episodes per sentence during training.
    pub samples: usize,
    /// Source tokens read before the first decision.
    pub initial_read: usize,
    /// Target length cap as a multiple of the source length.
    pub max_target_ratio: f32,
    pub finetune: bool,
    /// Training calls between translator finetuning updates.
    pub finetune_freq: usize,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        DecoderConfig {
            samples: 5,
            initial_read: 1,
            max_target_ratio: 2.0,
            finetune: false,
            finetune_freq: 5,
        }
    }
}

struct Rollout {
    episode: Episode,
    trajectory: Trajectory,
}

/// Episode runner pairing a [`Translator`] with a [`Policy`].
pub struct SimultaneousDecoder<T: Translator> {
    translator: T,
    policy: Box<dyn Policy>,
    config: DecoderConfig,
    reward: RewardConfig,
    train_calls: usize,
}

impl<T: Translator> SimultaneousDecoder<T> {
    pub fn new(
        translator: T,
        policy: Box<dyn Policy>,
        config: DecoderConfig,
        reward: RewardConfig,
    ) -> Self {
        SimultaneousDecoder {
            translator,
            policy,
            config,
            reward,
            train_calls: 0,
        }
    }

    pub fn translator(&self) -> &T {
        &self.translator
    }

    fn check_batch(batch: &Batch) -> Result<(), DecodeError> {
        if batch.sources.len() != batch.targets.len() {
            return Err(DecodeError::BatchMismatch {
                sources: batch.sources.len(),
                targets: batch.targets.len(),
            });
        }
        Ok(())
    }

    fn rollout(
        &mut self,
        sentence: usize,
        sample: usize,
        source: &[String],
        reference: &[String],
        greedy: bool,
        rng: &mut StdRng,
    ) -> Rollout {
        let len = source.len();
        let max_target = (len as f32 * self.config.max_target_ratio).ceil() as usize + 1;
        let mut read = self.config.initial_read.min(len);

        let mut tokens = Vec::new();
        let mut actions = Vec::new();
        let mut cursors = Vec::new();
        let mut reads_at_commit = Vec::new();
        let mut observations = Vec::new();
        let mut decisions = Vec::new();

        let mut state = self.translator.init(SourceView::new(&source[..read], read == len));
        loop {
            let cursor = Cursor {
                source: read.saturating_sub(1),
                target: tokens.len(),
            };
            cursors.push(cursor);
            if tokens.len() >= max_target {
                actions.push(Action::Finish);
                break;
            }

            let step = self
                .translator
                .step(SourceView::new(&source[..read], read == len), &state);
            let observation = Observation {
                read,
                written: tokens.len(),
                source_len: len,
                confidence: step.confidence,
            };
            let mut action = self.policy.act(&observation, greedy, rng);
            if action == Action::Wait && observation.source_exhausted() {
                action = Action::Commit;
            }
            observations.push(observation);
            decisions.push(action);

            match action {
                Action::Wait => {
                    read += 1;
                    actions.push(Action::Wait);
                }
                Action::Commit => match step.token {
                    Some(token) => {
                        tokens.push(token);
                        reads_at_commit.push(read);
                        state = step.state;
                        actions.push(Action::Commit);
                    }
                    None => {
                        actions.push(Action::Finish);
                        break;
                    }
                },
                Action::Finish => {
                    actions.push(Action::Finish);
                    break;
                }
            }
        }

        let quality = sentence_bleu(reference, &tokens);
        let delay = average_proportion(len, &reads_at_commit);
        let wait_mean = consecutive_waits(&actions).map(|r| r.mean()).unwrap_or(0.0);
        let reward = self.reward.score(quality, delay, wait_mean);
        trace!(sentence, sample, quality, delay, reward, "episode finished");

        Rollout {
            episode: Episode {
                sentence,
                sample,
                source: source.to_vec(),
                reference: reference.to_vec(),
                tokens,
                actions,
                cursors,
                track: Track {
                    quality,
                    delay,
                    reward,
                },
            },
            trajectory: Trajectory {
                observations,
                actions: decisions,
                advantage: 0.0,
            },
        }
    }

    fn finetune(&mut self, batch: &Batch) -> f32 {
        let mut costs = Vec::with_capacity(batch.len());
        for (source, target) in batch.pairs() {
            self.translator.update(source, target);
            costs.push(self.translator.cost(source, target));
        }
        stats::mean(&costs)
    }
}

impl<T: Translator> EpisodeRunner for SimultaneousDecoder<T> {
    fn decode(
        &mut self,
        batch: &Batch,
        request: DecodeRequest,
        rng: &mut StdRng,
    ) -> Result<Translation, DecodeError> {
        Self::check_batch(batch)?;
        let mut translation = Translation::default();
        for (sentence, (source, reference)) in batch.pairs().enumerate() {
            for sample in 0..request.samples {
                let rollout = self.rollout(sentence, sample, source, reference, request.greedy, rng);
                translation.episodes.push(rollout.episode);
            }
        }
        Ok(translation)
    }

    fn train(
        &mut self,
        batch: &Batch,
        rng: &mut StdRng,
    ) -> Result<(Translation, StepInfo), DecodeError> {
        Self::check_batch(batch)?;
        let samples = self.config.samples.max(1);
        let mut translation = Translation::default();
        let mut trajectories = Vec::with_capacity(batch.len() * samples);

        for (sentence, (source, reference)) in batch.pairs().enumerate() {
            let rollouts: Vec<Rollout> = (0..samples)
                .map(|sample| self.rollout(sentence, sample, source, reference, false, rng))
                .collect();
            // Baseline: mean reward over this sentence's samples.
            let rewards: Vec<f32> = rollouts.iter().map(|r| r.episode.track.reward).collect();
            let baseline = stats::mean(&rewards);
            for mut rollout in rollouts {
                rollout.trajectory.advantage = rollout.episode.track.reward - baseline;
                trajectories.push(rollout.trajectory);
                translation.episodes.push(rollout.episode);
            }
        }

        let policy_loss = self.policy.update(&trajectories);

        self.train_calls += 1;
        let finetune_cost = if self.config.finetune
            && self.train_calls % self.config.finetune_freq.max(1) == 0
        {
            let cost = self.finetune(batch);
            debug!(cost, "finetuned translator");
            Some(cost)
        } else {
            None
        };

        let tracks: Vec<Track> = translation.tracks().collect();
        let info = StepInfo {
            reward: stats::mean(&tracks.iter().map(|t| t.reward).collect::<Vec<_>>()),
            quality: stats::mean(&tracks.iter().map(|t| t.quality).collect::<Vec<_>>()),
            delay: stats::mean(&tracks.iter().map(|t| t.delay).collect::<Vec<_>>()),
            policy_loss,
            finetune_cost,
        };
        Ok((translation, info))
    }

    fn policy(&self) -> &dyn Policy {
        self.policy.as_ref()
    }

    fn policy_mut(&mut self) -> &mut dyn Policy {
        self.policy.as_mut()
    }
}
