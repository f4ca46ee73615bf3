use burn::backend::{Autodiff, NdArray};
use burn::module::{AutodiffModule, Param};
use burn::nn::Linear;
use burn::optim::adaptor::OptimizerAdaptor;
use burn::optim::{Adam, AdamConfig, GradientsParams, Optimizer};
use burn::prelude::*;
use burn::tensor::TensorData;
use rand::rngs::StdRng;
use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use super::agent::{Observation, Policy, Trajectory};
use super::PolicyConfig;
use crate::decode::Action;
use crate::error::PolicyError;

type InferBackend = NdArray<f32>;
type TrainBackend = Autodiff<InferBackend>;

const NUM_FEATURES: usize = 5;
const NUM_ACTIONS: usize = 3;

/// One linear layer from observation features to action logits.
#[derive(Module, Debug)]
pub struct PolicyNetwork<B: Backend> {
    head: Linear<B>,
}

impl<B: Backend> PolicyNetwork<B> {
    /// `weights` is row-major `[NUM_FEATURES, NUM_ACTIONS]`.
    fn from_values(weights: Vec<f32>, bias: Vec<f32>, device: &B::Device) -> Self {
        let weight = Tensor::<B, 2>::from_data(
            TensorData::new(weights, [NUM_FEATURES, NUM_ACTIONS]),
            device,
        );
        let bias = Tensor::<B, 1>::from_data(TensorData::new(bias, [NUM_ACTIONS]), device);
        PolicyNetwork {
            head: Linear {
                weight: Param::from_tensor(weight),
                bias: Some(Param::from_tensor(bias)),
            },
        }
    }

    /// Input `[batch, NUM_FEATURES]` -> logits `[batch, NUM_ACTIONS]`.
    pub fn forward(&self, input: Tensor<B, 2>) -> Tensor<B, 2> {
        self.head.forward(input)
    }

    fn weight_values(&self) -> Vec<f32> {
        values(self.head.weight.val())
    }

    fn bias_values(&self) -> Vec<f32> {
        self.head
            .bias
            .as_ref()
            .map(|b| values(b.val()))
            .unwrap_or_else(|| vec![0.0; NUM_ACTIONS])
    }
}

fn values<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Vec<f32> {
    tensor.into_data().iter::<f32>().collect()
}

/// Learnable state written to `policy.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearPolicyState {
    pub weights: Vec<f32>,
    pub bias: Vec<f32>,
    pub learning_rate: f32,
    pub updates: usize,
}

/// Softmax policy over a linear function of hand-built features, trained
/// with REINFORCE.
pub struct LinearPolicy {
    network: PolicyNetwork<TrainBackend>,
    optimizer: OptimizerAdaptor<Adam, PolicyNetwork<TrainBackend>, TrainBackend>,
    device: <TrainBackend as Backend>::Device,
    learning_rate: f32,
    updates: usize,
}

impl LinearPolicy {
    pub fn new(config: &PolicyConfig, rng: &mut StdRng) -> Result<Self, PolicyError> {
        if !(config.init_std >= 0.0 && config.init_std.is_finite()) {
            return Err(PolicyError::Config(format!(
                "policy.init_std must be finite and >= 0, got {}",
                config.init_std
            )));
        }
        let normal = Normal::new(0.0f32, config.init_std)
            .map_err(|e| PolicyError::Config(format!("policy.init_std: {e}")))?;
        let weights: Vec<f32> = (0..NUM_FEATURES * NUM_ACTIONS)
            .map(|_| normal.sample(rng))
            .collect();
        let mut bias = vec![0.0f32; NUM_ACTIONS];
        bias[Action::Finish.code()] = config.finish_bias;

        let device = Default::default();
        Ok(LinearPolicy {
            network: PolicyNetwork::from_values(weights, bias, &device),
            optimizer: AdamConfig::new().init(),
            device,
            learning_rate: config.learning_rate,
            updates: 0,
        })
    }

    pub fn updates(&self) -> usize {
        self.updates
    }

    /// Action probabilities with illegal actions masked to zero.
    pub fn probabilities(&self, observation: &Observation) -> [f32; NUM_ACTIONS] {
        let input = Tensor::<InferBackend, 2>::from_data(
            TensorData::new(features(observation).to_vec(), [1, NUM_FEATURES]),
            &self.device,
        );
        let logits = values(self.network.valid().forward(input));
        masked_softmax(&logits, observation.legal_actions())
    }
}

fn features(observation: &Observation) -> [f32; NUM_FEATURES] {
    let len = observation.source_len.max(1) as f32;
    let read = observation.read as f32;
    let written = observation.written as f32;
    [
        read / len,
        written / len,
        (read - written) / len,
        observation.confidence,
        if observation.source_exhausted() { 1.0 } else { 0.0 },
    ]
}

fn masked_softmax(logits: &[f32], legal: &[Action]) -> [f32; NUM_ACTIONS] {
    let max_val = legal
        .iter()
        .map(|a| logits[a.code()])
        .fold(f32::NEG_INFINITY, f32::max);

    let mut probs = [0.0f32; NUM_ACTIONS];
    let mut sum = 0.0;
    for action in legal {
        let v = (logits[action.code()] - max_val).exp();
        probs[action.code()] = v;
        sum += v;
    }
    for p in &mut probs {
        *p /= sum;
    }
    probs
}

/// Sample an action from a categorical distribution defined by probs.
fn sample_categorical(probs: &[f32; NUM_ACTIONS], rng: &mut StdRng) -> Action {
    let r: f32 = rng.random_range(0.0..1.0);
    let mut cumulative = 0.0;
    for (i, &p) in probs.iter().enumerate() {
        cumulative += p;
        if r < cumulative {
            return Action::ALL[i];
        }
    }
    // Rounding left r above the last bucket.
    let last = probs.iter().rposition(|&p| p > 0.0).unwrap_or(0);
    Action::ALL[last]
}

impl Policy for LinearPolicy {
    fn name(&self) -> &str {
        "Linear"
    }

    fn act(&mut self, observation: &Observation, greedy: bool, rng: &mut StdRng) -> Action {
        let probs = self.probabilities(observation);
        if !greedy {
            return sample_categorical(&probs, rng);
        }

        let legal = observation.legal_actions();
        let mut best = legal[0];
        for &action in legal {
            if probs[action.code()] > probs[best.code()] {
                best = action;
            }
        }
        best
    }

    /// One optimizer step on `-sum(advantage * log pi(a|s)) / trajectories`.
    fn update(&mut self, trajectories: &[Trajectory]) -> f32 {
        let n: usize = trajectories.iter().map(|t| t.actions.len()).sum();
        if n == 0 {
            return 0.0;
        }

        let mut feature_data = Vec::with_capacity(n * NUM_FEATURES);
        let mut legal_mask_data = vec![-1e9f32; n * NUM_ACTIONS];
        let mut action_mask_data = vec![0.0f32; n * NUM_ACTIONS];
        let mut advantage_data = Vec::with_capacity(n);
        let steps = trajectories.iter().flat_map(|t| {
            t.observations
                .iter()
                .zip(&t.actions)
                .map(move |(o, a)| (o, a, t.advantage))
        });
        for (i, (observation, action, advantage)) in steps.enumerate() {
            feature_data.extend_from_slice(&features(observation));
            for legal in observation.legal_actions() {
                legal_mask_data[i * NUM_ACTIONS + legal.code()] = 0.0;
            }
            action_mask_data[i * NUM_ACTIONS + action.code()] = 1.0;
            advantage_data.push(advantage);
        }

        let input = Tensor::<TrainBackend, 2>::from_data(
            TensorData::new(feature_data, [n, NUM_FEATURES]),
            &self.device,
        );
        let legal_mask = Tensor::<TrainBackend, 2>::from_data(
            TensorData::new(legal_mask_data, [n, NUM_ACTIONS]),
            &self.device,
        );
        let action_mask = Tensor::<TrainBackend, 2>::from_data(
            TensorData::new(action_mask_data, [n, NUM_ACTIONS]),
            &self.device,
        );
        let advantages =
            Tensor::<TrainBackend, 1>::from_data(TensorData::new(advantage_data, [n]), &self.device);

        let logits = self.network.forward(input) + legal_mask;
        let log_probs = burn::tensor::activation::log_softmax(logits, 1);
        let selected = (log_probs * action_mask).sum_dim(1).reshape([n]);
        let loss = -(selected * advantages).sum() / trajectories.len() as f32;

        let loss_value = values(loss.clone()).first().copied().unwrap_or(0.0);

        let grads = loss.backward();
        let grads = GradientsParams::from_grads(grads, &self.network);
        self.network = self.optimizer.step(
            self.learning_rate as f64,
            self.network.clone(),
            grads,
        );
        self.updates += 1;

        loss_value
    }

    fn training_state_json(&self) -> Result<String, PolicyError> {
        let state = LinearPolicyState {
            weights: self.network.weight_values(),
            bias: self.network.bias_values(),
            learning_rate: self.learning_rate,
            updates: self.updates,
        };
        Ok(serde_json::to_string_pretty(&state)?)
    }

    fn restore_training_state_json(&mut self, json: &str) -> Result<(), PolicyError> {
        let state: LinearPolicyState = serde_json::from_str(json)?;
        if state.weights.len() != NUM_FEATURES * NUM_ACTIONS || state.bias.len() != NUM_ACTIONS {
            return Err(PolicyError::Mismatch(format!(
                "expected {} weights and {} biases, found {} and {}",
                NUM_FEATURES * NUM_ACTIONS,
                NUM_ACTIONS,
                state.weights.len(),
                state.bias.len()
            )));
        }
        self.network = PolicyNetwork::from_values(state.weights, state.bias, &self.device);
        // Moment estimates belonged to the replaced parameters.
        self.optimizer = AdamConfig::new().init();
        self.learning_rate = state.learning_rate;
        self.updates = state.updates;
        Ok(())
    }
}
