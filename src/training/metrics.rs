use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::decode::StepInfo;

/// Training metrics tracker with rolling window computations.
pub struct TrainingMetrics {
    steps: VecDeque<StepInfo>,
    capacity: usize,
    total_steps: usize, // lifetime count, never capped
}

impl TrainingMetrics {
    pub fn with_capacity(capacity: usize) -> Self {
        TrainingMetrics {
            steps: VecDeque::with_capacity(capacity),
            capacity,
            total_steps: 0,
        }
    }

    pub fn new() -> Self {
        Self::with_capacity(100)
    }

    pub fn record(&mut self, info: StepInfo) {
        self.total_steps += 1;
        self.steps.push_back(info);
        if self.steps.len() > self.capacity {
            self.steps.pop_front();
        }
    }

    fn average(&self, last_n: usize, field: impl Fn(&StepInfo) -> f32) -> f32 {
        let n = self.steps.len().min(last_n);
        if n == 0 {
            return 0.0;
        }
        let sum: f32 = self.steps.iter().rev().take(n).map(field).sum();
        sum / n as f32
    }

    pub fn average_reward(&self, last_n: usize) -> f32 {
        self.average(last_n, |s| s.reward)
    }

    pub fn average_quality(&self, last_n: usize) -> f32 {
        self.average(last_n, |s| s.quality)
    }

    pub fn average_delay(&self, last_n: usize) -> f32 {
        self.average(last_n, |s| s.delay)
    }

    pub fn average_policy_loss(&self, last_n: usize) -> f32 {
        self.average(last_n, |s| s.policy_loss)
    }

    /// Mean finetuning cost over the steps in the window that report one.
    pub fn average_finetune_cost(&self, last_n: usize) -> Option<f32> {
        let costs: Vec<f32> = self
            .steps
            .iter()
            .rev()
            .take(last_n)
            .filter_map(|s| s.finetune_cost)
            .collect();
        if costs.is_empty() {
            return None;
        }
        Some(costs.iter().sum::<f32>() / costs.len() as f32)
    }

    pub fn total_steps(&self) -> usize {
        self.total_steps
    }

    /// `R: .. - Q: .. - D: .. - P: ..[ - A: ..]` over the last `last_n` steps.
    pub fn summary_line(&self, last_n: usize) -> String {
        let mut line = format!(
            "R: {:.4} - Q: {:.4} - D: {:.4} - P: {:.4}",
            self.average_reward(last_n),
            self.average_quality(last_n),
            self.average_delay(last_n),
            self.average_policy_loss(last_n),
        );
        if let Some(cost) = self.average_finetune_cost(last_n) {
            line.push_str(&format!(" - A: {cost:.4}"));
        }
        line
    }
}

impl Default for TrainingMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Throughput tracker for the training loop.
pub struct TimingMetrics {
    step_micros: VecDeque<u32>, // per-step µs
    capacity: usize,
    window_start: Instant,
    window_sentences: usize,
    window_overhead_micros: u128, // validation/checkpoint time excluded from throughput
}

impl TimingMetrics {
    pub fn with_capacity(capacity: usize) -> Self {
        TimingMetrics {
            step_micros: VecDeque::with_capacity(capacity),
            capacity,
            window_start: Instant::now(),
            window_sentences: 0,
            window_overhead_micros: 0,
        }
    }

    pub fn new() -> Self {
        Self::with_capacity(100)
    }

    pub fn record_step(&mut self, sentences: usize, d: Duration) {
        self.step_micros.push_back(d.as_micros() as u32);
        if self.step_micros.len() > self.capacity {
            self.step_micros.pop_front();
        }
        self.window_sentences += sentences;
    }

    /// Record time spent in validation or checkpoint saving so it is excluded
    /// from the throughput window.
    pub fn record_overhead(&mut self, d: Duration) {
        self.window_overhead_micros += d.as_micros();
    }

    /// Mean of the last `last_n` step times in milliseconds.
    pub fn avg_step_ms(&self, last_n: usize) -> f32 {
        let n = self.step_micros.len().min(last_n);
        if n == 0 {
            return 0.0;
        }
        let mean = self
            .step_micros
            .iter()
            .rev()
            .take(n)
            .map(|&v| v as f64)
            .sum::<f64>()
            / n as f64;
        (mean / 1000.0) as f32
    }

    /// Sentences per second since the last `reset_window` call, excluding
    /// overhead.
    pub fn sentences_per_sec(&self) -> f32 {
        let total_micros = self.window_start.elapsed().as_micros();
        let net_micros = total_micros.saturating_sub(self.window_overhead_micros);
        if net_micros == 0 {
            return 0.0;
        }
        self.window_sentences as f32 / (net_micros as f32 / 1_000_000.0)
    }

    pub fn reset_window(&mut self) {
        self.window_start = Instant::now();
        self.window_sentences = 0;
        self.window_overhead_micros = 0;
    }
}

impl Default for TimingMetrics {
    fn default() -> Self {
        Self::new()
    }
}
