//! Annealed exploration.
//!
//! At global step `s` of a budget of `max` steps the schedule threshold is
//!
//! ```text
//! threshold(s) = (s + (1 - rate) * max) / max
//! ```
//!
//! which rises linearly from `1 - rate` to 1. A choice is replaced by a random
//! one when a uniform draw exceeds the threshold, or when a second draw falls
//! below `epsilon`. Action and position are checked with separate draws.

use fastrand::Rng;

#[derive(Debug, Clone)]
pub struct ExplorationSchedule {
    rate: f64,
    epsilon: f64,
    max_steps: u64,
    rng: Rng,
}

impl ExplorationSchedule {
    pub fn new(rate: f64, epsilon: f64, max_steps: u64, seed: u64) -> Self {
        Self {
            rate,
            epsilon,
            max_steps,
            rng: Rng::with_seed(seed),
        }
    }

    /// Schedule threshold at `step`.
    pub fn threshold(&self, step: u64) -> f64 {
        if self.max_steps == 0 {
            return 1.0;
        }
        let max = self.max_steps as f64;
        (step as f64 + (1.0 - self.rate) * max) / max
    }

    /// Whether to replace the greedy choice at `step`.
    pub fn explore(&mut self, step: u64) -> bool {
        let draw = self.rng.f64();
        let floor_draw = self.rng.f64();
        draw > self.threshold(step) || floor_draw < self.epsilon
    }

    /// Uniform index in `0..n`. `n` must be positive.
    pub fn pick(&mut self, n: usize) -> usize {
        self.rng.usize(..n)
    }
}
