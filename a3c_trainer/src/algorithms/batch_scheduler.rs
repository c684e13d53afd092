//! Chunked estimator updates.
//!
//! An episode can be arbitrarily long, so its targets are fed to the
//! estimator in `n_batches` contiguous chunks. Chunk sizes differ by at most
//! one; the leading chunks take the extra rows. With fewer rows than chunks
//! the trailing chunks are empty and are skipped.

use std::ops::Range;

use super::returns::UpdateTargets;
use super::UpdateError;
use crate::estimator::Estimator;

/// Split `len` rows into `n` contiguous ranges covering every row once.
///
/// `n == 0` is treated as a single chunk.
pub fn split_ranges(len: usize, n: usize) -> Vec<Range<usize>> {
    let n = n.max(1);
    let base = len / n;
    let extra = len % n;

    let mut ranges = Vec::with_capacity(n);
    let mut start = 0;
    for i in 0..n {
        let size = base + usize::from(i < extra);
        ranges.push(start..start + size);
        start += size;
    }
    ranges
}

/// Result of one episode update.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct UpdateReport {
    /// Undiscounted episode reward.
    pub total_reward: f32,
    /// Mean policy loss over the non-empty chunks.
    pub policy_loss: f32,
    /// Mean value loss over the non-empty chunks.
    pub value_loss: f32,
    pub learning_rate: f64,
    pub n_samples: usize,
    /// Training calls issued.
    pub n_chunks: usize,
}

/// Drives the training calls of one update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchScheduler {
    n_batches: usize,
}

impl BatchScheduler {
    pub fn new(n_batches: usize) -> Self {
        Self {
            n_batches: n_batches.max(1),
        }
    }

    pub fn n_batches(&self) -> usize {
        self.n_batches
    }

    /// Issue one training call per non-empty chunk.
    ///
    /// The first failing call aborts the update; chunks already applied stay
    /// applied and nothing is retried.
    pub fn run<E: Estimator + ?Sized>(
        &self,
        estimator: &E,
        targets: &UpdateTargets,
        learning_rate: f64,
    ) -> Result<UpdateReport, UpdateError> {
        let mut policy = 0.0f32;
        let mut value = 0.0f32;
        let mut n_chunks = 0usize;

        for range in split_ranges(targets.len(), self.n_batches) {
            if range.is_empty() {
                continue;
            }
            let losses = estimator.train_step(&targets.batch(range), learning_rate)?;
            policy += losses.policy_loss;
            value += losses.value_loss;
            n_chunks += 1;
        }

        let (policy_loss, value_loss) = if n_chunks == 0 {
            (0.0, 0.0)
        } else {
            (policy / n_chunks as f32, value / n_chunks as f32)
        };

        Ok(UpdateReport {
            total_reward: targets.total_reward,
            policy_loss,
            value_loss,
            learning_rate,
            n_samples: targets.len(),
            n_chunks,
        })
    }
}

impl Default for BatchScheduler {
    fn default() -> Self {
        Self::new(20)
    }
}
