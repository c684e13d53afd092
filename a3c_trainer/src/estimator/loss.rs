//! Actor-critic loss on plain slices.
//!
//! The burn network computes the same quantities on tensors, and its tests
//! check its reported losses against [`batch_losses`]. Lightweight
//! estimators can use these helpers directly.
//!
//! ```text
//! p_action  = sum(pi * onehot_a) / clamp(sum(pi * legal), 1e-10, 1)
//! log_prob  = log clamp(p_action) + has_spatial * log clamp(sum(pi_xy * onehot_xy))
//! advantage = R - V(s)                    (constant)
//! policy    = -mean(log_prob * advantage)
//! value     = -mean(V(s) * advantage)
//! ```

use serde::{Deserialize, Serialize};

use super::{EstimatorError, Prediction, TrainingBatch};

/// Probabilities are clamped to `[PROB_FLOOR, 1]` before taking logarithms.
pub const PROB_FLOOR: f32 = 1e-10;

/// Losses of one training call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LossReport {
    pub policy_loss: f32,
    pub value_loss: f32,
}

impl LossReport {
    pub fn new(policy_loss: f32, value_loss: f32) -> Self {
        Self {
            policy_loss,
            value_loss,
        }
    }

    pub fn total(&self) -> f32 {
        self.policy_loss + self.value_loss
    }
}

#[inline]
pub fn clamp_prob(p: f32) -> f32 {
    p.clamp(PROB_FLOOR, 1.0)
}

#[inline]
fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Log-probability of the chosen action, renormalized over the legal actions,
/// plus the log-probability of the chosen cell when a target was used.
pub fn chosen_log_prob(
    action_probs: &[f32],
    legal_mask: &[f32],
    action_one_hot: &[f32],
    spatial_probs: &[f32],
    spatial_one_hot: &[f32],
    has_spatial: f32,
) -> f32 {
    let legal_mass = clamp_prob(dot(action_probs, legal_mask));
    let action_prob = dot(action_probs, action_one_hot) / legal_mass;
    let action_log_prob = clamp_prob(action_prob).ln();

    let spatial_log_prob = clamp_prob(dot(spatial_probs, spatial_one_hot)).ln();
    action_log_prob + has_spatial * spatial_log_prob
}

/// Advantages `R - V(s)` for each row.
pub fn advantages(returns: &[f32], values: &[f32]) -> Vec<f32> {
    returns.iter().zip(values).map(|(r, v)| r - v).collect()
}

/// Losses of `batch` given the estimator's prediction on `batch.states`.
pub fn batch_losses(
    prediction: &Prediction,
    batch: &TrainingBatch<'_>,
) -> Result<LossReport, EstimatorError> {
    batch.validate()?;
    let n = batch.len();
    if prediction.len() != n
        || prediction.action_probs.len() != n
        || prediction.spatial_probs.len() != n
    {
        return Err(EstimatorError::InvalidBatch(format!(
            "prediction has {} rows, batch has {}",
            prediction.len(),
            n
        )));
    }

    let advantages = advantages(batch.returns, &prediction.values);
    let mut policy = 0.0;
    let mut value = 0.0;
    for i in 0..n {
        let log_prob = chosen_log_prob(
            &prediction.action_probs[i],
            &batch.legal_masks[i],
            &batch.action_one_hots[i],
            &prediction.spatial_probs[i],
            &batch.spatial_one_hots[i],
            batch.has_spatial[i],
        );
        policy += log_prob * advantages[i];
        value += prediction.values[i] * advantages[i];
    }

    Ok(LossReport::new(-policy / n as f32, -value / n as f32))
}
