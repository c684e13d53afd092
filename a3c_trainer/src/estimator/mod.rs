//! Estimator contract.
//!
//! The estimator is the policy/value function shared by all workers. Workers
//! only rely on the [`Estimator`] trait:
//!
//! - `predict`: action probabilities, spatial probabilities and value for a batch
//! - `train_step`: one gradient update on a batch, returning the losses
//! - `save` / `load`: parameter persistence, used by the checkpoint manager
//!
//! [`BurnEstimator`] is the reference implementation on top of burn.
//!
//! ## Contention
//!
//! Implementations serialize concurrent `train_step` calls. Every worker goes
//! through that single update path, so with many workers it is the throughput
//! bottleneck of training.

pub mod loss;
pub mod network;

use std::fmt;
use std::path::Path;

use crate::core::transition::FeatureState;

pub use loss::{LossReport, PROB_FLOOR};
pub use network::{rmsprop_optimizer, A3CNet, A3CNetConfig, BurnEstimator};

/// Error raised by an estimator call.
#[derive(Debug, Clone, PartialEq)]
pub enum EstimatorError {
    /// The batch is empty or its parts disagree in length.
    InvalidBatch(String),
    /// The backend failed (allocation failure, device loss, ...).
    Backend(String),
    /// Parameters could not be saved or loaded.
    Persistence(String),
}

impl fmt::Display for EstimatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EstimatorError::InvalidBatch(e) => write!(f, "invalid batch: {}", e),
            EstimatorError::Backend(e) => write!(f, "estimator backend error: {}", e),
            EstimatorError::Persistence(e) => write!(f, "estimator persistence error: {}", e),
        }
    }
}

impl std::error::Error for EstimatorError {}

/// Output of a forward pass over a batch of states.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Prediction {
    /// Per state, one probability per catalog action.
    pub action_probs: Vec<Vec<f32>>,
    /// Per state, one probability per screen cell (row-major).
    pub spatial_probs: Vec<Vec<f32>>,
    /// Per state, the value estimate.
    pub values: Vec<f32>,
}

impl Prediction {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Borrowed view of one chunk of update targets.
///
/// All fields have the same length: one row per transition.
#[derive(Debug, Clone, Copy)]
pub struct TrainingBatch<'a> {
    pub states: &'a [FeatureState],
    /// 1.0 for actions that were legal at that step.
    pub legal_masks: &'a [Vec<f32>],
    /// One-hot of the action taken.
    pub action_one_hots: &'a [Vec<f32>],
    /// One-hot of the chosen screen cell; all zeros when unused.
    pub spatial_one_hots: &'a [Vec<f32>],
    /// 1.0 when the action consumed a screen target.
    pub has_spatial: &'a [f32],
    /// Discounted return targets.
    pub returns: &'a [f32],
}

impl<'a> TrainingBatch<'a> {
    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Check that every part has one row per state.
    pub fn validate(&self) -> Result<(), EstimatorError> {
        let n = self.states.len();
        let lengths = [
            ("legal_masks", self.legal_masks.len()),
            ("action_one_hots", self.action_one_hots.len()),
            ("spatial_one_hots", self.spatial_one_hots.len()),
            ("has_spatial", self.has_spatial.len()),
            ("returns", self.returns.len()),
        ];
        for (name, len) in lengths {
            if len != n {
                return Err(EstimatorError::InvalidBatch(format!(
                    "{} has {} rows, expected {}",
                    name, len, n
                )));
            }
        }
        if n == 0 {
            return Err(EstimatorError::InvalidBatch("empty batch".to_string()));
        }
        Ok(())
    }
}

/// Policy/value function shared by all workers.
pub trait Estimator: Send + Sync {
    /// Forward pass over a batch of states.
    fn predict(&self, states: &[FeatureState]) -> Result<Prediction, EstimatorError>;

    /// One gradient update. The advantage `return - value(state)` is treated
    /// as a constant.
    fn train_step(
        &self,
        batch: &TrainingBatch<'_>,
        learning_rate: f64,
    ) -> Result<LossReport, EstimatorError>;

    /// Persist the parameters under `path`.
    fn save(&self, path: &Path) -> Result<(), EstimatorError>;

    /// Replace the parameters with the ones stored under `path`.
    fn load(&self, path: &Path) -> Result<(), EstimatorError>;

    /// Value estimate of a single state.
    fn value(&self, state: &FeatureState) -> Result<f32, EstimatorError> {
        let prediction = self.predict(std::slice::from_ref(state))?;
        prediction
            .values
            .first()
            .copied()
            .ok_or_else(|| EstimatorError::Backend("prediction returned no value".to_string()))
    }
}

impl<E: Estimator + ?Sized> Estimator for std::sync::Arc<E> {
    fn predict(&self, states: &[FeatureState]) -> Result<Prediction, EstimatorError> {
        (**self).predict(states)
    }

    fn train_step(
        &self,
        batch: &TrainingBatch<'_>,
        learning_rate: f64,
    ) -> Result<LossReport, EstimatorError> {
        (**self).train_step(batch, learning_rate)
    }

    fn save(&self, path: &Path) -> Result<(), EstimatorError> {
        (**self).save(path)
    }

    fn load(&self, path: &Path) -> Result<(), EstimatorError> {
        (**self).load(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_validate() {
        let states = vec![FeatureState::default(); 2];
        let rows = vec![vec![1.0]; 2];
        let flags = vec![0.0; 2];
        let batch = TrainingBatch {
            states: &states,
            legal_masks: &rows,
            action_one_hots: &rows,
            spatial_one_hots: &rows,
            has_spatial: &flags,
            returns: &flags[..1],
        };

        assert!(matches!(
            batch.validate(),
            Err(EstimatorError::InvalidBatch(msg)) if msg.contains("returns")
        ));

        let batch = TrainingBatch {
            returns: &flags,
            ..batch
        };
        assert!(batch.validate().is_ok());
        assert_eq!(batch.len(), 2);
    }

    #[test]
    fn test_empty_batch_rejected() {
        let batch = TrainingBatch {
            states: &[],
            legal_masks: &[],
            action_one_hots: &[],
            spatial_one_hots: &[],
            has_spatial: &[],
            returns: &[],
        };
        assert!(batch.is_empty());
        assert!(batch.validate().is_err());
    }
}
