//! Discounted returns and update targets for one finished trajectory.
//!
//! ## Recurrence
//!
//! With `R` the bootstrap value (0 after a terminal step, `V(s_last)`
//! otherwise), in chronological order:
//!
//! ```text
//! G[T-1] = R
//! G[t]   = r[t+1] + γ G[t+1]
//! ```
//!
//! The reward attached to a transition arrived with its observation, i.e. it
//! was earned by the action of the previous step. The reward of the first
//! transition therefore never enters a return.

use std::ops::Range;

use super::UpdateError;
use crate::config::{ActionCatalog, ScreenResolution};
use crate::core::trajectory::TrajectoryBuffer;
use crate::core::transition::FeatureState;
use crate::estimator::{Estimator, TrainingBatch};

/// Discounted return targets for `rewards` (chronological) given `bootstrap`.
///
/// # Example
///
/// ```
/// use a3c_trainer::algorithms::discounted_returns;
///
/// let returns = discounted_returns(&[1.0, 2.0, 3.0], 10.0, 0.99);
/// assert!((returns[0] - 14.771).abs() < 1e-3);
/// assert!((returns[1] - 12.9).abs() < 1e-4);
/// assert_eq!(returns[2], 10.0);
/// ```
pub fn discounted_returns(rewards: &[f32], bootstrap: f32, discount: f32) -> Vec<f32> {
    let n = rewards.len();
    let mut returns = vec![0.0f32; n];
    if n == 0 {
        return returns;
    }

    returns[n - 1] = bootstrap;
    for t in (0..n - 1).rev() {
        returns[t] = rewards[t + 1] + discount * returns[t + 1];
    }
    returns
}

/// Value the return recurrence starts from.
///
/// Exactly 0 when the last transition is terminal; the estimator is not
/// consulted in that case.
pub fn bootstrap_value<E: Estimator + ?Sized>(
    buffer: &TrajectoryBuffer,
    estimator: &E,
) -> Result<f32, UpdateError> {
    match buffer.last() {
        None => Err(UpdateError::EmptyTrajectory),
        Some(last) if last.terminal => Ok(0.0),
        Some(last) => Ok(estimator.value(&last.state)?),
    }
}

/// Everything one update feeds to the estimator, one row per transition.
#[derive(Debug, Clone, Default)]
pub struct UpdateTargets {
    pub states: Vec<FeatureState>,
    pub legal_masks: Vec<Vec<f32>>,
    pub action_one_hots: Vec<Vec<f32>>,
    pub spatial_one_hots: Vec<Vec<f32>>,
    pub has_spatial: Vec<f32>,
    pub returns: Vec<f32>,
    /// Bootstrap value the returns were computed from.
    pub bootstrap: f32,
    /// Undiscounted sum of the episode's rewards.
    pub total_reward: f32,
}

impl UpdateTargets {
    /// Build the targets for a finished trajectory.
    pub fn build<E: Estimator + ?Sized>(
        buffer: &TrajectoryBuffer,
        estimator: &E,
        catalog: &ActionCatalog,
        resolution: ScreenResolution,
        discount: f32,
    ) -> Result<Self, UpdateError> {
        let bootstrap = bootstrap_value(buffer, estimator)?;
        let rewards: Vec<f32> = buffer.iter().map(|t| t.reward).collect();
        let returns = discounted_returns(&rewards, bootstrap, discount);

        let n = buffer.len();
        let n_actions = catalog.len();
        let n_cells = resolution.cells();
        let mut targets = Self {
            states: Vec::with_capacity(n),
            legal_masks: Vec::with_capacity(n),
            action_one_hots: Vec::with_capacity(n),
            spatial_one_hots: Vec::with_capacity(n),
            has_spatial: Vec::with_capacity(n),
            returns,
            bootstrap,
            total_reward: buffer.total_reward(),
        };

        for transition in buffer.iter() {
            let action_index = catalog
                .index_of(transition.action_id)
                .ok_or(UpdateError::UnknownAction(transition.action_id))?;
            let mut action_one_hot = vec![0.0; n_actions];
            action_one_hot[action_index] = 1.0;

            let needs_target = catalog
                .get(action_index)
                .map(|spec| spec.needs_target)
                .unwrap_or(false);
            let mut spatial_one_hot = vec![0.0; n_cells];
            let mut has_spatial = 0.0;
            if let (true, Some(target)) = (needs_target, transition.target) {
                if !resolution.contains(target) {
                    return Err(UpdateError::TargetOutOfBounds {
                        x: target.x,
                        y: target.y,
                    });
                }
                spatial_one_hot[resolution.index_of(target)] = 1.0;
                has_spatial = 1.0;
            }

            targets.states.push(transition.state.clone());
            targets
                .legal_masks
                .push(catalog.legality_mask(&transition.legal_actions));
            targets.action_one_hots.push(action_one_hot);
            targets.spatial_one_hots.push(spatial_one_hot);
            targets.has_spatial.push(has_spatial);
        }

        Ok(targets)
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Borrow rows `range` as an estimator batch.
    pub fn batch(&self, range: Range<usize>) -> TrainingBatch<'_> {
        TrainingBatch {
            states: &self.states[range.clone()],
            legal_masks: &self.legal_masks[range.clone()],
            action_one_hots: &self.action_one_hots[range.clone()],
            spatial_one_hots: &self.spatial_one_hots[range.clone()],
            has_spatial: &self.has_spatial[range.clone()],
            returns: &self.returns[range],
        }
    }
}
