//! Turning a finished episode into estimator updates.
//!
//! - `returns`: bootstrap value, discounted returns and per-step targets
//! - `batch_scheduler`: splits the targets into chunks and drives training

pub mod batch_scheduler;
pub mod returns;

#[cfg(test)]
mod tests;

use std::fmt;

use crate::estimator::EstimatorError;

pub use batch_scheduler::{split_ranges, BatchScheduler, UpdateReport};
pub use returns::{bootstrap_value, discounted_returns, UpdateTargets};

/// Error raised while building targets or applying an update.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateError {
    /// The trajectory has no transitions.
    EmptyTrajectory,
    /// A transition carries an action id missing from the catalog.
    UnknownAction(u32),
    /// A transition's target lies outside the screen.
    TargetOutOfBounds { x: usize, y: usize },
    /// The estimator failed; the update was abandoned.
    Estimator(EstimatorError),
}

impl fmt::Display for UpdateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdateError::EmptyTrajectory => write!(f, "cannot update from an empty trajectory"),
            UpdateError::UnknownAction(id) => write!(f, "action {} is not in the catalog", id),
            UpdateError::TargetOutOfBounds { x, y } => {
                write!(f, "target ({}, {}) is outside the screen", x, y)
            }
            UpdateError::Estimator(e) => write!(f, "update failed: {}", e),
        }
    }
}

impl std::error::Error for UpdateError {}

impl From<EstimatorError> for UpdateError {
    fn from(e: EstimatorError) -> Self {
        UpdateError::Estimator(e)
    }
}
