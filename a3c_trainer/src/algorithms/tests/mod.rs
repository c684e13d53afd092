//! Tests for the algorithms module.
//!
//! - `returns_tests`: return recurrence, bootstrap rule, target construction
//! - `batch_scheduler_tests`: chunk coverage, loss averaging, failure handling

pub mod returns_tests;

use std::path::Path;

use parking_lot::Mutex;

use crate::config::{ActionCatalog, ActionSpec};
use crate::core::trajectory::TrajectoryBuffer;
use crate::core::transition::{FeatureState, ResourceSnapshot, SpatialTarget, Transition};
use crate::estimator::{Estimator, EstimatorError, LossReport, Prediction, TrainingBatch};

/// Estimator with a constant value that records every training call.
pub struct RecordingEstimator {
    pub value: f32,
    /// Training call (0-based) that fails, if any.
    pub fail_at: Option<usize>,
    pub calls: Mutex<Vec<(usize, f64)>>,
    pub predictions: Mutex<usize>,
}

impl RecordingEstimator {
    pub fn new(value: f32) -> Self {
        Self {
            value,
            fail_at: None,
            calls: Mutex::new(Vec::new()),
            predictions: Mutex::new(0),
        }
    }

    pub fn failing_at(mut self, call: usize) -> Self {
        self.fail_at = Some(call);
        self
    }
}

impl Estimator for RecordingEstimator {
    fn predict(&self, states: &[FeatureState]) -> Result<Prediction, EstimatorError> {
        *self.predictions.lock() += 1;
        Ok(Prediction {
            action_probs: vec![vec![1.0]; states.len()],
            spatial_probs: vec![vec![1.0]; states.len()],
            values: vec![self.value; states.len()],
        })
    }

    fn train_step(
        &self,
        batch: &TrainingBatch<'_>,
        learning_rate: f64,
    ) -> Result<LossReport, EstimatorError> {
        batch.validate()?;
        let mut calls = self.calls.lock();
        if self.fail_at == Some(calls.len()) {
            return Err(EstimatorError::Backend("out of memory".to_string()));
        }
        calls.push((batch.len(), learning_rate));
        // Loss equals the chunk size so averaging is observable.
        Ok(LossReport::new(batch.len() as f32, -(batch.len() as f32)))
    }

    fn save(&self, _path: &Path) -> Result<(), EstimatorError> {
        Ok(())
    }

    fn load(&self, _path: &Path) -> Result<(), EstimatorError> {
        Ok(())
    }
}

pub fn catalog() -> ActionCatalog {
    ActionCatalog::new(vec![
        ActionSpec::new(0, "no_op", false),
        ActionSpec::new(2, "select_point", true),
        ActionSpec::new(5, "train_scv", false),
    ])
}

pub fn transition(reward: f32, terminal: bool, action_id: u32) -> Transition {
    Transition {
        state: FeatureState::new(vec![reward], vec![]),
        reward,
        resources: ResourceSnapshot::default(),
        terminal,
        action_id,
        target: None,
        legal_actions: vec![0, 2],
        random_action: false,
        random_position: false,
    }
}

pub fn targeted(reward: f32, x: usize, y: usize) -> Transition {
    Transition {
        target: Some(SpatialTarget::new(x, y)),
        ..transition(reward, false, 2)
    }
}

pub fn buffer(transitions: Vec<Transition>) -> TrajectoryBuffer {
    let mut buffer = TrajectoryBuffer::new();
    for t in transitions {
        buffer.push(t);
    }
    buffer
}
