//! Shared fixtures for the pool integration tests.

#![allow(dead_code)]

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use a3c_trainer::{
    ActionCatalog, ActionSpec, AgentAction, EnvError, Environment, Estimator, EstimatorError,
    FeatureState, LossReport, Observation, Prediction, ResourceSnapshot, ScreenLayer, TimeStep,
    TrainingBatch, TrainingConfig,
};

pub const WIDTH: usize = 4;
pub const HEIGHT: usize = 4;

pub fn catalog() -> ActionCatalog {
    ActionCatalog::new(vec![
        ActionSpec::new(0, "no_op", false),
        ActionSpec::new(2, "select_point", true),
        ActionSpec::new(264, "Harvest_Gather_screen", true),
        ActionSpec::new(490, "Train_SCV_quick", false),
    ])
}

/// Small, fast configuration writing under `dir`.
pub fn config(dir: &Path) -> TrainingConfig {
    TrainingConfig::new()
        .with_resolution(WIDTH, HEIGHT)
        .with_actions(catalog())
        .with_screen_layers(vec![ScreenLayer::new(0, 4.0)])
        .with_player_features(vec![0, 1])
        .with_n_workers(3)
        .with_max_steps(30)
        .with_n_batches(3)
        .with_checkpoint_interval(1_000)
        .with_retention(3)
        .with_start_stagger_ms(0)
        .with_show_progress(false)
        .with_seed(11)
        .with_checkpoint_dir(dir.join("saved_checkpoints"))
        .with_log_dir(dir.join("logs"))
}

/// Deterministic estimator: uniform distributions, constant value.
///
/// `save` writes the number of training calls so far; `load` reads it back.
pub struct StubEstimator {
    n_actions: usize,
    n_cells: usize,
    fail_train: bool,
    pub train_calls: AtomicUsize,
    pub trained_samples: AtomicUsize,
    pub loaded: AtomicBool,
}

impl StubEstimator {
    pub fn new() -> Self {
        Self {
            n_actions: catalog().len(),
            n_cells: WIDTH * HEIGHT,
            fail_train: false,
            train_calls: AtomicUsize::new(0),
            trained_samples: AtomicUsize::new(0),
            loaded: AtomicBool::new(false),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail_train: true,
            ..Self::new()
        }
    }

    pub fn trained_samples(&self) -> usize {
        self.trained_samples.load(Ordering::SeqCst)
    }

    pub fn train_calls(&self) -> usize {
        self.train_calls.load(Ordering::SeqCst)
    }
}

impl Estimator for StubEstimator {
    fn predict(&self, states: &[FeatureState]) -> Result<Prediction, EstimatorError> {
        Ok(Prediction {
            action_probs: vec![vec![1.0 / self.n_actions as f32; self.n_actions]; states.len()],
            spatial_probs: vec![vec![1.0 / self.n_cells as f32; self.n_cells]; states.len()],
            values: vec![0.25; states.len()],
        })
    }

    fn train_step(
        &self,
        batch: &TrainingBatch<'_>,
        _learning_rate: f64,
    ) -> Result<LossReport, EstimatorError> {
        batch.validate()?;
        if self.fail_train {
            return Err(EstimatorError::Backend("simulated device loss".to_string()));
        }
        self.train_calls.fetch_add(1, Ordering::SeqCst);
        self.trained_samples.fetch_add(batch.len(), Ordering::SeqCst);
        Ok(LossReport::new(0.5, -0.5))
    }

    fn save(&self, path: &Path) -> Result<(), EstimatorError> {
        fs::write(path.with_extension("bin"), self.train_calls().to_string())
            .map_err(|e| EstimatorError::Persistence(e.to_string()))
    }

    fn load(&self, path: &Path) -> Result<(), EstimatorError> {
        fs::read_to_string(path.with_extension("bin"))
            .map_err(|e| EstimatorError::Persistence(e.to_string()))?;
        self.loaded.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Environment with fixed-length episodes and a growing resource counter.
pub struct ScriptedEnv {
    length: usize,
    t: usize,
    minerals: i64,
}

impl ScriptedEnv {
    pub fn new(length: usize) -> Self {
        Self {
            length,
            t: 0,
            minerals: 50,
        }
    }

    fn observation(&self) -> Observation {
        Observation {
            screen: vec![vec![1.0; WIDTH * HEIGHT]],
            player: vec![self.minerals as f32, 12.0],
            available_actions: vec![0, 2, 264, 490],
            resources: ResourceSnapshot::new(vec![self.minerals, 0]),
        }
    }
}

impl Environment for ScriptedEnv {
    fn reset(&mut self) -> Result<TimeStep, EnvError> {
        self.t = 0;
        self.minerals = 50;
        Ok(TimeStep::first(self.observation()))
    }

    fn step(&mut self, action: &AgentAction) -> Result<TimeStep, EnvError> {
        if let Some(target) = action.target {
            if target.x >= WIDTH || target.y >= HEIGHT {
                return Err(EnvError::Backend(format!("bad target {:?}", target)));
            }
        }
        self.t += 1;
        let reward = if action.action_id == 264 { 1.0 } else { 0.0 };
        self.minerals += 5;
        Ok(TimeStep {
            observation: self.observation(),
            reward,
            last: self.t + 1 >= self.length,
        })
    }
}
