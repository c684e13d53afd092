//! Per-step records collected by a worker.
//!
//! - `FeatureState`: what the estimator sees for one step
//! - `ResourceSnapshot`: cumulative resource counters at that step
//! - `Transition`: one step's full record, immutable once built

use serde::{Deserialize, Serialize};

/// A cell on the screen grid. `x` is the column, `y` the row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SpatialTarget {
    pub x: usize,
    pub y: usize,
}

impl SpatialTarget {
    pub fn new(x: usize, y: usize) -> Self {
        Self { x, y }
    }
}

/// Cumulative resource counters reported by the environment.
///
/// The first counter is the primary resource and the second the secondary
/// one; the action log ranks episodes by both. Missing counters read as 0.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSnapshot {
    counters: Vec<i64>,
}

impl ResourceSnapshot {
    pub fn new(counters: Vec<i64>) -> Self {
        Self { counters }
    }

    pub fn primary(&self) -> i64 {
        self.counters.first().copied().unwrap_or(0)
    }

    pub fn secondary(&self) -> i64 {
        self.counters.get(1).copied().unwrap_or(0)
    }

    pub fn counters(&self) -> &[i64] {
        &self.counters
    }
}

/// Estimator input for a single step.
///
/// `screen` holds the selected feature layers, flattened layer-major;
/// `non_spatial` holds player features followed by the action legality mask.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureState {
    pub screen: Vec<f32>,
    pub non_spatial: Vec<f32>,
}

impl FeatureState {
    pub fn new(screen: Vec<f32>, non_spatial: Vec<f32>) -> Self {
        Self {
            screen,
            non_spatial,
        }
    }
}

/// One environment step as seen by a worker.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    /// Features fed to the estimator at this step
    pub state: FeatureState,
    /// Reward attached to the observation of this step
    pub reward: f32,
    /// Resource counters at this step
    pub resources: ResourceSnapshot,
    /// Whether this was the last step of the episode
    pub terminal: bool,
    /// Chosen action id
    pub action_id: u32,
    /// Chosen screen target, present when the action consumes one
    pub target: Option<SpatialTarget>,
    /// Action ids that were legal at this step
    pub legal_actions: Vec<u32>,
    /// Action came from exploration rather than the greedy choice
    pub random_action: bool,
    /// Target came from exploration rather than the greedy choice
    pub random_position: bool,
}
