//! Environment abstraction for A3C workers.
//!
//! Each worker owns one [`Environment`] instance. The environment hands out
//! [`TimeStep`]s; the worker answers each with an [`AgentAction`]. The
//! [`FeatureLayout`] turns an observation into the estimator's input.

use std::fmt;

use crate::config::{ActionCatalog, ScreenLayer, ScreenResolution, TrainingConfig};
use crate::core::transition::{FeatureState, ResourceSnapshot, SpatialTarget};

/// Error raised by an environment or while reading one of its observations.
#[derive(Debug, Clone, PartialEq)]
pub enum EnvError {
    /// The environment was shut down.
    Closed,
    /// The simulator reported a failure.
    Backend(String),
    /// An observation lacks a feature the layout asks for.
    MissingFeature {
        kind: &'static str,
        index: usize,
    },
    /// A screen layer has the wrong number of cells.
    LayerSize {
        index: usize,
        expected: usize,
        actual: usize,
    },
}

impl fmt::Display for EnvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnvError::Closed => write!(f, "environment closed"),
            EnvError::Backend(e) => write!(f, "environment error: {}", e),
            EnvError::MissingFeature { kind, index } => {
                write!(f, "observation has no {} feature at index {}", kind, index)
            }
            EnvError::LayerSize {
                index,
                expected,
                actual,
            } => write!(
                f,
                "screen layer {} has {} cells, expected {}",
                index, actual, expected
            ),
        }
    }
}

impl std::error::Error for EnvError {}

/// What the environment exposes at one step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Observation {
    /// Screen feature layers, each flattened row-major to `width * height`.
    pub screen: Vec<Vec<f32>>,
    /// Scalar player features.
    pub player: Vec<f32>,
    /// Action ids the environment accepts right now.
    pub available_actions: Vec<u32>,
    /// Cumulative resource counters.
    pub resources: ResourceSnapshot,
}

/// Observation plus the reward and termination flag that came with it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimeStep {
    pub observation: Observation,
    pub reward: f32,
    /// Last step of the episode.
    pub last: bool,
}

impl TimeStep {
    /// First step of an episode: zero reward, not last.
    pub fn first(observation: Observation) -> Self {
        Self {
            observation,
            reward: 0.0,
            last: false,
        }
    }
}

/// Action issued to the environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgentAction {
    pub action_id: u32,
    /// Present when the action consumes a screen coordinate.
    pub target: Option<SpatialTarget>,
}

/// A single simulated environment driven by one worker.
pub trait Environment {
    /// Start a new episode.
    fn reset(&mut self) -> Result<TimeStep, EnvError>;

    /// Apply an action and return the resulting step.
    fn step(&mut self, action: &AgentAction) -> Result<TimeStep, EnvError>;
}

impl<E: Environment + ?Sized> Environment for Box<E> {
    fn reset(&mut self) -> Result<TimeStep, EnvError> {
        (**self).reset()
    }

    fn step(&mut self, action: &AgentAction) -> Result<TimeStep, EnvError> {
        (**self).step(action)
    }
}

/// Maps observations to estimator inputs.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureLayout {
    screen_layers: Vec<ScreenLayer>,
    player_features: Vec<usize>,
    resolution: ScreenResolution,
    actions: ActionCatalog,
}

impl FeatureLayout {
    pub fn new(
        screen_layers: Vec<ScreenLayer>,
        player_features: Vec<usize>,
        resolution: ScreenResolution,
        actions: ActionCatalog,
    ) -> Self {
        Self {
            screen_layers,
            player_features,
            resolution,
            actions,
        }
    }

    pub fn from_config(config: &TrainingConfig) -> Self {
        Self::new(
            config.screen_layers.clone(),
            config.player_features.clone(),
            config.resolution,
            config.actions.clone(),
        )
    }

    /// Length of `FeatureState::screen`.
    pub fn screen_size(&self) -> usize {
        self.screen_layers.len() * self.resolution.cells()
    }

    /// Length of `FeatureState::non_spatial`.
    pub fn non_spatial_size(&self) -> usize {
        self.player_features.len() + self.actions.len()
    }

    /// Build the estimator input for one observation.
    ///
    /// Selected screen layers are divided by their scale. Non-spatial
    /// features are the selected player features followed by the catalog's
    /// legality mask.
    pub fn encode(&self, observation: &Observation) -> Result<FeatureState, EnvError> {
        let cells = self.resolution.cells();
        let mut screen = Vec::with_capacity(self.screen_size());
        for layer in &self.screen_layers {
            let values = observation
                .screen
                .get(layer.index)
                .ok_or(EnvError::MissingFeature {
                    kind: "screen",
                    index: layer.index,
                })?;
            if values.len() != cells {
                return Err(EnvError::LayerSize {
                    index: layer.index,
                    expected: cells,
                    actual: values.len(),
                });
            }
            screen.extend(values.iter().map(|v| v / layer.scale));
        }

        let mut non_spatial = Vec::with_capacity(self.non_spatial_size());
        for &index in &self.player_features {
            let value = observation
                .player
                .get(index)
                .copied()
                .ok_or(EnvError::MissingFeature {
                    kind: "player",
                    index,
                })?;
            non_spatial.push(value);
        }
        non_spatial.extend(self.actions.legality_mask(&observation.available_actions));

        Ok(FeatureState::new(screen, non_spatial))
    }
}
