//! Configuration for A3C training.
//!
//! All knobs of a training run live in [`TrainingConfig`]. Defaults reproduce
//! the resource-harvesting setup: a 32x32 screen, 16 workers and a 13-action
//! catalog. Configs can be built in code with the `with_*` methods or loaded
//! from a JSON file.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::core::transition::SpatialTarget;

/// Configuration validation error.
///
/// Returned when configuration parameters are invalid or inconsistent.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// A count parameter (n_workers, max_steps, etc.) must be positive.
    InvalidCount {
        field: &'static str,
        value: u64,
    },
    /// A parameter is outside its valid range.
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
    /// The action catalog has no entries.
    EmptyCatalog,
    /// Two catalog entries share the same action id.
    DuplicateAction(u32),
    /// The config file could not be read.
    Io(String),
    /// The config file is not valid JSON for this schema.
    Parse(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidCount { field, value } => {
                write!(f, "{} must be > 0, got {}", field, value)
            }
            ConfigError::OutOfRange { field, value, min, max } => {
                write!(f, "{} must be in [{}, {}], got {}", field, min, max, value)
            }
            ConfigError::EmptyCatalog => write!(f, "action catalog must not be empty"),
            ConfigError::DuplicateAction(id) => {
                write!(f, "action id {} appears more than once in the catalog", id)
            }
            ConfigError::Io(e) => write!(f, "failed to read config: {}", e),
            ConfigError::Parse(e) => write!(f, "failed to parse config: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Screen resolution the estimator was built for.
///
/// Spatial targets are addressed on this grid; flattened cell index is
/// `y * width + x`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenResolution {
    pub width: usize,
    pub height: usize,
}

impl ScreenResolution {
    pub fn new(width: usize, height: usize) -> Self {
        Self { width, height }
    }

    /// Number of cells in the flattened grid.
    pub fn cells(&self) -> usize {
        self.width * self.height
    }

    /// Flattened index of a target (row-major).
    pub fn index_of(&self, target: SpatialTarget) -> usize {
        target.y * self.width + target.x
    }

    /// Target for a flattened index: row = index / width, col = index % width.
    pub fn target_of(&self, index: usize) -> SpatialTarget {
        SpatialTarget {
            x: index % self.width,
            y: index / self.width,
        }
    }

    pub fn contains(&self, target: SpatialTarget) -> bool {
        target.x < self.width && target.y < self.height
    }
}

impl Default for ScreenResolution {
    fn default() -> Self {
        Self::new(32, 32)
    }
}

impl fmt::Display for ScreenResolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// One executable action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionSpec {
    /// Environment-side action id.
    pub id: u32,
    /// Human readable name, written to the action logs.
    pub name: String,
    /// Whether the action consumes a screen coordinate.
    pub needs_target: bool,
}

impl ActionSpec {
    pub fn new(id: u32, name: impl Into<String>, needs_target: bool) -> Self {
        Self {
            id,
            name: name.into(),
            needs_target,
        }
    }
}

/// Fixed, ordered set of actions the agent may choose from.
///
/// The order defines the layout of every action-sized vector (probabilities,
/// legality masks, one-hots) and breaks ties during greedy selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionCatalog {
    actions: Vec<ActionSpec>,
}

impl ActionCatalog {
    pub fn new(actions: Vec<ActionSpec>) -> Self {
        Self { actions }
    }

    /// The resource-harvesting action set.
    pub fn harvester() -> Self {
        Self::new(vec![
            ActionSpec::new(0, "no_op", false),
            ActionSpec::new(490, "Train_SCV_quick", false),
            ActionSpec::new(2, "select_point", true),
            ActionSpec::new(6, "select_idle_worker", false),
            ActionSpec::new(44, "Build_CommandCenter_screen", true),
            ActionSpec::new(79, "Build_Refinery_screen", true),
            ActionSpec::new(91, "Build_SupplyDepot_screen", true),
            ActionSpec::new(264, "Harvest_Gather_screen", true),
            ActionSpec::new(269, "Harvest_Return_quick", false),
            ActionSpec::new(318, "Morph_SupplyDepot_Lower_quick", false),
            ActionSpec::new(319, "Morph_SupplyDepot_Raise_quick", false),
            ActionSpec::new(331, "Move_screen", true),
            ActionSpec::new(343, "Rally_Workers_screen", true),
        ])
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Position of an action id in the catalog order.
    pub fn index_of(&self, id: u32) -> Option<usize> {
        self.actions.iter().position(|a| a.id == id)
    }

    pub fn get(&self, index: usize) -> Option<&ActionSpec> {
        self.actions.get(index)
    }

    pub fn by_id(&self, id: u32) -> Option<&ActionSpec> {
        self.actions.iter().find(|a| a.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ActionSpec> {
        self.actions.iter()
    }

    /// Catalog indices of the actions present in `available`, in catalog order.
    pub fn legal_indices(&self, available: &[u32]) -> Vec<usize> {
        self.actions
            .iter()
            .enumerate()
            .filter(|(_, a)| available.contains(&a.id))
            .map(|(i, _)| i)
            .collect()
    }

    /// 1.0 for every catalog action present in `available`, 0.0 otherwise.
    pub fn legality_mask(&self, available: &[u32]) -> Vec<f32> {
        self.actions
            .iter()
            .map(|a| if available.contains(&a.id) { 1.0 } else { 0.0 })
            .collect()
    }
}

impl Default for ActionCatalog {
    fn default() -> Self {
        Self::harvester()
    }
}

/// A screen feature layer fed to the estimator, divided by `scale` on read.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScreenLayer {
    pub index: usize,
    pub scale: f32,
}

impl ScreenLayer {
    pub fn new(index: usize, scale: f32) -> Self {
        Self { index, scale }
    }
}

/// Training or greedy evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrainingMode {
    /// Explore, update the estimator, write logs and checkpoints.
    #[default]
    Train,
    /// Single greedy worker, no updates, no persistence.
    Evaluate,
}

/// Hyperparameters of the reference burn network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorConfig {
    /// Width of the dense layers.
    pub hidden_size: usize,
    /// RMSProp decay.
    pub rms_decay: f32,
    /// RMSProp epsilon.
    pub rms_epsilon: f32,
    /// Gradients are clipped to this L2 norm.
    pub max_grad_norm: f32,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            hidden_size: 256,
            rms_decay: 0.99,
            rms_epsilon: 1e-10,
            max_grad_norm: 100.0,
        }
    }
}

/// Configuration for an A3C training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Screen grid spatial targets are chosen on.
    pub resolution: ScreenResolution,
    /// Discount factor for returns.
    pub discount: f32,
    /// Learning rate at step 0.
    pub learning_rate: f64,
    /// Fraction of the learning rate removed by the time `max_steps` is reached.
    pub lr_decay_share: f64,
    /// Initial probability of exploring; anneals to 0 over `max_steps`.
    pub exploration_rate: f64,
    /// Floor probability of exploring at any step.
    pub epsilon: f64,
    /// Number of worker threads.
    pub n_workers: usize,
    /// Total environment steps across all workers.
    pub max_steps: u64,
    /// Save a checkpoint every this many global episodes.
    pub checkpoint_interval: u64,
    /// Chunks per update.
    pub n_batches: usize,
    /// Episodes kept with full traces per ranking.
    pub retention: usize,
    /// Where counters and estimator parameters go.
    pub checkpoint_dir: PathBuf,
    /// Where per-worker action logs go.
    pub log_dir: PathBuf,
    /// Restore counters, estimator and logs before starting.
    pub resume: bool,
    /// Log every finished episode at info level.
    pub show_progress: bool,
    pub mode: TrainingMode,
    /// Delay between worker thread starts, in milliseconds.
    pub start_stagger_ms: u64,
    /// Ask every worker to stop once one of them fails.
    pub stop_on_worker_failure: bool,
    /// Base seed; worker `i` uses `seed + i`.
    pub seed: u64,
    pub actions: ActionCatalog,
    pub screen_layers: Vec<ScreenLayer>,
    /// Indexes into the observation's player feature vector.
    pub player_features: Vec<usize>,
    pub estimator: EstimatorConfig,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            resolution: ScreenResolution::default(),
            discount: 0.99,
            learning_rate: 10e-3,
            lr_decay_share: 0.9,
            exploration_rate: 0.2,
            epsilon: 0.05,
            n_workers: 16,
            max_steps: 10_000_000,
            checkpoint_interval: 500,
            n_batches: 20,
            retention: 10,
            checkpoint_dir: PathBuf::from("./saved_checkpoints/"),
            log_dir: PathBuf::from("./logs/"),
            resume: false,
            show_progress: true,
            mode: TrainingMode::Train,
            start_stagger_ms: 5_000,
            stop_on_worker_failure: false,
            seed: 0,
            actions: ActionCatalog::harvester(),
            // unit_type (342 distinct values) and selected (binary)
            screen_layers: vec![ScreenLayer::new(6, 342.0), ScreenLayer::new(7, 2.0)],
            // minerals, food used, food cap, idle workers
            player_features: vec![1, 3, 4, 7],
            estimator: EstimatorConfig::default(),
        }
    }
}

impl TrainingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a config from a JSON file. Missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io(e.to_string()))?;
        let config: Self =
            serde_json::from_str(&text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_resolution(mut self, width: usize, height: usize) -> Self {
        self.resolution = ScreenResolution::new(width, height);
        self
    }

    pub fn with_discount(mut self, discount: f32) -> Self {
        self.discount = discount;
        self
    }

    pub fn with_learning_rate(mut self, lr: f64) -> Self {
        self.learning_rate = lr;
        self
    }

    pub fn with_lr_decay_share(mut self, share: f64) -> Self {
        self.lr_decay_share = share;
        self
    }

    pub fn with_exploration_rate(mut self, rate: f64) -> Self {
        self.exploration_rate = rate;
        self
    }

    pub fn with_epsilon(mut self, epsilon: f64) -> Self {
        self.epsilon = epsilon;
        self
    }

    pub fn with_n_workers(mut self, n: usize) -> Self {
        self.n_workers = n;
        self
    }

    pub fn with_max_steps(mut self, steps: u64) -> Self {
        self.max_steps = steps;
        self
    }

    pub fn with_checkpoint_interval(mut self, episodes: u64) -> Self {
        self.checkpoint_interval = episodes;
        self
    }

    pub fn with_n_batches(mut self, n: usize) -> Self {
        self.n_batches = n;
        self
    }

    pub fn with_retention(mut self, k: usize) -> Self {
        self.retention = k;
        self
    }

    pub fn with_checkpoint_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.checkpoint_dir = dir.into();
        self
    }

    pub fn with_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = dir.into();
        self
    }

    pub fn with_resume(mut self, resume: bool) -> Self {
        self.resume = resume;
        self
    }

    pub fn with_show_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn with_mode(mut self, mode: TrainingMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_start_stagger_ms(mut self, ms: u64) -> Self {
        self.start_stagger_ms = ms;
        self
    }

    pub fn with_stop_on_worker_failure(mut self, stop: bool) -> Self {
        self.stop_on_worker_failure = stop;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_actions(mut self, actions: ActionCatalog) -> Self {
        self.actions = actions;
        self
    }

    pub fn with_screen_layers(mut self, layers: Vec<ScreenLayer>) -> Self {
        self.screen_layers = layers;
        self
    }

    pub fn with_player_features(mut self, features: Vec<usize>) -> Self {
        self.player_features = features;
        self
    }

    pub fn with_estimator(mut self, estimator: EstimatorConfig) -> Self {
        self.estimator = estimator;
        self
    }

    /// Number of worker threads actually started for the configured mode.
    pub fn effective_workers(&self) -> usize {
        match self.mode {
            TrainingMode::Train => self.n_workers,
            TrainingMode::Evaluate => 1,
        }
    }

    pub fn is_training(&self) -> bool {
        self.mode == TrainingMode::Train
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let counts: [(&'static str, u64); 7] = [
            ("resolution.width", self.resolution.width as u64),
            ("resolution.height", self.resolution.height as u64),
            ("n_workers", self.n_workers as u64),
            ("max_steps", self.max_steps),
            ("checkpoint_interval", self.checkpoint_interval),
            ("n_batches", self.n_batches as u64),
            ("retention", self.retention as u64),
        ];
        for (field, value) in counts {
            if value == 0 {
                return Err(ConfigError::InvalidCount { field, value });
            }
        }

        let unit_ranges: [(&'static str, f64); 4] = [
            ("discount", self.discount as f64),
            ("lr_decay_share", self.lr_decay_share),
            ("exploration_rate", self.exploration_rate),
            ("epsilon", self.epsilon),
        ];
        for (field, value) in unit_ranges {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::OutOfRange {
                    field,
                    value,
                    min: 0.0,
                    max: 1.0,
                });
            }
        }

        if !self.learning_rate.is_finite() || self.learning_rate < 0.0 {
            return Err(ConfigError::OutOfRange {
                field: "learning_rate",
                value: self.learning_rate,
                min: 0.0,
                max: f64::MAX,
            });
        }

        if self.actions.is_empty() {
            return Err(ConfigError::EmptyCatalog);
        }
        for (i, action) in self.actions.iter().enumerate() {
            if self.actions.iter().skip(i + 1).any(|a| a.id == action.id) {
                return Err(ConfigError::DuplicateAction(action.id));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config_is_valid() {
        let config = TrainingConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.resolution, ScreenResolution::new(32, 32));
        assert_eq!(config.n_batches, 20);
        assert_eq!(config.retention, 10);
        assert_eq!(config.actions.len(), 13);
    }

    #[test]
    fn test_builder() {
        let config = TrainingConfig::new()
            .with_n_workers(4)
            .with_max_steps(1000)
            .with_checkpoint_interval(10)
            .with_resolution(8, 4)
            .with_mode(TrainingMode::Evaluate);

        assert_eq!(config.n_workers, 4);
        assert_eq!(config.max_steps, 1000);
        assert_eq!(config.resolution.cells(), 32);
        assert_eq!(config.effective_workers(), 1);
        assert!(!config.is_training());
    }

    #[test]
    fn test_validate_rejects_zero_counts() {
        let config = TrainingConfig::new().with_n_batches(0);
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidCount {
                field: "n_batches",
                value: 0
            })
        );
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        let config = TrainingConfig::new().with_epsilon(1.5);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::OutOfRange { field: "epsilon", .. })
        ));
    }

    #[test]
    fn test_validate_rejects_duplicate_actions() {
        let catalog = ActionCatalog::new(vec![
            ActionSpec::new(1, "a", false),
            ActionSpec::new(1, "b", true),
        ]);
        let config = TrainingConfig::new().with_actions(catalog);
        assert_eq!(config.validate(), Err(ConfigError::DuplicateAction(1)));
    }

    #[test]
    fn test_resolution_index_round_trip() {
        let res = ScreenResolution::new(8, 4);
        let target = res.target_of(13);
        assert_eq!(target, SpatialTarget { x: 5, y: 1 });
        assert_eq!(res.index_of(target), 13);
        assert!(res.contains(target));
        assert!(!res.contains(SpatialTarget { x: 8, y: 0 }));
    }

    #[test]
    fn test_catalog_legality() {
        let catalog = ActionCatalog::harvester();
        assert_eq!(catalog.index_of(490), Some(1));
        assert_eq!(catalog.legal_indices(&[2, 0, 999]), vec![0, 2]);

        let mask = catalog.legality_mask(&[0, 331]);
        assert_eq!(mask.len(), 13);
        assert_eq!(mask[0], 1.0);
        assert_eq!(mask[11], 1.0);
        assert_eq!(mask.iter().sum::<f32>(), 2.0);
    }

    #[test]
    fn test_from_json_file_fills_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{ "n_workers": 2, "mode": "evaluate" }"#).unwrap();

        let config = TrainingConfig::from_json_file(&path).unwrap();
        assert_eq!(config.n_workers, 2);
        assert_eq!(config.mode, TrainingMode::Evaluate);
        assert_eq!(config.discount, 0.99);
    }

    #[test]
    fn test_from_json_file_rejects_invalid() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{ "retention": 0 }"#).unwrap();

        assert!(matches!(
            TrainingConfig::from_json_file(&path),
            Err(ConfigError::InvalidCount { field: "retention", .. })
        ));
        assert!(matches!(
            TrainingConfig::from_json_file(dir.path().join("missing.json")),
            Err(ConfigError::Io(_))
        ));
    }
}
