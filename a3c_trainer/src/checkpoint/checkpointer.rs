//! Training checkpoints.
//!
//! A checkpoint directory holds:
//!
//! - `training_state.json`: step and episode counters, screen resolution and
//!   the estimator file stem
//! - the estimator parameters, written through `Estimator::save`
//!
//! Per-worker action logs are flushed to their own directory on every save
//! but are not part of the checkpoint proper: a resume needs only the
//! counters and the estimator.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::action_log::{ActionLogError, SharedActionLogRegistry};
use crate::config::{ScreenResolution, TrainingConfig};
use crate::core::global_state::{CounterSnapshot, GlobalTrainingState};
use crate::estimator::{Estimator, EstimatorError};

const STATE_FILE: &str = "training_state.json";
const ESTIMATOR_STEM: &str = "estimator";

/// Configuration for the checkpoint manager.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckpointConfig {
    /// Directory to store checkpoints.
    pub checkpoint_dir: PathBuf,
    /// Global episodes between saves (0 = never).
    pub interval: u64,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            checkpoint_dir: PathBuf::from("./saved_checkpoints/"),
            interval: 500,
        }
    }
}

impl CheckpointConfig {
    pub fn new(checkpoint_dir: impl Into<PathBuf>) -> Self {
        Self {
            checkpoint_dir: checkpoint_dir.into(),
            ..Default::default()
        }
    }

    pub fn from_training(config: &TrainingConfig) -> Self {
        Self::new(&config.checkpoint_dir).with_interval(config.checkpoint_interval)
    }

    /// Set the save interval, in global episodes.
    pub fn with_interval(mut self, interval: u64) -> Self {
        self.interval = interval;
        self
    }
}

/// Error type for checkpointing operations.
#[derive(Debug)]
pub enum CheckpointError {
    Io(io::Error),
    /// The state file could not be encoded or decoded.
    Serialization(String),
    /// No checkpoint where a resume expected one.
    NotFound(PathBuf),
    /// The checkpoint was taken at a different screen resolution.
    ResolutionMismatch {
        expected: ScreenResolution,
        found: ScreenResolution,
    },
    Estimator(EstimatorError),
    ActionLog(ActionLogError),
}

impl std::fmt::Display for CheckpointError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CheckpointError::Io(e) => write!(f, "IO error: {}", e),
            CheckpointError::Serialization(e) => write!(f, "Serialization error: {}", e),
            CheckpointError::NotFound(p) => write!(f, "No checkpoint found in {:?}", p),
            CheckpointError::ResolutionMismatch { expected, found } => write!(
                f,
                "Checkpoint resolution {} does not match configured resolution {}",
                found, expected
            ),
            CheckpointError::Estimator(e) => write!(f, "Estimator error: {}", e),
            CheckpointError::ActionLog(e) => write!(f, "Action log error: {}", e),
        }
    }
}

impl std::error::Error for CheckpointError {}

impl From<io::Error> for CheckpointError {
    fn from(e: io::Error) -> Self {
        CheckpointError::Io(e)
    }
}

impl From<serde_json::Error> for CheckpointError {
    fn from(e: serde_json::Error) -> Self {
        CheckpointError::Serialization(e.to_string())
    }
}

impl From<EstimatorError> for CheckpointError {
    fn from(e: EstimatorError) -> Self {
        CheckpointError::Estimator(e)
    }
}

impl From<ActionLogError> for CheckpointError {
    fn from(e: ActionLogError) -> Self {
        CheckpointError::ActionLog(e)
    }
}

/// Contents of the state file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointRecord {
    pub step_counter: u64,
    pub episode_counter: u64,
    pub resolution: ScreenResolution,
    /// Estimator parameter file, relative to the checkpoint directory.
    pub estimator_file: String,
}

impl CheckpointRecord {
    pub fn counters(&self) -> CounterSnapshot {
        CounterSnapshot {
            steps: self.step_counter,
            episodes: self.episode_counter,
        }
    }
}

/// Saves and restores training checkpoints.
///
/// Saves from different workers are serialized. A save carrying an older
/// episode than the last one written is skipped, so the state file never
/// moves backwards.
pub struct CheckpointManager {
    config: CheckpointConfig,
    resolution: ScreenResolution,
    logs: SharedActionLogRegistry,
    /// Episode of the last state file written; held for the whole save.
    last_saved: Mutex<Option<u64>>,
}

impl CheckpointManager {
    pub fn new(
        config: CheckpointConfig,
        resolution: ScreenResolution,
        logs: SharedActionLogRegistry,
    ) -> Self {
        Self {
            config,
            resolution,
            logs,
            last_saved: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &CheckpointConfig {
        &self.config
    }

    pub fn resolution(&self) -> ScreenResolution {
        self.resolution
    }

    /// Path of the state file.
    pub fn state_path(&self) -> PathBuf {
        self.config.checkpoint_dir.join(STATE_FILE)
    }

    /// Whether finishing global episode `episode` triggers a save.
    pub fn should_save(&self, episode: u64) -> bool {
        self.config.interval > 0 && episode > 0 && episode % self.config.interval == 0
    }

    /// Save counters, resolution and estimator, then flush every action log.
    ///
    /// `counters` are the values observed when the triggering episode was
    /// counted. The estimator is written before the state file, and the state
    /// file is replaced atomically, so an existing state file always refers to
    /// complete parameters.
    ///
    /// Returns `None` when a save for a later episode already happened.
    pub fn save<E: Estimator + ?Sized>(
        &self,
        estimator: &E,
        counters: CounterSnapshot,
    ) -> Result<Option<CheckpointRecord>, CheckpointError> {
        let mut last_saved = self.last_saved.lock();
        if let Some(last) = *last_saved {
            if counters.episodes < last {
                log::debug!(
                    "Skipping checkpoint for episode {}: episode {} already saved",
                    counters.episodes,
                    last
                );
                return Ok(None);
            }
        }
        let dir = &self.config.checkpoint_dir;
        fs::create_dir_all(dir)?;

        estimator.save(&dir.join(ESTIMATOR_STEM))?;

        let record = CheckpointRecord {
            step_counter: counters.steps,
            episode_counter: counters.episodes,
            resolution: self.resolution,
            estimator_file: ESTIMATOR_STEM.to_string(),
        };
        let path = self.state_path();
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_string_pretty(&record)?)?;
        fs::rename(&tmp, &path)?;
        *last_saved = Some(counters.episodes);

        let flushed = self.logs.flush_all()?;
        log::debug!("Flushed {} action logs", flushed);

        Ok(Some(record))
    }

    /// Read and validate the state file.
    pub fn load_record(&self) -> Result<CheckpointRecord, CheckpointError> {
        let path = self.state_path();
        let json = match fs::read_to_string(&path) {
            Ok(json) => json,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(CheckpointError::NotFound(self.config.checkpoint_dir.clone()))
            }
            Err(e) => return Err(e.into()),
        };
        let record: CheckpointRecord = serde_json::from_str(&json)?;

        if record.resolution != self.resolution {
            return Err(CheckpointError::ResolutionMismatch {
                expected: self.resolution,
                found: record.resolution,
            });
        }
        Ok(record)
    }

    /// Restore estimator parameters and global counters.
    pub fn restore<E: Estimator + ?Sized>(
        &self,
        estimator: &E,
        state: &GlobalTrainingState,
    ) -> Result<CheckpointRecord, CheckpointError> {
        let record = self.load_record()?;
        estimator.load(&self.estimator_path(&record))?;
        state.restore(record.counters());

        log::info!(
            "Restored checkpoint from {:?}: step {}, episode {}",
            self.config.checkpoint_dir,
            record.step_counter,
            record.episode_counter
        );
        Ok(record)
    }

    fn estimator_path(&self, record: &CheckpointRecord) -> PathBuf {
        Path::new(&self.config.checkpoint_dir).join(&record.estimator_file)
    }
}
