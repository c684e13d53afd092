//! # A3C Trainer: Asynchronous Advantage Actor-Critic
//!
//! Multi-threaded A3C training against a shared policy/value estimator.
//! Every worker drives its own environment, collects one episode, computes
//! discounted returns and pushes a chunked update into the shared estimator.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                           WorkerPool                                 │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │  Thread 0          Thread 1          Thread N                       │
//! │  ┌────────┐        ┌────────┐        ┌────────┐                     │
//! │  │Worker 0│        │Worker 1│        │Worker N│                     │
//! │  │  env   │        │  env   │        │  env   │                     │
//! │  │ buffer │        │ buffer │        │ buffer │                     │
//! │  └───┬────┘        └───┬────┘        └───┬────┘                     │
//! │      │ predict / train_step (serialized) │                          │
//! │      └─────────────────┼─────────────────┘                          │
//! │                        ▼                                            │
//! │  ┌──────────────────┐  ┌────────────────────┐  ┌────────────────┐  │
//! │  │ Estimator (burn) │  │ GlobalTrainingState│  │ ActionLogStore │  │
//! │  │  RMSProp, shared │  │ step/episode count │  │ one per worker │  │
//! │  └────────┬─────────┘  └─────────┬──────────┘  └───────┬────────┘  │
//! │           └──────────────┬───────┴─────────────────────┘           │
//! │                          ▼                                          │
//! │                 ┌───────────────────┐                               │
//! │                 │ CheckpointManager │ every N global episodes       │
//! │                 └───────────────────┘                               │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use a3c_trainer::{BurnEstimator, TrainingConfig, WorkerPool, ConsoleLogger};
//!
//! let config = TrainingConfig::new()
//!     .with_n_workers(8)
//!     .with_max_steps(1_000_000)
//!     .with_checkpoint_interval(500);
//!
//! let estimator = Arc::new(BurnEstimator::<MyBackend, _>::new(net, optimizer, device));
//! let summary = WorkerPool::new(config, estimator)
//!     .with_logger(ConsoleLogger::new(10))
//!     .run(|worker_id| MyEnv::connect(worker_id))?;
//! ```

pub mod action_log;
pub mod actors;
pub mod algorithms;
pub mod checkpoint;
pub mod config;
pub mod core;
pub mod environment;
pub mod estimator;
pub mod messages;
pub mod metrics;
pub mod scheduling;

// Shared state and per-step records
pub use core::global_state::{
    training_state, CounterSnapshot, EpisodeTicket, GlobalTrainingState, SharedTrainingState,
};
pub use core::trajectory::TrajectoryBuffer;
pub use core::transition::{FeatureState, ResourceSnapshot, SpatialTarget, Transition};

pub use config::{
    ActionCatalog, ActionSpec, ConfigError, EstimatorConfig, ScreenLayer, ScreenResolution,
    TrainingConfig, TrainingMode,
};

pub use environment::{
    AgentAction, EnvError, Environment, FeatureLayout, Observation, TimeStep,
};

pub use estimator::{
    rmsprop_optimizer, A3CNet, A3CNetConfig, BurnEstimator, Estimator, EstimatorError,
    LossReport, Prediction, TrainingBatch,
};

pub use algorithms::{
    bootstrap_value, discounted_returns, split_ranges, BatchScheduler, UpdateError,
    UpdateReport, UpdateTargets,
};

pub use action_log::{
    ActionLogError, ActionLogRegistry, ActionLogStore, EpisodeLogEntry, SharedActionLog,
    StepRecord,
};

pub use checkpoint::{CheckpointConfig, CheckpointError, CheckpointManager, CheckpointRecord};

pub use actors::{
    A3CWorker, ExplorationSchedule, StepOutcome, TrainingError, TrainingSummary, WorkerContext,
    WorkerError, WorkerFailure, WorkerPool,
};

pub use messages::{EpisodeSummary, ShutdownReason, ShutdownReport, WorkerReport};

pub use metrics::{CSVLogger, ConsoleLogger, MetricsLogger, MultiLogger};

// Learning rate scheduling
pub use scheduling::{LRScheduler, LinearDecay};
