//! Worker threads.
//!
//! - `A3CWorker`: drives one environment, trains on each finished episode
//! - `ExplorationSchedule`: annealed random overrides of the greedy choice
//! - `WorkerPool`: spawns the workers and collects their reports

pub mod exploration;
pub mod pool;
pub mod worker;


pub use exploration::ExplorationSchedule;
pub use pool::{TrainingError, TrainingSummary, WorkerFailure, WorkerPool};
pub use worker::{argmax, greedy_action, A3CWorker, StepOutcome, WorkerContext, WorkerError};
