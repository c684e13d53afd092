//! Reports sent from worker threads to the pool.

use std::time::Duration;

use crate::algorithms::UpdateReport;

/// Why a worker left its run loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// The global step budget is spent.
    StepBudget,
    /// The pool asked every worker to stop.
    StopRequested,
}

/// One finished and trained episode.
#[derive(Debug, Clone, PartialEq)]
pub struct EpisodeSummary {
    pub worker_id: usize,
    /// Global episode id handed out by the episode counter.
    pub global_episode: u64,
    pub local_episode: u64,
    /// Global step counter when the episode was counted.
    pub global_steps: u64,
    /// Steps taken in this episode.
    pub episode_steps: u64,
    pub total_reward: f32,
    pub primary_resource: i64,
    pub secondary_resource: i64,
    pub policy_loss: f32,
    pub value_loss: f32,
    pub learning_rate: f64,
    /// Whether a checkpoint was saved after this episode.
    pub checkpointed: bool,
    pub duration: Duration,
}

/// Final state of a worker that stopped cooperatively.
#[derive(Debug, Clone, PartialEq)]
pub struct ShutdownReport {
    pub worker_id: usize,
    pub reason: ShutdownReason,
    pub local_episodes: u64,
    /// Update applied to the unfinished episode, if it had any steps.
    pub final_update: Option<UpdateReport>,
}

/// Message from a worker thread.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerReport {
    EpisodeFinished(EpisodeSummary),
    Stopped(ShutdownReport),
    Failed { worker_id: usize, error: String },
}

impl WorkerReport {
    pub fn worker_id(&self) -> usize {
        match self {
            WorkerReport::EpisodeFinished(s) => s.worker_id,
            WorkerReport::Stopped(r) => r.worker_id,
            WorkerReport::Failed { worker_id, .. } => *worker_id,
        }
    }

    /// Whether this is the last report of its worker.
    pub fn is_final(&self) -> bool {
        !matches!(self, WorkerReport::EpisodeFinished(_))
    }
}
