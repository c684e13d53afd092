//! The A3C worker loop.
//!
//! One worker drives one environment on its own thread:
//!
//! 1. `step`: encode the observation, pick the greedy legal action and screen
//!    cell, apply exploration, record the transition, count the step
//! 2. `reset`: at the episode boundary, count the episode, train on the
//!    trajectory, log it, and checkpoint every `checkpoint_interval` episodes
//!
//! Shared state is touched only through the counters' short critical sections
//! and the estimator's own update path. Returns, chunked updates and logging
//! run outside any global lock.
//!
//! Each `step` first claims one step of the global budget. Once the budget is
//! spent (or a stop is requested) the claim fails, and the worker trains on
//! whatever the buffer holds and returns [`StepOutcome::Shutdown`].

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use crossbeam_channel::Sender;

use crate::action_log::{EpisodeLogEntry, SharedActionLog};
use crate::actors::exploration::ExplorationSchedule;
use crate::algorithms::{BatchScheduler, UpdateError, UpdateReport, UpdateTargets};
use crate::checkpoint::{CheckpointError, CheckpointManager};
use crate::config::TrainingConfig;
use crate::core::global_state::{CounterSnapshot, SharedTrainingState};
use crate::core::trajectory::TrajectoryBuffer;
use crate::core::transition::Transition;
use crate::environment::{AgentAction, EnvError, Environment, FeatureLayout, TimeStep};
use crate::estimator::{Estimator, EstimatorError};
use crate::messages::{EpisodeSummary, ShutdownReason, ShutdownReport, WorkerReport};
use crate::scheduling::{LRScheduler, LinearDecay};

/// Error that ends a worker.
#[derive(Debug)]
pub enum WorkerError {
    Environment(EnvError),
    /// The estimator failed while choosing an action.
    Inference(EstimatorError),
    /// The episode update was abandoned.
    Update(UpdateError),
    Checkpoint(CheckpointError),
    /// The action catalog has no entries.
    EmptyCatalog,
}

impl fmt::Display for WorkerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerError::Environment(e) => write!(f, "environment: {}", e),
            WorkerError::Inference(e) => write!(f, "inference: {}", e),
            WorkerError::Update(e) => write!(f, "{}", e),
            WorkerError::Checkpoint(e) => write!(f, "checkpoint: {}", e),
            WorkerError::EmptyCatalog => write!(f, "action catalog is empty"),
        }
    }
}

impl std::error::Error for WorkerError {}

impl From<EnvError> for WorkerError {
    fn from(e: EnvError) -> Self {
        WorkerError::Environment(e)
    }
}

impl From<UpdateError> for WorkerError {
    fn from(e: UpdateError) -> Self {
        WorkerError::Update(e)
    }
}

impl From<CheckpointError> for WorkerError {
    fn from(e: CheckpointError) -> Self {
        WorkerError::Checkpoint(e)
    }
}

/// What a worker answers to a time step.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    /// Send this action to the environment.
    Act(AgentAction),
    /// Stop: the final update is done.
    Shutdown(ShutdownReport),
}

/// Handles shared by every worker of a run.
pub struct WorkerContext<E: ?Sized> {
    pub config: Arc<TrainingConfig>,
    pub estimator: Arc<E>,
    pub state: SharedTrainingState,
    pub checkpoints: Arc<CheckpointManager>,
}

impl<E: ?Sized> Clone for WorkerContext<E> {
    fn clone(&self) -> Self {
        Self {
            config: Arc::clone(&self.config),
            estimator: Arc::clone(&self.estimator),
            state: Arc::clone(&self.state),
            checkpoints: Arc::clone(&self.checkpoints),
        }
    }
}

/// Index of the most probable legal action; ties go to the earliest catalog
/// entry. Falls back to 0 when nothing is legal.
pub fn greedy_action(action_probs: &[f32], legal: &[usize]) -> usize {
    let mut best: Option<(usize, f32)> = None;
    for &index in legal {
        let p = action_probs.get(index).copied().unwrap_or(f32::NEG_INFINITY);
        if best.map_or(true, |(_, best_p)| p > best_p) {
            best = Some((index, p));
        }
    }
    best.map_or(0, |(index, _)| index)
}

/// Index of the first maximum.
pub fn argmax(values: &[f32]) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate() {
        if v > values[best] {
            best = i;
        }
    }
    best
}

pub struct A3CWorker<E: Estimator + ?Sized> {
    id: usize,
    ctx: WorkerContext<E>,
    action_log: SharedActionLog,
    layout: FeatureLayout,
    exploration: ExplorationSchedule,
    scheduler: BatchScheduler,
    lr_schedule: LinearDecay,
    buffer: TrajectoryBuffer,
    local_episodes: u64,
    episode_steps: u64,
    episode_start: Instant,
}

impl<E: Estimator + ?Sized> A3CWorker<E> {
    /// Create a worker. Local episode numbering continues from the last
    /// episode already present in `action_log`.
    pub fn new(id: usize, ctx: WorkerContext<E>, action_log: SharedActionLog) -> Self {
        let config = &ctx.config;
        let local_episodes = action_log.lock().last_local_episode();
        Self {
            id,
            layout: FeatureLayout::from_config(config),
            exploration: ExplorationSchedule::new(
                config.exploration_rate,
                config.epsilon,
                config.max_steps,
                config.seed.wrapping_add(id as u64),
            ),
            scheduler: BatchScheduler::new(config.n_batches),
            lr_schedule: LinearDecay::with_decay_share(
                config.learning_rate,
                config.lr_decay_share,
                config.max_steps,
            ),
            buffer: TrajectoryBuffer::new(),
            local_episodes,
            episode_steps: 0,
            episode_start: Instant::now(),
            action_log,
            ctx,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn local_episodes(&self) -> u64 {
        self.local_episodes
    }

    pub fn episode_steps(&self) -> u64 {
        self.episode_steps
    }

    /// Transitions of the current episode.
    pub fn buffer(&self) -> &TrajectoryBuffer {
        &self.buffer
    }

    fn training(&self) -> bool {
        self.ctx.config.is_training()
    }

    /// Choose the action for `timestep`.
    pub fn step(&mut self, timestep: &TimeStep) -> Result<StepOutcome, WorkerError> {
        let Some(claimed) = self.ctx.state.try_record_step() else {
            return self.shutdown().map(StepOutcome::Shutdown);
        };
        // exploration is annealed on the counter before this step
        let global_step = claimed - 1;

        let config = Arc::clone(&self.ctx.config);
        let catalog = &config.actions;
        let resolution = config.resolution;
        let observation = &timestep.observation;

        let features = self.layout.encode(observation)?;
        let prediction = self
            .ctx
            .estimator
            .predict(std::slice::from_ref(&features))
            .map_err(WorkerError::Inference)?;
        let action_probs = prediction.action_probs.first().map_or(&[][..], Vec::as_slice);
        let spatial_probs = prediction.spatial_probs.first().map_or(&[][..], Vec::as_slice);
        if action_probs.len() != catalog.len() || spatial_probs.len() != resolution.cells() {
            return Err(WorkerError::Inference(EstimatorError::InvalidBatch(format!(
                "expected {} action and {} spatial probabilities, got {} and {}",
                catalog.len(),
                resolution.cells(),
                action_probs.len(),
                spatial_probs.len()
            ))));
        }

        let legal = catalog.legal_indices(&observation.available_actions);
        let explore = self.training();

        let mut action_index = greedy_action(action_probs, &legal);
        let mut random_action = false;
        if explore && self.exploration.explore(global_step) && !legal.is_empty() {
            action_index = legal[self.exploration.pick(legal.len())];
            random_action = true;
        }

        let mut cell = argmax(spatial_probs);
        let mut random_cell = false;
        if explore && self.exploration.explore(global_step) {
            cell = self.exploration.pick(resolution.cells());
            random_cell = true;
        }

        let spec = catalog.get(action_index).ok_or(WorkerError::EmptyCatalog)?;
        let target = spec.needs_target.then(|| resolution.target_of(cell));
        let action = AgentAction {
            action_id: spec.id,
            target,
        };

        if self.training() {
            self.buffer.push(Transition {
                state: features,
                reward: timestep.reward,
                resources: observation.resources.clone(),
                terminal: timestep.last,
                action_id: spec.id,
                target,
                legal_actions: observation.available_actions.clone(),
                random_action,
                random_position: random_cell && target.is_some(),
            });
        }

        self.episode_steps += 1;
        Ok(StepOutcome::Act(action))
    }

    /// Close the current episode and start timing the next one.
    ///
    /// Returns the summary of the episode that was trained on, if any.
    pub fn reset(&mut self) -> Result<Option<EpisodeSummary>, WorkerError> {
        let summary = if !self.training() {
            if self.episode_steps > 0 {
                self.local_episodes += 1;
            }
            None
        } else if self.buffer.is_empty() {
            None
        } else {
            Some(self.finish_episode()?)
        };

        self.episode_steps = 0;
        self.episode_start = Instant::now();
        Ok(summary)
    }

    fn finish_episode(&mut self) -> Result<EpisodeSummary, WorkerError> {
        let ticket = self.ctx.state.record_episode();
        let report = self.update()?;
        self.local_episodes += 1;

        let entry = EpisodeLogEntry::from_trajectory(
            ticket.episode,
            self.local_episodes,
            &report,
            &self.buffer,
            &self.ctx.config.actions,
        );
        let (primary_resource, secondary_resource) =
            (entry.primary_resource, entry.secondary_resource);
        self.action_log.lock().append(entry);
        self.buffer.clear();

        let duration = self.episode_start.elapsed();
        if self.ctx.config.show_progress {
            log::info!(
                "Episode {} (worker {}) finished in {:.1}s: reward {:.2}, {:.1}% of steps used",
                ticket.episode,
                self.id,
                duration.as_secs_f32(),
                report.total_reward,
                100.0 * self.ctx.state.progress()
            );
        }

        let mut checkpointed = false;
        if self.ctx.checkpoints.should_save(ticket.episode) {
            let counters = CounterSnapshot {
                steps: ticket.steps,
                episodes: ticket.episode,
            };
            if self.ctx.checkpoints.save(&*self.ctx.estimator, counters)?.is_some() {
                checkpointed = true;
                log::info!(
                    "Checkpoint saved at episode {} (step {}/{})",
                    ticket.episode,
                    counters.steps,
                    self.ctx.state.max_steps()
                );
            }
        }

        Ok(EpisodeSummary {
            worker_id: self.id,
            global_episode: ticket.episode,
            local_episode: self.local_episodes,
            global_steps: ticket.steps,
            episode_steps: self.episode_steps,
            total_reward: report.total_reward,
            primary_resource,
            secondary_resource,
            policy_loss: report.policy_loss,
            value_loss: report.value_loss,
            learning_rate: report.learning_rate,
            checkpointed,
            duration,
        })
    }

    /// Train on the current buffer.
    fn update(&self) -> Result<UpdateReport, WorkerError> {
        let learning_rate = self.lr_schedule.get_lr(self.ctx.state.steps());
        let config = &self.ctx.config;
        let estimator = &*self.ctx.estimator;

        let targets = UpdateTargets::build(
            &self.buffer,
            estimator,
            &config.actions,
            config.resolution,
            config.discount,
        )?;
        let report = self.scheduler.run(estimator, &targets, learning_rate)?;
        log::debug!(
            "Worker {} trained on {} steps in {} chunks (lr {:.6})",
            self.id,
            report.n_samples,
            report.n_chunks,
            learning_rate
        );
        Ok(report)
    }

    fn shutdown(&mut self) -> Result<ShutdownReport, WorkerError> {
        let reason = if self.ctx.state.stop_requested() {
            ShutdownReason::StopRequested
        } else {
            ShutdownReason::StepBudget
        };

        let final_update = if self.training() && !self.buffer.is_empty() {
            let report = self.update()?;
            self.buffer.clear();
            Some(report)
        } else {
            None
        };

        log::info!(
            "Worker {} stopping ({:?}) after {} local episodes",
            self.id,
            reason,
            self.local_episodes
        );
        Ok(ShutdownReport {
            worker_id: self.id,
            reason,
            local_episodes: self.local_episodes,
            final_update,
        })
    }

    /// Drive `env` until shutdown, sending one report per finished episode.
    pub fn run<Env: Environment + ?Sized>(
        &mut self,
        env: &mut Env,
        reports: &Sender<WorkerReport>,
    ) -> Result<ShutdownReport, WorkerError> {
        loop {
            if let Some(summary) = self.reset()? {
                if reports.send(WorkerReport::EpisodeFinished(summary)).is_err() {
                    log::debug!("Worker {}: report receiver is gone", self.id);
                }
            }

            let mut timestep = env.reset()?;
            loop {
                match self.step(&timestep)? {
                    StepOutcome::Shutdown(report) => return Ok(report),
                    StepOutcome::Act(action) => {
                        if timestep.last {
                            break;
                        }
                        timestep = env.step(&action)?;
                    }
                }
            }
        }
    }
}
