//! Worker pool: spawns one thread per worker and collects their reports.
//!
//! Start-up order:
//!
//! 1. validate the configuration
//! 2. on resume, restore estimator parameters and counters (fatal on error),
//!    then reload each worker's action log (missing logs start fresh)
//! 3. spawn `A3C-Worker-{id}` threads, `start_stagger_ms` apart
//!
//! The calling thread then drains the report channel until every worker has
//! hung up, feeding finished episodes to the metrics logger.

use std::fmt;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::unbounded;

use crate::action_log::{ActionLogError, ActionLogRegistry, SharedActionLog};
use crate::actors::worker::{A3CWorker, WorkerContext};
use crate::checkpoint::{CheckpointConfig, CheckpointError, CheckpointManager};
use crate::config::{ConfigError, TrainingConfig};
use crate::core::global_state::{training_state, CounterSnapshot, SharedTrainingState};
use crate::environment::{EnvError, Environment};
use crate::estimator::Estimator;
use crate::messages::{ShutdownReport, WorkerReport};
use crate::metrics::MetricsLogger;

/// Error that prevents a run from starting.
#[derive(Debug)]
pub enum TrainingError {
    Config(ConfigError),
    /// Resume was requested but the checkpoint could not be restored.
    Checkpoint(CheckpointError),
    /// An existing action log could not be read.
    ActionLog(ActionLogError),
}

impl fmt::Display for TrainingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrainingError::Config(e) => write!(f, "invalid configuration: {}", e),
            TrainingError::Checkpoint(e) => write!(f, "cannot resume: {}", e),
            TrainingError::ActionLog(e) => write!(f, "cannot resume action log: {}", e),
        }
    }
}

impl std::error::Error for TrainingError {}

impl From<ConfigError> for TrainingError {
    fn from(e: ConfigError) -> Self {
        TrainingError::Config(e)
    }
}

impl From<CheckpointError> for TrainingError {
    fn from(e: CheckpointError) -> Self {
        TrainingError::Checkpoint(e)
    }
}

impl From<ActionLogError> for TrainingError {
    fn from(e: ActionLogError) -> Self {
        TrainingError::ActionLog(e)
    }
}

/// A worker that ended with an error or panicked.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerFailure {
    pub worker_id: usize,
    pub error: String,
}

/// Outcome of a finished run.
#[derive(Debug, Clone, Default)]
pub struct TrainingSummary {
    /// Global counters after every worker stopped
    pub counters: CounterSnapshot,
    /// Counters the run started from (non-zero after a resume)
    pub resumed_from: CounterSnapshot,
    /// Episodes reported during this run
    pub episodes_reported: u64,
    /// Mean total reward of the reported episodes
    pub mean_reward: f32,
    /// Checkpoints written during this run
    pub checkpoints_saved: u64,
    pub shutdowns: Vec<ShutdownReport>,
    pub failures: Vec<WorkerFailure>,
    pub elapsed: Duration,
}

impl TrainingSummary {
    /// Whether every worker shut down cleanly.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Runs `n_workers` A3C workers against one shared estimator.
pub struct WorkerPool<E: Estimator + ?Sized + 'static> {
    config: Arc<TrainingConfig>,
    estimator: Arc<E>,
    logger: Option<Box<dyn MetricsLogger>>,
}

impl<E: Estimator + ?Sized + 'static> WorkerPool<E> {
    pub fn new(config: TrainingConfig, estimator: Arc<E>) -> Self {
        Self {
            config: Arc::new(config),
            estimator,
            logger: None,
        }
    }

    /// Receive every finished episode.
    pub fn with_logger<L: MetricsLogger + 'static>(mut self, logger: L) -> Self {
        self.logger = Some(Box::new(logger));
        self
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Run until the step budget is spent or a stop is requested.
    ///
    /// `env_factory` is called on the worker's own thread with the worker id.
    pub fn run<F, Env>(&mut self, env_factory: F) -> Result<TrainingSummary, TrainingError>
    where
        F: Fn(usize) -> Result<Env, EnvError> + Send + Sync + 'static,
        Env: Environment + 'static,
    {
        self.config.validate()?;
        let config = Arc::clone(&self.config);
        let n_workers = config.effective_workers();

        let state = training_state(config.max_steps);
        let registry = Arc::new(ActionLogRegistry::new(&config.log_dir, config.retention));
        let checkpoints = Arc::new(CheckpointManager::new(
            CheckpointConfig::from_training(&config),
            config.resolution,
            Arc::clone(&registry),
        ));

        let logs = self.prepare(&state, &registry, &checkpoints, n_workers)?;
        let resumed_from = state.snapshot();

        let ctx = WorkerContext {
            config: Arc::clone(&config),
            estimator: Arc::clone(&self.estimator),
            state: Arc::clone(&state),
            checkpoints,
        };

        log::info!(
            "Starting {} workers ({:?}) at step {}/{}",
            n_workers,
            config.mode,
            resumed_from.steps,
            config.max_steps
        );

        let start_time = Instant::now();
        let mut summary = TrainingSummary {
            resumed_from,
            ..Default::default()
        };
        let (report_tx, report_rx) = unbounded();
        let env_factory = Arc::new(env_factory);
        let mut handles: Vec<(usize, JoinHandle<()>)> = Vec::with_capacity(n_workers);

        for (worker_id, action_log) in logs.into_iter().enumerate() {
            if worker_id > 0 && config.start_stagger_ms > 0 {
                std::thread::sleep(Duration::from_millis(config.start_stagger_ms));
            }

            let ctx = ctx.clone();
            let env_factory = Arc::clone(&env_factory);
            let reports = report_tx.clone();

            let spawned = std::thread::Builder::new()
                .name(format!("A3C-Worker-{}", worker_id))
                .spawn(move || {
                    Self::worker_thread(worker_id, ctx, action_log, env_factory, reports)
                });

            match spawned {
                Ok(handle) => handles.push((worker_id, handle)),
                Err(e) => {
                    log::error!("Failed to spawn worker {}: {}", worker_id, e);
                    summary.failures.push(WorkerFailure {
                        worker_id,
                        error: format!("spawn failed: {}", e),
                    });
                    state.request_stop();
                    break;
                }
            }
        }
        drop(report_tx);

        let mut reward_sum = 0.0f64;
        for report in report_rx.iter() {
            match report {
                WorkerReport::EpisodeFinished(episode) => {
                    summary.episodes_reported += 1;
                    reward_sum += episode.total_reward as f64;
                    if episode.checkpointed {
                        summary.checkpoints_saved += 1;
                    }
                    if let Some(logger) = self.logger.as_mut() {
                        logger.log(&episode);
                    }
                }
                WorkerReport::Stopped(report) => summary.shutdowns.push(report),
                WorkerReport::Failed { worker_id, error } => {
                    self.on_failure(&state, worker_id);
                    summary.failures.push(WorkerFailure { worker_id, error });
                }
            }
        }

        for (worker_id, handle) in handles {
            if handle.join().is_err() {
                log::error!("Worker {} panicked", worker_id);
                self.on_failure(&state, worker_id);
                summary.failures.push(WorkerFailure {
                    worker_id,
                    error: "worker thread panicked".to_string(),
                });
            }
        }

        if let Some(logger) = self.logger.as_mut() {
            logger.flush();
        }

        if summary.episodes_reported > 0 {
            summary.mean_reward = (reward_sum / summary.episodes_reported as f64) as f32;
        }
        summary.counters = state.snapshot();
        summary.elapsed = start_time.elapsed();

        log::info!(
            "Training finished in {:.1}s: {} steps, {} episodes, {} worker failures",
            summary.elapsed.as_secs_f32(),
            summary.counters.steps,
            summary.counters.episodes,
            summary.failures.len()
        );
        Ok(summary)
    }

    /// Restore or create every worker's action log, restoring the
    /// checkpoint first when resuming.
    fn prepare(
        &self,
        state: &SharedTrainingState,
        registry: &ActionLogRegistry,
        checkpoints: &CheckpointManager,
        n_workers: usize,
    ) -> Result<Vec<SharedActionLog>, TrainingError> {
        if !self.config.resume {
            return Ok((0..n_workers).map(|id| registry.register(id)).collect());
        }

        checkpoints.restore(&*self.estimator, state)?;
        (0..n_workers)
            .map(|id| registry.restore(id).map_err(TrainingError::from))
            .collect()
    }

    fn on_failure(&self, state: &SharedTrainingState, worker_id: usize) {
        if self.config.stop_on_worker_failure && !state.stop_requested() {
            log::warn!("Worker {} failed, stopping the remaining workers", worker_id);
            state.request_stop();
        }
    }

    fn worker_thread<F, Env>(
        worker_id: usize,
        ctx: WorkerContext<E>,
        action_log: SharedActionLog,
        env_factory: Arc<F>,
        reports: crossbeam_channel::Sender<WorkerReport>,
    ) where
        F: Fn(usize) -> Result<Env, EnvError>,
        Env: Environment,
    {
        let mut env = match env_factory(worker_id) {
            Ok(env) => env,
            Err(e) => {
                log::error!("Worker {} could not create its environment: {}", worker_id, e);
                Self::report(
                    &reports,
                    WorkerReport::Failed {
                        worker_id,
                        error: e.to_string(),
                    },
                );
                return;
            }
        };

        let mut worker = A3CWorker::new(worker_id, ctx, action_log);
        let report = match worker.run(&mut env, &reports) {
            Ok(shutdown) => WorkerReport::Stopped(shutdown),
            Err(e) => {
                log::error!("Worker {} failed: {}", worker_id, e);
                WorkerReport::Failed {
                    worker_id,
                    error: e.to_string(),
                }
            }
        };
        Self::report(&reports, report);
    }

    fn report(reports: &crossbeam_channel::Sender<WorkerReport>, report: WorkerReport) {
        let worker_id = report.worker_id();
        if reports.send(report).is_err() {
            log::debug!("Worker {}: report receiver is gone", worker_id);
        }
    }
}
