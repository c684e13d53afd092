//! Step and episode counters shared by every worker.
//!
//! Both counters live behind one `parking_lot::Mutex` that is held only for
//! the read-modify-write itself. Updates, logging and checkpointing happen
//! outside the lock.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Point-in-time copy of the global counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterSnapshot {
    /// Environment steps taken across all workers
    pub steps: u64,
    /// Episodes completed across all workers
    pub episodes: u64,
}

/// Result of registering a finished episode.
///
/// `episode` is unique across workers: no other worker observes the same
/// post-increment value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EpisodeTicket {
    /// Episode counter before the increment
    pub previous_episode: u64,
    /// Episode counter after the increment; the id of this episode
    pub episode: u64,
    /// Step counter observed under the same lock
    pub steps: u64,
}

/// Global training counters.
///
/// Counters never decrease. `restore` is only meant for startup and refuses to
/// move either counter backwards.
#[derive(Debug)]
pub struct GlobalTrainingState {
    counters: Mutex<CounterSnapshot>,
    max_steps: u64,
    stop_requested: AtomicBool,
}

impl GlobalTrainingState {
    /// Create counters starting at zero.
    pub fn new(max_steps: u64) -> Self {
        Self {
            counters: Mutex::new(CounterSnapshot::default()),
            max_steps,
            stop_requested: AtomicBool::new(false),
        }
    }

    /// Raise the counters to a checkpointed snapshot.
    pub fn restore(&self, snapshot: CounterSnapshot) {
        let mut counters = self.counters.lock();
        counters.steps = counters.steps.max(snapshot.steps);
        counters.episodes = counters.episodes.max(snapshot.episodes);
    }

    /// Claim the next step of the budget.
    ///
    /// Returns the new step counter, or `None` once the budget is spent or a
    /// stop was requested. Concurrent claimants never push the counter past
    /// `max_steps`.
    pub fn try_record_step(&self) -> Option<u64> {
        if self.stop_requested() {
            return None;
        }
        let mut counters = self.counters.lock();
        if counters.steps >= self.max_steps {
            return None;
        }
        counters.steps += 1;
        Some(counters.steps)
    }

    /// Count one finished episode.
    pub fn record_episode(&self) -> EpisodeTicket {
        let mut counters = self.counters.lock();
        let previous_episode = counters.episodes;
        counters.episodes += 1;
        EpisodeTicket {
            previous_episode,
            episode: counters.episodes,
            steps: counters.steps,
        }
    }

    /// Read both counters consistently.
    pub fn snapshot(&self) -> CounterSnapshot {
        *self.counters.lock()
    }

    pub fn steps(&self) -> u64 {
        self.counters.lock().steps
    }

    pub fn episodes(&self) -> u64 {
        self.counters.lock().episodes
    }

    pub fn max_steps(&self) -> u64 {
        self.max_steps
    }

    /// Fraction of the step budget used, in [0, 1].
    pub fn progress(&self) -> f64 {
        if self.max_steps == 0 {
            return 1.0;
        }
        (self.steps() as f64 / self.max_steps as f64).min(1.0)
    }

    /// Ask every worker to stop at its next step.
    pub fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
    }

    pub fn stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }
}

/// Shared global training state.
pub type SharedTrainingState = Arc<GlobalTrainingState>;

/// Create new shared training state starting at zero.
pub fn training_state(max_steps: u64) -> SharedTrainingState {
    Arc::new(GlobalTrainingState::new(max_steps))
}
