//! Learning rate schedules driven by the global step counter.
//!
//! Workers read the step counter once at the start of an update and ask the
//! schedule for the rate of the whole update, so schedules are pure functions
//! of the step.
//!
//! # Data Integrity
//!
//! Invalid inputs (NaN/Inf or negative rates, a decay share outside [0, 1])
//! trigger a panic in debug builds and are sanitized in release builds, so a
//! bad configuration never feeds NaN into the optimizer.

/// Learning rate scheduler trait.
pub trait LRScheduler: Send + Sync {
    /// Learning rate at global step `step`.
    fn get_lr(&self, step: u64) -> f64;
}

/// Linear decay from `start_lr` to `end_lr` over `total_steps`.
///
/// Past `total_steps` the rate stays at `end_lr`.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearDecay {
    start_lr: f64,
    end_lr: f64,
    total_steps: u64,
}

fn sanitize_lr(lr: f64) -> f64 {
    if lr.is_finite() && lr >= 0.0 {
        lr
    } else {
        0.0
    }
}

impl LinearDecay {
    /// Create a new linear decay scheduler.
    ///
    /// # Panics (debug only)
    ///
    /// Panics if a rate is non-finite or negative.
    pub fn new(start_lr: f64, end_lr: f64, total_steps: u64) -> Self {
        debug_assert!(
            start_lr.is_finite() && start_lr >= 0.0,
            "LinearDecay: start_lr must be finite and non-negative, got {}",
            start_lr
        );
        debug_assert!(
            end_lr.is_finite() && end_lr >= 0.0,
            "LinearDecay: end_lr must be finite and non-negative, got {}",
            end_lr
        );

        Self {
            start_lr: sanitize_lr(start_lr),
            end_lr: sanitize_lr(end_lr),
            total_steps,
        }
    }

    /// `base_lr * (1 - share * step / total_steps)`: a `share` of the base
    /// rate is removed by the time the step budget is spent.
    pub fn with_decay_share(base_lr: f64, share: f64, total_steps: u64) -> Self {
        debug_assert!(
            (0.0..=1.0).contains(&share),
            "LinearDecay: decay share must lie in [0, 1], got {}",
            share
        );
        let share = if (0.0..=1.0).contains(&share) { share } else { 0.0 };
        Self::new(base_lr, base_lr * (1.0 - share), total_steps)
    }

    pub fn start_lr(&self) -> f64 {
        self.start_lr
    }

    pub fn end_lr(&self) -> f64 {
        self.end_lr
    }

    pub fn total_steps(&self) -> u64 {
        self.total_steps
    }
}

impl LRScheduler for LinearDecay {
    fn get_lr(&self, step: u64) -> f64 {
        if self.total_steps == 0 {
            return self.end_lr;
        }

        let progress = (step as f64 / self.total_steps as f64).min(1.0);
        let lr = self.start_lr + (self.end_lr - self.start_lr) * progress;

        if lr.is_finite() {
            lr
        } else {
            self.end_lr
        }
    }
}
