//! Training checkpoints.
//!
//! ## Example
//!
//! ```rust,ignore
//! use a3c_trainer::checkpoint::{CheckpointConfig, CheckpointManager};
//!
//! let manager = CheckpointManager::new(
//!     CheckpointConfig::new("./saved_checkpoints").with_interval(500),
//!     config.resolution,
//!     logs,
//! );
//!
//! // After each finished episode:
//! if manager.should_save(ticket.episode) {
//!     manager.save(&estimator, state.snapshot())?;
//! }
//!
//! // On resume:
//! manager.restore(&estimator, &state)?;
//! ```

pub mod checkpointer;

pub use checkpointer::{CheckpointConfig, CheckpointError, CheckpointManager, CheckpointRecord};
