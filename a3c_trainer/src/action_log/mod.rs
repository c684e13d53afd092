//! Per-worker structured episode logs.
//!
//! - `store`: episode records, trace retention, JSON persistence
//! - `registry`: worker id → store, flushed on checkpoints

pub mod registry;
pub mod store;

#[cfg(test)]
mod tests;

use std::fmt;
use std::io;

pub use registry::{ActionLogRegistry, SharedActionLog, SharedActionLogRegistry};
pub use store::{retained_set, ActionLogDocument, ActionLogStore, EpisodeLogEntry, StepRecord};

/// Error raised while reading or writing an action log.
#[derive(Debug)]
pub enum ActionLogError {
    Io(io::Error),
    /// The document is not valid JSON or lacks its episode list.
    Parse(String),
}

impl fmt::Display for ActionLogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionLogError::Io(e) => write!(f, "action log IO error: {}", e),
            ActionLogError::Parse(e) => write!(f, "action log parse error: {}", e),
        }
    }
}

impl std::error::Error for ActionLogError {}

impl From<io::Error> for ActionLogError {
    fn from(e: io::Error) -> Self {
        ActionLogError::Io(e)
    }
}

impl From<serde_json::Error> for ActionLogError {
    fn from(e: serde_json::Error) -> Self {
        ActionLogError::Parse(e.to_string())
    }
}
