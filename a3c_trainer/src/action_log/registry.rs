//! Action logs of every worker, indexed by worker id.
//!
//! Each worker appends only to its own store. The checkpoint manager flushes
//! all of them, so stores sit behind a mutex that is uncontended outside
//! checkpoints.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use super::store::ActionLogStore;
use super::ActionLogError;

/// One worker's store, shared with the registry.
pub type SharedActionLog = Arc<Mutex<ActionLogStore>>;

#[derive(Debug)]
pub struct ActionLogRegistry {
    dir: PathBuf,
    retention: usize,
    logs: RwLock<BTreeMap<usize, SharedActionLog>>,
}

impl ActionLogRegistry {
    pub fn new(dir: impl Into<PathBuf>, retention: usize) -> Self {
        Self {
            dir: dir.into(),
            retention,
            logs: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Store of `worker_id`, created empty if the worker has none yet.
    pub fn register(&self, worker_id: usize) -> SharedActionLog {
        let mut logs = self.logs.write();
        Arc::clone(
            logs.entry(worker_id)
                .or_insert_with(|| Arc::new(Mutex::new(ActionLogStore::new(worker_id, self.retention)))),
        )
    }

    /// Load the document of `worker_id` from disk.
    ///
    /// A missing document is not an error: the worker starts from an empty
    /// store and zero local episodes.
    pub fn restore(&self, worker_id: usize) -> Result<SharedActionLog, ActionLogError> {
        let store = match ActionLogStore::load(&self.dir, worker_id, self.retention)? {
            Some(store) => {
                log::info!(
                    "Restored action log of worker {} ({} episodes)",
                    worker_id,
                    store.len()
                );
                store
            }
            None => {
                log::warn!(
                    "No action log for worker {} in {:?}; starting from zero episodes",
                    worker_id,
                    self.dir
                );
                ActionLogStore::new(worker_id, self.retention)
            }
        };

        let shared = Arc::new(Mutex::new(store));
        self.logs.write().insert(worker_id, Arc::clone(&shared));
        Ok(shared)
    }

    pub fn get(&self, worker_id: usize) -> Option<SharedActionLog> {
        self.logs.read().get(&worker_id).cloned()
    }

    /// Write every registered document. Returns how many were written.
    pub fn flush_all(&self) -> Result<usize, ActionLogError> {
        let logs: Vec<SharedActionLog> = self.logs.read().values().cloned().collect();
        for log in &logs {
            log.lock().save(&self.dir)?;
        }
        Ok(logs.len())
    }
}

/// Shared registry.
pub type SharedActionLogRegistry = Arc<ActionLogRegistry>;
