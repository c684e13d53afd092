//! Per-worker episode history with bounded trace retention.
//!
//! Every finished episode leaves an [`EpisodeLogEntry`]. Summary fields are
//! kept forever; the step-by-step trace is kept only for retained episodes:
//!
//! ```text
//! retained = top-K by primary resource
//!          ∪ top-K by secondary resource
//!          ∪ K most recent local episodes
//! ```
//!
//! Rankings are stable with the newest entry placed first, so on equal
//! resource totals the newest episode wins a slot.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ActionLogError;
use crate::algorithms::UpdateReport;
use crate::config::ActionCatalog;
use crate::core::trajectory::TrajectoryBuffer;
use crate::core::transition::Transition;

/// One step of a retained trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub action_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_x: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_y: Option<usize>,
    pub random_action: bool,
    pub random_position: bool,
    pub primary_resource: i64,
    pub secondary_resource: i64,
}

impl StepRecord {
    pub fn from_transition(transition: &Transition, catalog: &ActionCatalog) -> Self {
        let action_name = catalog
            .by_id(transition.action_id)
            .map(|spec| spec.name.clone())
            .unwrap_or_else(|| format!("action_{}", transition.action_id));
        Self {
            action_name,
            target_x: transition.target.map(|t| t.x),
            target_y: transition.target.map(|t| t.y),
            random_action: transition.random_action,
            random_position: transition.random_position,
            primary_resource: transition.resources.primary(),
            secondary_resource: transition.resources.secondary(),
        }
    }
}

/// JSON has no NaN or infinity; serde_json writes them as `null`.
fn non_finite_as_nan<'de, D: serde::Deserializer<'de>>(deserializer: D) -> Result<f32, D::Error> {
    Ok(Option::<f32>::deserialize(deserializer)?.unwrap_or(f32::NAN))
}

/// Summary of one finished episode, plus its trace while retained.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeLogEntry {
    pub global_episode: u64,
    pub local_episode: u64,
    #[serde(deserialize_with = "non_finite_as_nan")]
    pub total_reward: f32,
    pub primary_resource: i64,
    pub secondary_resource: i64,
    /// Non-finite losses are written as `null` and read back as NaN.
    #[serde(deserialize_with = "non_finite_as_nan")]
    pub policy_loss: f32,
    #[serde(deserialize_with = "non_finite_as_nan")]
    pub value_loss: f32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub trace: Vec<StepRecord>,
}

impl EpisodeLogEntry {
    /// Entry for a finished trajectory. Resource totals are the counters of
    /// the last transition.
    pub fn from_trajectory(
        global_episode: u64,
        local_episode: u64,
        report: &UpdateReport,
        buffer: &TrajectoryBuffer,
        catalog: &ActionCatalog,
    ) -> Self {
        let (primary_resource, secondary_resource) = buffer
            .last()
            .map(|t| (t.resources.primary(), t.resources.secondary()))
            .unwrap_or((0, 0));
        Self {
            global_episode,
            local_episode,
            total_reward: report.total_reward,
            primary_resource,
            secondary_resource,
            policy_loss: report.policy_loss,
            value_loss: report.value_loss,
            trace: buffer
                .iter()
                .map(|t| StepRecord::from_transition(t, catalog))
                .collect(),
        }
    }

    /// Same summary without the trace.
    pub fn without_trace(&self) -> Self {
        Self {
            trace: Vec::new(),
            ..self.clone()
        }
    }

    pub fn has_trace(&self) -> bool {
        !self.trace.is_empty()
    }
}

/// Local episode indices whose traces are kept.
///
/// `episodes` must list candidates in ranking priority order: on equal
/// resource totals the earlier candidate wins.
pub fn retained_set(episodes: &[EpisodeLogEntry], k: usize) -> BTreeSet<u64> {
    let mut retained = BTreeSet::new();
    if k == 0 {
        return retained;
    }

    let mut by_primary: Vec<&EpisodeLogEntry> = episodes.iter().collect();
    by_primary.sort_by(|a, b| b.primary_resource.cmp(&a.primary_resource));
    retained.extend(by_primary.iter().take(k).map(|e| e.local_episode));

    let mut by_secondary: Vec<&EpisodeLogEntry> = episodes.iter().collect();
    by_secondary.sort_by(|a, b| b.secondary_resource.cmp(&a.secondary_resource));
    retained.extend(by_secondary.iter().take(k).map(|e| e.local_episode));

    let recent: BTreeSet<u64> = episodes.iter().map(|e| e.local_episode).collect();
    retained.extend(recent.iter().rev().take(k));

    retained
}

/// Serialized form of a store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionLogDocument {
    pub worker_id: usize,
    pub episodes: Vec<EpisodeLogEntry>,
}

/// Episode history of one worker.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionLogStore {
    worker_id: usize,
    retention: usize,
    episodes: Vec<EpisodeLogEntry>,
}

impl ActionLogStore {
    pub fn new(worker_id: usize, retention: usize) -> Self {
        Self {
            worker_id,
            retention,
            episodes: Vec::new(),
        }
    }

    pub fn worker_id(&self) -> usize {
        self.worker_id
    }

    pub fn retention(&self) -> usize {
        self.retention
    }

    /// Entries in append order.
    pub fn episodes(&self) -> &[EpisodeLogEntry] {
        &self.episodes
    }

    pub fn len(&self) -> usize {
        self.episodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.episodes.is_empty()
    }

    /// Highest local episode index recorded, 0 when empty.
    pub fn last_local_episode(&self) -> u64 {
        self.episodes
            .iter()
            .map(|e| e.local_episode)
            .max()
            .unwrap_or(0)
    }

    /// Local episode indices that currently carry a trace.
    pub fn traced_episodes(&self) -> BTreeSet<u64> {
        self.episodes
            .iter()
            .filter(|e| e.has_trace())
            .map(|e| e.local_episode)
            .collect()
    }

    /// Record a finished episode and prune traces outside the retained set.
    ///
    /// Returns whether the new entry kept its trace.
    pub fn append(&mut self, entry: EpisodeLogEntry) -> bool {
        let mut candidates = Vec::with_capacity(self.episodes.len() + 1);
        candidates.push(entry.clone());
        candidates.extend(self.episodes.iter().cloned());
        let retained = retained_set(&candidates, self.retention);

        let keep_new = retained.contains(&entry.local_episode);
        let mut pruned: Vec<EpisodeLogEntry> = self
            .episodes
            .iter()
            .map(|e| {
                if e.has_trace() && !retained.contains(&e.local_episode) {
                    e.without_trace()
                } else {
                    e.clone()
                }
            })
            .collect();
        pruned.push(if keep_new { entry } else { entry.without_trace() });

        self.episodes = pruned;
        keep_new
    }

    pub fn document(&self) -> ActionLogDocument {
        ActionLogDocument {
            worker_id: self.worker_id,
            episodes: self.episodes.clone(),
        }
    }

    pub fn to_json(&self) -> Result<String, ActionLogError> {
        Ok(serde_json::to_string_pretty(&self.document())?)
    }

    /// Parse a document.
    ///
    /// Episode records that do not parse are skipped; a document that is not
    /// a JSON object with an `episodes` array is an error.
    pub fn from_json(worker_id: usize, retention: usize, json: &str) -> Result<Self, ActionLogError> {
        let value: Value = serde_json::from_str(json)?;
        let records = value
            .get("episodes")
            .and_then(Value::as_array)
            .ok_or_else(|| ActionLogError::Parse("missing episodes array".to_string()))?;

        let mut episodes = Vec::with_capacity(records.len());
        for (i, record) in records.iter().enumerate() {
            match serde_json::from_value::<EpisodeLogEntry>(record.clone()) {
                Ok(entry) => episodes.push(entry),
                Err(e) => log::debug!(
                    "Skipping malformed episode record {} of worker {}: {}",
                    i,
                    worker_id,
                    e
                ),
            }
        }

        Ok(Self {
            worker_id,
            retention,
            episodes,
        })
    }

    /// Document path of `worker_id` under `dir`.
    pub fn path(dir: &Path, worker_id: usize) -> PathBuf {
        dir.join(format!("agent{:02}.json", worker_id))
    }

    /// Write the document, replacing any previous one atomically.
    pub fn save(&self, dir: &Path) -> Result<PathBuf, ActionLogError> {
        fs::create_dir_all(dir)?;
        let path = Self::path(dir, self.worker_id);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, self.to_json()?)?;
        fs::rename(&tmp, &path)?;
        Ok(path)
    }

    /// Read the document of `worker_id`, `None` if there is none.
    pub fn load(dir: &Path, worker_id: usize, retention: usize) -> Result<Option<Self>, ActionLogError> {
        let path = Self::path(dir, worker_id);
        match fs::read_to_string(&path) {
            Ok(json) => Self::from_json(worker_id, retention, &json).map(Some),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
