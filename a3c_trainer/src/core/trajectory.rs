//! Per-worker episode buffer.

use super::transition::Transition;

/// Ordered transitions of the current episode of one worker.
///
/// Append-only while the episode runs; consumed by the update and then
/// cleared at the episode boundary. Never shared between workers.
#[derive(Debug, Clone, Default)]
pub struct TrajectoryBuffer {
    transitions: Vec<Transition>,
}

impl TrajectoryBuffer {
    /// Create a new empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a buffer with pre-allocated capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            transitions: Vec::with_capacity(capacity),
        }
    }

    /// Append the transition of the step just taken.
    pub fn push(&mut self, transition: Transition) {
        self.transitions.push(transition);
    }

    pub fn len(&self) -> usize {
        self.transitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }

    /// Most recent transition.
    pub fn last(&self) -> Option<&Transition> {
        self.transitions.last()
    }

    /// Transitions in chronological order.
    pub fn as_slice(&self) -> &[Transition] {
        &self.transitions
    }

    pub fn iter(&self) -> impl Iterator<Item = &Transition> {
        self.transitions.iter()
    }

    /// Sum of the rewards recorded this episode.
    pub fn total_reward(&self) -> f32 {
        self.transitions.iter().map(|t| t.reward).sum()
    }

    /// Drop every transition, keeping the allocation for the next episode.
    pub fn clear(&mut self) {
        self.transitions.clear();
    }
}
