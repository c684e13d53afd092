//! Core types shared across the trainer.

pub mod global_state;
pub mod trajectory;
pub mod transition;

pub use global_state::{
    CounterSnapshot, EpisodeTicket, GlobalTrainingState, SharedTrainingState, training_state,
};
pub use trajectory::TrajectoryBuffer;
pub use transition::{FeatureState, ResourceSnapshot, SpatialTarget, Transition};
