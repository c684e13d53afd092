//! Messages between worker threads and the pool.
//!
//! # Architecture
//!
//! ```text
//!    +----------+  +----------+       +----------+
//!    | Worker 0 |  | Worker 1 |  ...  | Worker N |
//!    +----------+  +----------+       +----------+
//!          \             |              /
//!           +---- WorkerReport channel +
//!                        |
//!                        v
//!                 +-------------+
//!                 | WorkerPool  | ──► MetricsLogger
//!                 +-------------+
//! ```
//!
//! Workers never wait on the pool: reports go over an unbounded channel.

mod worker_msg;

pub use worker_msg::{EpisodeSummary, ShutdownReason, ShutdownReport, WorkerReport};
