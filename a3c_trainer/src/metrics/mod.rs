//! Episode metrics.
//!
//! ## Loggers
//!
//! - [`ConsoleLogger`]: interval-gated table on stdout
//! - [`CSVLogger`]: one CSV row per finished episode
//! - [`MultiLogger`]: combine multiple loggers

pub mod logger;

pub use logger::{CSVLogger, ConsoleLogger, MetricsLogger, MultiLogger};
