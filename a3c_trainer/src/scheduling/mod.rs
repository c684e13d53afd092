//! Learning rate scheduling.
//!
//! ## Example
//!
//! ```rust
//! use a3c_trainer::scheduling::{LinearDecay, LRScheduler};
//!
//! // 90% of the base rate is gone once 1M global steps are taken
//! let scheduler = LinearDecay::with_decay_share(1e-2, 0.9, 1_000_000);
//! assert!((scheduler.get_lr(500_000) - 5.5e-3).abs() < 1e-12);
//! ```

pub mod lr_scheduler;


pub use lr_scheduler::{LRScheduler, LinearDecay};
