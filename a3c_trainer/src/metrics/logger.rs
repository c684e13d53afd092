//! Episode loggers.
//!
//! The pool hands every [`EpisodeSummary`] it receives to one
//! [`MetricsLogger`].

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::Instant;

use crate::messages::EpisodeSummary;

/// Logger trait for different logging backends.
pub trait MetricsLogger: Send {
    /// Log a finished episode.
    fn log(&mut self, episode: &EpisodeSummary);

    /// Flush any buffered output.
    fn flush(&mut self);
}

/// Console logger printing one table row every `log_interval` global episodes.
pub struct ConsoleLogger {
    log_interval: u64,
    last_logged: Option<u64>,
    start_time: Instant,
    show_header: bool,
}

impl ConsoleLogger {
    pub fn new(log_interval: u64) -> Self {
        Self {
            log_interval: log_interval.max(1),
            last_logged: None,
            start_time: Instant::now(),
            show_header: true,
        }
    }

    /// Reset the start time.
    pub fn reset_timer(&mut self) {
        self.start_time = Instant::now();
    }

    fn due(&self, episode: u64) -> bool {
        match self.last_logged {
            None => true,
            Some(last) => episode >= last + self.log_interval,
        }
    }

    fn print_header(&self) {
        println!(
            "{:>8} {:>6} {:>10} {:>10} {:>8} {:>8} {:>10} {:>10} {:>8}",
            "Episode", "Worker", "Steps", "Reward", "ResA", "ResB", "Policy", "Value", "SPS"
        );
        println!("{}", "-".repeat(86));
    }
}

impl MetricsLogger for ConsoleLogger {
    fn log(&mut self, episode: &EpisodeSummary) {
        if !self.due(episode.global_episode) {
            return;
        }

        if self.show_header {
            self.print_header();
            self.show_header = false;
        }

        let elapsed = self.start_time.elapsed().as_secs_f32();
        let sps = if elapsed > 0.0 {
            episode.global_steps as f32 / elapsed
        } else {
            0.0
        };

        println!(
            "{:>8} {:>6} {:>10} {:>10.2} {:>8} {:>8} {:>10.4} {:>10.4} {:>8.0}",
            episode.global_episode,
            episode.worker_id,
            episode.global_steps,
            episode.total_reward,
            episode.primary_resource,
            episode.secondary_resource,
            episode.policy_loss,
            episode.value_loss,
            sps
        );

        self.last_logged = Some(episode.global_episode);
    }

    fn flush(&mut self) {}
}

/// CSV file logger, one row per finished episode.
pub struct CSVLogger {
    writer: BufWriter<File>,
    start_time: Instant,
}

impl CSVLogger {
    pub const HEADER: &'static str = "global_episode,worker_id,local_episode,global_steps,episode_steps,total_reward,primary_resource,secondary_resource,policy_loss,value_loss,learning_rate,duration_secs,elapsed_secs";

    /// Create the file at `path` and write the header.
    pub fn new(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        writeln!(writer, "{}", Self::HEADER)?;

        Ok(Self {
            writer,
            start_time: Instant::now(),
        })
    }

    /// Reset the start time.
    pub fn reset_timer(&mut self) {
        self.start_time = Instant::now();
    }
}

impl MetricsLogger for CSVLogger {
    fn log(&mut self, episode: &EpisodeSummary) {
        let elapsed = self.start_time.elapsed().as_secs_f32();
        let _ = writeln!(
            self.writer,
            "{},{},{},{},{},{:.4},{},{},{:.6},{:.6},{:.8},{:.3},{:.2}",
            episode.global_episode,
            episode.worker_id,
            episode.local_episode,
            episode.global_steps,
            episode.episode_steps,
            episode.total_reward,
            episode.primary_resource,
            episode.secondary_resource,
            episode.policy_loss,
            episode.value_loss,
            episode.learning_rate,
            episode.duration.as_secs_f32(),
            elapsed
        );
    }

    fn flush(&mut self) {
        let _ = self.writer.flush();
    }
}

impl Drop for CSVLogger {
    fn drop(&mut self) {
        self.flush();
    }
}

/// Multi-logger that writes to multiple backends.
pub struct MultiLogger {
    loggers: Vec<Box<dyn MetricsLogger>>,
}

impl MultiLogger {
    pub fn new() -> Self {
        Self {
            loggers: Vec::new(),
        }
    }

    /// Add a logger.
    pub fn add<L: MetricsLogger + 'static>(mut self, logger: L) -> Self {
        self.loggers.push(Box::new(logger));
        self
    }

    pub fn len(&self) -> usize {
        self.loggers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loggers.is_empty()
    }
}

impl Default for MultiLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsLogger for MultiLogger {
    fn log(&mut self, episode: &EpisodeSummary) {
        for logger in &mut self.loggers {
            logger.log(episode);
        }
    }

    fn flush(&mut self) {
        for logger in &mut self.loggers {
            logger.flush();
        }
    }
}
