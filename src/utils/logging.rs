//! Logging Module
//!
//! Structured logging through the `tracing` crate, plus the progress
//! helpers used by the training and evaluation loops.

use std::time::Instant;

use indicatif::{ProgressBar, ProgressStyle};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Minimum log level to display
    pub level: LogLevel,
    /// Whether to include target (module path)
    pub include_target: bool,
    /// Whether to include thread IDs
    pub include_thread_ids: bool,
    /// Whether to use ANSI colors
    pub ansi_colors: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            include_target: false,
            include_thread_ids: false,
            ansi_colors: true,
        }
    }
}

impl LogConfig {
    /// Verbose config for debugging: debug level with module targets
    pub fn verbose() -> Self {
        Self {
            level: LogLevel::Debug,
            include_target: true,
            include_thread_ids: true,
            ansi_colors: true,
        }
    }
}

/// Log level enum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Convert to tracing Level
    pub fn to_tracing_level(&self) -> Level {
        match self {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "TRACE"),
            LogLevel::Debug => write!(f, "DEBUG"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warn => write!(f, "WARN"),
            LogLevel::Error => write!(f, "ERROR"),
        }
    }
}

/// Install the global tracing subscriber
///
/// Fails if a global subscriber was already set.
pub fn init_logging(config: &LogConfig) -> Result<(), String> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(config.level.to_tracing_level())
        .with_ansi(config.ansi_colors)
        .with_target(config.include_target)
        .with_thread_ids(config.include_thread_ids)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| format!("Failed to initialize logging: {}", e))?;

    Ok(())
}

/// Progress bar for one pass over a loader
///
/// Shows running loss and accuracy in the bar message.
pub fn batch_progress(label: &str, num_batches: usize) -> ProgressBar {
    let pb = ProgressBar::new(num_batches as u64);
    let style = ProgressStyle::default_bar()
        .template("  {spinner:.green} {prefix} [{bar:30.cyan/blue}] {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
    pb.set_style(style);
    pb.set_prefix(label.to_string());
    pb
}

/// Epoch timing logger shared by the supervised and adaptation loops
pub struct TrainingLogger {
    stage: String,
    epoch: usize,
    total_epochs: usize,
    epoch_start: Instant,
    training_start: Instant,
}

impl TrainingLogger {
    pub fn new(stage: &str, total_epochs: usize) -> Self {
        Self {
            stage: stage.to_string(),
            epoch: 0,
            total_epochs,
            epoch_start: Instant::now(),
            training_start: Instant::now(),
        }
    }

    /// Log start of an epoch (0-based index)
    pub fn start_epoch(&mut self, epoch: usize) {
        self.epoch = epoch;
        self.epoch_start = Instant::now();

        tracing::debug!("{} epoch {}/{} started", self.stage, epoch + 1, self.total_epochs);
    }

    /// Log end of an epoch with its headline metrics
    pub fn end_epoch(&self, loss: f64, accuracy: f64, learning_rate: f64) {
        let epoch_time = self.epoch_start.elapsed();
        let total_time = self.training_start.elapsed();

        let epochs_remaining = self.total_epochs.saturating_sub(self.epoch + 1);
        let avg_epoch_time = total_time.as_secs_f64() / (self.epoch + 1) as f64;
        let eta_secs = epochs_remaining as f64 * avg_epoch_time;

        tracing::info!(
            stage = %self.stage,
            epoch = self.epoch + 1,
            loss,
            accuracy,
            lr = learning_rate,
            "epoch completed in {:.1}s, ETA {:.0}s",
            epoch_time.as_secs_f64(),
            eta_secs
        );
    }

    pub fn log_new_best(&self, accuracy: f64) {
        tracing::info!(stage = %self.stage, "new best model: {:.2}%", accuracy);
    }

    pub fn log_complete(&self, best_accuracy: Option<f64>) {
        let total_time = self.training_start.elapsed();

        match best_accuracy {
            Some(best) => tracing::info!(
                "{} complete: {} epochs in {}, best accuracy {:.2}%",
                self.stage,
                self.total_epochs,
                super::format_duration(total_time.as_secs_f64()),
                best
            ),
            None => tracing::info!(
                "{} complete: {} epochs in {}",
                self.stage,
                self.total_epochs,
                super::format_duration(total_time.as_secs_f64())
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_config_presets() {
        assert_eq!(LogConfig::default().level, LogLevel::Info);
        assert_eq!(LogConfig::verbose().level, LogLevel::Debug);
        assert_eq!(LogLevel::Warn.to_string(), "WARN");
    }

    #[test]
    fn test_batch_progress_length() {
        let pb = batch_progress("train", 12);
        assert_eq!(pb.length(), Some(12));
        pb.finish_and_clear();
    }

    #[test]
    fn test_training_logger_tracks_epoch() {
        let mut logger = TrainingLogger::new("pretrain", 3);
        logger.start_epoch(2);
        assert_eq!(logger.epoch, 2);
        logger.end_epoch(0.5, 80.0, 1e-4);
    }
}
