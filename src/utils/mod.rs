//! Utilities module for logging, charts, histories, and helper functions
//!
//! This module provides:
//! - Structured logging with tracing
//! - SVG training curves
//! - Per-epoch metric histories with JSON export
//! - Error handling types

pub mod charts;
pub mod error;
pub mod history;
pub mod logging;

pub use error::{Result, Synth2RealError};
pub use history::{AdaptationEpoch, AdaptationHistory, SupervisedEpoch, SupervisedHistory};
pub use logging::init_logging;

/// Format a duration in a human-readable way
pub fn format_duration(seconds: f64) -> String {
    if seconds < 60.0 {
        format!("{:.1}s", seconds)
    } else if seconds < 3600.0 {
        let minutes = (seconds / 60.0).floor();
        let secs = seconds % 60.0;
        format!("{}m {:.0}s", minutes as u32, secs)
    } else {
        let hours = (seconds / 3600.0).floor();
        let minutes = ((seconds % 3600.0) / 60.0).floor();
        format!("{}h {}m", hours as u32, minutes as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(30.5), "30.5s");
        assert_eq!(format_duration(90.0), "1m 30s");
        assert_eq!(format_duration(3661.0), "1h 1m");
    }
}
