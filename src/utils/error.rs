//! Error Handling Module
//!
//! Defines the error type shared by the library stages.
//! Uses thiserror for ergonomic error definitions.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for synth2real operations
#[derive(Error, Debug)]
pub enum Synth2RealError {
    /// Error loading or decoding an image
    #[error("Failed to load image at '{0}': {1}")]
    ImageLoad(PathBuf, String),

    /// Error with dataset discovery or batching
    #[error("Dataset error: {0}")]
    Dataset(String),

    /// A data source that must contain samples is empty
    #[error("No images found in '{0}'")]
    EmptyDataset(PathBuf),

    /// Error with model construction or weights
    #[error("Model error: {0}")]
    Model(String),

    /// Error saving or loading a checkpoint
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Path not found
    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),
}

impl From<serde_json::Error> for Synth2RealError {
    fn from(err: serde_json::Error) -> Self {
        Synth2RealError::Serialization(err.to_string())
    }
}

/// Convenience Result type for synth2real operations
pub type Result<T> = std::result::Result<T, Synth2RealError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Synth2RealError::Dataset("class folder missing".to_string());
        assert_eq!(format!("{}", err), "Dataset error: class folder missing");
    }

    #[test]
    fn test_image_load_error() {
        let path = PathBuf::from("/data/real/cat_001.png");
        let err = Synth2RealError::ImageLoad(path, "truncated file".to_string());
        assert!(format!("{}", err).contains("cat_001.png"));
    }

    #[test]
    fn test_empty_dataset_names_directory() {
        let err = Synth2RealError::EmptyDataset(PathBuf::from("stl10_png/unlabeled"));
        assert_eq!(format!("{}", err), "No images found in 'stl10_png/unlabeled'");
    }

    #[test]
    fn test_json_error_converts() {
        let parse: std::result::Result<serde_json::Value, _> = serde_json::from_str("{not json");
        let err: Synth2RealError = parse.unwrap_err().into();
        assert!(matches!(err, Synth2RealError::Serialization(_)));
    }
}
