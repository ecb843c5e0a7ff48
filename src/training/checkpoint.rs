//! Model persistence
//!
//! Checkpoints are burn `CompactRecorder` records (`<name>.mpk`) with an
//! optional JSON sidecar (`<name>.json`) describing when and why they were
//! written.

use std::path::{Path, PathBuf};

use burn::{
    module::Module,
    record::CompactRecorder,
    tensor::backend::Backend,
};
use chrono::Local;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::model::{Classifier, ClassifierConfig};
use crate::utils::error::{Result, Synth2RealError};

/// Sidecar written next to the best checkpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointMetadata {
    /// 1-based epoch that produced the checkpoint
    pub epoch: usize,
    pub val_accuracy: f64,
    pub val_loss: f64,
    pub saved_at: String,
}

impl CheckpointMetadata {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// Save a classifier record at `path` (the recorder adds the extension)
pub fn save_classifier<B: Backend>(model: &Classifier<B>, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    model
        .clone()
        .save_file(path, &CompactRecorder::new())
        .map_err(|e| Synth2RealError::Checkpoint(format!("Failed to save model to {:?}: {:?}", path, e)))
}

/// Build a classifier from `config` and load the record at `path` into it
pub fn load_classifier<B: Backend>(
    config: &ClassifierConfig,
    path: &Path,
    device: &B::Device,
) -> Result<Classifier<B>> {
    load_into(config.init::<B>(device), path, device)
}

/// Load the record at `path` into an existing classifier
pub fn load_into<B: Backend>(
    model: Classifier<B>,
    path: &Path,
    device: &B::Device,
) -> Result<Classifier<B>> {
    let model = model
        .load_file(path, &CompactRecorder::new(), device)
        .map_err(|e| {
            Synth2RealError::Checkpoint(format!("Failed to load model from {:?}: {:?}", path, e))
        })?;

    info!("Loaded model from {:?}", path);
    Ok(model)
}

/// Keeps the checkpoint of the best validation accuracy seen so far
///
/// A checkpoint is written only on strict improvement over the previous
/// best, which starts at 0.
#[derive(Debug, Clone)]
pub struct BestCheckpoint {
    path: PathBuf,
    best_accuracy: f64,
    best_epoch: Option<usize>,
}

impl BestCheckpoint {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            best_accuracy: 0.0,
            best_epoch: None,
        }
    }

    pub fn is_improvement(&self, accuracy: f64) -> bool {
        accuracy > self.best_accuracy
    }

    /// Save `model` if `accuracy` beats the best so far; returns whether it did
    pub fn update<B: Backend>(
        &mut self,
        model: &Classifier<B>,
        epoch: usize,
        accuracy: f64,
        loss: f64,
    ) -> Result<bool> {
        if !self.is_improvement(accuracy) {
            return Ok(false);
        }

        save_classifier(model, &self.path)?;

        let metadata = CheckpointMetadata {
            epoch,
            val_accuracy: accuracy,
            val_loss: loss,
            saved_at: Local::now().to_rfc3339(),
        };
        std::fs::write(self.metadata_path(), serde_json::to_string_pretty(&metadata)?)?;

        self.best_accuracy = accuracy;
        self.best_epoch = Some(epoch);
        Ok(true)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.path.with_extension("json")
    }

    pub fn best_accuracy(&self) -> f64 {
        self.best_accuracy
    }

    pub fn best_epoch(&self) -> Option<usize> {
        self.best_epoch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    fn tiny_model() -> Classifier<TestBackend> {
        ClassifierConfig::new().with_num_classes(2).init(&Default::default())
    }

    #[test]
    fn test_best_checkpoint_strict_improvement() {
        let dir = tempfile::tempdir().unwrap();
        let model = tiny_model();
        let mut best = BestCheckpoint::new(dir.path().join("best_model"));

        assert!(!best.update(&model, 1, 0.0, 1.0).unwrap());
        assert!(best.update(&model, 2, 50.0, 0.9).unwrap());
        assert!(!best.update(&model, 3, 50.0, 0.8).unwrap());
        assert!(best.update(&model, 4, 60.0, 0.7).unwrap());

        assert_eq!(best.best_epoch(), Some(4));
        assert_eq!(best.best_accuracy(), 60.0);
        assert!(dir.path().join("best_model.mpk").exists());

        let metadata = CheckpointMetadata::load(&best.metadata_path()).unwrap();
        assert_eq!(metadata.epoch, 4);
        assert_eq!(metadata.val_accuracy, 60.0);
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/model");
        let device = Default::default();
        let model = tiny_model();

        save_classifier(&model, &path).unwrap();
        let loaded: Classifier<TestBackend> =
            load_classifier(&ClassifierConfig::new().with_num_classes(2), &path, &device).unwrap();

        let input = burn::tensor::Tensor::<TestBackend, 4>::ones([1, 3, 8, 8], &device);
        let a: Vec<f32> = model.forward(input.clone()).into_data().to_vec().unwrap();
        let b: Vec<f32> = loaded.forward(input).into_data().to_vec().unwrap();
        for (x, y) in a.iter().zip(&b) {
            assert!((x - y).abs() < 1e-2);
        }
    }

    #[test]
    fn test_load_missing_checkpoint() {
        let err = load_classifier::<TestBackend>(
            &ClassifierConfig::new(),
            Path::new("/nonexistent/model"),
            &Default::default(),
        )
        .unwrap_err();
        assert!(matches!(err, Synth2RealError::Checkpoint(_)));
    }
}
