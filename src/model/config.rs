//! Experiment Configuration Module
//!
//! Defines the configuration for every stage of the pipeline: data locations,
//! classifier hyperparameters, supervised pretraining, domain adaptation and
//! evaluation. Defaults reproduce the reference experiment.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::utils::error::{Result, Synth2RealError};

/// Filesystem layout of inputs and outputs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Labeled synthetic training images, one sub-directory per class
    pub synthetic_train: PathBuf,
    /// Labeled synthetic validation images, one sub-directory per class
    pub synthetic_val: PathBuf,
    /// Labeled real test images, one sub-directory per class
    pub real_test: PathBuf,
    /// Unlabeled real images (flat directory)
    pub unlabeled: PathBuf,
    /// Directory receiving checkpoints, plots and histories
    pub output_dir: PathBuf,
    /// File stem of the best-validation checkpoint
    pub checkpoint_name: String,
    /// File stem of the model saved after domain adaptation
    pub adapted_model_name: String,
    /// Stem of the supervised training curves
    pub training_plot: String,
    /// Stem of the domain adaptation curves
    pub adaptation_plot: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            synthetic_train: PathBuf::from("data/image1000/synthetic_dataset/train"),
            synthetic_val: PathBuf::from("data/image1000/synthetic_dataset/val"),
            real_test: PathBuf::from("data/stl10_png/labeled_test"),
            unlabeled: PathBuf::from("data/stl10_png/unlabeled"),
            output_dir: PathBuf::from("output"),
            checkpoint_name: "best_model".to_string(),
            adapted_model_name: "adapted_model".to_string(),
            training_plot: "training_curves".to_string(),
            adaptation_plot: "domain_adaptation_cdan_consistency".to_string(),
        }
    }
}

impl PathsConfig {
    /// Re-root the four data directories under `root`, keeping their layout
    pub fn with_data_root(mut self, root: &Path) -> Self {
        self.synthetic_train = root.join("image1000/synthetic_dataset/train");
        self.synthetic_val = root.join("image1000/synthetic_dataset/val");
        self.real_test = root.join("stl10_png/labeled_test");
        self.unlabeled = root.join("stl10_png/unlabeled");
        self
    }

    pub fn checkpoint_path(&self) -> PathBuf {
        self.output_dir.join(&self.checkpoint_name)
    }

    pub fn adapted_model_path(&self) -> PathBuf {
        self.output_dir.join(&self.adapted_model_name)
    }
}

/// Classifier hyperparameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Number of output classes
    pub num_classes: usize,
    /// Input image size (width and height, square)
    pub image_size: usize,
    /// Dropout rate in front of the classification head
    pub dropout_rate: f64,
    /// Optional burn record holding backbone weights to start from
    pub pretrained_backbone: Option<PathBuf>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            num_classes: crate::NUM_CLASSES,
            image_size: crate::IMAGE_SIZE,
            dropout_rate: 0.3,
            pretrained_backbone: None,
        }
    }
}

impl ModelConfig {
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.num_classes < 2 {
            return Err("num_classes must be at least 2".to_string());
        }

        if self.image_size < 8 {
            return Err("image_size must be at least 8".to_string());
        }

        if !(0.0..1.0).contains(&self.dropout_rate) {
            return Err("dropout_rate must be in range [0.0, 1.0)".to_string());
        }

        Ok(())
    }
}

/// Supervised pretraining hyperparameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    pub batch_size: usize,
    pub epochs: usize,
    pub learning_rate: f64,
    /// Decoupled (AdamW) weight decay
    pub weight_decay: f64,
    /// Minimum learning rate reached by the cosine schedule
    pub min_learning_rate: f64,
    /// Seed for weight init, shuffling and augmentation
    pub seed: u64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            batch_size: 128,
            epochs: 20,
            learning_rate: 1e-4,
            weight_decay: 1e-5,
            min_learning_rate: 0.0,
            seed: 0,
        }
    }
}

impl TrainingConfig {
    /// Tiny settings for smoke runs
    pub fn quick() -> Self {
        Self {
            batch_size: 8,
            epochs: 1,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.batch_size == 0 {
            return Err("batch_size must be greater than 0".to_string());
        }

        if self.epochs == 0 {
            return Err("epochs must be greater than 0".to_string());
        }

        if self.learning_rate <= 0.0 {
            return Err("learning_rate must be positive".to_string());
        }

        if self.weight_decay < 0.0 {
            return Err("weight_decay must not be negative".to_string());
        }

        if self.min_learning_rate < 0.0 || self.min_learning_rate > self.learning_rate {
            return Err("min_learning_rate must be in range [0, learning_rate]".to_string());
        }

        Ok(())
    }
}

/// Domain adaptation hyperparameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdaptationConfig {
    /// Sharpened confidence a pseudo-label must strictly exceed
    pub confidence_threshold: f32,
    /// Softmax temperature used when pseudo-labeling (< 1 sharpens)
    pub temperature: f32,
    pub epochs: usize,
    pub batch_size: usize,
    /// Learning rate of the classifier during adaptation
    pub learning_rate: f64,
    pub weight_decay: f64,
    /// Learning rate of the domain discriminator (Adam, no decay)
    pub discriminator_learning_rate: f64,
    /// Gradient reversal factor
    pub adversarial_lambda: f64,
    /// Weight of the symmetric KL consistency term
    pub consistency_weight: f64,
    pub discriminator_hidden: usize,
    pub discriminator_dropout: f64,
    /// Seed for discriminator init, shuffling and augmentation
    pub seed: u64,
}

impl Default for AdaptationConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: crate::DEFAULT_CONFIDENCE_THRESHOLD,
            temperature: crate::DEFAULT_TEMPERATURE,
            epochs: 20,
            batch_size: 128,
            learning_rate: 1e-4,
            weight_decay: 1e-5,
            discriminator_learning_rate: 1e-4,
            adversarial_lambda: 1.0,
            consistency_weight: 0.5,
            discriminator_hidden: 1024,
            discriminator_dropout: 0.5,
            seed: 0,
        }
    }
}

impl AdaptationConfig {
    /// Tiny settings for smoke runs
    pub fn quick() -> Self {
        Self {
            epochs: 1,
            batch_size: 8,
            discriminator_hidden: 64,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        if !(self.confidence_threshold > 0.0 && self.confidence_threshold < 1.0) {
            return Err("confidence_threshold must be in range (0.0, 1.0)".to_string());
        }

        if self.temperature <= 0.0 {
            return Err("temperature must be positive".to_string());
        }

        if self.epochs == 0 || self.batch_size == 0 {
            return Err("epochs and batch_size must be greater than 0".to_string());
        }

        if self.learning_rate <= 0.0 || self.discriminator_learning_rate <= 0.0 {
            return Err("learning rates must be positive".to_string());
        }

        if self.adversarial_lambda < 0.0 || self.consistency_weight < 0.0 {
            return Err("loss weights must not be negative".to_string());
        }

        if self.discriminator_hidden == 0 {
            return Err("discriminator_hidden must be greater than 0".to_string());
        }

        if !(0.0..1.0).contains(&self.discriminator_dropout) {
            return Err("discriminator_dropout must be in range [0.0, 1.0)".to_string());
        }

        Ok(())
    }
}

/// Evaluation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationConfig {
    /// Use five-crop test-time augmentation on the real test set
    pub tta: bool,
    /// Side of each of the five crops
    pub tta_crop_size: usize,
    pub batch_size: usize,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            tta: true,
            tta_crop_size: crate::IMAGE_SIZE,
            batch_size: 128,
        }
    }
}

impl EvaluationConfig {
    pub fn validate(&self, image_size: usize) -> std::result::Result<(), String> {
        if self.tta_crop_size == 0 || self.tta_crop_size > image_size {
            return Err(format!(
                "tta_crop_size must be in range [1, {}]",
                image_size
            ));
        }

        Ok(())
    }
}

/// Full experiment configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExperimentConfig {
    pub paths: PathsConfig,
    pub model: ModelConfig,
    pub training: TrainingConfig,
    pub adaptation: AdaptationConfig,
    pub evaluation: EvaluationConfig,
}

impl ExperimentConfig {
    /// Tiny settings for smoke runs on toy folders
    pub fn quick() -> Self {
        Self {
            training: TrainingConfig::quick(),
            adaptation: AdaptationConfig::quick(),
            evaluation: EvaluationConfig {
                batch_size: 8,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Check every section, reporting the first invalid value
    pub fn validate(&self) -> Result<()> {
        self.model
            .validate()
            .and_then(|_| self.training.validate())
            .and_then(|_| self.adaptation.validate())
            .and_then(|_| self.evaluation.validate(self.model.image_size))
            .map_err(Synth2RealError::Config)
    }

    /// Save configuration to a JSON file
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_reference_experiment() {
        let config = ExperimentConfig::default();

        assert_eq!(config.model.num_classes, 3);
        assert_eq!(config.model.image_size, 96);
        assert_eq!(config.model.dropout_rate, 0.3);
        assert_eq!(config.training.batch_size, 128);
        assert_eq!(config.training.epochs, 20);
        assert_eq!(config.training.learning_rate, 1e-4);
        assert_eq!(config.training.weight_decay, 1e-5);
        assert_eq!(config.adaptation.confidence_threshold, 0.99);
        assert_eq!(config.adaptation.temperature, 0.3);
        assert_eq!(config.adaptation.adversarial_lambda, 1.0);
        assert_eq!(config.adaptation.consistency_weight, 0.5);
        assert_eq!(config.evaluation.tta_crop_size, 96);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_model_config_validation() {
        let mut config = ModelConfig::default();
        assert!(config.validate().is_ok());

        config.dropout_rate = 1.0;
        assert!(config.validate().is_err());

        config.dropout_rate = 0.3;
        config.num_classes = 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_adaptation_config_validation() {
        let mut config = AdaptationConfig::default();

        config.confidence_threshold = 1.0;
        assert!(config.validate().is_err());

        config.confidence_threshold = 0.99;
        config.temperature = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_tta_crop_cannot_exceed_image() {
        let mut config = ExperimentConfig::default();
        config.evaluation.tta_crop_size = 128;

        let err = config.validate().unwrap_err();
        assert!(matches!(err, Synth2RealError::Config(_)));
    }

    #[test]
    fn test_data_root_keeps_layout() {
        let paths = PathsConfig::default().with_data_root(Path::new("/datasets"));
        assert_eq!(
            paths.unlabeled,
            PathBuf::from("/datasets/stl10_png/unlabeled")
        );
        assert_eq!(paths.checkpoint_path(), PathBuf::from("output/best_model"));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("experiment.json");

        let mut config = ExperimentConfig::quick();
        config.adaptation.temperature = 0.5;
        config.save(&path).unwrap();

        let loaded = ExperimentConfig::load(&path).unwrap();
        assert_eq!(loaded.adaptation.temperature, 0.5);
        assert_eq!(loaded.training.batch_size, 8);
    }
}
