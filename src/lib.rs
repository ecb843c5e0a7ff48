//! # synth2real
//!
//! Synthetic-to-real domain adaptation for image classification, built on
//! the Burn framework.
//!
//! ## Features
//!
//! - **Supervised pretraining** of a ResNet-18 on synthetic images
//! - **Pseudo-labeling** of unlabeled real images with temperature sharpening
//! - **CDAN** adversarial alignment with a spectrally normalised discriminator
//! - **Consistency regularization** between weak and strong views
//! - **Gap reporting** between synthetic validation and real test accuracy
//!
//! ## Modules
//!
//! - `dataset`: Folder discovery, augmentation, datasets and batchers
//! - `model`: ResNet-18 classifier, CDAN discriminator, gradient reversal, configuration
//! - `training`: Supervised and adaptation loops, evaluation, pseudo-labeling
//! - `utils`: Logging, charts, histories and errors
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use synth2real::model::ExperimentConfig;
//!
//! let config = ExperimentConfig::default();
//! let model = config.model.classifier().init::<TrainingBackend>(&device);
//! // ... run_supervised, PseudoLabeler, run_adaptation
//! ```

pub mod backend;
pub mod dataset;
pub mod model;
pub mod training;
pub mod utils;

// Re-export commonly used items for convenience
pub use dataset::{DomainDataset, ImageDataset, ImageFolder, RawImageDataset, UnlabeledFolder};
pub use model::{CdanDiscriminator, Classifier, ClassifierConfig, ExperimentConfig};
pub use training::{EvalResult, GapReport, PseudoLabelConfig, PseudoLabeler};
pub use utils::error::{Result, Synth2RealError};

/// Number of classes in the reference experiment
pub const NUM_CLASSES: usize = 3;

/// Input image size (square)
pub const IMAGE_SIZE: usize = 96;

/// Width of the backbone feature vector
pub const FEATURE_DIM: usize = 512;

/// Pseudo-labels are kept iff their confidence is strictly above this
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.99;

/// Softmax temperature used for pseudo-labeling
pub const DEFAULT_TEMPERATURE: f32 = 0.3;

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
