//! Training module for pretraining and domain adaptation
//!
//! This module provides:
//! - Supervised pretraining on synthetic images with best-checkpointing
//! - Evaluation with optional five-crop test-time augmentation
//! - Confidence-filtered pseudo-labeling of unlabeled real images
//! - CDAN domain adaptation with a consistency phase
//! - Learning rate scheduling and loss functions
//!
//! ## Domain Adaptation Approach
//!
//! 1. Pretrain the classifier on labeled synthetic images
//! 2. Pseudo-label the unlabeled real images with a sharpened softmax
//! 3. Train on synthetic + pseudo-labeled images while a discriminator,
//!    fed through gradient reversal, pushes the features to be domain-invariant
//! 4. Make predictions on weak and strong views of real images agree

pub mod adaptation;
pub mod checkpoint;
pub mod evaluator;
pub mod losses;
pub mod pseudo_label;
pub mod scheduler;
pub mod supervised;

pub use adaptation::{phase_a_step, phase_b_step, run_adaptation, AdaptationOutcome, PhaseAStep};
pub use checkpoint::{load_classifier, save_classifier, BestCheckpoint, CheckpointMetadata};
pub use evaluator::{evaluate, evaluate_five_crop, evaluate_samples, EvalResult, GapReport};
pub use pseudo_label::{PseudoLabelConfig, PseudoLabelStats, PseudoLabeler};
pub use scheduler::{LRScheduler, SchedulerState};
pub use supervised::{run_supervised, SupervisedOutcome};

pub use crate::model::config::{AdaptationConfig, TrainingConfig};
