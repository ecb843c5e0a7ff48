//! Model module for the networks used by the pipeline
//!
//! This module provides:
//! - A ResNet-18 backbone adapted to small (96px) inputs
//! - The classifier with its logits and feature-extraction entry points
//! - The CDAN domain discriminator built from spectrally normalised layers
//! - Gradient reversal for adversarial feature alignment
//! - Experiment configuration

pub mod classifier;
pub mod config;
pub mod domain;
pub mod grl;
pub mod resnet;
pub mod spectral_norm;

pub use classifier::{Classifier, ClassifierConfig};
pub use config::{
    AdaptationConfig, EvaluationConfig, ExperimentConfig, ModelConfig, PathsConfig, TrainingConfig,
};
pub use domain::{CdanDiscriminator, CdanDiscriminatorConfig};
pub use grl::grad_reverse;
pub use resnet::ResNet18;
pub use spectral_norm::SpectralNormLinear;

impl ModelConfig {
    /// Burn module config for the classifier described by this section
    pub fn classifier(&self) -> ClassifierConfig {
        ClassifierConfig::new()
            .with_num_classes(self.num_classes)
            .with_dropout_rate(self.dropout_rate)
    }
}

impl AdaptationConfig {
    /// Burn module config for the discriminator described by this section
    pub fn discriminator(&self, num_classes: usize) -> CdanDiscriminatorConfig {
        CdanDiscriminatorConfig::new()
            .with_feature_dim(crate::FEATURE_DIM)
            .with_num_classes(num_classes)
            .with_hidden_dim(self.discriminator_hidden)
            .with_dropout_rate(self.discriminator_dropout)
    }
}
