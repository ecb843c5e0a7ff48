//! Image classifier: ResNet-18 backbone with a dropout + linear head
//!
//! Exposes both the class logits and the 512-dim pooled features that the
//! domain discriminator consumes.

use std::path::Path;

use burn::{
    config::Config,
    module::Module,
    nn::{Dropout, DropoutConfig, Linear, LinearConfig},
    record::CompactRecorder,
    tensor::{activation::softmax, backend::Backend, Tensor},
};
use tracing::info;

use crate::model::resnet::ResNet18;
// the `Config` derive expands to code that names the prelude `Result`
use crate::utils::error::{self, Synth2RealError};
use crate::FEATURE_DIM;

/// Configuration for the [`Classifier`]
#[derive(Config, Debug)]
pub struct ClassifierConfig {
    /// Number of output classes
    #[config(default = "3")]
    pub num_classes: usize,

    /// Dropout rate in front of the linear head
    #[config(default = "0.3")]
    pub dropout_rate: f64,
}

impl ClassifierConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> Classifier<B> {
        Classifier {
            backbone: ResNet18::new(device),
            dropout: DropoutConfig::new(self.dropout_rate).init(),
            fc: LinearConfig::new(FEATURE_DIM, self.num_classes).init(device),
        }
    }
}

/// ResNet-18 classifier for the synthetic and real domains
#[derive(Module, Debug)]
pub struct Classifier<B: Backend> {
    backbone: ResNet18<B>,
    dropout: Dropout,
    fc: Linear<B>,
}

impl<B: Backend> Classifier<B> {
    /// Class logits `[batch, num_classes]`
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 2> {
        let features = self.backbone.forward(input);
        let features = self.dropout.forward(features);
        self.fc.forward(features)
    }

    /// Pooled backbone features `[batch, 512]`, before dropout and the head
    pub fn extract_features(&self, input: Tensor<B, 4>) -> Tensor<B, 2> {
        self.backbone.forward(input)
    }

    /// Class probabilities
    pub fn forward_softmax(&self, input: Tensor<B, 4>) -> Tensor<B, 2> {
        softmax(self.forward(input), 1)
    }

    pub fn num_classes(&self) -> usize {
        self.fc.weight.val().dims()[1]
    }

    /// Replace the backbone weights with a saved backbone record
    ///
    /// The head keeps its fresh initialisation.
    pub fn with_pretrained_backbone(mut self, path: &Path, device: &B::Device) -> error::Result<Self> {
        let recorder = CompactRecorder::new();
        self.backbone = self
            .backbone
            .load_file(path, &recorder, device)
            .map_err(|e| {
                Synth2RealError::Model(format!(
                    "Failed to load backbone weights from {:?}: {:?}",
                    path, e
                ))
            })?;

        info!("Loaded pretrained backbone from {:?}", path);
        Ok(self)
    }

    /// Save only the backbone, in the format read by `with_pretrained_backbone`
    pub fn save_backbone(&self, path: &Path) -> error::Result<()> {
        let recorder = CompactRecorder::new();
        self.backbone
            .clone()
            .save_file(path, &recorder)
            .map_err(|e| Synth2RealError::Model(format!("Failed to save backbone: {:?}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_classifier_output_shape() {
        let device = Default::default();
        let model = ClassifierConfig::new().init::<TestBackend>(&device);

        let input = Tensor::<TestBackend, 4>::zeros([2, 3, 16, 16], &device);
        assert_eq!(model.forward(input).dims(), [2, 3]);
        assert_eq!(model.num_classes(), 3);
    }

    #[test]
    fn test_feature_shape() {
        let device = Default::default();
        let model = ClassifierConfig::new()
            .with_num_classes(2)
            .init::<TestBackend>(&device);

        let input = Tensor::<TestBackend, 4>::zeros([3, 3, 16, 16], &device);
        assert_eq!(model.extract_features(input).dims(), [3, FEATURE_DIM]);
    }

    #[test]
    fn test_softmax_rows_sum_to_one() {
        let device = Default::default();
        let model = ClassifierConfig::new().init::<TestBackend>(&device);

        let input = Tensor::<TestBackend, 4>::ones([2, 3, 16, 16], &device);
        let sums: Vec<f32> = model
            .forward_softmax(input)
            .sum_dim(1)
            .into_data()
            .to_vec()
            .unwrap();

        for sum in sums {
            assert!((sum - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_config_json_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("classifier.json");

        let config = ClassifierConfig::new().with_num_classes(5).with_dropout_rate(0.1);
        config.save(&path).unwrap();
        let loaded = ClassifierConfig::load(&path).unwrap();

        assert_eq!(loaded.num_classes, 5);
        assert_eq!(loaded.dropout_rate, 0.1);
        assert_eq!(ClassifierConfig::new().num_classes, crate::NUM_CLASSES);
    }

    #[test]
    fn test_backbone_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("backbone");
        let device = Default::default();

        let source = ClassifierConfig::new().init::<TestBackend>(&device);
        source.save_backbone(&path).unwrap();

        let input = Tensor::<TestBackend, 4>::ones([1, 3, 16, 16], &device);
        let expected: Vec<f32> = source
            .extract_features(input.clone())
            .into_data()
            .to_vec()
            .unwrap();

        let target = ClassifierConfig::new()
            .init::<TestBackend>(&device)
            .with_pretrained_backbone(&path, &device)
            .unwrap();
        let actual: Vec<f32> = target.extract_features(input).into_data().to_vec().unwrap();

        for (a, b) in expected.iter().zip(&actual) {
            assert!((a - b).abs() < 1e-5);
        }
    }
}
