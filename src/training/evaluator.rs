//! Evaluation and domain-gap reporting
//!
//! Runs the model without gradients over a labeled folder, either on the
//! plain eval transform or with five-crop test-time augmentation.

use std::fmt;
use std::path::PathBuf;

use burn::{
    data::{dataloader::batcher::Batcher, dataset::Dataset},
    tensor::{backend::Backend, ElementConversion, Int, Tensor},
};
use colored::Colorize;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::dataset::burn_dataset::{
    FiveCropBatcher, FiveCropDataset, ImageBatcher, ImageDataset, TryDataset, NUM_CROPS,
};
use crate::model::{Classifier, EvaluationConfig};
use crate::training::losses::cross_entropy;
use crate::utils::error::Result;

/// Loss and accuracy over one dataset
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvalResult {
    /// Sample-weighted mean cross-entropy
    pub loss: f64,
    /// Percent correct
    pub accuracy: f64,
    pub total: usize,
}

impl EvalResult {
    fn from_sums(loss_sum: f64, correct: usize, total: usize) -> Self {
        if total == 0 {
            return Self {
                loss: 0.0,
                accuracy: 0.0,
                total: 0,
            };
        }

        Self {
            loss: loss_sum / total as f64,
            accuracy: 100.0 * correct as f64 / total as f64,
            total,
        }
    }

    /// Print in the `<name> Results:` format
    pub fn print(&self, name: &str) {
        println!("{}", format!("{} Results:", name).cyan().bold());
        println!("  Loss: {:.4} | Accuracy: {:.2}%", self.loss, self.accuracy);
    }
}

/// Number of rows whose argmax matches the target
pub fn count_correct<B: Backend>(logits: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> usize {
    let [batch, _] = logits.dims();
    let correct: i64 = logits
        .argmax(1)
        .reshape([batch])
        .equal(targets)
        .int()
        .sum()
        .into_scalar()
        .elem();
    correct as usize
}

/// Average the logits of the five crops of every image
///
/// `images` is `[batch * 5, 3, H, W]` with the crops of one image adjacent;
/// the result is `[batch, classes]`.
pub fn five_crop_logits<B: Backend>(model: &Classifier<B>, images: Tensor<B, 4>) -> Tensor<B, 2> {
    let [rows, _, _, _] = images.dims();
    let batch = rows / NUM_CROPS;

    let logits = model.forward(images);
    let [_, classes] = logits.dims();

    logits
        .reshape([batch, NUM_CROPS, classes])
        .mean_dim(1)
        .reshape([batch, classes])
}

/// Evaluate on eval-transformed images
///
/// Fails if any image cannot be loaded.
pub fn evaluate<B: Backend>(
    model: &Classifier<B>,
    dataset: &ImageDataset,
    batch_size: usize,
    device: &B::Device,
) -> Result<EvalResult> {
    let batcher = ImageBatcher::<B>::new(dataset.image_size());
    let len = dataset.len();
    let mut loss_sum = 0.0f64;
    let mut correct = 0usize;
    let mut total = 0usize;

    for start in (0..len).step_by(batch_size.max(1)) {
        let end = (start + batch_size).min(len);
        let items = dataset.try_items(start..end)?;
        let count = items.len();
        let batch = batcher.batch(items, device);
        let logits = model.forward(batch.images);

        let loss: f64 = cross_entropy(logits.clone(), batch.targets.clone())
            .into_scalar()
            .elem();
        loss_sum += loss * count as f64;
        correct += count_correct(logits, batch.targets);
        total += count;
    }

    debug!("Evaluated {} samples", total);
    Ok(EvalResult::from_sums(loss_sum, correct, total))
}

/// Evaluate with five-crop test-time augmentation
pub fn evaluate_five_crop<B: Backend>(
    model: &Classifier<B>,
    dataset: &FiveCropDataset,
    image_size: usize,
    batch_size: usize,
    device: &B::Device,
) -> Result<EvalResult> {
    let batcher = FiveCropBatcher::<B>::new(image_size);
    let len = dataset.len();
    let mut loss_sum = 0.0f64;
    let mut correct = 0usize;
    let mut total = 0usize;

    for start in (0..len).step_by(batch_size.max(1)) {
        let end = (start + batch_size).min(len);
        let items = dataset.try_items(start..end)?;
        let count = items.len();
        let batch = batcher.batch(items, device);
        let logits = five_crop_logits(model, batch.images);

        let loss: f64 = cross_entropy(logits.clone(), batch.targets.clone())
            .into_scalar()
            .elem();
        loss_sum += loss * count as f64;
        correct += count_correct(logits, batch.targets);
        total += count;
    }

    debug!("Evaluated {} samples with five-crop TTA", total);
    Ok(EvalResult::from_sums(loss_sum, correct, total))
}

/// Evaluate a labeled folder, with or without TTA
pub fn evaluate_samples<B: Backend>(
    model: &Classifier<B>,
    samples: Vec<(PathBuf, usize)>,
    image_size: usize,
    config: &EvaluationConfig,
    tta: bool,
    device: &B::Device,
) -> Result<EvalResult> {
    if tta {
        let dataset = FiveCropDataset::new(samples, image_size, config.tta_crop_size);
        evaluate_five_crop(model, &dataset, image_size, config.batch_size, device)
    } else {
        let dataset = ImageDataset::new(samples, image_size);
        evaluate(model, &dataset, config.batch_size, device)
    }
}

/// Synthetic-vs-real accuracy gap
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GapReport {
    pub synthetic_accuracy: f64,
    pub real_accuracy: f64,
    /// `|s - r|` in percentage points
    pub absolute_gap: f64,
    /// `|s - r| / s * 100`; 0 when `s` is 0
    pub relative_gap: f64,
}

impl GapReport {
    pub fn new(synthetic_accuracy: f64, real_accuracy: f64) -> Self {
        let absolute_gap = (synthetic_accuracy - real_accuracy).abs();
        let relative_gap = if synthetic_accuracy > 0.0 {
            absolute_gap / synthetic_accuracy * 100.0
        } else {
            0.0
        };

        Self {
            synthetic_accuracy,
            real_accuracy,
            absolute_gap,
            relative_gap,
        }
    }
}

impl fmt::Display for GapReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Synthetic Validation Accuracy: {:.2}%", self.synthetic_accuracy)?;
        writeln!(f, "Real Test Accuracy: {:.2}%", self.real_accuracy)?;
        writeln!(f, "Absolute Gap: {:.2}%", self.absolute_gap)?;
        write!(f, "Relative Gap: {:.2}%", self.relative_gap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::loader::tests::write_png;
    use crate::model::ClassifierConfig;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_gap_report() {
        let report = GapReport::new(90.0, 60.0);
        assert!((report.absolute_gap - 30.0).abs() < 1e-9);
        assert!((report.relative_gap - 33.333333).abs() < 1e-4);

        let text = report.to_string();
        assert!(text.contains("Absolute Gap: 30.00%"));
        assert!(text.contains("Relative Gap: 33.33%"));
    }

    #[test]
    fn test_gap_report_real_better_and_zero() {
        assert_eq!(GapReport::new(50.0, 70.0).absolute_gap, 20.0);
        assert_eq!(GapReport::new(0.0, 10.0).relative_gap, 0.0);
    }

    #[test]
    fn test_count_correct() {
        let device = Default::default();
        let logits = Tensor::<TestBackend, 2>::from_floats([[2.0, 0.0], [0.0, 1.0], [3.0, 1.0]], &device);
        let targets = Tensor::<TestBackend, 1, Int>::from_ints([0, 1, 1], &device);

        assert_eq!(count_correct(logits, targets), 2);
    }

    #[test]
    fn test_five_crop_logits_average_per_image() {
        let device = Default::default();
        let model = ClassifierConfig::new().with_num_classes(3).init::<TestBackend>(&device);

        let first = Tensor::<TestBackend, 4>::zeros([5, 3, 8, 8], &device);
        let second = Tensor::<TestBackend, 4>::ones([5, 3, 8, 8], &device);
        let images = Tensor::cat(vec![first.clone(), second.clone()], 0);

        let averaged: Vec<f32> = five_crop_logits(&model, images).into_data().to_vec().unwrap();
        let direct: Vec<f32> = model
            .forward(Tensor::cat(vec![first.slice([0..1]), second.slice([0..1])], 0))
            .into_data()
            .to_vec()
            .unwrap();

        assert_eq!(averaged.len(), 6);
        for (a, b) in averaged.iter().zip(&direct) {
            assert!((a - b).abs() < 1e-4);
        }
    }

    #[test]
    fn test_evaluate_with_and_without_tta() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a/0.png");
        let b = dir.path().join("b/0.png");
        write_png(&a, 10, [200, 20, 20]);
        write_png(&b, 10, [20, 20, 200]);
        let samples = vec![(a, 0), (b, 1)];

        let device = Default::default();
        let model = ClassifierConfig::new().with_num_classes(2).init::<TestBackend>(&device);
        let config = EvaluationConfig {
            tta: true,
            tta_crop_size: 8,
            batch_size: 1,
        };

        let plain = evaluate_samples(&model, samples.clone(), 8, &config, false, &device).unwrap();
        let tta = evaluate_samples(&model, samples, 8, &config, true, &device).unwrap();

        assert_eq!(plain.total, 2);
        assert_eq!(tta.total, 2);
        assert!(plain.loss.is_finite());
        assert!([0.0, 50.0, 100.0].contains(&plain.accuracy));
    }

    #[test]
    fn test_unreadable_image_fails_evaluation() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a/0.png");
        write_png(&a, 10, [200, 20, 20]);
        let broken = dir.path().join("b/0.png");
        std::fs::write(&broken, b"not an image").unwrap();
        let samples = vec![(a, 0), (broken, 1)];

        let device = Default::default();
        let model = ClassifierConfig::new().with_num_classes(2).init::<TestBackend>(&device);
        let config = EvaluationConfig {
            tta: true,
            tta_crop_size: 8,
            batch_size: 4,
        };

        assert!(evaluate_samples(&model, samples.clone(), 8, &config, false, &device).is_err());
        assert!(evaluate_samples(&model, samples, 8, &config, true, &device).is_err());
    }
}
