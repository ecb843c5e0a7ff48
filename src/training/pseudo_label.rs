//! Pseudo-Labeling of Unlabeled Real Images
//!
//! ## Algorithm Overview
//!
//! 1. Run the pretrained classifier over the unlabeled images in sorted order
//! 2. Sharpen the predictions: `softmax(logits / T)` with a low temperature
//! 3. Keep an image iff its top probability is strictly above the threshold
//! 4. The kept images become domain-1 training samples labeled with the argmax

use std::path::{Path, PathBuf};

use burn::{
    data::{dataloader::batcher::Batcher, dataset::Dataset},
    tensor::{activation::softmax, backend::Backend, Tensor},
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::dataset::burn_dataset::{
    ImageBatcher, ImageDataset, PseudoLabelDataset, PseudoLabeledItem, TryDataset,
};
use crate::model::{AdaptationConfig, Classifier};
use crate::utils::error::{Result, Synth2RealError};
use crate::utils::logging::batch_progress;

/// Configuration for pseudo-labeling
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PseudoLabelConfig {
    /// Accept iff max probability > threshold
    pub confidence_threshold: f32,
    /// Softmax temperature; below 1 sharpens
    pub temperature: f32,
}

impl Default for PseudoLabelConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: crate::DEFAULT_CONFIDENCE_THRESHOLD,
            temperature: crate::DEFAULT_TEMPERATURE,
        }
    }
}

impl From<&AdaptationConfig> for PseudoLabelConfig {
    fn from(config: &AdaptationConfig) -> Self {
        Self {
            confidence_threshold: config.confidence_threshold,
            temperature: config.temperature,
        }
    }
}

/// A single prediction result from the model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    pub image_path: PathBuf,
    pub predicted_label: usize,
    /// Sharpened probability of the predicted label
    pub confidence: f32,
}

impl Prediction {
    /// Argmax of one probability row; the first index wins ties
    pub fn from_probabilities(image_path: PathBuf, probabilities: &[f32]) -> Self {
        let (predicted_label, confidence) = probabilities
            .iter()
            .enumerate()
            .fold((0, f32::NEG_INFINITY), |(best_idx, best), (idx, &p)| {
                if p > best {
                    (idx, p)
                } else {
                    (best_idx, best)
                }
            });

        Self {
            image_path,
            predicted_label,
            confidence,
        }
    }
}

/// `softmax(logits / temperature)` over the class dimension
pub fn sharpened_softmax<B: Backend>(logits: Tensor<B, 2>, temperature: f32) -> Tensor<B, 2> {
    softmax(logits.div_scalar(temperature), 1)
}

/// Statistics about one pseudo-labeling pass
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PseudoLabelStats {
    pub total_processed: usize,
    pub total_accepted: usize,
    pub rejected_low_confidence: usize,
    /// Accepted samples per predicted class
    pub class_counts: Vec<usize>,
}

impl PseudoLabelStats {
    pub fn acceptance_rate(&self) -> f64 {
        if self.total_processed == 0 {
            return 0.0;
        }
        self.total_accepted as f64 / self.total_processed as f64
    }
}

impl std::fmt::Display for PseudoLabelStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Pseudo-Label Statistics:")?;
        writeln!(f, "  Total processed: {}", self.total_processed)?;
        writeln!(
            f,
            "  Retained {}/{} samples after filtering ({:.1}%)",
            self.total_accepted,
            self.total_processed,
            self.acceptance_rate() * 100.0
        )?;
        writeln!(f, "  Rejected (low confidence): {}", self.rejected_low_confidence)?;
        write!(f, "  Per class: {:?}", self.class_counts)
    }
}

/// Serializable record of an accepted sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PseudoLabelRecord {
    pub path: String,
    pub label: usize,
    pub confidence: f32,
}

/// Write the accepted samples of `dataset` as a JSON list
pub fn save_records(dataset: &PseudoLabelDataset, path: &Path) -> Result<()> {
    let records: Vec<PseudoLabelRecord> = dataset
        .items()
        .iter()
        .map(|item| PseudoLabelRecord {
            path: item.item.path.clone(),
            label: item.item.label,
            confidence: item.confidence,
        })
        .collect();

    std::fs::write(path, serde_json::to_string_pretty(&records)?)?;
    Ok(())
}

/// Confidence-filtered pseudo-labeler
#[derive(Debug)]
pub struct PseudoLabeler {
    config: PseudoLabelConfig,
    stats: PseudoLabelStats,
}

impl PseudoLabeler {
    pub fn new(config: PseudoLabelConfig, num_classes: usize) -> Self {
        Self {
            config,
            stats: PseudoLabelStats {
                class_counts: vec![0; num_classes],
                ..Default::default()
            },
        }
    }

    /// Whether a prediction passes the (strict) confidence filter
    pub fn accepts(&self, prediction: &Prediction) -> bool {
        prediction.confidence > self.config.confidence_threshold
    }

    /// Update statistics for one prediction and report whether it is kept
    pub fn process(&mut self, prediction: &Prediction) -> bool {
        self.stats.total_processed += 1;

        if !self.accepts(prediction) {
            self.stats.rejected_low_confidence += 1;
            return false;
        }

        self.stats.total_accepted += 1;
        if let Some(count) = self.stats.class_counts.get_mut(prediction.predicted_label) {
            *count += 1;
        }
        true
    }

    /// Label every image of `dataset` and keep the confident ones
    ///
    /// Runs in dataset order; accepted items keep their eval-transformed
    /// image and carry the predicted label. An unreadable image or a
    /// probability tensor that cannot be read back aborts the pass.
    pub fn label_dataset<B: Backend>(
        &mut self,
        model: &Classifier<B>,
        dataset: &ImageDataset,
        batch_size: usize,
        device: &B::Device,
    ) -> Result<PseudoLabelDataset> {
        let batcher = ImageBatcher::<B>::new(dataset.image_size());
        let len = dataset.len();
        let num_batches = len.div_ceil(batch_size.max(1));
        let mut pseudo = PseudoLabelDataset::new();

        let pb = batch_progress("Pseudo-labeling", num_batches);

        for start in (0..len).step_by(batch_size.max(1)) {
            let end = (start + batch_size).min(len);
            let items = dataset.try_items(start..end)?;
            pb.inc(1);

            let batch = batcher.batch(items.clone(), device);
            let probs = sharpened_softmax(model.forward(batch.images), self.config.temperature);
            let [_, num_classes] = probs.dims();
            let probs: Vec<f32> = probs.into_data().to_vec().map_err(|e| {
                Synth2RealError::Model(format!("reading pseudo-label probabilities: {:?}", e))
            })?;
            if probs.len() != items.len() * num_classes {
                return Err(Synth2RealError::Model(format!(
                    "expected {} probabilities, got {}",
                    items.len() * num_classes,
                    probs.len()
                )));
            }

            for (item, row) in items.into_iter().zip(probs.chunks(num_classes)) {
                let prediction = Prediction::from_probabilities(PathBuf::from(&item.path), row);
                if self.process(&prediction) {
                    let mut item = item;
                    item.label = prediction.predicted_label;
                    pseudo.add(PseudoLabeledItem {
                        item,
                        confidence: prediction.confidence,
                    });
                }
            }

            pb.set_message(format!("kept {}", self.stats.total_accepted));
        }

        pb.finish_and_clear();

        debug!(
            "Processed {} images, accepted {} pseudo-labels (threshold: {:.2}, T = {:.2})",
            self.stats.total_processed,
            self.stats.total_accepted,
            self.config.confidence_threshold,
            self.config.temperature
        );
        info!(
            "Retained {}/{} samples after filtering",
            self.stats.total_accepted, self.stats.total_processed
        );

        Ok(pseudo)
    }

    pub fn stats(&self) -> &PseudoLabelStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::loader::tests::write_png;
    use crate::model::ClassifierConfig;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    fn prediction(label: usize, confidence: f32) -> Prediction {
        Prediction {
            image_path: PathBuf::from(format!("{}.png", label)),
            predicted_label: label,
            confidence,
        }
    }

    #[test]
    fn test_threshold_is_strict() {
        let mut labeler = PseudoLabeler::new(PseudoLabelConfig::default(), 3);

        assert!(!labeler.process(&prediction(0, 0.99)));
        assert!(labeler.process(&prediction(1, 0.995)));
        assert!(!labeler.process(&prediction(2, 0.5)));

        let stats = labeler.stats();
        assert_eq!(stats.total_processed, 3);
        assert_eq!(stats.total_accepted, 1);
        assert_eq!(stats.rejected_low_confidence, 2);
        assert_eq!(stats.class_counts, vec![0, 1, 0]);
    }

    #[test]
    fn test_prediction_argmax_first_tie() {
        let p = Prediction::from_probabilities(PathBuf::new(), &[0.4, 0.4, 0.2]);
        assert_eq!(p.predicted_label, 0);
        assert_eq!(p.confidence, 0.4);
    }

    #[test]
    fn test_sharpening_increases_confidence() {
        let device = Default::default();
        let logits = Tensor::<TestBackend, 2>::from_floats([[2.0, 1.0, 0.0]], &device);

        let plain: Vec<f32> = softmax(logits.clone(), 1).into_data().to_vec().unwrap();
        let sharp: Vec<f32> = sharpened_softmax(logits, 0.3).into_data().to_vec().unwrap();

        assert!(sharp[0] > plain[0]);
        assert!((sharp.iter().sum::<f32>() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_stats_display() {
        let mut labeler = PseudoLabeler::new(PseudoLabelConfig::default(), 2);
        labeler.process(&prediction(1, 1.0));
        labeler.process(&prediction(0, 0.1));

        let text = labeler.stats().to_string();
        assert!(text.contains("Retained 1/2 samples"));
        assert!(text.contains("50.0%"));
    }

    #[test]
    fn test_label_dataset_bounds() {
        let dir = tempfile::tempdir().unwrap();
        let paths: Vec<PathBuf> = (0..3)
            .map(|i| {
                let p = dir.path().join(format!("{}.png", i));
                write_png(&p, 8, [i as u8 * 80, 30, 30]);
                p
            })
            .collect();

        let device = Default::default();
        let model = ClassifierConfig::new().with_num_classes(3).init::<TestBackend>(&device);
        let dataset = ImageDataset::unlabeled(&paths, 8);

        // threshold 0 keeps everything with non-zero confidence
        let mut keep_all = PseudoLabeler::new(
            PseudoLabelConfig {
                confidence_threshold: 0.0,
                temperature: 0.3,
            },
            3,
        );
        let pseudo = keep_all.label_dataset(&model, &dataset, 2, &device).unwrap();
        assert_eq!(pseudo.len(), 3);
        assert_eq!(pseudo.class_distribution(3).iter().sum::<usize>(), 3);
        assert!(pseudo.items().iter().all(|i| i.item.image.len() == 3 * 8 * 8));

        let mut keep_none = PseudoLabeler::new(
            PseudoLabelConfig {
                confidence_threshold: 1.0,
                temperature: 0.3,
            },
            3,
        );
        assert_eq!(keep_none.label_dataset(&model, &dataset, 2, &device).unwrap().len(), 0);
        assert_eq!(keep_none.stats().total_processed, 3);

        let out = dir.path().join("pseudo.json");
        save_records(&pseudo, &out).unwrap();
        let records: Vec<PseudoLabelRecord> =
            serde_json::from_str(&std::fs::read_to_string(out).unwrap()).unwrap();
        assert_eq!(records.len(), 3);
    }

    #[test]
    fn test_label_dataset_fails_on_unreadable_image() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("0.png");
        write_png(&good, 8, [10, 200, 30]);
        let broken = dir.path().join("1.png");
        std::fs::write(&broken, b"truncated").unwrap();

        let device = Default::default();
        let model = ClassifierConfig::new().with_num_classes(3).init::<TestBackend>(&device);
        let dataset = ImageDataset::unlabeled(&[good, broken], 8);

        let mut labeler = PseudoLabeler::new(PseudoLabelConfig::default(), 3);
        let err = labeler.label_dataset(&model, &dataset, 4, &device).unwrap_err();
        assert!(matches!(err, Synth2RealError::ImageLoad(..)));
        assert_eq!(labeler.stats().total_processed, 0);
    }
}
