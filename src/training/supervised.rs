//! Supervised Pretraining on Synthetic Images
//!
//! A custom training loop over manually batched, shuffled indices: one
//! augmented pass over the training images, one pass over the validation
//! images, a cosine learning-rate step, and a checkpoint whenever validation
//! accuracy strictly improves. The best checkpoint is reloaded at the end.

use burn::{
    data::{dataloader::batcher::Batcher, dataset::Dataset},
    module::AutodiffModule,
    optim::{AdamWConfig, GradientsParams, Optimizer},
    tensor::{backend::AutodiffBackend, ElementConversion},
};
use colored::Colorize;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{info, warn};

use crate::dataset::burn_dataset::{
    AugmentingBatcher, ImageBatcher, ImageDataset, RawImageDataset, TryDataset,
};
use crate::model::{Classifier, PathsConfig, TrainingConfig};
use crate::training::checkpoint::{load_into, BestCheckpoint};
use crate::training::evaluator::count_correct;
use crate::training::losses::cross_entropy;
use crate::training::scheduler::{LRScheduler, SchedulerState};
use crate::utils::error::{Result, Synth2RealError};
use crate::utils::history::{SupervisedEpoch, SupervisedHistory};
use crate::utils::logging::{batch_progress, TrainingLogger};

/// Result of supervised pretraining
#[derive(Debug)]
pub struct SupervisedOutcome<B: AutodiffBackend> {
    /// The best-validation model (or the last one if no epoch improved)
    pub model: Classifier<B>,
    pub history: SupervisedHistory,
    pub best_val_accuracy: f64,
    pub best_epoch: Option<usize>,
}

/// Mean loss and accuracy of one pass
#[derive(Debug, Clone, Copy, Default)]
pub struct PassMetrics {
    /// Mean of per-batch losses
    pub loss: f64,
    /// Percent correct
    pub accuracy: f64,
}

impl PassMetrics {
    fn from_sums(loss_sum: f64, batches: usize, correct: usize, total: usize) -> Self {
        Self {
            loss: loss_sum / batches.max(1) as f64,
            accuracy: 100.0 * correct as f64 / total.max(1) as f64,
        }
    }
}

/// Shuffle `0..len` for one epoch
pub fn create_shuffled_indices(len: usize, rng: &mut ChaCha8Rng) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..len).collect();
    indices.shuffle(rng);
    indices
}

/// Train the classifier on the synthetic training images
///
/// `config.seed` seeds the backend, the epoch shuffles and the augmentation
/// streams; weight initialisation is seeded by the caller before `init`.
/// Writes the best checkpoint (`paths.checkpoint_path()`), the training
/// history JSON and the loss/accuracy charts into `paths.output_dir`.
pub fn run_supervised<B: AutodiffBackend>(
    model: Classifier<B>,
    train_dataset: &RawImageDataset,
    val_dataset: &ImageDataset,
    config: &TrainingConfig,
    paths: &PathsConfig,
    device: &B::Device,
) -> Result<SupervisedOutcome<B>> {
    if train_dataset.len() == 0 {
        return Err(Synth2RealError::Dataset("training set is empty".to_string()));
    }

    std::fs::create_dir_all(&paths.output_dir)?;
    B::seed(config.seed);

    let image_size = val_dataset.image_size();
    let batch_size = config.batch_size.max(1);
    let batcher = AugmentingBatcher::<B>::new(image_size, config.seed);

    let mut model = model;
    let mut optimizer = AdamWConfig::new()
        .with_weight_decay(config.weight_decay as f32)
        .init();
    let mut scheduler = SchedulerState::new(LRScheduler::cosine_annealing(
        config.learning_rate,
        config.min_learning_rate,
        config.epochs,
    ));

    let mut checkpoint = BestCheckpoint::new(paths.checkpoint_path());
    let mut history = SupervisedHistory::default();
    let mut logger = TrainingLogger::new("supervised", config.epochs);
    let mut epoch_rng = ChaCha8Rng::seed_from_u64(config.seed);

    println!();
    println!("{}", "Training Configuration:".cyan().bold());
    println!("  🏷️  Training samples:   {}", train_dataset.len());
    println!("  ✅ Validation samples: {}", val_dataset.len());
    println!("  🔄 Epochs:             {}", config.epochs);
    println!("  📦 Batch size:         {}", batch_size);
    println!("  📈 Schedule:           {}", scheduler.scheduler().description());
    println!();

    for epoch in 0..config.epochs {
        logger.start_epoch(epoch);
        let learning_rate = scheduler.current_lr();

        // Training phase
        let shuffled_indices = create_shuffled_indices(train_dataset.len(), &mut epoch_rng);
        let num_batches = shuffled_indices.len().div_ceil(batch_size);
        let pb = batch_progress("train", num_batches);

        let mut loss_sum = 0.0f64;
        let mut batches = 0usize;
        let mut correct = 0usize;
        let mut total = 0usize;

        for batch_indices in shuffled_indices.chunks(batch_size) {
            let items = train_dataset.try_items(batch_indices.iter().copied())?;
            let batch = batcher.batch(items, device);
            let output = model.forward(batch.images);
            let loss = cross_entropy(output.clone(), batch.targets.clone());

            let loss_value: f64 = loss.clone().into_scalar().elem();
            loss_sum += loss_value;
            batches += 1;
            total += batch.targets.dims()[0];
            correct += count_correct(output, batch.targets);

            let grads = GradientsParams::from_grads(loss.backward(), &model);
            model = optimizer.step(learning_rate, model, grads);

            pb.inc(1);
            pb.set_message(format!(
                "loss {:.4} acc {:.2}%",
                loss_value,
                100.0 * correct as f64 / total as f64
            ));
        }
        pb.finish_and_clear();

        let train = PassMetrics::from_sums(loss_sum, batches, correct, total);

        // Validation phase
        let val = validate::<B>(&model.valid(), val_dataset, batch_size, device)?;

        let learning_rate = scheduler.step();

        println!("{}", format!("Epoch {}/{}", epoch + 1, config.epochs).yellow().bold());
        println!("  Train Loss: {:.4} | Acc: {:.2}%", train.loss, train.accuracy);
        println!("  Val Loss: {:.4} | Acc: {:.2}%", val.loss, val.accuracy);
        println!("  LR: {:.2e}", learning_rate);

        if checkpoint.update(&model, epoch + 1, val.accuracy, val.loss)? {
            logger.log_new_best(val.accuracy);
            println!(
                "  {} saved best model ({:.2}%) to {:?}",
                "→".cyan(),
                val.accuracy,
                checkpoint.path()
            );
        }
        println!("{}", "-".repeat(50));

        logger.end_epoch(train.loss, train.accuracy, learning_rate);
        history.record(SupervisedEpoch {
            train_loss: train.loss,
            train_accuracy: train.accuracy,
            val_loss: val.loss,
            val_accuracy: val.accuracy,
            learning_rate,
        });
    }

    logger.log_complete(checkpoint.best_epoch().map(|_| checkpoint.best_accuracy()));

    let model = match checkpoint.best_epoch() {
        Some(epoch) => {
            info!("Reloading best checkpoint from epoch {}", epoch);
            load_into(model, checkpoint.path(), device)?
        }
        None => {
            warn!("Validation accuracy never exceeded 0, keeping the last model");
            model
        }
    };

    history.save_json(&paths.output_dir.join("training_history.json"))?;
    let charts = history.plot(&paths.output_dir, &paths.training_plot)?;
    info!("Training curves written to {:?}", charts);

    Ok(SupervisedOutcome {
        model,
        history,
        best_val_accuracy: checkpoint.best_accuracy(),
        best_epoch: checkpoint.best_epoch(),
    })
}

/// One pass over the validation images without gradients
fn validate<B: AutodiffBackend>(
    model: &Classifier<B::InnerBackend>,
    dataset: &ImageDataset,
    batch_size: usize,
    device: &B::Device,
) -> Result<PassMetrics> {
    let batcher = ImageBatcher::<B::InnerBackend>::new(dataset.image_size());
    let len = dataset.len();

    let mut loss_sum = 0.0f64;
    let mut batches = 0usize;
    let mut correct = 0usize;
    let mut total = 0usize;

    for start in (0..len).step_by(batch_size) {
        let end = (start + batch_size).min(len);
        let items = dataset.try_items(start..end)?;
        let count = items.len();
        let batch = batcher.batch(items, device);
        let output = model.forward(batch.images);

        let loss: f64 = cross_entropy(output.clone(), batch.targets.clone())
            .into_scalar()
            .elem();
        loss_sum += loss;
        batches += 1;
        correct += count_correct(output, batch.targets);
        total += count;
    }

    Ok(PassMetrics::from_sums(loss_sum, batches, correct, total))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::loader::tests::write_png;
    use crate::model::ClassifierConfig;
    use burn::backend::{Autodiff, NdArray};
    use std::path::PathBuf;

    type TestAutodiffBackend = Autodiff<NdArray>;

    #[test]
    fn test_shuffled_indices_are_permutation() {
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let mut indices = create_shuffled_indices(10, &mut rng);
        indices.sort();
        assert_eq!(indices, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_shuffle_is_seeded() {
        let a = create_shuffled_indices(20, &mut ChaCha8Rng::seed_from_u64(3));
        let b = create_shuffled_indices(20, &mut ChaCha8Rng::seed_from_u64(3));
        assert_eq!(a, b);
    }

    fn two_class_split(root: &std::path::Path) -> (Vec<(PathBuf, usize)>, Vec<(PathBuf, usize)>) {
        let mut train = Vec::new();
        let mut val = Vec::new();
        for (label, color) in [[220u8, 30, 30], [30, 30, 220]].iter().enumerate() {
            for i in 0..2 {
                let p = root.join(format!("train/{}/{}.png", label, i));
                write_png(&p, 12, *color);
                train.push((p, label));
            }
            let p = root.join(format!("val/{}/0.png", label));
            write_png(&p, 12, *color);
            val.push((p, label));
        }
        (train, val)
    }

    #[test]
    fn test_one_epoch_writes_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let (train, val) = two_class_split(dir.path());

        let paths = PathsConfig {
            output_dir: dir.path().join("out"),
            ..Default::default()
        };
        let config = TrainingConfig {
            batch_size: 2,
            epochs: 1,
            ..Default::default()
        };

        let device = Default::default();
        let model = ClassifierConfig::new().with_num_classes(2).init::<TestAutodiffBackend>(&device);
        let outcome = run_supervised(
            model,
            &RawImageDataset::new_cached(train).unwrap(),
            &ImageDataset::new_cached(val, 8).unwrap(),
            &config,
            &paths,
            &device,
        )
        .unwrap();

        assert_eq!(outcome.history.len(), 1);
        let epoch = outcome.history.epochs[0];
        assert!(epoch.train_loss.is_finite());
        assert!(epoch.learning_rate.abs() < 1e-12);

        let out: PathBuf = paths.output_dir.clone();
        assert!(out.join("training_history.json").exists());
        assert!(out.join("training_curves_loss.svg").exists());
        assert!(out.join("training_curves_acc.svg").exists());

        // the only epoch is saved iff its accuracy beats the initial 0
        let improved = epoch.val_accuracy > 0.0;
        assert_eq!(outcome.best_epoch, improved.then_some(1));
        assert_eq!(out.join("best_model.mpk").exists(), improved);
        assert_eq!(out.join("best_model.json").exists(), improved);
        if improved {
            assert_eq!(outcome.best_val_accuracy, epoch.val_accuracy);
        }
    }

    #[test]
    fn test_broken_val_image_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let (_, val) = two_class_split(dir.path());
        let mut broken_val = val.clone();
        let broken = dir.path().join("val/1/broken.png");
        std::fs::write(&broken, b"garbage").unwrap();
        broken_val.push((broken, 1));

        let device = Default::default();
        let model = ClassifierConfig::new().with_num_classes(2).init::<TestAutodiffBackend>(&device);
        let err = run_supervised(
            model,
            &RawImageDataset::new_cached(val).unwrap(),
            &ImageDataset::new(broken_val, 8),
            &TrainingConfig {
                batch_size: 2,
                epochs: 1,
                ..Default::default()
            },
            &PathsConfig {
                output_dir: dir.path().join("out"),
                ..Default::default()
            },
            &device,
        )
        .unwrap_err();
        assert!(matches!(err, Synth2RealError::ImageLoad(..)));
    }

    #[test]
    fn test_empty_training_set_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let device = Default::default();
        let model = ClassifierConfig::new().init::<TestAutodiffBackend>(&device);

        let err = run_supervised(
            model,
            &RawImageDataset::default(),
            &ImageDataset::new(Vec::new(), 8),
            &TrainingConfig::default(),
            &PathsConfig {
                output_dir: dir.path().to_path_buf(),
                ..Default::default()
            },
            &device,
        )
        .unwrap_err();
        assert!(matches!(err, Synth2RealError::Dataset(_)));
    }
}
