//! Domain Adaptation: CDAN + Pseudo-Labels + Consistency
//!
//! Every epoch runs two phases:
//!
//! - **Phase A** over synthetic (domain 0) and pseudo-labeled real (domain 1)
//!   images. The classifier is updated with `class loss + adversarial loss`,
//!   the adversarial term coming from the discriminator through gradient
//!   reversal. The discriminator is then updated on detached features with
//!   its own optimizer, so the classifier step always sees the discriminator
//!   weights from before this batch.
//! - **Phase B** over unlabeled real images: symmetric KL between the
//!   predictions on a weak and a strong view, scaled by the consistency weight.
//!
//! The classifier's cosine schedule steps between the two phases.

use burn::{
    data::{dataloader::batcher::Batcher, dataset::Dataset},
    optim::{AdamConfig, AdamWConfig, GradientsParams, Optimizer},
    tensor::{activation::softmax, backend::AutodiffBackend, ElementConversion, Int, Tensor},
};
use colored::Colorize;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info};

use crate::dataset::burn_dataset::{
    DomainBatch, DomainBatcher, DomainDataset, TryDataset, UnlabeledDataset, ViewPairBatch,
    ViewPairBatcher,
};
use crate::model::{grad_reverse, AdaptationConfig, CdanDiscriminator, Classifier, PathsConfig};
use crate::training::checkpoint::save_classifier;
use crate::training::evaluator::count_correct;
use crate::training::losses::{cross_entropy, domain_bce, symmetric_kl};
use crate::training::scheduler::{LRScheduler, SchedulerState};
use crate::training::supervised::create_shuffled_indices;
use crate::utils::error::{Result, Synth2RealError};
use crate::utils::history::{AdaptationEpoch, AdaptationHistory};
use crate::utils::logging::{batch_progress, TrainingLogger};

/// Scalar results of one Phase A batch
#[derive(Debug, Clone, Copy, Default)]
pub struct PhaseAStep {
    pub class_loss: f64,
    /// Domain loss of the classifier step (discriminator weights before update)
    pub adversarial_loss: f64,
    /// Domain loss of the discriminator's own step
    pub domain_loss: f64,
    pub correct: usize,
    pub total: usize,
}

/// Domain loss of the classifier step
///
/// Features reach the discriminator through gradient reversal, so the
/// backbone is pushed towards domain-confusing features.
pub fn adversarial_loss<B: AutodiffBackend>(
    discriminator: &CdanDiscriminator<B>,
    features: Tensor<B, 2>,
    probs: Tensor<B, 2>,
    domains: Tensor<B, 1, Int>,
    lambda: f64,
) -> Tensor<B, 1> {
    domain_bce(discriminator.forward(grad_reverse(features, lambda), probs), domains)
}

/// Domain loss of the discriminator step; no gradient reaches the classifier
pub fn discriminator_loss<B: AutodiffBackend>(
    discriminator: &CdanDiscriminator<B>,
    features: Tensor<B, 2>,
    probs: Tensor<B, 2>,
    domains: Tensor<B, 1, Int>,
) -> Tensor<B, 1> {
    domain_bce(discriminator.forward(features.detach(), probs.detach()), domains)
}

/// One Phase A batch: classifier step, then discriminator step
pub fn phase_a_step<B, OM, OD>(
    model: Classifier<B>,
    discriminator: CdanDiscriminator<B>,
    model_optimizer: &mut OM,
    discriminator_optimizer: &mut OD,
    batch: DomainBatch<B>,
    learning_rate: f64,
    discriminator_learning_rate: f64,
    lambda: f64,
) -> (Classifier<B>, CdanDiscriminator<B>, PhaseAStep)
where
    B: AutodiffBackend,
    OM: Optimizer<Classifier<B>, B>,
    OD: Optimizer<CdanDiscriminator<B>, B>,
{
    let total = batch.targets.dims()[0];

    // Classifier: class loss + reversed-gradient domain loss
    let outputs = model.forward(batch.images.clone());
    let class_loss = cross_entropy(outputs.clone(), batch.targets.clone());
    let probs = softmax(outputs.clone(), 1);
    let features = model.extract_features(batch.images);

    let adversarial = adversarial_loss(
        &discriminator,
        features.clone(),
        probs.clone(),
        batch.domains.clone(),
        lambda,
    );

    let class_value: f64 = class_loss.clone().into_scalar().elem();
    let adversarial_value: f64 = adversarial.clone().into_scalar().elem();
    let correct = count_correct(outputs, batch.targets);

    let loss = class_loss + adversarial;
    // discriminator gradients from this pass are discarded
    let grads = GradientsParams::from_grads(loss.backward(), &model);
    let model = model_optimizer.step(learning_rate, model, grads);

    // Discriminator: detached features and probabilities
    let domain_loss = discriminator_loss(&discriminator, features, probs, batch.domains);
    let domain_value: f64 = domain_loss.clone().into_scalar().elem();

    let grads = GradientsParams::from_grads(domain_loss.backward(), &discriminator);
    let discriminator = discriminator_optimizer.step(discriminator_learning_rate, discriminator, grads);

    (
        model,
        discriminator,
        PhaseAStep {
            class_loss: class_value,
            adversarial_loss: adversarial_value,
            domain_loss: domain_value,
            correct,
            total,
        },
    )
}

/// One Phase B batch; returns the unweighted symmetric KL
pub fn phase_b_step<B, OM>(
    model: Classifier<B>,
    optimizer: &mut OM,
    batch: ViewPairBatch<B>,
    learning_rate: f64,
    consistency_weight: f64,
) -> (Classifier<B>, f64)
where
    B: AutodiffBackend,
    OM: Optimizer<Classifier<B>, B>,
{
    let weak_logits = model.forward(batch.weak);
    let strong_logits = model.forward(batch.strong);

    let kl = symmetric_kl(weak_logits, strong_logits);
    let kl_value: f64 = kl.clone().into_scalar().elem();

    let grads = GradientsParams::from_grads(kl.mul_scalar(consistency_weight).backward(), &model);
    let model = optimizer.step(learning_rate, model, grads);

    (model, kl_value)
}

/// Result of the adaptation loop
#[derive(Debug)]
pub struct AdaptationOutcome<B: AutodiffBackend> {
    pub model: Classifier<B>,
    pub discriminator: CdanDiscriminator<B>,
    pub history: AdaptationHistory,
}

/// Run all adaptation epochs
///
/// `config.seed` seeds the backend before the discriminator is built, along
/// with the shuffles and augmentation streams. An unreadable image aborts
/// the run. Saves the adapted classifier (`paths.adapted_model_path()`), the history
/// JSON and the adaptation charts into `paths.output_dir`.
pub fn run_adaptation<B: AutodiffBackend>(
    model: Classifier<B>,
    labeled: &DomainDataset,
    unlabeled: &UnlabeledDataset,
    config: &AdaptationConfig,
    paths: &PathsConfig,
    image_size: usize,
    device: &B::Device,
) -> Result<AdaptationOutcome<B>> {
    if labeled.len() == 0 {
        return Err(Synth2RealError::Dataset(
            "no labeled samples for domain adaptation".to_string(),
        ));
    }

    std::fs::create_dir_all(&paths.output_dir)?;
    B::seed(config.seed);

    let batch_size = config.batch_size.max(1);
    let mut model = model;
    let mut discriminator = config
        .discriminator(model.num_classes())
        .init::<B>(device);

    let mut model_optimizer = AdamWConfig::new()
        .with_weight_decay(config.weight_decay as f32)
        .init();
    let mut discriminator_optimizer = AdamConfig::new().init();
    let mut scheduler = SchedulerState::new(LRScheduler::cosine_annealing(
        config.learning_rate,
        0.0,
        config.epochs,
    ));

    let domain_batcher = DomainBatcher::<B>::new(image_size, config.seed);
    let view_batcher = ViewPairBatcher::<B>::new(image_size, config.seed.wrapping_add(1));
    let mut labeled_rng = ChaCha8Rng::seed_from_u64(config.seed);
    let mut unlabeled_rng = ChaCha8Rng::seed_from_u64(config.seed.wrapping_add(1));

    let mut history = AdaptationHistory::default();
    let mut logger = TrainingLogger::new("adaptation", config.epochs);

    println!();
    println!("{}", "Domain Adaptation Configuration:".cyan().bold());
    println!("  🏷️  Synthetic samples:     {}", labeled.num_synthetic());
    println!("  🔖 Pseudo-labeled samples: {}", labeled.num_real());
    println!("  🌐 Consistency samples:   {}", unlabeled.len());
    println!("  🔄 Epochs:                {}", config.epochs);
    println!("  ⚖️  Lambda / consistency:  {} / {}", config.adversarial_lambda, config.consistency_weight);
    println!();

    for epoch in 0..config.epochs {
        logger.start_epoch(epoch);

        // Phase A
        let learning_rate = scheduler.current_lr();
        let indices = create_shuffled_indices(labeled.len(), &mut labeled_rng);
        let pb = batch_progress("phase A", indices.len().div_ceil(batch_size));

        let mut sums = PhaseAStep::default();
        let mut batches = 0usize;

        for chunk in indices.chunks(batch_size) {
            let items = labeled.try_items(chunk.iter().copied())?;

            let batch = domain_batcher.batch(items, device);
            let (next_model, next_discriminator, step) = phase_a_step(
                model,
                discriminator,
                &mut model_optimizer,
                &mut discriminator_optimizer,
                batch,
                learning_rate,
                config.discriminator_learning_rate,
                config.adversarial_lambda,
            );
            model = next_model;
            discriminator = next_discriminator;

            sums.class_loss += step.class_loss;
            sums.adversarial_loss += step.adversarial_loss;
            sums.domain_loss += step.domain_loss;
            sums.correct += step.correct;
            sums.total += step.total;
            batches += 1;

            pb.inc(1);
            pb.set_message(format!(
                "loss {:.4} acc {:.2}%",
                step.class_loss + step.adversarial_loss,
                100.0 * sums.correct as f64 / sums.total.max(1) as f64
            ));
        }
        pb.finish_and_clear();

        let n = batches.max(1) as f64;
        let class_loss = sums.class_loss / n;
        let adversarial_loss = sums.adversarial_loss / n;
        let total_loss = class_loss + adversarial_loss;
        let domain_loss = sums.domain_loss / n;
        let accuracy = 100.0 * sums.correct as f64 / sums.total.max(1) as f64;

        let learning_rate = scheduler.step();

        println!(
            "{}",
            format!("Adaptation Epoch {}/{} - Labeled Training", epoch + 1, config.epochs)
                .yellow()
                .bold()
        );
        println!("  Train Loss: {:.4} | Acc: {:.2}%", total_loss, accuracy);
        println!(
            "  Class: {:.4} | Adversarial: {:.4} | Discriminator: {:.4}",
            class_loss, adversarial_loss, domain_loss
        );
        println!("{}", "-".repeat(50));

        // Phase B
        let indices = create_shuffled_indices(unlabeled.len(), &mut unlabeled_rng);
        let pb = batch_progress("phase B", indices.len().div_ceil(batch_size));

        let mut consistency_sum = 0.0f64;
        let mut consistency_batches = 0usize;

        for chunk in indices.chunks(batch_size) {
            let items = unlabeled.try_items(chunk.iter().copied())?;

            let batch = view_batcher.batch(items, device);
            let (next_model, kl) =
                phase_b_step(model, &mut model_optimizer, batch, learning_rate, config.consistency_weight);
            model = next_model;

            consistency_sum += kl;
            consistency_batches += 1;

            pb.inc(1);
            pb.set_message(format!("kl {:.4}", kl));
        }
        pb.finish_and_clear();

        let consistency_loss = if consistency_batches > 0 {
            consistency_sum / consistency_batches as f64
        } else {
            0.0
        };

        println!(
            "{}",
            format!(
                "Adaptation Epoch {}/{} - Consistency Loss: {:.4}",
                epoch + 1,
                config.epochs,
                consistency_loss
            )
            .yellow()
        );
        println!("  LR: {:.2e}", learning_rate);
        println!("{}", "=".repeat(50));

        debug!(
            epoch = epoch + 1,
            class_loss, adversarial_loss, domain_loss, consistency_loss, "adaptation epoch"
        );
        logger.end_epoch(total_loss, accuracy, learning_rate);

        history.record(AdaptationEpoch {
            class_loss,
            adversarial_loss,
            total_loss,
            domain_loss,
            accuracy,
            consistency_loss,
            learning_rate,
        });
    }

    logger.log_complete(None);

    save_classifier(&model, &paths.adapted_model_path())?;
    info!("Adapted model saved to {:?}", paths.adapted_model_path());

    history.save_json(&paths.output_dir.join("adaptation_history.json"))?;
    let charts = history.plot(&paths.output_dir, &paths.adaptation_plot)?;
    info!("Adaptation curves written to {:?}", charts);

    Ok(AdaptationOutcome {
        model,
        discriminator,
        history,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::burn_dataset::{
        ImageItem, PseudoLabelDataset, PseudoLabeledItem, RawImageDataset,
    };
    use crate::dataset::loader::tests::write_png;
    use crate::model::ClassifierConfig;
    use burn::backend::{Autodiff, NdArray};
    use burn::module::{list_param_ids, AutodiffModule};
    use std::path::PathBuf;

    type TestBackend = NdArray;
    type TestAutodiffBackend = Autodiff<TestBackend>;

    const SIZE: usize = 8;

    fn small_config() -> AdaptationConfig {
        AdaptationConfig {
            epochs: 1,
            batch_size: 2,
            discriminator_hidden: 16,
            ..Default::default()
        }
    }

    fn domain_batch() -> DomainBatch<TestAutodiffBackend> {
        let device = Default::default();
        DomainBatch {
            images: Tensor::random(
                [4, 3, SIZE, SIZE],
                burn::tensor::Distribution::Normal(0.0, 1.0),
                &device,
            ),
            targets: Tensor::<TestAutodiffBackend, 1, Int>::from_ints([0, 1, 2, 0], &device),
            domains: Tensor::<TestAutodiffBackend, 1, Int>::from_ints([0, 0, 1, 1], &device),
        }
    }

    #[test]
    fn test_phase_a_updates_classifier_and_discriminator() {
        let device = Default::default();
        let config = small_config();
        let model = ClassifierConfig::new().init::<TestAutodiffBackend>(&device);
        let discriminator = config.discriminator(3).init::<TestAutodiffBackend>(&device);

        let input = Tensor::<TestBackend, 4>::ones([1, 3, SIZE, SIZE], &device);
        let features = Tensor::<TestBackend, 2>::ones([1, crate::FEATURE_DIM], &device);
        let probs = Tensor::<TestBackend, 2>::ones([1, 3], &device).div_scalar(3.0);

        let model_out = |m: &Classifier<TestAutodiffBackend>| -> Vec<f32> {
            m.valid().forward(input.clone()).into_data().to_vec().unwrap()
        };
        let disc_out = |d: &CdanDiscriminator<TestAutodiffBackend>| -> Vec<f32> {
            d.valid()
                .forward(features.clone(), probs.clone())
                .into_data()
                .to_vec()
                .unwrap()
        };

        let model_before = model_out(&model);
        let disc_before = disc_out(&discriminator);

        let mut model_optimizer = AdamWConfig::new().init();
        let mut discriminator_optimizer = AdamConfig::new().init();
        let (model, discriminator, step) = phase_a_step(
            model,
            discriminator,
            &mut model_optimizer,
            &mut discriminator_optimizer,
            domain_batch(),
            1e-2,
            1e-2,
            1.0,
        );

        assert_eq!(step.total, 4);
        assert!(step.class_loss.is_finite() && step.class_loss > 0.0);
        assert!(step.adversarial_loss.is_finite() && step.adversarial_loss > 0.0);
        assert!(step.domain_loss.is_finite() && step.domain_loss > 0.0);

        assert_ne!(model_out(&model), model_before);
        assert_ne!(disc_out(&discriminator), disc_before);
    }

    #[test]
    fn test_phase_a_gradient_boundary() {
        let device = Default::default();
        let model = ClassifierConfig::new().init::<TestAutodiffBackend>(&device);
        let discriminator = small_config().discriminator(3).init::<TestAutodiffBackend>(&device);
        let batch = domain_batch();

        let probs = softmax(model.forward(batch.images.clone()), 1);
        let features = model.extract_features(batch.images);

        // the discriminator's own loss never reaches the classifier
        let loss = discriminator_loss(
            &discriminator,
            features.clone(),
            probs.clone(),
            batch.domains.clone(),
        );
        let mut grads = loss.backward();
        assert!(GradientsParams::from_module(&mut grads, &model).is_empty());
        assert!(!GradientsParams::from_module(&mut grads, &discriminator).is_empty());

        // the adversarial loss reaches both, the classifier step keeps only its own
        let loss = adversarial_loss(&discriminator, features, probs, batch.domains, 1.0);
        let mut grads = loss.backward();
        let model_grads = GradientsParams::from_module(&mut grads, &model);
        assert!(!model_grads.is_empty());
        for id in list_param_ids(&discriminator) {
            assert!(model_grads.get::<TestBackend, 2>(id).is_none());
        }
        assert!(!GradientsParams::from_module(&mut grads, &discriminator).is_empty());
    }

    #[test]
    fn test_phase_b_returns_unweighted_kl() {
        let device = Default::default();
        let model = ClassifierConfig::new().init::<TestAutodiffBackend>(&device);
        let images = Tensor::<TestAutodiffBackend, 4>::random(
            [2, 3, SIZE, SIZE],
            burn::tensor::Distribution::Normal(0.0, 1.0),
            &device,
        );
        let batch = ViewPairBatch {
            weak: images.clone(),
            strong: images.flip([3]),
        };

        let mut optimizer = AdamWConfig::new().init();
        let (_, kl) = phase_b_step(model, &mut optimizer, batch, 1e-3, 0.5);

        assert!(kl.is_finite());
        assert!(kl >= 0.0);
    }

    #[test]
    fn test_run_adaptation_one_epoch() {
        let dir = tempfile::tempdir().unwrap();

        let mut synthetic = Vec::new();
        for (label, color) in [[220u8, 30, 30], [30, 220, 30], [30, 30, 220]].iter().enumerate() {
            let p = dir.path().join(format!("synth/{}/0.png", label));
            write_png(&p, 12, *color);
            synthetic.push((p, label));
        }

        let unlabeled: Vec<PathBuf> = (0..3)
            .map(|i| {
                let p = dir.path().join(format!("real/{}.png", i));
                write_png(&p, 12, [60 * i as u8, 90, 120]);
                p
            })
            .collect();

        let mut pseudo = PseudoLabelDataset::new();
        pseudo.add(PseudoLabeledItem {
            item: ImageItem {
                image: vec![0.4; 3 * SIZE * SIZE],
                label: 1,
                path: "real/0.png".into(),
            },
            confidence: 0.999,
        });

        let paths = PathsConfig {
            output_dir: dir.path().join("out"),
            ..Default::default()
        };
        let device = Default::default();
        let model = ClassifierConfig::new().init::<TestAutodiffBackend>(&device);

        let outcome = run_adaptation(
            model,
            &DomainDataset::new(RawImageDataset::new_cached(synthetic).unwrap(), pseudo),
            &UnlabeledDataset::new(unlabeled),
            &small_config(),
            &paths,
            SIZE,
            &device,
        )
        .unwrap();

        assert_eq!(outcome.history.len(), 1);
        let epoch = outcome.history.epochs[0];
        assert!((epoch.total_loss - (epoch.class_loss + epoch.adversarial_loss)).abs() < 1e-9);
        assert!(epoch.consistency_loss >= 0.0);

        let out = &paths.output_dir;
        assert!(out.join("adapted_model.mpk").exists());
        assert!(out.join("adaptation_history.json").exists());
        assert!(out.join("domain_adaptation_cdan_consistency_loss.svg").exists());
    }

    #[test]
    fn test_run_adaptation_requires_labeled_data() {
        let dir = tempfile::tempdir().unwrap();
        let device = Default::default();
        let model = ClassifierConfig::new().init::<TestAutodiffBackend>(&device);

        let err = run_adaptation(
            model,
            &DomainDataset::new(RawImageDataset::default(), PseudoLabelDataset::new()),
            &UnlabeledDataset::new(Vec::new()),
            &small_config(),
            &PathsConfig {
                output_dir: dir.path().to_path_buf(),
                ..Default::default()
            },
            SIZE,
            &device,
        )
        .unwrap_err();
        assert!(matches!(err, Synth2RealError::Dataset(_)));
    }

    #[test]
    fn test_run_adaptation_fails_on_unreadable_real_image() {
        let dir = tempfile::tempdir().unwrap();
        let synth = dir.path().join("synth/0/0.png");
        write_png(&synth, 12, [220, 30, 30]);
        let broken = dir.path().join("real/0.png");
        std::fs::create_dir_all(broken.parent().unwrap()).unwrap();
        std::fs::write(&broken, b"not a png").unwrap();

        let device = Default::default();
        let model = ClassifierConfig::new().init::<TestAutodiffBackend>(&device);
        let err = run_adaptation(
            model,
            &DomainDataset::new(
                RawImageDataset::new_cached(vec![(synth, 0)]).unwrap(),
                PseudoLabelDataset::new(),
            ),
            &UnlabeledDataset::new(vec![broken]),
            &small_config(),
            &PathsConfig {
                output_dir: dir.path().join("out"),
                ..Default::default()
            },
            SIZE,
            &device,
        )
        .unwrap_err();
        assert!(matches!(err, Synth2RealError::ImageLoad(..)));
        assert!(!dir.path().join("out/adapted_model.mpk").exists());
    }
}
