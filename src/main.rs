//! synth2real CLI
//!
//! Entry point for the synthetic-to-real pipeline: supervised pretraining,
//! evaluation with a gap report, pseudo-labeling and domain adaptation.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use burn::data::dataset::Dataset;
use burn::module::AutodiffModule;
use burn::tensor::backend::Backend;
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::{info, warn};

use synth2real::backend::{backend_name, default_device, DefaultBackend, TrainingBackend};
use synth2real::dataset::{
    DomainDataset, ImageDataset, ImageFolder, PseudoLabelDataset, RawImageDataset,
    UnlabeledDataset, UnlabeledFolder,
};
use synth2real::model::{Classifier, ExperimentConfig};
use synth2real::training::pseudo_label::save_records;
use synth2real::training::{
    evaluate_samples, load_classifier, run_adaptation, run_supervised, EvalResult, GapReport,
    PseudoLabelConfig, PseudoLabeler,
};
use synth2real::utils::logging::{init_logging, LogConfig};

type Device = <DefaultBackend as Backend>::Device;

/// Synthetic-to-real domain adaptation
///
/// Pretrains a ResNet-18 on synthetic images, then adapts it to real images
/// with pseudo-labels, CDAN and consistency regularization.
#[derive(Parser, Debug)]
#[command(name = "synth2real")]
#[command(version)]
#[command(about = "Synthetic-to-real domain adaptation with Burn", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true, default_value = "false")]
    verbose: bool,

    /// JSON experiment configuration (defaults are used when omitted)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Directory receiving checkpoints, charts and histories
    #[arg(short, long, global = true)]
    output_dir: Option<PathBuf>,

    /// Random seed for weight initialisation, shuffling and augmentation
    #[arg(long, global = true)]
    seed: Option<u64>,

    /// Root holding the `image1000/` and `stl10_png/` folders
    #[arg(long, global = true)]
    data_root: Option<PathBuf>,

    /// Tiny epochs and batches for a smoke run
    #[arg(long, global = true, default_value = "false")]
    quick: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Pretrain on synthetic images and report the domain gap
    Train {
        /// Number of training epochs
        #[arg(short, long)]
        epochs: Option<usize>,

        /// Batch size for training
        #[arg(short, long)]
        batch_size: Option<usize>,

        /// Learning rate
        #[arg(short, long)]
        learning_rate: Option<f64>,

        /// Backbone record to start from
        #[arg(long)]
        pretrained: Option<PathBuf>,
    },

    /// Evaluate a saved model on synthetic val and real test
    Evaluate {
        /// Saved classifier record
        #[arg(short, long)]
        model: PathBuf,

        /// Disable five-crop test-time augmentation on the real test set
        #[arg(long, default_value = "false")]
        no_tta: bool,
    },

    /// Pseudo-label the unlabeled real images with a saved model
    PseudoLabel {
        /// Saved classifier record
        #[arg(short, long)]
        model: PathBuf,

        /// Confidence threshold (strict)
        #[arg(long)]
        confidence_threshold: Option<f32>,

        /// Softmax temperature
        #[arg(long)]
        temperature: Option<f32>,

        /// Write the accepted samples as JSON
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Pseudo-label, adapt and evaluate a saved model
    Adapt {
        /// Saved classifier record
        #[arg(short, long)]
        model: PathBuf,

        /// Number of adaptation epochs
        #[arg(short, long)]
        epochs: Option<usize>,
    },

    /// Full pipeline: train, evaluate, pseudo-label, adapt, evaluate
    Run {
        /// Backbone record to start from
        #[arg(long)]
        pretrained: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = if cli.verbose {
        LogConfig::verbose()
    } else {
        LogConfig::default()
    };

    if let Err(e) = init_logging(&log_config) {
        eprintln!("{} {}", "warning:".yellow(), e);
    }

    print_banner();

    let mut config = load_config(&cli)?;
    let device = default_device();
    println!("  🖥️  Backend: {}", backend_name());

    match cli.command {
        Commands::Train {
            epochs,
            batch_size,
            learning_rate,
            pretrained,
        } => {
            if let Some(epochs) = epochs {
                config.training.epochs = epochs;
            }
            if let Some(batch_size) = batch_size {
                config.training.batch_size = batch_size;
            }
            if let Some(learning_rate) = learning_rate {
                config.training.learning_rate = learning_rate;
            }
            if pretrained.is_some() {
                config.model.pretrained_backbone = pretrained;
            }
            config.validate().context("invalid configuration")?;
            save_config(&config)?;

            let model = stage_train(&config, &device)?;
            stage_evaluate(&model.valid(), &config, config.evaluation.tta, &device)?;
        }

        Commands::Evaluate { model, no_tta } => {
            let model = load_model(&config, &model, &device)?;
            stage_evaluate(&model.valid(), &config, config.evaluation.tta && !no_tta, &device)?;
        }

        Commands::PseudoLabel {
            model,
            confidence_threshold,
            temperature,
            output,
        } => {
            if let Some(threshold) = confidence_threshold {
                config.adaptation.confidence_threshold = threshold;
            }
            if let Some(temperature) = temperature {
                config.adaptation.temperature = temperature;
            }
            config.validate().context("invalid configuration")?;

            let model = load_model(&config, &model, &device)?;
            let pseudo = stage_pseudo_label(&model.valid(), &config, &device)?;

            if let Some(output) = output {
                save_records(&pseudo, &output)
                    .with_context(|| format!("failed to write pseudo-labels to {:?}", output))?;
                println!("  💾 Pseudo-labels written to {:?}", output);
            }
        }

        Commands::Adapt { model, epochs } => {
            if let Some(epochs) = epochs {
                config.adaptation.epochs = epochs;
            }
            config.validate().context("invalid configuration")?;
            save_config(&config)?;

            let model = load_model(&config, &model, &device)?;
            let synthetic = stage_evaluate_synthetic(&model.valid(), &config, &device)?;
            stage_adapt(model, synthetic.accuracy, &config, &device)?;
        }

        Commands::Run { pretrained } => {
            if pretrained.is_some() {
                config.model.pretrained_backbone = pretrained;
            }
            config.validate().context("invalid configuration")?;
            save_config(&config)?;

            let model = stage_train(&config, &device)?;
            let (synthetic, _, _) = stage_evaluate(&model.valid(), &config, config.evaluation.tta, &device)?;
            stage_adapt(model, synthetic.accuracy, &config, &device)?;
        }
    }

    Ok(())
}

fn print_banner() {
    println!(
        "{}",
        r#"
 ╔══════════════════════════════════════════════════════════╗
 ║   🧪 synth2real                                          ║
 ║   Synthetic-to-Real Domain Adaptation with Burn + Rust   ║
 ╚══════════════════════════════════════════════════════════╝
  "#
        .green()
    );
}

/// Defaults (or `--config`), then the global overrides, then validation
fn load_config(cli: &Cli) -> Result<ExperimentConfig> {
    let mut config = match &cli.config {
        Some(path) => ExperimentConfig::load(path)
            .with_context(|| format!("failed to load config from {:?}", path))?,
        None if cli.quick => ExperimentConfig::quick(),
        None => ExperimentConfig::default(),
    };

    if let Some(root) = &cli.data_root {
        config.paths = config.paths.with_data_root(root);
    }
    if let Some(output_dir) = &cli.output_dir {
        config.paths.output_dir = output_dir.clone();
    }
    if let Some(seed) = cli.seed {
        config.training.seed = seed;
        config.adaptation.seed = seed;
    }

    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn save_config(config: &ExperimentConfig) -> Result<()> {
    std::fs::create_dir_all(&config.paths.output_dir)
        .with_context(|| format!("failed to create {:?}", config.paths.output_dir))?;
    let path = config.paths.output_dir.join("config.json");
    config
        .save(&path)
        .with_context(|| format!("failed to save config to {:?}", path))?;
    info!("Configuration saved to {:?}", path);
    Ok(())
}

fn load_model(config: &ExperimentConfig, path: &Path, device: &Device) -> Result<Classifier<TrainingBackend>> {
    println!("{}", "Loading model...".cyan());
    load_classifier::<TrainingBackend>(&config.model.classifier(), path, device)
        .with_context(|| format!("failed to load model from {:?}", path))
}

fn labeled_folder(path: &Path, what: &str) -> Result<ImageFolder> {
    let folder = ImageFolder::new(path).with_context(|| format!("failed to read {} from {:?}", what, path))?;
    folder.get_stats().print(what);
    Ok(folder)
}

/// Supervised pretraining; returns the best-validation model
fn stage_train(config: &ExperimentConfig, device: &Device) -> Result<Classifier<TrainingBackend>> {
    println!("{}", "Stage 1: Supervised Pretraining".green().bold());

    let train = labeled_folder(&config.paths.synthetic_train, "Synthetic Train")?;
    let val = labeled_folder(&config.paths.synthetic_val, "Synthetic Val")?;
    if !train.check_classes_match(&val) {
        warn!("Synthetic train and val class folders differ");
    }

    TrainingBackend::seed(config.training.seed);
    let mut model = config.model.classifier().init::<TrainingBackend>(device);
    match &config.model.pretrained_backbone {
        Some(path) => {
            model = model
                .with_pretrained_backbone(path, device)
                .context("failed to load pretrained backbone")?;
        }
        None => warn!("No pretrained backbone given, starting from random weights"),
    }

    let image_size = config.model.image_size;
    let outcome = run_supervised(
        model,
        &RawImageDataset::new_cached(train.pairs()).context("failed to load synthetic train images")?,
        &ImageDataset::new_cached(val.pairs(), image_size).context("failed to load synthetic val images")?,
        &config.training,
        &config.paths,
        device,
    )
    .context("supervised training failed")?;

    let backbone_path = config.paths.output_dir.join("backbone");
    outcome
        .model
        .save_backbone(&backbone_path)
        .context("failed to save backbone")?;

    println!(
        "  ✅ Best validation accuracy: {:.2}% (epoch {})",
        outcome.best_val_accuracy,
        outcome
            .best_epoch
            .map(|e| e.to_string())
            .unwrap_or_else(|| "-".to_string())
    );

    Ok(outcome.model)
}

fn stage_evaluate_synthetic(
    model: &Classifier<DefaultBackend>,
    config: &ExperimentConfig,
    device: &Device,
) -> Result<EvalResult> {
    let val = ImageFolder::new(&config.paths.synthetic_val)
        .with_context(|| format!("failed to read synthetic val from {:?}", config.paths.synthetic_val))?;
    let result = evaluate_samples(
        model,
        val.pairs(),
        config.model.image_size,
        &config.evaluation,
        false,
        device,
    )
    .context("synthetic validation failed")?;
    result.print("Synthetic Validation");
    Ok(result)
}

fn stage_evaluate_real(
    model: &Classifier<DefaultBackend>,
    config: &ExperimentConfig,
    tta: bool,
    device: &Device,
) -> Result<EvalResult> {
    let test = ImageFolder::new(&config.paths.real_test)
        .with_context(|| format!("failed to read real test from {:?}", config.paths.real_test))?;
    let result = evaluate_samples(
        model,
        test.pairs(),
        config.model.image_size,
        &config.evaluation,
        tta,
        device,
    )
    .context("real test evaluation failed")?;
    result.print(if tta { "Real Test (TTA)" } else { "Real Test" });
    Ok(result)
}

fn print_gap(report: &GapReport) {
    println!();
    println!("{}", "Domain Gap Analysis:".cyan().bold());
    for line in report.to_string().lines() {
        println!("  {}", line);
    }
    println!();
}

/// Synthetic val (no TTA), real test, gap report
fn stage_evaluate(
    model: &Classifier<DefaultBackend>,
    config: &ExperimentConfig,
    tta: bool,
    device: &Device,
) -> Result<(EvalResult, EvalResult, GapReport)> {
    println!("{}", "Stage 2: Evaluation".green().bold());

    let synthetic = stage_evaluate_synthetic(model, config, device)?;
    let real = stage_evaluate_real(model, config, tta, device)?;
    let report = GapReport::new(synthetic.accuracy, real.accuracy);
    print_gap(&report);

    Ok((synthetic, real, report))
}

fn stage_pseudo_label(
    model: &Classifier<DefaultBackend>,
    config: &ExperimentConfig,
    device: &Device,
) -> Result<PseudoLabelDataset> {
    println!("{}", "Stage 3: Pseudo-Labeling".green().bold());

    let unlabeled = UnlabeledFolder::new(&config.paths.unlabeled)
        .with_context(|| format!("failed to read unlabeled images from {:?}", config.paths.unlabeled))?;
    let dataset = ImageDataset::unlabeled(&unlabeled.paths, config.model.image_size);

    let mut labeler = PseudoLabeler::new(PseudoLabelConfig::from(&config.adaptation), model.num_classes());
    let pseudo = labeler
        .label_dataset(model, &dataset, config.evaluation.batch_size, device)
        .context("pseudo-labeling failed")?;

    println!("{}", labeler.stats());
    println!(
        "Retained {}/{} samples after filtering",
        pseudo.len(),
        unlabeled.len()
    );
    println!("  Average confidence: {:.4}", pseudo.average_confidence());

    Ok(pseudo)
}

/// Pseudo-label, adapt, then evaluate the adapted model with TTA
fn stage_adapt(
    model: Classifier<TrainingBackend>,
    synthetic_accuracy: f64,
    config: &ExperimentConfig,
    device: &Device,
) -> Result<()> {
    let pseudo = stage_pseudo_label(&model.valid(), config, device)?;

    println!("{}", "Stage 4: Domain Adaptation".green().bold());

    let train = ImageFolder::new(&config.paths.synthetic_train)
        .with_context(|| format!("failed to read synthetic train from {:?}", config.paths.synthetic_train))?;
    let unlabeled = UnlabeledFolder::new(&config.paths.unlabeled)
        .with_context(|| format!("failed to read unlabeled images from {:?}", config.paths.unlabeled))?;

    let synthetic = RawImageDataset::new_cached(train.pairs()).context("failed to load synthetic train images")?;
    let labeled = DomainDataset::new(synthetic, pseudo);
    let outcome = run_adaptation(
        model,
        &labeled,
        &UnlabeledDataset::new(unlabeled.paths),
        &config.adaptation,
        &config.paths,
        config.model.image_size,
        device,
    )
    .context("domain adaptation failed")?;

    println!("{}", "Stage 5: Final Evaluation".green().bold());
    let real = stage_evaluate_real(&outcome.model.valid(), config, config.evaluation.tta, device)?;
    println!("Final Real Test Accuracy (TTA): {:.2}%", real.accuracy);
    print_gap(&GapReport::new(synthetic_accuracy, real.accuracy));

    println!(
        "  💾 Adapted model saved to {:?}",
        config.paths.adapted_model_path()
    );

    Ok(())
}
