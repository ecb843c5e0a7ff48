//! Burn Dataset Integration
//!
//! Dataset and Batcher implementations feeding the trainers.
//!
//! ## Items and batchers
//!
//! - `ImageItem` + `ImageBatcher`: eval-transformed images (validation, test, pseudo-labeling)
//! - `RawImageItem` + `AugmentingBatcher`: training augmentation applied per batch
//! - `DomainItem` + `DomainBatcher`: synthetic (domain 0) and pseudo-labeled real (domain 1)
//! - `RawImageItem` + `ViewPairBatcher`: weak/strong views for consistency training
//! - `FiveCropItem` + `FiveCropBatcher`: test-time augmentation
//!
//! All batchers apply ImageNet normalization on the device.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use burn::data::dataloader::batcher::Batcher;
use burn::data::dataset::Dataset;
use burn::prelude::*;
use image::DynamicImage;
use indicatif::{ProgressBar, ProgressStyle};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use tracing::error;

use crate::dataset::augmentation::{
    eval_transform, five_crop_transform, strong_transform, to_tensor_data, RandAugment,
    TrainAugmentation,
};
use crate::dataset::loader::load_image;
use crate::utils::error::{Result, Synth2RealError};

/// ImageNet channel means
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
/// ImageNet channel standard deviations
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Number of crops produced by five-crop TTA
pub const NUM_CROPS: usize = 5;

/// Domain label of synthetic images
pub const SYNTHETIC_DOMAIN: usize = 0;
/// Domain label of real images
pub const REAL_DOMAIN: usize = 1;

/// Build a normalized `[count, 3, size, size]` tensor from CHW `[0, 1]` data
pub fn normalized_images<B: Backend>(
    data: Vec<f32>,
    count: usize,
    image_size: usize,
    device: &B::Device,
) -> Tensor<B, 4> {
    let images = Tensor::<B, 4>::from_floats(
        TensorData::new(data, [count, 3, image_size, image_size]),
        device,
    );

    let mean = Tensor::<B, 4>::from_floats(TensorData::new(IMAGENET_MEAN.to_vec(), [1, 3, 1, 1]), device);
    let std = Tensor::<B, 4>::from_floats(TensorData::new(IMAGENET_STD.to_vec(), [1, 3, 1, 1]), device);

    (images - mean) / std
}

/// Dataset access that reports undecodable images instead of skipping them
///
/// `Dataset::get` has no error channel, so the training, evaluation and
/// pseudo-labeling loops read through `try_get`.
pub trait TryDataset<I>: Dataset<I> {
    fn try_get(&self, index: usize) -> Result<I>;

    /// Items at `indices`, failing on the first error
    fn try_items(&self, indices: impl IntoIterator<Item = usize>) -> Result<Vec<I>> {
        indices.into_iter().map(|i| self.try_get(i)).collect()
    }
}

fn out_of_range(index: usize, len: usize) -> Synth2RealError {
    Synth2RealError::Dataset(format!("index {} out of range for {} items", index, len))
}

/// `Dataset::get` on top of `try_get`; errors are logged
fn logged<I>(result: Result<I>) -> Option<I> {
    result.map_err(|e| error!("{}", e)).ok()
}

fn int_tensor<B: Backend>(values: Vec<i64>, device: &B::Device) -> Tensor<B, 1, Int> {
    let len = values.len();
    Tensor::<B, 1, Int>::from_data(TensorData::new(values, [len]), device)
}

fn preload_progress(total: usize) -> ProgressBar {
    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("  {spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    pb
}

/// Per-batch RNGs derived from a base seed
///
/// Batchers only get `&self`, so the batch counter is shared and atomic.
#[derive(Clone, Debug)]
pub struct BatchRng {
    seed: u64,
    counter: Arc<AtomicU64>,
}

impl BatchRng {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            counter: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn next_rng(&self) -> ChaCha8Rng {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        ChaCha8Rng::seed_from_u64(self.seed.wrapping_add(n.wrapping_mul(0x9E37_79B9_7F4A_7C15)))
    }
}

// --------------------------------------------------------------------------------
// Eval-transformed images
// --------------------------------------------------------------------------------

/// A single image ready for Burn
#[derive(Clone, Debug)]
pub struct ImageItem {
    /// Image data as flattened CHW float array [3 * H * W] in [0, 1]
    pub image: Vec<f32>,
    /// Class label; unused for unlabeled images
    pub label: usize,
    pub path: String,
}

impl ImageItem {
    /// Load and apply the eval transform
    pub fn from_path(path: &Path, label: usize, image_size: usize) -> Result<Self> {
        let img = load_image(path)?;
        let image = to_tensor_data(&eval_transform(&img, image_size as u32));

        Ok(Self {
            image,
            label,
            path: path.to_string_lossy().to_string(),
        })
    }
}

/// Images with the deterministic eval transform, loaded lazily or cached
#[derive(Debug, Clone)]
pub struct ImageDataset {
    samples: Vec<(PathBuf, usize)>,
    image_size: usize,
    cached_items: Option<Arc<Vec<ImageItem>>>,
}

impl ImageDataset {
    /// Dataset that decodes images on demand
    pub fn new(samples: Vec<(PathBuf, usize)>, image_size: usize) -> Self {
        Self {
            samples,
            image_size,
            cached_items: None,
        }
    }

    /// Unlabeled images get label 0
    pub fn unlabeled(paths: &[PathBuf], image_size: usize) -> Self {
        Self::new(paths.iter().map(|p| (p.clone(), 0)).collect(), image_size)
    }

    /// Load every image into memory in parallel
    ///
    /// Fails on the first image that cannot be decoded.
    pub fn new_cached(samples: Vec<(PathBuf, usize)>, image_size: usize) -> Result<Self> {
        let total = samples.len();
        println!("  📦 Pre-loading {} images into memory (parallel)...", total);

        let pb = preload_progress(total);
        let loaded = AtomicUsize::new(0);

        let cached_items: Vec<ImageItem> = samples
            .par_iter()
            .map(|(path, label)| {
                let result = ImageItem::from_path(path, *label, image_size);
                let count = loaded.fetch_add(1, Ordering::Relaxed);
                if count % 100 == 0 {
                    pb.set_position(count as u64);
                }
                result
            })
            .collect::<Result<_>>()?;

        pb.finish_with_message(format!("Loaded {} images", cached_items.len()));

        Ok(Self {
            samples,
            image_size,
            cached_items: Some(Arc::new(cached_items)),
        })
    }

    pub fn image_size(&self) -> usize {
        self.image_size
    }

    pub fn samples(&self) -> &[(PathBuf, usize)] {
        &self.samples
    }
}

impl TryDataset<ImageItem> for ImageDataset {
    fn try_get(&self, index: usize) -> Result<ImageItem> {
        if let Some(ref cached) = self.cached_items {
            return cached
                .get(index)
                .cloned()
                .ok_or_else(|| out_of_range(index, cached.len()));
        }

        let (path, label) = self
            .samples
            .get(index)
            .ok_or_else(|| out_of_range(index, self.samples.len()))?;
        ImageItem::from_path(path, *label, self.image_size)
    }
}

impl Dataset<ImageItem> for ImageDataset {
    fn get(&self, index: usize) -> Option<ImageItem> {
        logged(self.try_get(index))
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}

/// A batch of images with class targets
#[derive(Clone, Debug)]
pub struct ImageBatch<B: Backend> {
    /// Batch of images with shape [batch_size, 3, height, width]
    pub images: Tensor<B, 4>,
    /// Batch of labels with shape [batch_size]
    pub targets: Tensor<B, 1, Int>,
}

/// Batcher for eval-transformed images
#[derive(Clone, Debug)]
pub struct ImageBatcher<B: Backend> {
    image_size: usize,
    _backend: std::marker::PhantomData<B>,
}

impl<B: Backend> ImageBatcher<B> {
    pub fn new(image_size: usize) -> Self {
        Self {
            image_size,
            _backend: std::marker::PhantomData,
        }
    }
}

impl<B: Backend> Batcher<B, ImageItem, ImageBatch<B>> for ImageBatcher<B> {
    fn batch(&self, items: Vec<ImageItem>, device: &B::Device) -> ImageBatch<B> {
        let batch_size = items.len();
        let targets: Vec<i64> = items.iter().map(|item| item.label as i64).collect();
        let data: Vec<f32> = items.into_iter().flat_map(|item| item.image).collect();

        ImageBatch {
            images: normalized_images(data, batch_size, self.image_size, device),
            targets: int_tensor(targets, device),
        }
    }
}

// --------------------------------------------------------------------------------
// Raw images for on-the-fly augmentation
// --------------------------------------------------------------------------------

/// Decoded image kept unprocessed until batching
#[derive(Clone)]
pub struct RawImageItem {
    pub image: DynamicImage,
    pub label: usize,
    pub path: String,
}

impl RawImageItem {
    pub fn from_path(path: &Path, label: usize) -> Result<Self> {
        Ok(Self {
            image: load_image(path)?,
            label,
            path: path.to_string_lossy().to_string(),
        })
    }
}

impl std::fmt::Debug for RawImageItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawImageItem")
            .field("label", &self.label)
            .field("path", &self.path)
            .field(
                "image_size",
                &format!("{}x{}", self.image.width(), self.image.height()),
            )
            .finish()
    }
}

/// Raw images held in memory; cloning shares the storage
#[derive(Clone, Default)]
pub struct RawImageDataset {
    items: Arc<Vec<RawImageItem>>,
}

impl std::fmt::Debug for RawImageDataset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawImageDataset")
            .field("len", &self.items.len())
            .finish()
    }
}

impl RawImageDataset {
    /// Decode every image in parallel, failing on the first broken one
    pub fn new_cached(samples: Vec<(PathBuf, usize)>) -> Result<Self> {
        let total = samples.len();
        println!("  📦 Pre-loading {} raw images for augmentation...", total);

        let pb = preload_progress(total);
        let loaded = AtomicUsize::new(0);

        let items: Vec<_> = samples
            .par_iter()
            .map(|(path, label)| {
                let result = RawImageItem::from_path(path, *label);
                let count = loaded.fetch_add(1, Ordering::Relaxed);
                if count % 100 == 0 {
                    pb.set_position(count as u64);
                }
                result
            })
            .collect::<Result<_>>()?;

        pb.finish_with_message(format!("Loaded {} raw images", items.len()));

        Ok(Self {
            items: Arc::new(items),
        })
    }
}

impl TryDataset<RawImageItem> for RawImageDataset {
    fn try_get(&self, index: usize) -> Result<RawImageItem> {
        self.items
            .get(index)
            .cloned()
            .ok_or_else(|| out_of_range(index, self.items.len()))
    }
}

impl Dataset<RawImageItem> for RawImageDataset {
    fn get(&self, index: usize) -> Option<RawImageItem> {
        self.items.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.items.len()
    }
}

/// Unlabeled images decoded on demand
#[derive(Clone, Debug)]
pub struct UnlabeledDataset {
    paths: Arc<Vec<PathBuf>>,
}

impl UnlabeledDataset {
    pub fn new(paths: Vec<PathBuf>) -> Self {
        Self {
            paths: Arc::new(paths),
        }
    }
}

impl TryDataset<RawImageItem> for UnlabeledDataset {
    fn try_get(&self, index: usize) -> Result<RawImageItem> {
        let path = self
            .paths
            .get(index)
            .ok_or_else(|| out_of_range(index, self.paths.len()))?;
        RawImageItem::from_path(path, 0)
    }
}

impl Dataset<RawImageItem> for UnlabeledDataset {
    fn get(&self, index: usize) -> Option<RawImageItem> {
        logged(self.try_get(index))
    }

    fn len(&self) -> usize {
        self.paths.len()
    }
}

/// Batcher applying the training augmentation to raw images
#[derive(Clone, Debug)]
pub struct AugmentingBatcher<B: Backend> {
    augmentation: TrainAugmentation,
    image_size: usize,
    rng: BatchRng,
    _backend: std::marker::PhantomData<B>,
}

impl<B: Backend> AugmentingBatcher<B> {
    pub fn new(image_size: usize, seed: u64) -> Self {
        Self::with_augmentation(TrainAugmentation::with_defaults(image_size as u32), image_size, seed)
    }

    pub fn with_augmentation(augmentation: TrainAugmentation, image_size: usize, seed: u64) -> Self {
        Self {
            augmentation,
            image_size,
            rng: BatchRng::new(seed),
            _backend: std::marker::PhantomData,
        }
    }
}

impl<B: Backend> Batcher<B, RawImageItem, ImageBatch<B>> for AugmentingBatcher<B> {
    fn batch(&self, items: Vec<RawImageItem>, device: &B::Device) -> ImageBatch<B> {
        let batch_size = items.len();
        let mut rng = self.rng.next_rng();

        let mut data = Vec::with_capacity(batch_size * 3 * self.image_size * self.image_size);
        let mut targets = Vec::with_capacity(batch_size);

        for item in items {
            data.extend(to_tensor_data(&self.augmentation.apply(&item.image, &mut rng)));
            targets.push(item.label as i64);
        }

        ImageBatch {
            images: normalized_images(data, batch_size, self.image_size, device),
            targets: int_tensor(targets, device),
        }
    }
}

// --------------------------------------------------------------------------------
// Pseudo-labels and domain-tagged data
// --------------------------------------------------------------------------------

/// A real image with a model-assigned label
#[derive(Clone, Debug)]
pub struct PseudoLabeledItem {
    /// Eval-transformed image with the pseudo-label in `label`
    pub item: ImageItem,
    /// Softmax confidence of the pseudo-label
    pub confidence: f32,
}

/// Dataset for pseudo-labeled items
#[derive(Clone, Debug, Default)]
pub struct PseudoLabelDataset {
    items: Vec<PseudoLabeledItem>,
}

impl PseudoLabelDataset {
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    pub fn add(&mut self, item: PseudoLabeledItem) {
        self.items.push(item);
    }

    pub fn items(&self) -> &[PseudoLabeledItem] {
        &self.items
    }

    /// Get class distribution of pseudo-labels
    pub fn class_distribution(&self, num_classes: usize) -> Vec<usize> {
        let mut counts = vec![0usize; num_classes];
        for item in &self.items {
            if item.item.label < num_classes {
                counts[item.item.label] += 1;
            }
        }
        counts
    }

    pub fn average_confidence(&self) -> f64 {
        if self.items.is_empty() {
            return 0.0;
        }
        let sum: f32 = self.items.iter().map(|item| item.confidence).sum();
        sum as f64 / self.items.len() as f64
    }
}

impl Dataset<PseudoLabeledItem> for PseudoLabelDataset {
    fn get(&self, index: usize) -> Option<PseudoLabeledItem> {
        self.items.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.items.len()
    }
}

/// Image payload of a [`DomainItem`]
#[derive(Clone, Debug)]
pub enum DomainImage {
    /// Synthetic image, augmented at batch time
    Synthetic(RawImageItem),
    /// Pseudo-labeled real image, already eval-transformed
    Real(ImageItem),
}

/// An image tagged with class label and domain label
#[derive(Clone, Debug)]
pub struct DomainItem {
    pub image: DomainImage,
    pub label: usize,
}

impl DomainItem {
    pub fn domain(&self) -> usize {
        match self.image {
            DomainImage::Synthetic(_) => SYNTHETIC_DOMAIN,
            DomainImage::Real(_) => REAL_DOMAIN,
        }
    }
}

/// Synthetic training images followed by the pseudo-labeled real images
#[derive(Clone, Debug)]
pub struct DomainDataset {
    synthetic: RawImageDataset,
    pseudo: PseudoLabelDataset,
}

impl DomainDataset {
    pub fn new(synthetic: RawImageDataset, pseudo: PseudoLabelDataset) -> Self {
        Self { synthetic, pseudo }
    }

    pub fn num_synthetic(&self) -> usize {
        self.synthetic.len()
    }

    pub fn num_real(&self) -> usize {
        self.pseudo.len()
    }
}

impl TryDataset<DomainItem> for DomainDataset {
    fn try_get(&self, index: usize) -> Result<DomainItem> {
        self.get(index).ok_or_else(|| out_of_range(index, self.len()))
    }
}

impl Dataset<DomainItem> for DomainDataset {
    fn get(&self, index: usize) -> Option<DomainItem> {
        let num_synthetic = self.synthetic.len();
        if index < num_synthetic {
            let raw = self.synthetic.get(index)?;
            Some(DomainItem {
                label: raw.label,
                image: DomainImage::Synthetic(raw),
            })
        } else {
            let pseudo = self.pseudo.get(index - num_synthetic)?;
            Some(DomainItem {
                label: pseudo.item.label,
                image: DomainImage::Real(pseudo.item),
            })
        }
    }

    fn len(&self) -> usize {
        self.synthetic.len() + self.pseudo.len()
    }
}

/// A batch of domain-tagged images
#[derive(Clone, Debug)]
pub struct DomainBatch<B: Backend> {
    pub images: Tensor<B, 4>,
    pub targets: Tensor<B, 1, Int>,
    /// 0 = synthetic, 1 = real
    pub domains: Tensor<B, 1, Int>,
}

/// Batcher augmenting synthetic items and passing real items through
#[derive(Clone, Debug)]
pub struct DomainBatcher<B: Backend> {
    augmentation: TrainAugmentation,
    image_size: usize,
    rng: BatchRng,
    _backend: std::marker::PhantomData<B>,
}

impl<B: Backend> DomainBatcher<B> {
    pub fn new(image_size: usize, seed: u64) -> Self {
        Self::with_augmentation(TrainAugmentation::with_defaults(image_size as u32), image_size, seed)
    }

    pub fn with_augmentation(augmentation: TrainAugmentation, image_size: usize, seed: u64) -> Self {
        Self {
            augmentation,
            image_size,
            rng: BatchRng::new(seed),
            _backend: std::marker::PhantomData,
        }
    }
}

impl<B: Backend> Batcher<B, DomainItem, DomainBatch<B>> for DomainBatcher<B> {
    fn batch(&self, items: Vec<DomainItem>, device: &B::Device) -> DomainBatch<B> {
        let batch_size = items.len();
        let mut rng = self.rng.next_rng();

        let mut data = Vec::with_capacity(batch_size * 3 * self.image_size * self.image_size);
        let mut targets = Vec::with_capacity(batch_size);
        let mut domains = Vec::with_capacity(batch_size);

        for item in items {
            targets.push(item.label as i64);
            domains.push(item.domain() as i64);
            match item.image {
                DomainImage::Synthetic(raw) => {
                    data.extend(to_tensor_data(&self.augmentation.apply(&raw.image, &mut rng)))
                }
                DomainImage::Real(real) => data.extend(real.image),
            }
        }

        DomainBatch {
            images: normalized_images(data, batch_size, self.image_size, device),
            targets: int_tensor(targets, device),
            domains: int_tensor(domains, device),
        }
    }
}

// --------------------------------------------------------------------------------
// Weak/strong views for consistency training
// --------------------------------------------------------------------------------

/// Weak (eval transform) and strong (RandAugment) views of the same images
#[derive(Clone, Debug)]
pub struct ViewPairBatch<B: Backend> {
    pub weak: Tensor<B, 4>,
    pub strong: Tensor<B, 4>,
}

#[derive(Clone, Debug)]
pub struct ViewPairBatcher<B: Backend> {
    rand_augment: RandAugment,
    image_size: usize,
    rng: BatchRng,
    _backend: std::marker::PhantomData<B>,
}

impl<B: Backend> ViewPairBatcher<B> {
    pub fn new(image_size: usize, seed: u64) -> Self {
        Self {
            rand_augment: RandAugment::default(),
            image_size,
            rng: BatchRng::new(seed),
            _backend: std::marker::PhantomData,
        }
    }
}

impl<B: Backend> Batcher<B, RawImageItem, ViewPairBatch<B>> for ViewPairBatcher<B> {
    fn batch(&self, items: Vec<RawImageItem>, device: &B::Device) -> ViewPairBatch<B> {
        let batch_size = items.len();
        let size = self.image_size as u32;
        let mut rng = self.rng.next_rng();

        let mut weak = Vec::with_capacity(batch_size * 3 * self.image_size * self.image_size);
        let mut strong = Vec::with_capacity(weak.capacity());

        for item in items {
            weak.extend(to_tensor_data(&eval_transform(&item.image, size)));
            strong.extend(to_tensor_data(&strong_transform(
                &item.image,
                size,
                &self.rand_augment,
                &mut rng,
            )));
        }

        ViewPairBatch {
            weak: normalized_images(weak, batch_size, self.image_size, device),
            strong: normalized_images(strong, batch_size, self.image_size, device),
        }
    }
}

// --------------------------------------------------------------------------------
// Five-crop test-time augmentation
// --------------------------------------------------------------------------------

/// Five crops of one image, concatenated CHW data
#[derive(Clone, Debug)]
pub struct FiveCropItem {
    /// [5 * 3 * H * W]
    pub crops: Vec<f32>,
    pub label: usize,
    pub path: String,
}

impl FiveCropItem {
    pub fn from_path(path: &Path, label: usize, image_size: usize, crop_size: usize) -> Result<Self> {
        let img = load_image(path)?;
        let crops = five_crop_transform(&img, image_size as u32, crop_size as u32)
            .iter()
            .flat_map(to_tensor_data)
            .collect();

        Ok(Self {
            crops,
            label,
            path: path.to_string_lossy().to_string(),
        })
    }
}

/// Labeled images producing five crops each, decoded on demand
#[derive(Clone, Debug)]
pub struct FiveCropDataset {
    samples: Vec<(PathBuf, usize)>,
    image_size: usize,
    crop_size: usize,
}

impl FiveCropDataset {
    pub fn new(samples: Vec<(PathBuf, usize)>, image_size: usize, crop_size: usize) -> Self {
        Self {
            samples,
            image_size,
            crop_size,
        }
    }
}

impl TryDataset<FiveCropItem> for FiveCropDataset {
    fn try_get(&self, index: usize) -> Result<FiveCropItem> {
        let (path, label) = self
            .samples
            .get(index)
            .ok_or_else(|| out_of_range(index, self.samples.len()))?;
        FiveCropItem::from_path(path, *label, self.image_size, self.crop_size)
    }
}

impl Dataset<FiveCropItem> for FiveCropDataset {
    fn get(&self, index: usize) -> Option<FiveCropItem> {
        logged(self.try_get(index))
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}

/// Crops laid out image-major: rows `5 * i .. 5 * i + 5` belong to image `i`
#[derive(Clone, Debug)]
pub struct FiveCropBatch<B: Backend> {
    /// [batch_size * 5, 3, H, W]
    pub images: Tensor<B, 4>,
    /// [batch_size]
    pub targets: Tensor<B, 1, Int>,
}

#[derive(Clone, Debug)]
pub struct FiveCropBatcher<B: Backend> {
    image_size: usize,
    _backend: std::marker::PhantomData<B>,
}

impl<B: Backend> FiveCropBatcher<B> {
    pub fn new(image_size: usize) -> Self {
        Self {
            image_size,
            _backend: std::marker::PhantomData,
        }
    }
}

impl<B: Backend> Batcher<B, FiveCropItem, FiveCropBatch<B>> for FiveCropBatcher<B> {
    fn batch(&self, items: Vec<FiveCropItem>, device: &B::Device) -> FiveCropBatch<B> {
        let batch_size = items.len();
        let targets: Vec<i64> = items.iter().map(|item| item.label as i64).collect();
        let data: Vec<f32> = items.into_iter().flat_map(|item| item.crops).collect();

        FiveCropBatch {
            images: normalized_images(data, batch_size * NUM_CROPS, self.image_size, device),
            targets: int_tensor(targets, device),
        }
    }
}
