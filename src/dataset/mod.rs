//! Dataset module for the synthetic and real image folders
//!
//! This module provides:
//! - Folder discovery for labeled and unlabeled images
//! - Training, evaluation and RandAugment transforms
//! - Burn datasets and batchers for every training phase

pub mod augmentation;
pub mod burn_dataset;
pub mod loader;

pub use augmentation::{RandAugment, TrainAugmentConfig, TrainAugmentation};
pub use burn_dataset::{
    AugmentingBatcher, DomainBatch, DomainBatcher, DomainDataset, FiveCropBatch, FiveCropBatcher,
    FiveCropDataset, ImageBatch, ImageBatcher, ImageDataset, ImageItem, PseudoLabelDataset,
    PseudoLabeledItem, RawImageDataset, RawImageItem, TryDataset, UnlabeledDataset,
    ViewPairBatch, ViewPairBatcher,
};
pub use loader::{DatasetStats, ImageFolder, UnlabeledFolder};
