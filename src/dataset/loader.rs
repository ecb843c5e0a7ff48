//! Image folder discovery
//!
//! Two on-disk layouts are supported:
//! - labeled folders with one sub-directory per class (synthetic train/val,
//!   real test); labels are the index of the class name in sorted order
//! - flat unlabeled folders (real images without labels)

use std::path::{Path, PathBuf};

use image::{DynamicImage, ImageReader};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::utils::error::{Result, Synth2RealError};

/// File extensions accepted as images
pub const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "bmp"];

/// A single labeled image on disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSample {
    pub path: PathBuf,
    /// Class label index
    pub label: usize,
}

/// Labeled images organised as `root/<class_name>/<image>`
#[derive(Debug, Clone)]
pub struct ImageFolder {
    pub root_dir: PathBuf,
    pub samples: Vec<ImageSample>,
    /// Class names, index = label
    pub classes: Vec<String>,
}

impl ImageFolder {
    /// Scan a class-per-directory image folder
    ///
    /// ```text
    /// root_dir/
    /// ├── airplane/
    /// │   ├── 0001.png
    /// │   └── 0002.png
    /// ├── car/
    /// └── ship/
    /// ```
    pub fn new<P: AsRef<Path>>(root_dir: P) -> Result<Self> {
        let root_dir = root_dir.as_ref().to_path_buf();
        info!("Scanning image folder: {:?}", root_dir);

        if !root_dir.is_dir() {
            return Err(Synth2RealError::PathNotFound(root_dir));
        }

        let mut classes: Vec<String> = Vec::new();
        for entry in std::fs::read_dir(&root_dir)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    classes.push(name.to_string());
                }
            }
        }
        classes.sort();

        let mut samples = Vec::new();
        for (label, class_name) in classes.iter().enumerate() {
            let before = samples.len();
            samples.extend(
                list_images(&root_dir.join(class_name))
                    .into_iter()
                    .map(|path| ImageSample { path, label }),
            );

            debug!(
                "Class '{}' (label {}): {} images",
                class_name,
                label,
                samples.len() - before
            );
        }

        if samples.is_empty() {
            return Err(Synth2RealError::EmptyDataset(root_dir));
        }

        info!(
            "Found {} images in {} classes",
            samples.len(),
            classes.len()
        );

        Ok(Self {
            root_dir,
            samples,
            classes,
        })
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn num_classes(&self) -> usize {
        self.classes.len()
    }

    /// Warn when two folders disagree on class names, since labels are
    /// positional and would silently mean different things
    pub fn check_classes_match(&self, other: &ImageFolder) -> bool {
        let matches = self.classes == other.classes;
        if !matches {
            warn!(
                "Class names differ between {:?} {:?} and {:?} {:?}",
                self.root_dir, self.classes, other.root_dir, other.classes
            );
        }
        matches
    }

    /// Samples as `(path, label)` pairs
    pub fn pairs(&self) -> Vec<(PathBuf, usize)> {
        self.samples
            .iter()
            .map(|s| (s.path.clone(), s.label))
            .collect()
    }

    pub fn get_stats(&self) -> DatasetStats {
        let mut class_counts = vec![0usize; self.num_classes()];
        for sample in &self.samples {
            class_counts[sample.label] += 1;
        }

        DatasetStats {
            total_samples: self.samples.len(),
            class_counts,
            class_names: self.classes.clone(),
        }
    }
}

/// Unlabeled images in a single directory
#[derive(Debug, Clone)]
pub struct UnlabeledFolder {
    pub root_dir: PathBuf,
    /// Image paths in sorted order
    pub paths: Vec<PathBuf>,
}

impl UnlabeledFolder {
    /// Collect the images directly inside `root_dir`
    pub fn new<P: AsRef<Path>>(root_dir: P) -> Result<Self> {
        let root_dir = root_dir.as_ref();
        info!("Scanning unlabeled folder: {:?}", root_dir);

        if !root_dir.is_dir() {
            return Err(Synth2RealError::PathNotFound(root_dir.to_path_buf()));
        }

        let paths = list_images(root_dir);
        if paths.is_empty() {
            return Err(Synth2RealError::EmptyDataset(root_dir.to_path_buf()));
        }

        info!("Found {} unlabeled images", paths.len());

        Ok(Self {
            root_dir: root_dir.to_path_buf(),
            paths,
        })
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

/// Statistics about a labeled folder
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetStats {
    pub total_samples: usize,
    pub class_counts: Vec<usize>,
    pub class_names: Vec<String>,
}

impl DatasetStats {
    /// Print statistics to console
    pub fn print(&self, title: &str) {
        println!("\n📊 {}:", title);
        println!("  Total samples: {}", self.total_samples);
        println!("  Number of classes: {}", self.class_names.len());

        for (idx, (name, count)) in self.class_names.iter().zip(&self.class_counts).enumerate() {
            let bar_len = (*count as f32 / self.total_samples.max(1) as f32 * 40.0) as usize;
            println!("    {:3}. {:20} {:6} {}", idx, name, count, "█".repeat(bar_len));
        }
    }
}

/// Decode an image from disk
pub fn load_image(path: &Path) -> Result<DynamicImage> {
    ImageReader::open(path)
        .map_err(|e| Synth2RealError::ImageLoad(path.to_path_buf(), e.to_string()))?
        .with_guessed_format()
        .map_err(|e| Synth2RealError::ImageLoad(path.to_path_buf(), e.to_string()))?
        .decode()
        .map_err(|e| Synth2RealError::ImageLoad(path.to_path_buf(), e.to_string()))
}

/// Image files below `dir`, sorted by path
/// Image files directly inside `dir`, sorted
fn list_images(dir: &Path) -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|path| is_image(path))
        .collect();

    paths.sort();
    paths
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    /// Write a solid-color PNG
    pub(crate) fn write_png(path: &Path, size: u32, color: [u8; 3]) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        RgbImage::from_pixel(size, size, Rgb(color)).save(path).unwrap();
    }

    #[test]
    fn test_image_folder_sorted_classes() {
        let dir = tempfile::tempdir().unwrap();
        write_png(&dir.path().join("ship/a.png"), 8, [0, 0, 255]);
        write_png(&dir.path().join("airplane/b.png"), 8, [255, 0, 0]);
        write_png(&dir.path().join("airplane/a.PNG"), 8, [255, 0, 0]);
        write_png(&dir.path().join("car/c.png"), 8, [0, 255, 0]);
        std::fs::write(dir.path().join("car/notes.txt"), "skip me").unwrap();

        let folder = ImageFolder::new(dir.path()).unwrap();

        assert_eq!(folder.classes, vec!["airplane", "car", "ship"]);
        assert_eq!(folder.len(), 4);
        assert_eq!(folder.samples[0].label, 0);
        assert!(folder.samples[0].path.ends_with("airplane/a.PNG"));
        assert_eq!(folder.samples[3].label, 2);
        assert_eq!(folder.get_stats().class_counts, vec![2, 1, 1]);
    }

    #[test]
    fn test_image_folder_missing_dir() {
        let err = ImageFolder::new("/definitely/not/here").unwrap_err();
        assert!(matches!(err, Synth2RealError::PathNotFound(_)));
    }

    #[test]
    fn test_image_folder_empty() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("cat")).unwrap();

        let err = ImageFolder::new(dir.path()).unwrap_err();
        assert!(matches!(err, Synth2RealError::EmptyDataset(_)));
    }

    #[test]
    fn test_unlabeled_folder_is_flat_and_sorted() {
        let dir = tempfile::tempdir().unwrap();
        write_png(&dir.path().join("1.png"), 8, [10, 10, 10]);
        write_png(&dir.path().join("0.png"), 8, [10, 10, 10]);
        write_png(&dir.path().join("nested/2.png"), 8, [10, 10, 10]);

        let flat = UnlabeledFolder::new(dir.path()).unwrap();
        assert_eq!(flat.len(), 2);
        assert!(flat.paths[0].ends_with("0.png"));

        assert!(flat.paths[1].ends_with("1.png"));
    }

    #[test]
    fn test_class_match_check() {
        let a = tempfile::tempdir().unwrap();
        let b = tempfile::tempdir().unwrap();
        write_png(&a.path().join("cat/0.png"), 4, [0, 0, 0]);
        write_png(&b.path().join("dog/0.png"), 4, [0, 0, 0]);

        let a = ImageFolder::new(a.path()).unwrap();
        let b = ImageFolder::new(b.path()).unwrap();
        assert!(a.check_classes_match(&a.clone()));
        assert!(!a.check_classes_match(&b));
    }

    #[test]
    fn test_load_image_error_names_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.png");
        std::fs::write(&path, b"not an image").unwrap();

        let err = load_image(&path).unwrap_err();
        assert!(matches!(err, Synth2RealError::ImageLoad(p, _) if p == path));
    }
}
