//! Image Transforms and Augmentation
//!
//! Turns decoded images into CHW float data in `[0, 1]`. ImageNet
//! normalization happens later, in the batchers.
//!
//! # Pipelines
//!
//! - **Train**: random resized crop, flip, rotation, color jitter, random
//!   grayscale, Gaussian blur
//! - **Eval**: resize shorter side, center crop (validation, test, pseudo-labeling,
//!   weak consistency view)
//! - **Five-crop**: resize shorter side, four corners + center (test-time augmentation)
//! - **Strong**: resize shorter side, center crop, RandAugment (strong consistency view)

use image::{imageops::FilterType, DynamicImage, GenericImageView, Rgb, RgbImage};
use rand::seq::SliceRandom;
use rand::Rng;
use rand_chacha::ChaCha8Rng;

/// Configuration for the training augmentation
#[derive(Clone, Debug)]
pub struct TrainAugmentConfig {
    /// Area fraction range of the random resized crop
    pub crop_scale: (f32, f32),
    /// Aspect ratio range of the random resized crop
    pub crop_ratio: (f32, f32),
    /// Probability of a horizontal flip
    pub horizontal_flip_prob: f32,
    /// Maximum rotation angle in degrees (applies ±rotation_degrees)
    pub rotation_degrees: f32,
    /// Brightness factor range is 1 ± brightness
    pub brightness: f32,
    /// Contrast factor range is 1 ± contrast
    pub contrast: f32,
    /// Saturation factor range is 1 ± saturation
    pub saturation: f32,
    /// Probability of converting to 3-channel grayscale
    pub grayscale_prob: f32,
    /// Gaussian blur kernel size (odd number, 0 = disabled)
    pub blur_kernel_size: u32,
    /// Range the blur sigma is drawn from
    pub blur_sigma: (f32, f32),
}

impl Default for TrainAugmentConfig {
    fn default() -> Self {
        Self {
            crop_scale: (0.6, 1.0),
            crop_ratio: (3.0 / 4.0, 4.0 / 3.0),
            horizontal_flip_prob: 0.5,
            rotation_degrees: 20.0,
            brightness: 0.3,
            contrast: 0.3,
            saturation: 0.3,
            grayscale_prob: 0.2,
            blur_kernel_size: 3,
            blur_sigma: (0.1, 2.0),
        }
    }
}

impl TrainAugmentConfig {
    /// Disable every random step; the crop keeps the full image
    pub fn none() -> Self {
        Self {
            crop_scale: (1.0, 1.0),
            crop_ratio: (1.0, 1.0),
            horizontal_flip_prob: 0.0,
            rotation_degrees: 0.0,
            brightness: 0.0,
            contrast: 0.0,
            saturation: 0.0,
            grayscale_prob: 0.0,
            blur_kernel_size: 0,
            blur_sigma: (0.1, 0.1),
        }
    }
}

/// Random training augmentation producing `image_size` squares
#[derive(Clone, Debug)]
pub struct TrainAugmentation {
    config: TrainAugmentConfig,
    image_size: u32,
}

impl TrainAugmentation {
    pub fn new(config: TrainAugmentConfig, image_size: u32) -> Self {
        Self { config, image_size }
    }

    pub fn with_defaults(image_size: u32) -> Self {
        Self::new(TrainAugmentConfig::default(), image_size)
    }

    /// Apply the full random pipeline
    pub fn apply(&self, img: &DynamicImage, rng: &mut ChaCha8Rng) -> RgbImage {
        let cfg = &self.config;
        let rgb = img.to_rgb8();

        let (x, y, w, h) = random_resized_crop_box(
            rgb.width(),
            rgb.height(),
            cfg.crop_scale,
            cfg.crop_ratio,
            rng,
        );
        let cropped = image::imageops::crop_imm(&rgb, x, y, w, h).to_image();
        let mut result = image::imageops::resize(
            &cropped,
            self.image_size,
            self.image_size,
            FilterType::Triangle,
        );

        if rng.gen::<f32>() < cfg.horizontal_flip_prob {
            result = image::imageops::flip_horizontal(&result);
        }

        if cfg.rotation_degrees > 0.0 {
            let angle = rng.gen_range(-cfg.rotation_degrees..=cfg.rotation_degrees);
            result = rotate(&result, angle);
        }

        result = self.color_jitter(result, rng);

        if rng.gen::<f32>() < cfg.grayscale_prob {
            result = grayscale(&result);
        }

        if cfg.blur_kernel_size > 0 {
            let sigma = rng.gen_range(cfg.blur_sigma.0..=cfg.blur_sigma.1);
            result = gaussian_blur(&result, cfg.blur_kernel_size, sigma);
        }

        result
    }

    /// Brightness, contrast and saturation in random order
    fn color_jitter(&self, mut img: RgbImage, rng: &mut ChaCha8Rng) -> RgbImage {
        let cfg = &self.config;
        let mut order = [0usize, 1, 2];
        order.shuffle(rng);

        for step in order {
            let (amount, op): (f32, fn(&RgbImage, f32) -> RgbImage) = match step {
                0 => (cfg.brightness, adjust_brightness),
                1 => (cfg.contrast, adjust_contrast),
                _ => (cfg.saturation, adjust_saturation),
            };
            if amount > 0.0 {
                let factor = rng.gen_range((1.0 - amount).max(0.0)..=1.0 + amount);
                img = op(&img, factor);
            }
        }

        img
    }
}

/// Deterministic resize-then-center-crop used for evaluation
pub fn eval_transform(img: &DynamicImage, image_size: u32) -> RgbImage {
    let resized = resize_shorter_side(img, image_size);
    center_crop(&resized, image_size)
}

/// Resize so the shorter side equals `size`, keeping the aspect ratio
pub fn resize_shorter_side(img: &DynamicImage, size: u32) -> RgbImage {
    let (width, height) = img.dimensions();
    let (new_w, new_h) = if width <= height {
        let h = (size as f64 * height as f64 / width as f64) as u32;
        (size, h.max(size))
    } else {
        let w = (size as f64 * width as f64 / height as f64) as u32;
        (w.max(size), size)
    };

    if (new_w, new_h) == (width, height) {
        return img.to_rgb8();
    }

    image::imageops::resize(&img.to_rgb8(), new_w, new_h, FilterType::Triangle)
}

/// Crop a `size` square from the middle of the image
pub fn center_crop(img: &RgbImage, size: u32) -> RgbImage {
    let (width, height) = img.dimensions();
    if width < size || height < size {
        return image::imageops::resize(img, size, size, FilterType::Triangle);
    }

    let x = ((width - size) as f32 / 2.0).round() as u32;
    let y = ((height - size) as f32 / 2.0).round() as u32;
    image::imageops::crop_imm(img, x, y, size, size).to_image()
}

/// Top-left, top-right, bottom-left, bottom-right and center crops
pub fn five_crop(img: &RgbImage, size: u32) -> [RgbImage; 5] {
    let (width, height) = img.dimensions();
    let size = size.min(width).min(height);
    let right = width - size;
    let bottom = height - size;

    let crop = |x: u32, y: u32| image::imageops::crop_imm(img, x, y, size, size).to_image();

    [
        crop(0, 0),
        crop(right, 0),
        crop(0, bottom),
        crop(right, bottom),
        center_crop(img, size),
    ]
}

/// Five crops of the resized image, each resized back to `image_size`
/// when `crop_size` is smaller
pub fn five_crop_transform(img: &DynamicImage, image_size: u32, crop_size: u32) -> [RgbImage; 5] {
    let resized = resize_shorter_side(img, image_size);
    five_crop(&resized, crop_size).map(|crop| {
        if crop.dimensions() == (image_size, image_size) {
            crop
        } else {
            image::imageops::resize(&crop, image_size, image_size, FilterType::Triangle)
        }
    })
}

/// Convert to CHW float data in `[0, 1]`
pub fn to_tensor_data(img: &RgbImage) -> Vec<f32> {
    let (width, height) = img.dimensions();
    let plane = (width * height) as usize;
    let mut data = vec![0.0f32; 3 * plane];

    for (x, y, pixel) in img.enumerate_pixels() {
        let idx = (y * width + x) as usize;
        for c in 0..3 {
            data[c * plane + idx] = pixel[c] as f32 / 255.0;
        }
    }

    data
}

/// Sample the random resized crop box `(x, y, w, h)`
///
/// Tries ten times to find a box with the requested area fraction and
/// aspect ratio, then falls back to the largest centered box within the
/// ratio range.
pub fn random_resized_crop_box(
    width: u32,
    height: u32,
    scale: (f32, f32),
    ratio: (f32, f32),
    rng: &mut ChaCha8Rng,
) -> (u32, u32, u32, u32) {
    let area = (width * height) as f32;
    let (log_r0, log_r1) = (ratio.0.ln(), ratio.1.ln());

    for _ in 0..10 {
        let target_area = area * rng.gen_range(scale.0..=scale.1);
        let aspect = rng.gen_range(log_r0..=log_r1).exp();

        let w = (target_area * aspect).sqrt().round() as u32;
        let h = (target_area / aspect).sqrt().round() as u32;

        if w > 0 && h > 0 && w <= width && h <= height {
            let x = rng.gen_range(0..=width - w);
            let y = rng.gen_range(0..=height - h);
            return (x, y, w, h);
        }
    }

    let in_ratio = width as f32 / height as f32;
    let (w, h) = if in_ratio < ratio.0 {
        (width, ((width as f32 / ratio.0).round() as u32).min(height))
    } else if in_ratio > ratio.1 {
        (((height as f32 * ratio.1).round() as u32).min(width), height)
    } else {
        (width, height)
    };

    ((width - w) / 2, (height - h) / 2, w, h)
}

/// Rotate around the center by `angle_degrees`, filling with black
pub fn rotate(img: &RgbImage, angle_degrees: f32) -> RgbImage {
    if angle_degrees.abs() < 0.1 {
        return img.clone();
    }

    let (width, height) = img.dimensions();
    let (sin_a, cos_a) = angle_degrees.to_radians().sin_cos();
    let cx = width as f32 / 2.0;
    let cy = height as f32 / 2.0;

    RgbImage::from_fn(width, height, |x, y| {
        let dx = x as f32 - cx;
        let dy = y as f32 - cy;
        bilinear_sample(img, cx + dx * cos_a + dy * sin_a, cy - dx * sin_a + dy * cos_a)
    })
}

/// Sample a pixel using bilinear interpolation; black outside the image
fn bilinear_sample(img: &RgbImage, x: f32, y: f32) -> Rgb<u8> {
    let (width, height) = img.dimensions();

    if x < 0.0 || y < 0.0 || x > (width - 1) as f32 || y > (height - 1) as f32 {
        return Rgb([0, 0, 0]);
    }

    let x0 = x.floor() as u32;
    let y0 = y.floor() as u32;
    let x1 = (x0 + 1).min(width - 1);
    let y1 = (y0 + 1).min(height - 1);

    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let p00 = img.get_pixel(x0, y0);
    let p10 = img.get_pixel(x1, y0);
    let p01 = img.get_pixel(x0, y1);
    let p11 = img.get_pixel(x1, y1);

    let mut result = [0u8; 3];
    for c in 0..3 {
        let v = p00[c] as f32 * (1.0 - fx) * (1.0 - fy)
            + p10[c] as f32 * fx * (1.0 - fy)
            + p01[c] as f32 * (1.0 - fx) * fy
            + p11[c] as f32 * fx * fy;

        result[c] = v.round().clamp(0.0, 255.0) as u8;
    }

    Rgb(result)
}

/// ITU-R 601-2 luma
fn luma(p: &Rgb<u8>) -> f32 {
    0.299 * p[0] as f32 + 0.587 * p[1] as f32 + 0.114 * p[2] as f32
}

/// `degenerate + factor * (img - degenerate)`, per pixel and channel
fn blend(degenerate: &RgbImage, img: &RgbImage, factor: f32) -> RgbImage {
    RgbImage::from_fn(img.width(), img.height(), |x, y| {
        let d = degenerate.get_pixel(x, y);
        let p = img.get_pixel(x, y);
        let mut out = [0u8; 3];
        for c in 0..3 {
            let v = d[c] as f32 + factor * (p[c] as f32 - d[c] as f32);
            out[c] = v.round().clamp(0.0, 255.0) as u8;
        }
        Rgb(out)
    })
}

/// Scale intensities by `factor`
pub fn adjust_brightness(img: &RgbImage, factor: f32) -> RgbImage {
    let black = RgbImage::new(img.width(), img.height());
    blend(&black, img, factor)
}

/// Scale distances to the mean gray level by `factor`
pub fn adjust_contrast(img: &RgbImage, factor: f32) -> RgbImage {
    let count = (img.width() * img.height()).max(1) as f32;
    let mean = img.pixels().map(luma).sum::<f32>() / count;
    let mean = mean.round().clamp(0.0, 255.0) as u8;

    let gray = RgbImage::from_pixel(img.width(), img.height(), Rgb([mean; 3]));
    blend(&gray, img, factor)
}

/// Interpolate between the grayscale image and the original
pub fn adjust_saturation(img: &RgbImage, factor: f32) -> RgbImage {
    blend(&grayscale(img), img, factor)
}

/// 3-channel grayscale
pub fn grayscale(img: &RgbImage) -> RgbImage {
    let mut out = img.clone();
    for pixel in out.pixels_mut() {
        let l = luma(pixel).round().clamp(0.0, 255.0) as u8;
        *pixel = Rgb([l; 3]);
    }
    out
}

/// Separable Gaussian blur with reflected borders
pub fn gaussian_blur(img: &RgbImage, kernel_size: u32, sigma: f32) -> RgbImage {
    let half = (kernel_size / 2) as i64;
    let mut kernel: Vec<f32> = (-half..=half)
        .map(|i| (-((i * i) as f32) / (2.0 * sigma * sigma)).exp())
        .collect();
    let total: f32 = kernel.iter().sum();
    kernel.iter_mut().for_each(|k| *k /= total);

    let (width, height) = img.dimensions();
    let reflect = |i: i64, n: u32| -> u32 {
        let n = n as i64;
        if n == 1 {
            return 0;
        }
        let mut i = i;
        if i < 0 {
            i = -i;
        }
        if i >= n {
            i = 2 * (n - 1) - i;
        }
        i.clamp(0, n - 1) as u32
    };

    let pass = |src: &RgbImage, horizontal: bool| -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            let mut acc = [0.0f32; 3];
            for (k, weight) in kernel.iter().enumerate() {
                let offset = k as i64 - half;
                let p = if horizontal {
                    src.get_pixel(reflect(x as i64 + offset, width), y)
                } else {
                    src.get_pixel(x, reflect(y as i64 + offset, height))
                };
                for c in 0..3 {
                    acc[c] += weight * p[c] as f32;
                }
            }
            Rgb(acc.map(|v| v.round().clamp(0.0, 255.0) as u8))
        })
    };

    let horizontal = pass(img, true);
    pass(&horizontal, false)
}

/// RandAugment operations
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RandAugmentOp {
    Identity,
    ShearX,
    ShearY,
    TranslateX,
    TranslateY,
    Rotate,
    Brightness,
    Color,
    Contrast,
    Sharpness,
    Posterize,
    Solarize,
    AutoContrast,
    Equalize,
}

impl RandAugmentOp {
    pub const ALL: [RandAugmentOp; 14] = [
        RandAugmentOp::Identity,
        RandAugmentOp::ShearX,
        RandAugmentOp::ShearY,
        RandAugmentOp::TranslateX,
        RandAugmentOp::TranslateY,
        RandAugmentOp::Rotate,
        RandAugmentOp::Brightness,
        RandAugmentOp::Color,
        RandAugmentOp::Contrast,
        RandAugmentOp::Sharpness,
        RandAugmentOp::Posterize,
        RandAugmentOp::Solarize,
        RandAugmentOp::AutoContrast,
        RandAugmentOp::Equalize,
    ];

    /// Whether the magnitude gets a random sign
    fn signed(&self) -> bool {
        matches!(
            self,
            RandAugmentOp::ShearX
                | RandAugmentOp::ShearY
                | RandAugmentOp::TranslateX
                | RandAugmentOp::TranslateY
                | RandAugmentOp::Rotate
                | RandAugmentOp::Brightness
                | RandAugmentOp::Color
                | RandAugmentOp::Contrast
                | RandAugmentOp::Sharpness
        )
    }

    /// Unsigned magnitude at bin `magnitude` out of `num_bins`
    pub fn magnitude(&self, magnitude: usize, num_bins: usize, width: u32, height: u32) -> f32 {
        let t = if num_bins > 1 {
            magnitude.min(num_bins - 1) as f32 / (num_bins - 1) as f32
        } else {
            0.0
        };

        match self {
            RandAugmentOp::ShearX | RandAugmentOp::ShearY => 0.3 * t,
            RandAugmentOp::TranslateX => 150.0 / 331.0 * width as f32 * t,
            RandAugmentOp::TranslateY => 150.0 / 331.0 * height as f32 * t,
            RandAugmentOp::Rotate => 30.0 * t,
            RandAugmentOp::Brightness
            | RandAugmentOp::Color
            | RandAugmentOp::Contrast
            | RandAugmentOp::Sharpness => 0.9 * t,
            // bits kept
            RandAugmentOp::Posterize => {
                let step = (num_bins.max(2) - 1) as f32 / 4.0;
                8.0 - (magnitude as f32 / step).round()
            }
            // threshold
            RandAugmentOp::Solarize => 255.0 * (1.0 - t),
            RandAugmentOp::Identity | RandAugmentOp::AutoContrast | RandAugmentOp::Equalize => 0.0,
        }
    }

    pub fn apply(&self, img: &RgbImage, value: f32) -> RgbImage {
        match self {
            RandAugmentOp::Identity => img.clone(),
            RandAugmentOp::ShearX => affine_nearest(img, |x, y| (x + value * y, y)),
            RandAugmentOp::ShearY => affine_nearest(img, |x, y| (x, y + value * x)),
            RandAugmentOp::TranslateX => affine_nearest(img, |x, y| (x - value, y)),
            RandAugmentOp::TranslateY => affine_nearest(img, |x, y| (x, y - value)),
            RandAugmentOp::Rotate => rotate(img, value),
            RandAugmentOp::Brightness => adjust_brightness(img, 1.0 + value),
            RandAugmentOp::Color => adjust_saturation(img, 1.0 + value),
            RandAugmentOp::Contrast => adjust_contrast(img, 1.0 + value),
            RandAugmentOp::Sharpness => adjust_sharpness(img, 1.0 + value),
            RandAugmentOp::Posterize => posterize(img, value as u32),
            RandAugmentOp::Solarize => solarize(img, value),
            RandAugmentOp::AutoContrast => autocontrast(img),
            RandAugmentOp::Equalize => equalize(img),
        }
    }
}

/// RandAugment: `num_ops` operations drawn uniformly, each at a fixed magnitude
#[derive(Clone, Debug)]
pub struct RandAugment {
    pub num_ops: usize,
    pub magnitude: usize,
    pub num_bins: usize,
}

impl Default for RandAugment {
    fn default() -> Self {
        Self {
            num_ops: 2,
            magnitude: 9,
            num_bins: 31,
        }
    }
}

impl RandAugment {
    pub fn apply(&self, img: &RgbImage, rng: &mut ChaCha8Rng) -> RgbImage {
        let mut result = img.clone();

        for _ in 0..self.num_ops {
            let op = RandAugmentOp::ALL[rng.gen_range(0..RandAugmentOp::ALL.len())];
            let mut value = op.magnitude(self.magnitude, self.num_bins, result.width(), result.height());
            if op.signed() && rng.gen_bool(0.5) {
                value = -value;
            }
            result = op.apply(&result, value);
        }

        result
    }
}

/// Strong view: eval resize + center crop followed by RandAugment
pub fn strong_transform(
    img: &DynamicImage,
    image_size: u32,
    rand_augment: &RandAugment,
    rng: &mut ChaCha8Rng,
) -> RgbImage {
    rand_augment.apply(&eval_transform(img, image_size), rng)
}

/// Resample through an inverse map with nearest neighbour, black outside
fn affine_nearest(img: &RgbImage, inverse: impl Fn(f32, f32) -> (f32, f32)) -> RgbImage {
    let (width, height) = img.dimensions();
    RgbImage::from_fn(width, height, |x, y| {
        let (sx, sy) = inverse(x as f32, y as f32);
        let (sx, sy) = (sx.round(), sy.round());
        if sx < 0.0 || sy < 0.0 || sx >= width as f32 || sy >= height as f32 {
            Rgb([0, 0, 0])
        } else {
            *img.get_pixel(sx as u32, sy as u32)
        }
    })
}

/// Blend with a 3x3 smoothed copy; border pixels stay untouched
pub fn adjust_sharpness(img: &RgbImage, factor: f32) -> RgbImage {
    let (width, height) = img.dimensions();
    if width < 3 || height < 3 {
        return img.clone();
    }

    let mut smooth = img.clone();
    for y in 1..height - 1 {
        for x in 1..width - 1 {
            let mut acc = [0.0f32; 3];
            for dy in 0..3 {
                for dx in 0..3 {
                    let weight = if dx == 1 && dy == 1 { 5.0 } else { 1.0 };
                    let p = img.get_pixel(x + dx - 1, y + dy - 1);
                    for c in 0..3 {
                        acc[c] += weight * p[c] as f32;
                    }
                }
            }
            smooth.put_pixel(x, y, Rgb(acc.map(|v| (v / 13.0).round().clamp(0.0, 255.0) as u8)));
        }
    }

    blend(&smooth, img, factor)
}

/// Keep the top `bits` bits of every channel
pub fn posterize(img: &RgbImage, bits: u32) -> RgbImage {
    let bits = bits.clamp(1, 8);
    let mask = !((1u16 << (8 - bits)) - 1) as u8;
    let mut out = img.clone();
    for pixel in out.pixels_mut() {
        pixel.0 = pixel.0.map(|v| v & mask);
    }
    out
}

/// Invert every channel value at or above `threshold`
pub fn solarize(img: &RgbImage, threshold: f32) -> RgbImage {
    let mut out = img.clone();
    for pixel in out.pixels_mut() {
        pixel.0 = pixel.0.map(|v| if v as f32 >= threshold { 255 - v } else { v });
    }
    out
}

/// Stretch each channel to the full `[0, 255]` range
pub fn autocontrast(img: &RgbImage) -> RgbImage {
    let mut lo = [255u8; 3];
    let mut hi = [0u8; 3];
    for pixel in img.pixels() {
        for c in 0..3 {
            lo[c] = lo[c].min(pixel[c]);
            hi[c] = hi[c].max(pixel[c]);
        }
    }

    let mut out = img.clone();
    for pixel in out.pixels_mut() {
        for c in 0..3 {
            if hi[c] > lo[c] {
                let scale = 255.0 / (hi[c] - lo[c]) as f32;
                pixel[c] = ((pixel[c] - lo[c]) as f32 * scale).round().clamp(0.0, 255.0) as u8;
            }
        }
    }
    out
}

/// Per-channel histogram equalization
pub fn equalize(img: &RgbImage) -> RgbImage {
    let mut luts = [[0u8; 256]; 3];

    for (c, lut) in luts.iter_mut().enumerate() {
        let mut hist = [0usize; 256];
        for pixel in img.pixels() {
            hist[pixel[c] as usize] += 1;
        }

        let last_nonzero = hist.iter().rposition(|&h| h > 0).map(|i| hist[i]).unwrap_or(0);
        let step = (hist.iter().sum::<usize>() - last_nonzero) / 255;

        if step == 0 {
            for (i, entry) in lut.iter_mut().enumerate() {
                *entry = i as u8;
            }
            continue;
        }

        let mut n = step / 2;
        for (i, entry) in lut.iter_mut().enumerate() {
            *entry = (n / step).min(255) as u8;
            n += hist[i];
        }
    }

    let mut out = img.clone();
    for pixel in out.pixels_mut() {
        for c in 0..3 {
            pixel[c] = luts[c][pixel[c] as usize];
        }
    }
    out
}
