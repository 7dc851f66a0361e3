//! Image preprocessing for OCR.

use std::path::Path;

use image::{DynamicImage, GenericImageView, GrayImage, ImageFormat, Luma};
use tracing::debug;

use crate::error::OcrError;
use crate::models::config::PreprocessConfig;

/// Normalizes a decoded page for OCR: grayscale, bounded size, stretched
/// contrast, optional median denoise and adaptive binarization.
pub struct ImagePreprocessor {
    /// Maximum image dimension.
    max_size: u32,
    /// Neighbourhood for adaptive thresholding (forced odd).
    block_size: u32,
    /// Constant subtracted from the local mean.
    offset: i32,
    /// Apply a 3x3 median filter before thresholding.
    denoise: bool,
}

impl ImagePreprocessor {
    /// Create a new preprocessor with default settings.
    pub fn new() -> Self {
        Self::from_config(&PreprocessConfig::default())
    }

    pub fn from_config(config: &PreprocessConfig) -> Self {
        Self {
            max_size: config.max_image_size.max(1),
            block_size: config.threshold_block_size.max(3) | 1,
            offset: config.threshold_offset,
            denoise: config.denoise,
        }
    }

    /// Set maximum image dimension.
    pub fn with_max_size(mut self, size: u32) -> Self {
        self.max_size = size.max(1);
        self
    }

    /// Decode raw image bytes (PNG, JPEG, ...).
    pub fn decode(bytes: &[u8]) -> Result<DynamicImage, OcrError> {
        image::load_from_memory(bytes).map_err(|e| OcrError::InvalidImage(e.to_string()))
    }

    /// Normalize `image` and write it as PNG to `output`.
    pub fn process_to_file(&self, image: &DynamicImage, output: &Path) -> Result<(), OcrError> {
        let processed = self.process(image);
        processed
            .save_with_format(output, ImageFormat::Png)
            .map_err(|e| OcrError::Preprocessing(format!("{}: {}", output.display(), e)))
    }

    /// Normalize an image for OCR.
    pub fn process(&self, image: &DynamicImage) -> GrayImage {
        let (orig_width, orig_height) = image.dimensions();
        let (width, height) = self.calculate_resize_dimensions(orig_width, orig_height);

        let resized;
        let image = if (width, height) != (orig_width, orig_height) {
            debug!(
                "Downscaling {}x{} to {}x{}",
                orig_width, orig_height, width, height
            );
            resized = image.resize_exact(width, height, image::imageops::FilterType::Triangle);
            &resized
        } else {
            image
        };

        let mut gray = image.to_luma8();
        stretch_contrast(&mut gray);
        if self.denoise {
            gray = median3(&gray);
        }
        self.adaptive_threshold(&gray)
    }

    fn calculate_resize_dimensions(&self, width: u32, height: u32) -> (u32, u32) {
        let max_dim = width.max(height);

        if max_dim <= self.max_size {
            return (width, height);
        }

        let scale = self.max_size as f32 / max_dim as f32;
        let new_width = (width as f32 * scale) as u32;
        let new_height = (height as f32 * scale) as u32;

        (new_width.max(1), new_height.max(1))
    }

    /// Mean-based adaptive threshold using an integral image.
    fn adaptive_threshold(&self, image: &GrayImage) -> GrayImage {
        let (width, height) = image.dimensions();
        let (w, h) = (width as usize, height as usize);

        // integral[(y + 1) * (w + 1) + (x + 1)] = sum of pixels above and left
        let stride = w + 1;
        let mut integral = vec![0u64; stride * (h + 1)];
        for y in 0..h {
            let mut row_sum = 0u64;
            for x in 0..w {
                row_sum += image.get_pixel(x as u32, y as u32)[0] as u64;
                integral[(y + 1) * stride + x + 1] = integral[y * stride + x + 1] + row_sum;
            }
        }

        let half_block = (self.block_size / 2) as usize;
        let mut result = GrayImage::new(width, height);

        for y in 0..h {
            let y0 = y.saturating_sub(half_block);
            let y1 = (y + half_block + 1).min(h);
            for x in 0..w {
                let x0 = x.saturating_sub(half_block);
                let x1 = (x + half_block + 1).min(w);

                let sum = integral[y1 * stride + x1] + integral[y0 * stride + x0]
                    - integral[y0 * stride + x1]
                    - integral[y1 * stride + x0];
                let count = ((y1 - y0) * (x1 - x0)) as u64;

                let threshold = (sum / count) as i32 - self.offset;
                let pixel_value = image.get_pixel(x as u32, y as u32)[0] as i32;

                let output = if pixel_value > threshold { 255 } else { 0 };
                result.put_pixel(x as u32, y as u32, Luma([output]));
            }
        }

        result
    }
}

impl Default for ImagePreprocessor {
    fn default() -> Self {
        Self::new()
    }
}

/// Linearly map the darkest..brightest range onto 0..255.
fn stretch_contrast(image: &mut GrayImage) {
    let (min, max) = image
        .pixels()
        .fold((u8::MAX, u8::MIN), |(lo, hi), p| (lo.min(p[0]), hi.max(p[0])));

    if max <= min {
        return;
    }

    let range = (max - min) as u32;
    for pixel in image.pixels_mut() {
        pixel[0] = (((pixel[0] - min) as u32 * 255) / range) as u8;
    }
}

/// 3x3 median filter; border pixels use the clamped neighbourhood.
fn median3(image: &GrayImage) -> GrayImage {
    let (width, height) = image.dimensions();
    let mut result = GrayImage::new(width, height);
    let mut window = Vec::with_capacity(9);

    for y in 0..height {
        for x in 0..width {
            window.clear();
            for ny in y.saturating_sub(1)..=(y + 1).min(height - 1) {
                for nx in x.saturating_sub(1)..=(x + 1).min(width - 1) {
                    window.push(image.get_pixel(nx, ny)[0]);
                }
            }
            window.sort_unstable();
            result.put_pixel(x, y, Luma([window[window.len() / 2]]));
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resize_dimensions() {
        let preprocessor = ImagePreprocessor::new().with_max_size(960);

        // Image smaller than target
        let (w, h) = preprocessor.calculate_resize_dimensions(500, 300);
        assert_eq!((w, h), (500, 300));

        // Image larger than target
        let (w, h) = preprocessor.calculate_resize_dimensions(1920, 1080);
        assert_eq!(w, 960);
        assert!(h < 960);
    }

    #[test]
    fn test_output_is_binary() {
        let image = GrayImage::from_fn(40, 20, |x, y| Luma([((x * 5 + y * 3) % 256) as u8]));
        let processed = ImagePreprocessor::new().process(&DynamicImage::ImageLuma8(image));

        assert_eq!(processed.dimensions(), (40, 20));
        assert!(processed.pixels().all(|p| p[0] == 0 || p[0] == 255));
    }

    #[test]
    fn test_dark_text_on_light_background() {
        // Light page with a dark 4x4 block in the middle
        let image = GrayImage::from_fn(30, 30, |x, y| {
            if (13..17).contains(&x) && (13..17).contains(&y) {
                Luma([30])
            } else {
                Luma([220])
            }
        });
        let processed = ImagePreprocessor::new().process(&DynamicImage::ImageLuma8(image));

        assert_eq!(processed.get_pixel(15, 15)[0], 0);
        assert_eq!(processed.get_pixel(2, 2)[0], 255);
    }

    #[test]
    fn test_median_removes_speck() {
        let mut image = GrayImage::from_pixel(5, 5, Luma([200]));
        image.put_pixel(2, 2, Luma([0]));
        assert_eq!(median3(&image).get_pixel(2, 2)[0], 200);
    }

    #[test]
    fn test_process_to_file_writes_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page.png");
        let image = DynamicImage::ImageLuma8(GrayImage::from_pixel(8, 8, Luma([128])));

        ImagePreprocessor::new().process_to_file(&image, &path).unwrap();
        let reloaded = image::open(&path).unwrap();
        assert_eq!(reloaded.dimensions(), (8, 8));
    }
}
