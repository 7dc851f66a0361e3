//! OCR stage: image normalization and text recognition.

mod preprocessing;
#[cfg(feature = "native")]
mod pure_engine;

pub use preprocessing::ImagePreprocessor;
#[cfg(feature = "native")]
pub use pure_engine::PureOcrEngine;

use std::path::Path;
use std::sync::Mutex;
use std::time::Instant;

use image::DynamicImage;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::OcrError;

/// A black-box OCR engine mapping one rasterized page to recognized text.
pub trait OcrBackend: Send {
    /// Recognize text on a single page image.
    fn recognize(&mut self, image: &DynamicImage) -> Result<OcrResult, OcrError>;
}

/// A detected text box with its coordinates and content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextBox {
    /// Bounding box coordinates (x1, y1, x2, y2, x3, y3, x4, y4) for quadrilateral.
    pub bbox: [f32; 8],

    /// Recognized text content.
    pub text: String,

    /// Confidence score (0.0 - 1.0).
    pub confidence: f32,
}

impl TextBox {
    /// Get the axis-aligned bounding rectangle.
    pub fn rect(&self) -> (f32, f32, f32, f32) {
        let xs = [self.bbox[0], self.bbox[2], self.bbox[4], self.bbox[6]];
        let ys = [self.bbox[1], self.bbox[3], self.bbox[5], self.bbox[7]];

        let min_x = xs.iter().cloned().fold(f32::INFINITY, f32::min);
        let max_x = xs.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
        let min_y = ys.iter().cloned().fold(f32::INFINITY, f32::min);
        let max_y = ys.iter().cloned().fold(f32::NEG_INFINITY, f32::max);

        (min_x, min_y, max_x, max_y)
    }
}

/// Result of OCR processing on one page.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OcrResult {
    /// Detected and recognized text boxes.
    pub boxes: Vec<TextBox>,

    /// Full text (boxes joined with newlines).
    pub text: String,

    /// Processing time in milliseconds.
    pub processing_time_ms: u64,
}

impl OcrResult {
    /// Result that carries only text, for engines without geometry.
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    /// Build a result from boxes, ordering them for reading.
    pub fn from_boxes(boxes: Vec<TextBox>, processing_time_ms: u64) -> Self {
        let mut result = Self {
            boxes,
            text: String::new(),
            processing_time_ms,
        };
        result.sort_by_reading_order();
        result
    }

    /// Sort boxes by reading order (top-to-bottom, left-to-right).
    pub fn sort_by_reading_order(&mut self) {
        self.boxes.sort_by(|a, b| {
            let (ax, ay, _, _) = a.rect();
            let (bx, by, _, _) = b.rect();

            // Group by approximate vertical position (within 20 pixels)
            let row_a = (ay / 20.0) as i32;
            let row_b = (by / 20.0) as i32;

            row_a
                .cmp(&row_b)
                .then_with(|| ax.partial_cmp(&bx).unwrap_or(std::cmp::Ordering::Equal))
        });

        self.text = self
            .boxes
            .iter()
            .map(|b| b.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");
    }
}

/// Runs OCR over processed page images and concatenates the results.
///
/// An empty string is a valid outcome: callers treat it as "nothing
/// recognized" rather than as a failure of the recognizer.
pub struct TextRecognizer {
    backend: Mutex<Box<dyn OcrBackend>>,
}

impl TextRecognizer {
    pub fn new(backend: Box<dyn OcrBackend>) -> Self {
        Self {
            backend: Mutex::new(backend),
        }
    }

    /// Recognize text on each page in order, joining pages with `\n`.
    pub fn recognize_pages<P: AsRef<Path>>(&self, pages: &[P]) -> Result<String, OcrError> {
        let start = Instant::now();
        let mut backend = self
            .backend
            .lock()
            .map_err(|_| OcrError::Recognition("OCR engine lock poisoned".to_string()))?;

        let mut texts = Vec::with_capacity(pages.len());
        for (index, page) in pages.iter().enumerate() {
            let page = page.as_ref();
            let image = image::open(page)
                .map_err(|e| OcrError::InvalidImage(format!("{}: {}", page.display(), e)))?;
            let result = backend.recognize(&image)?;
            debug!(
                "Page {}: {} chars, {} boxes",
                index + 1,
                result.text.len(),
                result.boxes.len()
            );
            texts.push(result.text);
        }

        let text = texts.join("\n");
        info!(
            "Recognized {} chars across {} page(s) in {}ms",
            text.len(),
            pages.len(),
            start.elapsed().as_millis()
        );
        Ok(text)
    }
}

/// Whether recognized text carries anything beyond whitespace.
pub fn has_text(text: &str) -> bool {
    !text.trim().is_empty()
}
