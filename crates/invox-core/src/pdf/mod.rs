//! PDF processing module.

mod extractor;

pub use extractor::{PdfPage, PdfRasterizer};

use crate::error::PdfError;

/// Pages of a PDF in order, capped at `max_pages` (0 = all).
pub fn read_pages(data: &[u8], max_pages: usize) -> Result<Vec<PdfPage>, PdfError> {
    PdfRasterizer::from_bytes(data)?.pages(max_pages)
}
