//! Page extraction from PDFs using lopdf and pdf-extract.

use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};

use image::{DynamicImage, GrayImage, RgbImage};
use lopdf::{Dictionary, Document, Object, ObjectId};
use tracing::{debug, trace, warn};

use crate::error::PdfError;

/// One PDF page as the pipeline consumes it.
#[derive(Debug, Clone)]
pub enum PdfPage {
    /// Page bitmap that still needs OCR.
    Scanned(DynamicImage),
    /// Text read from the page's text layer.
    Text(String),
}

impl PdfPage {
    fn is_blank_text(&self) -> bool {
        matches!(self, PdfPage::Text(text) if text.trim().is_empty())
    }
}

/// Splits a PDF into per-page images or text.
///
/// A page contributes its largest image XObject, which for scanner output is
/// the full page bitmap. Pages without one fall back to their text layer.
pub struct PdfRasterizer {
    document: Document,
    raw: Vec<u8>,
}

impl PdfRasterizer {
    /// Parse a PDF held in memory.
    ///
    /// Documents encrypted with an empty user password are opened; any other
    /// encryption fails with [`PdfError::Encrypted`].
    pub fn from_bytes(data: &[u8]) -> Result<Self, PdfError> {
        let mut document = Document::load_mem(data).map_err(|e| PdfError::Parse(e.to_string()))?;

        let raw = if document.is_encrypted() {
            if document.decrypt("").is_err() {
                return Err(PdfError::Encrypted);
            }
            debug!("Decrypted PDF with empty password");

            // pdf-extract reads bytes, so keep the decrypted form
            let mut decrypted = Vec::new();
            document
                .save_to(&mut decrypted)
                .map_err(|e| PdfError::Parse(format!("failed to save decrypted PDF: {}", e)))?;
            decrypted
        } else {
            data.to_vec()
        };

        if document.get_pages().is_empty() {
            return Err(PdfError::NoPages);
        }

        Ok(Self { document, raw })
    }

    /// Pages in page order, at most `max_pages` of them (0 = all).
    ///
    /// When no page carries an image and the per-page text layers are blank,
    /// the whole-document text from pdf-extract is returned as one page.
    pub fn pages(&self, max_pages: usize) -> Result<Vec<PdfPage>, PdfError> {
        let pages = self.document.get_pages();
        let limit = if max_pages == 0 { pages.len() } else { max_pages };
        if pages.len() > limit {
            debug!("Limiting extraction to {} of {} pages", limit, pages.len());
        }

        let mut extracted = Vec::with_capacity(limit.min(pages.len()));
        for (&number, &page_id) in pages.iter().take(limit) {
            match self.page_image(page_id) {
                Some(image) => extracted.push(PdfPage::Scanned(image)),
                None => {
                    debug!("No decodable image on page {}, reading text layer", number);
                    extracted.push(PdfPage::Text(self.page_text(number, page_id)));
                }
            }
        }

        if extracted.iter().all(PdfPage::is_blank_text) {
            if let Some(text) = self.document_text() {
                return Ok(vec![PdfPage::Text(text)]);
            }
        }

        debug!(
            "Extracted {} page(s), {} scanned",
            extracted.len(),
            extracted
                .iter()
                .filter(|p| matches!(p, PdfPage::Scanned(_)))
                .count()
        );
        Ok(extracted)
    }

    fn page_image(&self, page_id: ObjectId) -> Option<DynamicImage> {
        let doc = &self.document;
        let resources = self.page_resources(page_id)?;
        let (_, xobjects) = doc.dereference(resources.get(b"XObject").ok()?).ok()?;
        let Object::Dictionary(xobjects) = xobjects else {
            return None;
        };

        xobjects
            .iter()
            .filter_map(|(_, reference)| {
                let (_, object) = doc.dereference(reference).ok()?;
                decode_image_object(doc, object)
            })
            .max_by_key(|image| u64::from(image.width()) * u64::from(image.height()))
    }

    /// Resources dictionary for a page, following `Parent` inheritance.
    fn page_resources(&self, page_id: ObjectId) -> Option<&Dictionary> {
        self.ancestry(page_id)?.into_iter().find_map(|node| {
            match self.document.dereference(node.get(b"Resources").ok()?) {
                Ok((_, Object::Dictionary(resources))) => Some(resources),
                _ => None,
            }
        })
    }

    /// The page node followed by its ancestors, or `None` when the `Parent`
    /// links loop.
    fn ancestry(&self, page_id: ObjectId) -> Option<Vec<&Dictionary>> {
        let mut seen = HashSet::new();
        let mut chain = Vec::new();
        let mut next = Some(page_id);

        while let Some(id) = next {
            if !seen.insert(id) {
                debug!("Page tree loops back to object {:?}", id);
                return None;
            }
            let Ok(Object::Dictionary(node)) = self.document.get_object(id) else {
                break;
            };
            next = match node.get(b"Parent") {
                Ok(Object::Reference(parent)) => Some(*parent),
                _ => None,
            };
            chain.push(node);
        }

        Some(chain)
    }

    /// Text layer of one page. Text readers follow `Parent` links without a
    /// cycle check, so a looping page tree yields no text.
    fn page_text(&self, number: u32, page_id: ObjectId) -> String {
        if self.ancestry(page_id).is_none() {
            return String::new();
        }
        self.document.extract_text(&[number]).unwrap_or_else(|e| {
            debug!("No text layer on page {}: {}", number, e);
            String::new()
        })
    }

    fn document_text(&self) -> Option<String> {
        let pages = self.document.get_pages();
        if pages.values().any(|&id| self.ancestry(id).is_none()) {
            return None;
        }

        let raw = &self.raw;
        match panic::catch_unwind(AssertUnwindSafe(|| pdf_extract::extract_text_from_mem(raw))) {
            Ok(Ok(text)) if !text.trim().is_empty() => Some(text),
            Ok(Ok(_)) => None,
            Ok(Err(e)) => {
                debug!("pdf-extract failed: {}", e);
                None
            }
            Err(_) => {
                warn!("pdf-extract panicked, ignoring the text layer");
                None
            }
        }
    }
}

fn decode_image_object(doc: &Document, obj: &Object) -> Option<DynamicImage> {
    let Object::Stream(stream) = obj else {
        return None;
    };
    let dict = &stream.dict;

    if dict.get(b"Subtype").ok()?.as_name().ok()? != b"Image" {
        return None;
    }

    let width = u32::try_from(dict.get(b"Width").ok()?.as_i64().ok()?).ok()?;
    let height = u32::try_from(dict.get(b"Height").ok()?.as_i64().ok()?).ok()?;
    trace!("Found image object: {}x{}", width, height);

    if let Ok(filter) = dict.get(b"Filter") {
        let filter_name = match filter {
            Object::Name(name) => Some(name.as_slice()),
            Object::Array(arr) => arr.first().and_then(|o| o.as_name().ok()),
            _ => None,
        };

        match filter_name {
            Some(b"DCTDecode") => {
                // JPEG data is stored as-is
                return image::load_from_memory_with_format(
                    &stream.content,
                    image::ImageFormat::Jpeg,
                )
                .ok();
            }
            Some(b"JPXDecode") | Some(b"CCITTFaxDecode") | Some(b"JBIG2Decode") => {
                trace!("Unsupported image filter {:?}", filter_name.map(String::from_utf8_lossy));
                return None;
            }
            _ => {}
        }
    }

    let data = stream
        .decompressed_content()
        .unwrap_or_else(|_| stream.content.clone());

    let color_space = dict
        .get(b"ColorSpace")
        .ok()
        .and_then(|o| match o {
            Object::Name(name) => Some(name.as_slice()),
            Object::Array(arr) => arr.first().and_then(|o| o.as_name().ok()),
            Object::Reference(r) => doc.get_object(*r).ok().and_then(|o| o.as_name().ok()),
            _ => None,
        })
        .unwrap_or(b"DeviceRGB");

    let bits = dict
        .get(b"BitsPerComponent")
        .ok()
        .and_then(|o| o.as_i64().ok())
        .unwrap_or(8);

    raw_to_image(&data, width, height, color_space, bits)
}

fn raw_to_image(
    data: &[u8],
    width: u32,
    height: u32,
    color_space: &[u8],
    bits_per_component: i64,
) -> Option<DynamicImage> {
    if bits_per_component != 8 {
        trace!("Unsupported bits per component: {}", bits_per_component);
        return None;
    }

    let channels: usize = match color_space {
        b"DeviceRGB" | b"RGB" => 3,
        b"DeviceGray" | b"G" => 1,
        _ => {
            trace!("Unsupported colorspace {}", String::from_utf8_lossy(color_space));
            return None;
        }
    };

    // Dimensions come from the document and may not fit in memory at all
    let needed = (width as usize)
        .checked_mul(height as usize)
        .and_then(|pixels| pixels.checked_mul(channels));
    let Some(needed) = needed.filter(|&n| data.len() >= n) else {
        trace!(
            "Image data too short for {}x{}: {} bytes",
            width,
            height,
            data.len()
        );
        return None;
    };

    let pixels = data[..needed].to_vec();
    if channels == 3 {
        RgbImage::from_raw(width, height, pixels).map(DynamicImage::ImageRgb8)
    } else {
        GrayImage::from_raw(width, height, pixels).map(DynamicImage::ImageLuma8)
    }
}
