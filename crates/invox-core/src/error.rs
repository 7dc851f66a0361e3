//! Error types for the invox-core library.

use thiserror::Error;

use crate::models::{FileId, OwnerId, TransitionError};
use crate::store::StoreError;

/// Main error type for the invox library.
#[derive(Error, Debug)]
pub enum InvoxError {
    /// Key derivation, encryption or decryption error.
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// PDF processing error.
    #[error("PDF error: {0}")]
    Pdf(#[from] PdfError),

    /// OCR processing error.
    #[error("OCR error: {0}")]
    Ocr(#[from] OcrError),

    /// Generative model error.
    #[error("model error: {0}")]
    Llm(#[from] LlmError),

    /// Persistence error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Image processing error.
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The uploaded document type is not supported.
    #[error("unsupported file type: {0}")]
    UnsupportedFile(String),

    /// A caller-supplied value was rejected.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Errors related to key handling and the document cipher.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// Ciphertext failed authentication. A wrong key and corrupted data are
    /// reported identically.
    #[error("invalid decryption key or corrupted file")]
    Decryption,

    /// The key material is malformed.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// Encryption failed.
    #[error("encryption failed: {0}")]
    Encryption(String),
}

/// Errors related to PDF processing.
#[derive(Error, Debug)]
pub enum PdfError {
    /// Failed to open/parse the PDF file.
    #[error("failed to parse PDF: {0}")]
    Parse(String),

    /// The PDF is encrypted and cannot be processed.
    #[error("PDF is encrypted")]
    Encrypted,

    /// The PDF is empty or has no pages.
    #[error("PDF has no pages")]
    NoPages,

    /// Failed to extract page images from the PDF.
    #[error("failed to extract images: {0}")]
    ImageExtraction(String),

    /// Invalid page number requested.
    #[error("invalid page number: {0}")]
    InvalidPage(u32),
}

/// Errors related to OCR processing.
#[derive(Error, Debug)]
pub enum OcrError {
    /// Failed to load OCR models.
    #[error("failed to load model: {0}")]
    ModelLoad(String),

    /// Text recognition failed.
    #[error("text recognition failed: {0}")]
    Recognition(String),

    /// Image preprocessing failed.
    #[error("preprocessing failed: {0}")]
    Preprocessing(String),

    /// Invalid image format or dimensions.
    #[error("invalid image: {0}")]
    InvalidImage(String),
}

/// Errors from the generative model stage.
#[derive(Error, Debug)]
pub enum LlmError {
    /// The model call itself failed (transport, HTTP status, timeout).
    #[error("generation failed: {0}")]
    Generation(String),

    /// The model answered but the answer is not a usable invoice JSON object.
    #[error("model output is not valid JSON ({reason}); raw output: {}", preview(raw))]
    Parse { reason: String, raw: String },
}

impl LlmError {
    /// Raw model output attached to a parse failure.
    pub fn raw_output(&self) -> Option<&str> {
        match self {
            LlmError::Parse { raw, .. } => Some(raw),
            LlmError::Generation(_) => None,
        }
    }
}

const RAW_PREVIEW_CHARS: usize = 200;

fn preview(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.chars().count() <= RAW_PREVIEW_CHARS {
        return trimmed.to_string();
    }
    let head: String = trimmed.chars().take(RAW_PREVIEW_CHARS).collect();
    format!("{head}...")
}

/// Failures an extraction run reports to its caller.
///
/// Everything that goes wrong inside the pipeline is recorded on the
/// extraction record instead; only these escape.
#[derive(Error, Debug)]
pub enum RunError {
    /// The file or its record does not exist for this owner. Nothing was changed.
    #[error("file {file} not found for owner {owner}")]
    NotFound { owner: OwnerId, file: FileId },

    /// The record could not be loaded or persisted.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The lifecycle rejected a state change.
    #[error(transparent)]
    InvalidTransition(#[from] TransitionError),
}

/// Result type for the invox library.
pub type Result<T> = std::result::Result<T, InvoxError>;
