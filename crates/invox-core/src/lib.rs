//! Core library for encrypted invoice intake and extraction.
//!
//! This crate provides:
//! - Per-owner key derivation and an authenticated document cipher
//! - Page rasterization for scanned PDFs and OCR-oriented image cleanup
//! - OCR through a pluggable engine (pure-Rust ONNX by default)
//! - Invoice field extraction with a generative model and a regex fallback
//! - Extraction lifecycle tracking with SQLite or in-memory persistence

pub mod crypto;
pub mod error;
pub mod invoice;
pub mod llm;
pub mod models;
pub mod ocr;
pub mod pdf;
pub mod pipeline;
pub mod store;

pub use crypto::{DerivedKey, DocumentCipher, KeyProvider, Pbkdf2KeyDeriver};
pub use error::{CryptoError, InvoxError, LlmError, OcrError, PdfError, Result, RunError};
pub use invoice::RegexFallbackExtractor;
pub use llm::{FieldExtractor, HttpGenerator, TextGenerator};
pub use models::{
    DocumentKind, ExtractionRecord, ExtractionState, ExtractionStatus, ExtractionView, FileEntry,
    FileId, InvoiceData, InvoxConfig, LineItem, Owner, OwnerId,
};
#[cfg(feature = "native")]
pub use ocr::PureOcrEngine;
pub use ocr::{ImagePreprocessor, OcrBackend, OcrResult, TextRecognizer};
pub use pipeline::{DocumentService, ExtractionOrchestrator, FileSummary, ScratchSpace};
pub use store::{
    FileStore, LocalFileStore, MemoryRepository, Repository, SqliteRepository, StoreError,
};
