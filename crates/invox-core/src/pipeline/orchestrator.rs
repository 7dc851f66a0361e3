//! Drives one file through decryption, OCR and field extraction.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use super::locks::FileLocks;
use super::scratch::ScratchSpace;
use crate::crypto::{DocumentCipher, KeyProvider};
use crate::error::{InvoxError, OcrError, RunError};
use crate::invoice::RegexFallbackExtractor;
use crate::llm::FieldExtractor;
use crate::models::{
    DocumentKind, ExtractionRecord, ExtractionStatus, FileEntry, FileId, InvoiceData, InvoxConfig,
    Owner, OwnerId,
};
use crate::ocr::{ImagePreprocessor, TextRecognizer, has_text};
use crate::pdf::{self, PdfPage};
use crate::store::{FileStore, Repository};

/// Error message recorded when OCR recognizes no text.
pub const OCR_ERROR: &str = "ocr_error";

/// Prefix of the warning recorded when the fallback extractor produced the data.
pub const FALLBACK_WARNING_PREFIX: &str = "LLM failed, regex fallback used: ";

/// How a run that got past decryption ended.
enum Outcome {
    Extracted {
        text: String,
        data: InvoiceData,
        warning: Option<String>,
    },
    NoText,
}

/// A page ready for text recognition.
enum Page {
    /// Preprocessed page image in the scratch space.
    Scan(PathBuf),
    /// Text taken from a PDF text layer.
    Text(String),
}

/// Runs the extraction pipeline and keeps the extraction record in step.
///
/// A run moves the record to `processing`, persists it, and then always
/// leaves it in `done` or `error`. Pipeline failures are recorded on the
/// record rather than returned; only a missing file or a store failure
/// reaches the caller.
pub struct ExtractionOrchestrator {
    repository: Arc<dyn Repository>,
    files: Arc<dyn FileStore>,
    keys: Arc<dyn KeyProvider>,
    cipher: DocumentCipher,
    preprocessor: ImagePreprocessor,
    recognizer: TextRecognizer,
    fields: FieldExtractor,
    fallback: RegexFallbackExtractor,
    scratch_root: Option<PathBuf>,
    max_pages: usize,
    locks: FileLocks,
}

impl ExtractionOrchestrator {
    pub fn new(
        repository: Arc<dyn Repository>,
        files: Arc<dyn FileStore>,
        keys: Arc<dyn KeyProvider>,
        recognizer: TextRecognizer,
        fields: FieldExtractor,
    ) -> Self {
        Self {
            repository,
            files,
            keys,
            cipher: DocumentCipher::new(),
            preprocessor: ImagePreprocessor::new(),
            recognizer,
            fields,
            fallback: RegexFallbackExtractor::new(),
            scratch_root: None,
            max_pages: 0,
            locks: FileLocks::new(),
        }
    }

    /// Apply preprocessing, PDF and scratch settings from `config`.
    pub fn configured(mut self, config: &InvoxConfig) -> Self {
        self.preprocessor = ImagePreprocessor::from_config(&config.preprocessing);
        self.max_pages = config.pdf.max_pages;
        self.scratch_root = config.storage.scratch_dir.clone();
        self
    }

    pub fn with_preprocessor(mut self, preprocessor: ImagePreprocessor) -> Self {
        self.preprocessor = preprocessor;
        self
    }

    pub fn with_fallback(mut self, fallback: RegexFallbackExtractor) -> Self {
        self.fallback = fallback;
        self
    }

    /// Create per-run scratch directories under `root`.
    pub fn with_scratch_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.scratch_root = Some(root.into());
        self
    }

    /// Limit OCR to the first `max_pages` PDF pages (0 = all).
    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages;
        self
    }

    /// Extract unless the file already has a finished result.
    ///
    /// A `done` record is returned untouched when `force` is false; anything
    /// else (including `error`) is run again.
    pub fn extract(
        &self,
        owner_id: OwnerId,
        file_id: FileId,
        force: bool,
    ) -> Result<ExtractionRecord, RunError> {
        if !force {
            let record = self
                .repository
                .record_for_file(owner_id, file_id)?
                .ok_or(RunError::NotFound {
                    owner: owner_id,
                    file: file_id,
                })?;
            if record.status() == ExtractionStatus::Done {
                debug!(file = %file_id, "Already extracted, returning stored record");
                return Ok(record);
            }
        }
        self.run(owner_id, file_id)
    }

    /// Run the full pipeline for one file and return the persisted record.
    pub fn run(&self, owner_id: OwnerId, file_id: FileId) -> Result<ExtractionRecord, RunError> {
        let _guard = self.locks.acquire(file_id);

        let not_found = || RunError::NotFound {
            owner: owner_id,
            file: file_id,
        };
        let owner = self.repository.owner(owner_id)?.ok_or_else(not_found)?;
        let file = self
            .repository
            .file_for_owner(owner_id, file_id)?
            .ok_or_else(not_found)?;
        let mut record = self
            .repository
            .record_for_file(owner_id, file_id)?
            .ok_or_else(not_found)?;

        record.begin(Utc::now());
        self.repository.save_record(&record)?;
        info!(file = %file_id, "Extraction started for {}", file.filename);

        match self.process(&owner, &file) {
            Ok(Outcome::Extracted {
                text,
                data,
                warning,
            }) => {
                if let Some(warning) = &warning {
                    warn!(file = %file_id, "{}", warning);
                }
                record.complete(text, data, warning, Utc::now())?;
            }
            Ok(Outcome::NoText) => {
                warn!(file = %file_id, "OCR recognized no text");
                record.fail(OCR_ERROR, Utc::now())?;
            }
            Err(e) => {
                warn!(file = %file_id, "Extraction failed: {}", e);
                record.fail(e.to_string(), Utc::now())?;
            }
        }

        self.repository.save_record(&record)?;
        info!(file = %file_id, status = %record.status(), "Extraction finished");
        Ok(record)
    }

    fn process(&self, owner: &Owner, file: &FileEntry) -> Result<Outcome, InvoxError> {
        let kind = file.kind()?;
        let key = self.keys.key_for(owner)?;
        let ciphertext = self.files.read(&file.path)?;
        let plaintext = self.cipher.decrypt(&ciphertext, &key)?;
        debug!("Decrypted {} bytes", plaintext.len());

        // Dropping the scratch space on an early return removes it too
        let scratch = ScratchSpace::create(self.scratch_root.as_deref())?;
        let pages = self.prepare_pages(kind, &plaintext, &scratch)?;
        let text = self.read_text(&pages)?;
        scratch.close();

        if !has_text(&text) {
            return Ok(Outcome::NoText);
        }
        Ok(self.extract_fields(text))
    }

    /// Decode or split the document, writing normalized page images to scratch.
    fn prepare_pages(
        &self,
        kind: DocumentKind,
        plaintext: &[u8],
        scratch: &ScratchSpace,
    ) -> Result<Vec<Page>, InvoxError> {
        let pages = match kind {
            DocumentKind::Pdf => pdf::read_pages(plaintext, self.max_pages)?,
            DocumentKind::Png | DocumentKind::Jpeg => {
                vec![PdfPage::Scanned(ImagePreprocessor::decode(plaintext)?)]
            }
        };

        pages
            .into_iter()
            .enumerate()
            .map(|(index, page)| -> Result<Page, InvoxError> {
                match page {
                    PdfPage::Scanned(image) => {
                        let path = scratch.artifact(&format!("page-{}", index + 1), "png");
                        self.preprocessor.process_to_file(&image, &path)?;
                        Ok(Page::Scan(path))
                    }
                    PdfPage::Text(text) => Ok(Page::Text(text)),
                }
            })
            .collect()
    }

    /// OCR scanned pages and take text-layer pages as they are, joined in page order.
    fn read_text(&self, pages: &[Page]) -> Result<String, OcrError> {
        let texts = pages
            .iter()
            .map(|page| match page {
                Page::Scan(path) => self.recognizer.recognize_pages(std::slice::from_ref(path)),
                Page::Text(text) => Ok(text.clone()),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(texts.join("\n"))
    }

    fn extract_fields(&self, text: String) -> Outcome {
        match self.fields.extract(&text) {
            Ok(data) => Outcome::Extracted {
                text,
                data,
                warning: None,
            },
            Err(e) => {
                if let Some(raw) = e.raw_output() {
                    debug!("Unusable model output: {}", raw);
                }
                let data = self.fallback.extract(&text);
                Outcome::Extracted {
                    text,
                    data,
                    warning: Some(format!("{FALLBACK_WARNING_PREFIX}{e}")),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Pbkdf2KeyDeriver;
    use crate::error::{LlmError, OcrError};
    use crate::llm::TextGenerator;
    use crate::ocr::{OcrBackend, OcrResult};
    use crate::store::{LocalFileStore, MemoryRepository};
    use image::{DynamicImage, GrayImage, ImageFormat, Luma};
    use pretty_assertions::assert_eq;
    use std::io::Cursor;

    struct FixedOcr(&'static str);

    impl OcrBackend for FixedOcr {
        fn recognize(&mut self, _image: &DynamicImage) -> Result<OcrResult, OcrError> {
            Ok(OcrResult::from_text(self.0))
        }
    }

    struct FixedModel(&'static str);

    impl TextGenerator for FixedModel {
        fn generate(&self, _prompt: &str) -> Result<String, LlmError> {
            Ok(self.0.to_string())
        }
    }

    struct Harness {
        _dir: tempfile::TempDir,
        scratch: PathBuf,
        repository: Arc<MemoryRepository>,
        files: Arc<LocalFileStore>,
        keys: Arc<Pbkdf2KeyDeriver>,
        owner: Owner,
    }

    impl Harness {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let repository = Arc::new(MemoryRepository::new());
            let owner = Owner {
                id: OwnerId::new(),
                username: "alice".to_string(),
                key_salt: b"salt".to_vec(),
                created_at: Utc::now(),
            };
            repository.create_owner(&owner).unwrap();

            Self {
                scratch: dir.path().join("scratch"),
                files: Arc::new(LocalFileStore::new(dir.path().join("blobs"))),
                keys: Arc::new(Pbkdf2KeyDeriver::new().with_iterations(1_000)),
                _dir: dir,
                repository,
                owner,
            }
        }

        fn store(&self, filename: &str, plaintext: &[u8]) -> FileId {
            let key = self.keys.key_for(&self.owner).unwrap();
            let blob = DocumentCipher::new().encrypt(plaintext, &key).unwrap();
            let path = self.files.write(&format!("x_{filename}"), &blob).unwrap();
            let file = FileEntry {
                id: FileId::new(),
                owner_id: self.owner.id,
                filename: filename.to_string(),
                path,
                created_at: Utc::now(),
            };
            self.repository
                .create_file(&file, &ExtractionRecord::pending(file.id, Utc::now()))
                .unwrap();
            file.id
        }

        fn orchestrator(&self, ocr: &'static str, model: &'static str) -> ExtractionOrchestrator {
            ExtractionOrchestrator::new(
                self.repository.clone(),
                self.files.clone(),
                self.keys.clone(),
                TextRecognizer::new(Box::new(FixedOcr(ocr))),
                FieldExtractor::new(Box::new(FixedModel(model))),
            )
            .with_scratch_root(&self.scratch)
        }

        fn scratch_is_empty(&self) -> bool {
            std::fs::read_dir(&self.scratch)
                .map(|mut entries| entries.next().is_none())
                .unwrap_or(true)
        }
    }

    fn png() -> Vec<u8> {
        let mut bytes = Vec::new();
        DynamicImage::ImageLuma8(GrayImage::from_pixel(8, 8, Luma([200])))
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    #[test]
    fn test_model_result_is_stored() {
        let h = Harness::new();
        let file = h.store("bill.png", &png());

        let record = h
            .orchestrator("Invoice No: A-1", r#"{"invoice_number": "A-1"}"#)
            .run(h.owner.id, file)
            .unwrap();

        assert_eq!(record.status(), ExtractionStatus::Done);
        assert_eq!(record.error_message(), None);
        assert_eq!(record.extracted_text(), Some("Invoice No: A-1"));
        assert_eq!(
            record.structured_data().and_then(|d| d.invoice_number.as_deref()),
            Some("A-1")
        );
        assert!(h.scratch_is_empty());
    }

    #[test]
    fn test_blank_ocr_is_ocr_error() {
        let h = Harness::new();
        let file = h.store("bill.png", &png());

        let record = h.orchestrator("  \n", "{}").run(h.owner.id, file).unwrap();

        assert_eq!(record.status(), ExtractionStatus::Error);
        assert_eq!(record.error_message(), Some(OCR_ERROR));
        assert_eq!(record.structured_data(), None);
    }

    #[test]
    fn test_undecodable_image_is_recorded() {
        let h = Harness::new();
        let file = h.store("bill.png", b"not a png");

        let record = h.orchestrator("text", "{}").run(h.owner.id, file).unwrap();

        assert_eq!(record.status(), ExtractionStatus::Error);
        assert!(record.error_message().unwrap().contains("invalid image"));
        assert!(h.scratch_is_empty());
    }

    #[test]
    fn test_extract_skips_done_unless_forced() {
        let h = Harness::new();
        let file = h.store("bill.png", &png());

        let first = h
            .orchestrator("Invoice No: A-1", r#"{"invoice_number": "A-1"}"#)
            .run(h.owner.id, file)
            .unwrap();

        let second = h.orchestrator("ignored", r#"{"invoice_number": "B-2"}"#);
        let cached = second.extract(h.owner.id, file, false).unwrap();
        assert_eq!(cached, first);

        let forced = second.extract(h.owner.id, file, true).unwrap();
        assert_eq!(
            forced.structured_data().and_then(|d| d.invoice_number.as_deref()),
            Some("B-2")
        );
        assert_eq!(forced.extracted_text(), Some("ignored"));
    }

    #[test]
    fn test_unknown_file_is_not_found() {
        let h = Harness::new();
        let missing = FileId::new();

        let err = h.orchestrator("x", "{}").run(h.owner.id, missing).unwrap_err();
        assert!(matches!(err, RunError::NotFound { file, .. } if file == missing));

        let err = h
            .orchestrator("x", "{}")
            .extract(h.owner.id, missing, false)
            .unwrap_err();
        assert!(matches!(err, RunError::NotFound { .. }));
    }
}
