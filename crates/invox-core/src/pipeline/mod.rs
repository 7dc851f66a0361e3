//! The extraction pipeline and document intake around it.

mod documents;
mod locks;
mod orchestrator;
mod scratch;

pub use documents::{DEFAULT_SALT_LEN, DocumentService, FileSummary};
pub use locks::{FileLockGuard, FileLocks};
pub use orchestrator::{ExtractionOrchestrator, FALLBACK_WARNING_PREFIX, OCR_ERROR};
pub use scratch::ScratchSpace;
