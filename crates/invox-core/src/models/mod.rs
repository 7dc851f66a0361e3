//! Data models: invoice schema, lifecycle records, configuration.

pub mod config;
pub mod invoice;
pub mod record;

pub use config::InvoxConfig;
pub use invoice::{InvoiceData, LineItem};
pub use record::{
    DocumentKind, ExtractionRecord, ExtractionState, ExtractionStatus, ExtractionView, FileEntry,
    FileId, Owner, OwnerId, RecordId, TransitionError,
};
