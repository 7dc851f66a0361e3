//! Owners, stored files, and the extraction lifecycle record.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

use crate::error::InvoxError;

use super::invoice::InvoiceData;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Generate a fresh random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wrap an existing UUID.
            pub fn from_uuid(id: Uuid) -> Self {
                Self(id)
            }

            /// The underlying UUID.
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s.trim()).map(Self)
            }
        }
    };
}

id_type!(
    /// Identifier of a document owner.
    OwnerId
);
id_type!(
    /// Identifier of an uploaded file.
    FileId
);
id_type!(
    /// Identifier of an extraction record.
    RecordId
);

/// A user who owns uploaded documents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Owner {
    pub id: OwnerId,
    pub username: String,
    /// PBKDF2 salt for this owner's document key. Empty for legacy owners.
    #[serde(default)]
    pub key_salt: Vec<u8>,
    pub created_at: DateTime<Utc>,
}

/// Kind of uploaded document, decided by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Png,
    Jpeg,
    Pdf,
}

impl DocumentKind {
    /// Detect the document kind from a filename.
    pub fn from_filename(filename: &str) -> Result<Self, InvoxError> {
        let extension = Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();

        match extension.as_str() {
            "png" => Ok(DocumentKind::Png),
            "jpg" | "jpeg" => Ok(DocumentKind::Jpeg),
            "pdf" => Ok(DocumentKind::Pdf),
            _ => Err(InvoxError::UnsupportedFile(filename.to_string())),
        }
    }
}

/// An uploaded, encrypted file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub id: FileId,
    pub owner_id: OwnerId,
    /// Original filename as uploaded.
    pub filename: String,
    /// Location of the ciphertext in the file store.
    pub path: String,
    pub created_at: DateTime<Utc>,
}

impl FileEntry {
    pub fn kind(&self) -> Result<DocumentKind, InvoxError> {
        DocumentKind::from_filename(&self.filename)
    }
}

/// Flat status of an extraction record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionStatus {
    Pending,
    Processing,
    Done,
    Error,
}

impl ExtractionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionStatus::Pending => "pending",
            ExtractionStatus::Processing => "processing",
            ExtractionStatus::Done => "done",
            ExtractionStatus::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ExtractionStatus::Done | ExtractionStatus::Error)
    }
}

impl fmt::Display for ExtractionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExtractionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ExtractionStatus::Pending),
            "processing" => Ok(ExtractionStatus::Processing),
            "done" => Ok(ExtractionStatus::Done),
            "error" => Ok(ExtractionStatus::Error),
            other => Err(format!("unknown extraction status: {other}")),
        }
    }
}

/// Lifecycle state carrying exactly the data each status allows.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractionState {
    Pending,
    Processing,
    Done {
        text: String,
        data: InvoiceData,
        /// Set when the result is degraded (fallback extraction).
        warning: Option<String>,
    },
    Error {
        message: String,
    },
}

impl ExtractionState {
    pub fn status(&self) -> ExtractionStatus {
        match self {
            ExtractionState::Pending => ExtractionStatus::Pending,
            ExtractionState::Processing => ExtractionStatus::Processing,
            ExtractionState::Done { .. } => ExtractionStatus::Done,
            ExtractionState::Error { .. } => ExtractionStatus::Error,
        }
    }
}

/// A state change that the lifecycle does not allow.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid extraction transition from {from} to {to}")]
pub struct TransitionError {
    pub from: ExtractionStatus,
    pub to: ExtractionStatus,
}

/// Extraction lifecycle for one uploaded file.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionRecord {
    pub id: RecordId,
    pub file_id: FileId,
    state: ExtractionState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ExtractionRecord {
    /// A fresh record for a newly uploaded file.
    pub fn pending(file_id: FileId, now: DateTime<Utc>) -> Self {
        Self {
            id: RecordId::new(),
            file_id,
            state: ExtractionState::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    /// Rebuild a record from its persisted columns, checking the status invariants.
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        id: RecordId,
        file_id: FileId,
        status: ExtractionStatus,
        extracted_text: Option<String>,
        structured_data: Option<InvoiceData>,
        error_message: Option<String>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Result<Self, String> {
        let state = match status {
            ExtractionStatus::Pending => ExtractionState::Pending,
            ExtractionStatus::Processing => ExtractionState::Processing,
            ExtractionStatus::Done => match (extracted_text, structured_data) {
                (Some(text), Some(data)) => ExtractionState::Done {
                    text,
                    data,
                    warning: error_message,
                },
                _ => return Err(format!("record {id} is done without text or data")),
            },
            ExtractionStatus::Error => match error_message {
                Some(message) => ExtractionState::Error { message },
                None => return Err(format!("record {id} is in error without a message")),
            },
        };

        Ok(Self {
            id,
            file_id,
            state,
            created_at,
            updated_at,
        })
    }

    pub fn state(&self) -> &ExtractionState {
        &self.state
    }

    pub fn status(&self) -> ExtractionStatus {
        self.state.status()
    }

    pub fn extracted_text(&self) -> Option<&str> {
        match &self.state {
            ExtractionState::Done { text, .. } => Some(text),
            _ => None,
        }
    }

    pub fn structured_data(&self) -> Option<&InvoiceData> {
        match &self.state {
            ExtractionState::Done { data, .. } => Some(data),
            _ => None,
        }
    }

    /// Error description, or the degradation warning of a fallback result.
    pub fn error_message(&self) -> Option<&str> {
        match &self.state {
            ExtractionState::Done { warning, .. } => warning.as_deref(),
            ExtractionState::Error { message } => Some(message),
            _ => None,
        }
    }

    /// Enter `processing`. Any prior state may start a new run; re-entering
    /// from `processing` means a concurrent or abandoned run and is logged.
    pub fn begin(&mut self, now: DateTime<Utc>) {
        if self.status() == ExtractionStatus::Processing {
            warn!(record = %self.id, "record already processing, starting a new run over it");
        }
        self.state = ExtractionState::Processing;
        self.updated_at = now;
    }

    /// Finish the run successfully. `warning` marks a degraded result.
    pub fn complete(
        &mut self,
        text: String,
        data: InvoiceData,
        warning: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        self.guard_processing(ExtractionStatus::Done)?;
        self.state = ExtractionState::Done {
            text,
            data,
            warning,
        };
        self.updated_at = now;
        Ok(())
    }

    /// Finish the run with an error.
    pub fn fail(&mut self, message: impl Into<String>, now: DateTime<Utc>) -> Result<(), TransitionError> {
        self.guard_processing(ExtractionStatus::Error)?;
        self.state = ExtractionState::Error {
            message: message.into(),
        };
        self.updated_at = now;
        Ok(())
    }

    fn guard_processing(&self, to: ExtractionStatus) -> Result<(), TransitionError> {
        match self.status() {
            ExtractionStatus::Processing => Ok(()),
            from => Err(TransitionError { from, to }),
        }
    }
}

/// Serialized view of a record, matching the persisted columns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionView {
    pub id: RecordId,
    pub file_id: FileId,
    pub extracted_text: Option<String>,
    pub json_data: Option<InvoiceData>,
    pub status: ExtractionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub error_message: Option<String>,
}

impl From<&ExtractionRecord> for ExtractionView {
    fn from(record: &ExtractionRecord) -> Self {
        Self {
            id: record.id,
            file_id: record.file_id,
            extracted_text: record.extracted_text().map(str::to_string),
            json_data: record.structured_data().cloned(),
            status: record.status(),
            created_at: record.created_at,
            updated_at: record.updated_at,
            error_message: record.error_message().map(str::to_string),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn processing_record() -> ExtractionRecord {
        let mut record = ExtractionRecord::pending(FileId::new(), Utc::now());
        record.begin(Utc::now());
        record
    }

    #[test]
    fn test_document_kind_from_filename() {
        assert_eq!(DocumentKind::from_filename("scan.PNG").unwrap(), DocumentKind::Png);
        assert_eq!(DocumentKind::from_filename("a.b.jpeg").unwrap(), DocumentKind::Jpeg);
        assert_eq!(DocumentKind::from_filename("bill.pdf").unwrap(), DocumentKind::Pdf);
        assert!(DocumentKind::from_filename("notes.txt").is_err());
        assert!(DocumentKind::from_filename("noextension").is_err());
    }

    #[test]
    fn test_done_requires_processing() {
        let mut record = ExtractionRecord::pending(FileId::new(), Utc::now());
        let err = record
            .complete("text".into(), InvoiceData::default(), None, Utc::now())
            .unwrap_err();
        assert_eq!(err.from, ExtractionStatus::Pending);
        assert_eq!(err.to, ExtractionStatus::Done);
        assert_eq!(record.status(), ExtractionStatus::Pending);
    }

    #[test]
    fn test_done_exposes_text_and_data() {
        let mut record = processing_record();
        record
            .complete("INV-1".into(), InvoiceData::default(), None, Utc::now())
            .unwrap();
        assert_eq!(record.status(), ExtractionStatus::Done);
        assert_eq!(record.extracted_text(), Some("INV-1"));
        assert!(record.structured_data().is_some());
        assert_eq!(record.error_message(), None);
    }

    #[test]
    fn test_error_clears_previous_result() {
        let mut record = processing_record();
        record
            .complete("old".into(), InvoiceData::default(), None, Utc::now())
            .unwrap();
        record.begin(Utc::now());
        record.fail("ocr_error", Utc::now()).unwrap();

        assert_eq!(record.status(), ExtractionStatus::Error);
        assert_eq!(record.error_message(), Some("ocr_error"));
        assert_eq!(record.extracted_text(), None);
        assert_eq!(record.structured_data(), None);
    }

    #[test]
    fn test_terminal_states_cannot_transition_directly() {
        let mut record = processing_record();
        record.fail("boom", Utc::now()).unwrap();
        assert!(record.fail("again", Utc::now()).is_err());
        assert!(
            record
                .complete(String::new(), InvoiceData::default(), None, Utc::now())
                .is_err()
        );
    }

    #[test]
    fn test_from_parts_enforces_invariants() {
        let id = RecordId::new();
        let file = FileId::new();
        let now = Utc::now();

        let done_without_data = ExtractionRecord::from_parts(
            id,
            file,
            ExtractionStatus::Done,
            Some("text".into()),
            None,
            None,
            now,
            now,
        );
        assert!(done_without_data.is_err());

        let error_without_message = ExtractionRecord::from_parts(
            id,
            file,
            ExtractionStatus::Error,
            None,
            None,
            None,
            now,
            now,
        );
        assert!(error_without_message.is_err());

        let degraded = ExtractionRecord::from_parts(
            id,
            file,
            ExtractionStatus::Done,
            Some("text".into()),
            Some(InvoiceData::default()),
            Some("LLM failed, regex fallback used: x".into()),
            now,
            now,
        )
        .unwrap();
        assert_eq!(
            degraded.error_message(),
            Some("LLM failed, regex fallback used: x")
        );
    }

    #[test]
    fn test_status_round_trip() {
        for status in [
            ExtractionStatus::Pending,
            ExtractionStatus::Processing,
            ExtractionStatus::Done,
            ExtractionStatus::Error,
        ] {
            assert_eq!(status.as_str().parse::<ExtractionStatus>().unwrap(), status);
        }
        assert!("finished".parse::<ExtractionStatus>().is_err());
    }

    #[test]
    fn test_ids_parse() {
        let id = FileId::new();
        let parsed: FileId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
        assert!("not-a-uuid".parse::<FileId>().is_err());
    }
}
