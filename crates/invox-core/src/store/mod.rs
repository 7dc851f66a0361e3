//! Persistence for owners, uploaded files and extraction records.
//!
//! The pipeline talks to storage only through the [`Repository`] and
//! [`FileStore`] traits. Two repositories ship with the crate: an in-memory
//! one for tests and embedding, and a SQLite one for real deployments.

mod files;
mod memory;
mod migrations;
mod sqlite;

pub use files::{FileStore, LocalFileStore};
pub use memory::MemoryRepository;
pub use sqlite::SqliteRepository;

use std::path::PathBuf;

use thiserror::Error;

use crate::models::{ExtractionRecord, FileEntry, FileId, Owner, OwnerId};

/// Errors from persistence operations.
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite error from rusqlite.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// IO error when reading or writing stored files.
    #[error("IO error for path '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A migration failed to apply.
    #[error("migration failed at version {version}: {reason}")]
    Migration { version: u32, reason: String },

    /// Structured data could not be (de)serialized.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The store lock was poisoned.
    #[error("store lock poisoned")]
    LockPoisoned,

    /// The write clashes with existing state (duplicate key, vanished row).
    #[error("conflict: {0}")]
    Conflict(String),

    /// A stored row violates the model invariants.
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

/// Storage of owners, files and their extraction records.
///
/// Every file and record lookup is scoped to an owner: a file that exists
/// but belongs to someone else is reported as absent.
pub trait Repository: Send + Sync {
    /// Insert a new owner. Fails with [`StoreError::Conflict`] on a taken username.
    fn create_owner(&self, owner: &Owner) -> Result<(), StoreError>;

    fn owner(&self, id: OwnerId) -> Result<Option<Owner>, StoreError>;

    fn owner_by_username(&self, username: &str) -> Result<Option<Owner>, StoreError>;

    /// Register a file together with its initial extraction record, atomically.
    fn create_file(&self, file: &FileEntry, record: &ExtractionRecord) -> Result<(), StoreError>;

    fn file_for_owner(&self, owner: OwnerId, file: FileId) -> Result<Option<FileEntry>, StoreError>;

    /// Files of an owner, oldest first.
    fn list_files(&self, owner: OwnerId) -> Result<Vec<FileEntry>, StoreError>;

    /// Delete a file and, by cascade, its record. Returns whether anything was removed.
    fn delete_file(&self, owner: OwnerId, file: FileId) -> Result<bool, StoreError>;

    fn record_for_file(
        &self,
        owner: OwnerId,
        file: FileId,
    ) -> Result<Option<ExtractionRecord>, StoreError>;

    /// Overwrite an existing record's state and timestamps.
    fn save_record(&self, record: &ExtractionRecord) -> Result<(), StoreError>;
}
