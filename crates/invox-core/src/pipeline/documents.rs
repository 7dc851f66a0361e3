//! Owner registration and encrypted document intake.

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::crypto::{DocumentCipher, KeyProvider, generate_salt};
use crate::error::{InvoxError, Result};
use crate::models::{
    DocumentKind, ExtractionRecord, ExtractionStatus, FileEntry, FileId, Owner, OwnerId,
};
use crate::store::{FileStore, Repository, StoreError};

/// Default length of newly generated key salts.
pub const DEFAULT_SALT_LEN: usize = 16;

/// A file together with the status of its extraction.
#[derive(Debug, Clone, Serialize)]
pub struct FileSummary {
    #[serde(flatten)]
    pub file: FileEntry,
    pub status: ExtractionStatus,
}

/// Registers owners and stores, lists, opens and deletes their documents.
///
/// Documents are encrypted with the owner's key before they touch the file
/// store, and every upload gets a `pending` extraction record.
pub struct DocumentService {
    repository: Arc<dyn Repository>,
    files: Arc<dyn FileStore>,
    keys: Arc<dyn KeyProvider>,
    cipher: DocumentCipher,
    salt_len: usize,
}

impl DocumentService {
    pub fn new(
        repository: Arc<dyn Repository>,
        files: Arc<dyn FileStore>,
        keys: Arc<dyn KeyProvider>,
    ) -> Self {
        Self {
            repository,
            files,
            keys,
            cipher: DocumentCipher::new(),
            salt_len: DEFAULT_SALT_LEN,
        }
    }

    /// Salt length for owners registered from now on. Zero gives unsalted keys.
    pub fn with_salt_len(mut self, salt_len: usize) -> Self {
        self.salt_len = salt_len;
        self
    }

    /// Create an owner with a fresh key salt.
    pub fn register_owner(&self, username: &str) -> Result<Owner> {
        let username = username.trim();
        if username.is_empty() {
            return Err(InvoxError::InvalidInput("username must not be empty".to_string()));
        }

        let owner = Owner {
            id: OwnerId::new(),
            username: username.to_string(),
            key_salt: generate_salt(self.salt_len),
            created_at: Utc::now(),
        };
        self.repository.create_owner(&owner)?;
        info!(owner = %owner.id, "Registered owner {}", owner.username);
        Ok(owner)
    }

    pub fn owner(&self, username: &str) -> Result<Option<Owner>> {
        Ok(self.repository.owner_by_username(username.trim())?)
    }

    /// Encrypt and store a document, registering it with a `pending` record.
    pub fn upload(&self, owner: &Owner, filename: &str, data: &[u8]) -> Result<FileEntry> {
        let filename = Path::new(filename)
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| InvoxError::UnsupportedFile(filename.to_string()))?;
        DocumentKind::from_filename(filename)?;

        let key = self.keys.key_for(owner)?;
        let blob = self.cipher.encrypt(data, &key)?;
        let location = self
            .files
            .write(&format!("{}_{}", Uuid::new_v4(), filename), &blob)?;

        let now = Utc::now();
        let file = FileEntry {
            id: FileId::new(),
            owner_id: owner.id,
            filename: filename.to_string(),
            path: location,
            created_at: now,
        };
        let record = ExtractionRecord::pending(file.id, now);

        if let Err(e) = self.repository.create_file(&file, &record) {
            self.remove_blob(&file.path);
            return Err(e.into());
        }

        info!(owner = %owner.id, file = %file.id, "Uploaded {} ({} bytes)", filename, data.len());
        Ok(file)
    }

    /// The owner's files with their extraction status, oldest first.
    pub fn list(&self, owner: &Owner) -> Result<Vec<FileSummary>> {
        self.repository
            .list_files(owner.id)?
            .into_iter()
            .map(|file| -> Result<FileSummary> {
                let record = self
                    .repository
                    .record_for_file(owner.id, file.id)?
                    .ok_or_else(|| {
                        StoreError::Corrupt(format!("file {} has no extraction record", file.id))
                    })?;
                Ok(FileSummary {
                    file,
                    status: record.status(),
                })
            })
            .collect()
    }

    pub fn file(&self, owner: &Owner, file_id: FileId) -> Result<Option<FileEntry>> {
        Ok(self.repository.file_for_owner(owner.id, file_id)?)
    }

    pub fn record(&self, owner: &Owner, file_id: FileId) -> Result<Option<ExtractionRecord>> {
        Ok(self.repository.record_for_file(owner.id, file_id)?)
    }

    /// Decrypted contents of one of the owner's files.
    pub fn open(&self, owner: &Owner, file_id: FileId) -> Result<Option<Vec<u8>>> {
        let Some(file) = self.repository.file_for_owner(owner.id, file_id)? else {
            return Ok(None);
        };
        let key = self.keys.key_for(owner)?;
        let blob = self.files.read(&file.path)?;
        Ok(Some(self.cipher.decrypt(&blob, &key)?))
    }

    /// Delete a file, its record and its blob. Returns whether the file existed.
    pub fn delete(&self, owner: &Owner, file_id: FileId) -> Result<bool> {
        let Some(file) = self.repository.file_for_owner(owner.id, file_id)? else {
            return Ok(false);
        };
        if !self.repository.delete_file(owner.id, file_id)? {
            return Ok(false);
        }
        self.remove_blob(&file.path);
        info!(owner = %owner.id, file = %file_id, "Deleted {}", file.filename);
        Ok(true)
    }

    fn remove_blob(&self, location: &str) {
        if let Err(e) = self.files.remove(location) {
            warn!("Failed to remove stored blob {}: {}", location, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Pbkdf2KeyDeriver;
    use crate::error::CryptoError;
    use crate::store::{LocalFileStore, MemoryRepository};
    use pretty_assertions::assert_eq;

    struct Fixture {
        dir: tempfile::TempDir,
        service: DocumentService,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let service = DocumentService::new(
            Arc::new(MemoryRepository::new()),
            Arc::new(LocalFileStore::new(dir.path())),
            Arc::new(Pbkdf2KeyDeriver::new().with_iterations(1_000)),
        );
        Fixture { dir, service }
    }

    #[test]
    fn test_register_owner() {
        let f = fixture();
        let alice = f.service.register_owner(" alice ").unwrap();
        assert_eq!(alice.username, "alice");
        assert_eq!(alice.key_salt.len(), DEFAULT_SALT_LEN);
        assert_eq!(f.service.owner("alice").unwrap(), Some(alice));

        assert!(matches!(
            f.service.register_owner("alice"),
            Err(InvoxError::Store(StoreError::Conflict(_)))
        ));
        assert!(matches!(
            f.service.register_owner("  "),
            Err(InvoxError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_upload_encrypts_and_registers_pending_record() {
        let f = fixture();
        let alice = f.service.register_owner("alice").unwrap();

        let file = f.service.upload(&alice, "scans/Bill.PDF", b"%PDF-1.5 ...").unwrap();
        assert_eq!(file.filename, "Bill.PDF");
        assert!(file.path.ends_with("_Bill.PDF"));
        assert_ne!(std::fs::read(&file.path).unwrap(), b"%PDF-1.5 ...");

        let record = f.service.record(&alice, file.id).unwrap().unwrap();
        assert_eq!(record.status(), ExtractionStatus::Pending);
        assert_eq!(
            f.service.open(&alice, file.id).unwrap(),
            Some(b"%PDF-1.5 ...".to_vec())
        );
    }

    #[test]
    fn test_upload_rejects_unsupported_types() {
        let f = fixture();
        let alice = f.service.register_owner("alice").unwrap();

        assert!(matches!(
            f.service.upload(&alice, "notes.txt", b"hello"),
            Err(InvoxError::UnsupportedFile(_))
        ));
        assert_eq!(std::fs::read_dir(f.dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_files_are_private_to_their_owner() {
        let f = fixture();
        let alice = f.service.register_owner("alice").unwrap();
        let bob = f.service.register_owner("bob").unwrap();
        let file = f.service.upload(&alice, "a.png", b"png bytes").unwrap();

        assert_eq!(f.service.open(&bob, file.id).unwrap(), None);
        assert_eq!(f.service.record(&bob, file.id).unwrap(), None);
        assert!(f.service.list(&bob).unwrap().is_empty());
        assert!(!f.service.delete(&bob, file.id).unwrap());
        assert!(f.service.file(&alice, file.id).unwrap().is_some());
    }

    #[test]
    fn test_other_owners_key_cannot_decrypt() {
        let f = fixture();
        let alice = f.service.register_owner("alice").unwrap();
        let file = f.service.upload(&alice, "a.png", b"png bytes").unwrap();

        // Same username, different salt: a different key
        let impostor = Owner {
            key_salt: vec![0; DEFAULT_SALT_LEN],
            ..alice.clone()
        };
        assert!(matches!(
            f.service.open(&impostor, file.id),
            Err(InvoxError::Crypto(CryptoError::Decryption))
        ));
    }

    #[test]
    fn test_list_and_delete() {
        let f = fixture();
        let alice = f.service.register_owner("alice").unwrap();
        let first = f.service.upload(&alice, "a.png", b"a").unwrap();
        let second = f.service.upload(&alice, "b.jpg", b"b").unwrap();

        let listed = f.service.list(&alice).unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed.iter().all(|s| s.status == ExtractionStatus::Pending));

        assert!(f.service.delete(&alice, first.id).unwrap());
        assert!(!std::path::Path::new(&first.path).exists());
        assert_eq!(f.service.record(&alice, first.id).unwrap(), None);

        let remaining: Vec<FileId> = f.service.list(&alice).unwrap().iter().map(|s| s.file.id).collect();
        assert_eq!(remaining, vec![second.id]);
    }
}
