//! In-process repository backed by hash maps.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use super::{Repository, StoreError};
use crate::models::{ExtractionRecord, FileEntry, FileId, Owner, OwnerId};

#[derive(Default)]
struct Tables {
    owners: HashMap<OwnerId, Owner>,
    files: HashMap<FileId, FileEntry>,
    /// Keyed by file; one record per file.
    records: HashMap<FileId, ExtractionRecord>,
}

/// Repository that keeps everything in memory. Nothing survives the process.
#[derive(Default)]
pub struct MemoryRepository {
    tables: Mutex<Tables>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>, StoreError> {
        self.tables.lock().map_err(|_| StoreError::LockPoisoned)
    }
}

impl Tables {
    fn owned_file(&self, owner: OwnerId, file: FileId) -> Option<&FileEntry> {
        self.files.get(&file).filter(|f| f.owner_id == owner)
    }
}

impl Repository for MemoryRepository {
    fn create_owner(&self, owner: &Owner) -> Result<(), StoreError> {
        let mut tables = self.lock()?;
        if tables.owners.values().any(|o| o.username == owner.username) {
            return Err(StoreError::Conflict(format!(
                "username '{}' is already registered",
                owner.username
            )));
        }
        tables.owners.insert(owner.id, owner.clone());
        Ok(())
    }

    fn owner(&self, id: OwnerId) -> Result<Option<Owner>, StoreError> {
        Ok(self.lock()?.owners.get(&id).cloned())
    }

    fn owner_by_username(&self, username: &str) -> Result<Option<Owner>, StoreError> {
        Ok(self
            .lock()?
            .owners
            .values()
            .find(|o| o.username == username)
            .cloned())
    }

    fn create_file(&self, file: &FileEntry, record: &ExtractionRecord) -> Result<(), StoreError> {
        let mut tables = self.lock()?;
        if !tables.owners.contains_key(&file.owner_id) {
            return Err(StoreError::Conflict(format!("owner {} does not exist", file.owner_id)));
        }
        if tables.files.contains_key(&file.id) || tables.records.contains_key(&record.file_id) {
            return Err(StoreError::Conflict(format!("file {} already exists", file.id)));
        }
        tables.files.insert(file.id, file.clone());
        tables.records.insert(record.file_id, record.clone());
        Ok(())
    }

    fn file_for_owner(&self, owner: OwnerId, file: FileId) -> Result<Option<FileEntry>, StoreError> {
        Ok(self.lock()?.owned_file(owner, file).cloned())
    }

    fn list_files(&self, owner: OwnerId) -> Result<Vec<FileEntry>, StoreError> {
        let tables = self.lock()?;
        let mut files: Vec<FileEntry> = tables
            .files
            .values()
            .filter(|f| f.owner_id == owner)
            .cloned()
            .collect();
        files.sort_by_key(|f| f.created_at);
        Ok(files)
    }

    fn delete_file(&self, owner: OwnerId, file: FileId) -> Result<bool, StoreError> {
        let mut tables = self.lock()?;
        if tables.owned_file(owner, file).is_none() {
            return Ok(false);
        }
        tables.files.remove(&file);
        tables.records.remove(&file);
        Ok(true)
    }

    fn record_for_file(
        &self,
        owner: OwnerId,
        file: FileId,
    ) -> Result<Option<ExtractionRecord>, StoreError> {
        let tables = self.lock()?;
        if tables.owned_file(owner, file).is_none() {
            return Ok(None);
        }
        Ok(tables.records.get(&file).cloned())
    }

    fn save_record(&self, record: &ExtractionRecord) -> Result<(), StoreError> {
        let mut tables = self.lock()?;
        match tables.records.get_mut(&record.file_id) {
            Some(stored) if stored.id == record.id => {
                *stored = record.clone();
                Ok(())
            }
            _ => Err(StoreError::Conflict(format!("record {} no longer exists", record.id))),
        }
    }
}
