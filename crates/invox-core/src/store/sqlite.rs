//! SQLite repository.
//!
//! All access is serialized through a `Mutex<Connection>`; SQLite serializes
//! writes anyway. Foreign keys are enforced so deleting a file cascades to its
//! extraction record.

use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, ErrorCode, OptionalExtension, Row, params};
use tracing::info;

use super::{Repository, StoreError, migrations};
use crate::models::{
    ExtractionRecord, ExtractionStatus, FileEntry, FileId, InvoiceData, Owner, OwnerId, RecordId,
};

/// Repository backed by a single SQLite connection. Cloning is cheap.
#[derive(Clone)]
pub struct SqliteRepository {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteRepository {
    /// Open (or create) the database at `path` and run pending migrations.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        migrations::run_all(&conn)?;

        info!("Database opened at {}", path.display());

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory database. Runs all migrations.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        migrations::run_all(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Locked access to the underlying connection.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut Connection) -> Result<T, StoreError>,
    {
        let mut conn = self.conn.lock().map_err(|_| StoreError::LockPoisoned)?;
        f(&mut conn)
    }
}

/// A raw `owners` row.
struct OwnerRow {
    id: String,
    username: String,
    key_salt: Vec<u8>,
    created_at: String,
}

impl OwnerRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            username: row.get("username")?,
            key_salt: row.get("key_salt")?,
            created_at: row.get("created_at")?,
        })
    }

    fn into_owner(self) -> Result<Owner, StoreError> {
        Ok(Owner {
            id: parse_id(&self.id)?,
            username: self.username,
            key_salt: self.key_salt,
            created_at: parse_time(&self.created_at)?,
        })
    }
}

/// A raw `files` row.
struct FileRow {
    id: String,
    owner_id: String,
    filename: String,
    path: String,
    created_at: String,
}

impl FileRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            owner_id: row.get("owner_id")?,
            filename: row.get("filename")?,
            path: row.get("path")?,
            created_at: row.get("created_at")?,
        })
    }

    fn into_entry(self) -> Result<FileEntry, StoreError> {
        Ok(FileEntry {
            id: parse_id(&self.id)?,
            owner_id: parse_id(&self.owner_id)?,
            filename: self.filename,
            path: self.path,
            created_at: parse_time(&self.created_at)?,
        })
    }
}

/// A raw `extraction_records` row.
struct RecordRow {
    id: String,
    file_id: String,
    extracted_text: Option<String>,
    json_data: Option<String>,
    status: String,
    error_message: Option<String>,
    created_at: String,
    updated_at: String,
}

impl RecordRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            file_id: row.get("file_id")?,
            extracted_text: row.get("extracted_text")?,
            json_data: row.get("json_data")?,
            status: row.get("status")?,
            error_message: row.get("error_message")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }

    fn into_record(self) -> Result<ExtractionRecord, StoreError> {
        let status = ExtractionStatus::from_str(&self.status).map_err(StoreError::Corrupt)?;
        let data = self
            .json_data
            .as_deref()
            .map(serde_json::from_str::<InvoiceData>)
            .transpose()?;

        ExtractionRecord::from_parts(
            parse_id::<RecordId>(&self.id)?,
            parse_id(&self.file_id)?,
            status,
            self.extracted_text,
            data,
            self.error_message,
            parse_time(&self.created_at)?,
            parse_time(&self.updated_at)?,
        )
        .map_err(StoreError::Corrupt)
    }
}

fn parse_id<T: FromStr<Err = uuid::Error>>(raw: &str) -> Result<T, StoreError> {
    raw.parse()
        .map_err(|e| StoreError::Corrupt(format!("bad id '{}': {}", raw, e)))
}

fn parse_time(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("bad timestamp '{}': {}", raw, e)))
}

/// Map unique/foreign key violations to [`StoreError::Conflict`].
fn conflict_on_constraint(e: rusqlite::Error, what: impl FnOnce() -> String) -> StoreError {
    match e.sqlite_error_code() {
        Some(ErrorCode::ConstraintViolation) => StoreError::Conflict(what()),
        _ => StoreError::Sqlite(e),
    }
}

impl Repository for SqliteRepository {
    fn create_owner(&self, owner: &Owner) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO owners (id, username, key_salt, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![
                    owner.id.to_string(),
                    owner.username,
                    owner.key_salt,
                    owner.created_at.to_rfc3339(),
                ],
            )
            .map_err(|e| {
                conflict_on_constraint(e, || {
                    format!("username '{}' is already registered", owner.username)
                })
            })?;
            Ok(())
        })
    }

    fn owner(&self, id: OwnerId) -> Result<Option<Owner>, StoreError> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT * FROM owners WHERE id = ?1",
                params![id.to_string()],
                OwnerRow::from_row,
            )
            .optional()?
            .map(OwnerRow::into_owner)
            .transpose()
        })
    }

    fn owner_by_username(&self, username: &str) -> Result<Option<Owner>, StoreError> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT * FROM owners WHERE username = ?1",
                params![username],
                OwnerRow::from_row,
            )
            .optional()?
            .map(OwnerRow::into_owner)
            .transpose()
        })
    }

    fn create_file(&self, file: &FileEntry, record: &ExtractionRecord) -> Result<(), StoreError> {
        let data = record.structured_data().map(serde_json::to_string).transpose()?;

        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            let conflict = || format!("file {} conflicts with existing rows", file.id);

            tx.execute(
                "INSERT INTO files (id, owner_id, filename, path, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    file.id.to_string(),
                    file.owner_id.to_string(),
                    file.filename,
                    file.path,
                    file.created_at.to_rfc3339(),
                ],
            )
            .map_err(|e| conflict_on_constraint(e, conflict))?;

            tx.execute(
                "INSERT INTO extraction_records (id, file_id, extracted_text, json_data, status,
                 error_message, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    record.id.to_string(),
                    record.file_id.to_string(),
                    record.extracted_text(),
                    data,
                    record.status().as_str(),
                    record.error_message(),
                    record.created_at.to_rfc3339(),
                    record.updated_at.to_rfc3339(),
                ],
            )
            .map_err(|e| conflict_on_constraint(e, conflict))?;

            tx.commit()?;
            Ok(())
        })
    }

    fn file_for_owner(&self, owner: OwnerId, file: FileId) -> Result<Option<FileEntry>, StoreError> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT * FROM files WHERE id = ?1 AND owner_id = ?2",
                params![file.to_string(), owner.to_string()],
                FileRow::from_row,
            )
            .optional()?
            .map(FileRow::into_entry)
            .transpose()
        })
    }

    fn list_files(&self, owner: OwnerId) -> Result<Vec<FileEntry>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT * FROM files WHERE owner_id = ?1 ORDER BY created_at, id")?;
            let rows = stmt
                .query_map(params![owner.to_string()], FileRow::from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            rows.into_iter().map(FileRow::into_entry).collect()
        })
    }

    fn delete_file(&self, owner: OwnerId, file: FileId) -> Result<bool, StoreError> {
        self.with_conn(|conn| {
            let deleted = conn.execute(
                "DELETE FROM files WHERE id = ?1 AND owner_id = ?2",
                params![file.to_string(), owner.to_string()],
            )?;
            Ok(deleted > 0)
        })
    }

    fn record_for_file(
        &self,
        owner: OwnerId,
        file: FileId,
    ) -> Result<Option<ExtractionRecord>, StoreError> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT r.* FROM extraction_records r
                 JOIN files f ON f.id = r.file_id
                 WHERE r.file_id = ?1 AND f.owner_id = ?2",
                params![file.to_string(), owner.to_string()],
                RecordRow::from_row,
            )
            .optional()?
            .map(RecordRow::into_record)
            .transpose()
        })
    }

    fn save_record(&self, record: &ExtractionRecord) -> Result<(), StoreError> {
        let data = record.structured_data().map(serde_json::to_string).transpose()?;

        self.with_conn(|conn| {
            let updated = conn.execute(
                "UPDATE extraction_records SET extracted_text=?2, json_data=?3, status=?4,
                 error_message=?5, updated_at=?6
                 WHERE id=?1",
                params![
                    record.id.to_string(),
                    record.extracted_text(),
                    data,
                    record.status().as_str(),
                    record.error_message(),
                    record.updated_at.to_rfc3339(),
                ],
            )?;
            if updated == 0 {
                return Err(StoreError::Conflict(format!(
                    "record {} no longer exists",
                    record.id
                )));
            }
            Ok(())
        })
    }
}
