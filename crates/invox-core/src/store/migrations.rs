//! Versioned schema migrations.
//!
//! Applied migrations are tracked in a `_migrations` table; pending ones run
//! in order. Column additions are skipped when the column already exists, so
//! databases created by older tooling upgrade cleanly.

use rusqlite::Connection;
use tracing::info;

use super::StoreError;

struct Migration {
    version: u32,
    description: &'static str,
    sql: &'static str,
    kind: MigrationKind,
}

enum MigrationKind {
    Standard,
    /// ALTER TABLE ADD COLUMN, skipped if the column exists.
    AddColumn {
        table: &'static str,
        column: &'static str,
    },
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "create_core_tables",
        sql: include_str!("sql/001_create_core_tables.sql"),
        kind: MigrationKind::Standard,
    },
    Migration {
        version: 2,
        description: "add_owner_key_salt",
        sql: include_str!("sql/002_add_owner_key_salt.sql"),
        kind: MigrationKind::AddColumn {
            table: "owners",
            column: "key_salt",
        },
    },
];

/// Run all pending migrations on the given connection.
pub(crate) fn run_all(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            description TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )?;

    let current_version: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM _migrations",
        [],
        |r| r.get(0),
    )?;

    for migration in MIGRATIONS.iter().filter(|m| m.version > current_version) {
        let should_run = match &migration.kind {
            MigrationKind::Standard => true,
            MigrationKind::AddColumn { table, column } => !column_exists(conn, table, column)?,
        };

        if should_run {
            info!("Running migration v{}: {}", migration.version, migration.description);
            conn.execute_batch(migration.sql)
                .map_err(|e| StoreError::Migration {
                    version: migration.version,
                    reason: e.to_string(),
                })?;
        } else {
            info!("Skipping migration v{} (column exists)", migration.version);
        }

        conn.execute(
            "INSERT INTO _migrations (version, description) VALUES (?1, ?2)",
            rusqlite::params![migration.version, migration.description],
        )?;
    }

    Ok(())
}

fn column_exists(conn: &Connection, table: &str, column: &str) -> Result<bool, StoreError> {
    if !table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(StoreError::Migration {
            version: 0,
            reason: format!("invalid table name: {}", table),
        });
    }
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
    let exists = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .any(|r| r.map(|name| name == column).unwrap_or(false));
    Ok(exists)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn migrations_applied(conn: &Connection) -> u32 {
        conn.query_row("SELECT COUNT(*) FROM _migrations", [], |r| r.get(0))
            .unwrap()
    }

    #[test]
    fn test_fresh_database() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys=ON;").unwrap();
        run_all(&conn).unwrap();

        assert_eq!(migrations_applied(&conn), MIGRATIONS.len() as u32);
        assert!(column_exists(&conn, "owners", "key_salt").unwrap());
        assert!(column_exists(&conn, "extraction_records", "json_data").unwrap());
    }

    #[test]
    fn test_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run_all(&conn).unwrap();
        run_all(&conn).unwrap();
        assert_eq!(migrations_applied(&conn), MIGRATIONS.len() as u32);
    }

    #[test]
    fn test_legacy_owners_get_empty_salt() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(include_str!("sql/001_create_core_tables.sql"))
            .unwrap();
        conn.execute(
            "INSERT INTO owners (id, username, created_at) VALUES ('o1', 'legacy', '2024-01-01T00:00:00Z')",
            [],
        )
        .unwrap();

        run_all(&conn).unwrap();

        let salt: Vec<u8> = conn
            .query_row("SELECT key_salt FROM owners WHERE id = 'o1'", [], |r| r.get(0))
            .unwrap();
        assert!(salt.is_empty());
    }

    #[test]
    fn test_rejects_odd_table_names() {
        let conn = Connection::open_in_memory().unwrap();
        assert!(column_exists(&conn, "owners; DROP", "x").is_err());
    }
}
