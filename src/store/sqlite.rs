//! SQLite-backed [`StateStore`].
//!
//! The schema is brought up to date when the store is opened by applying
//! the pending entries of [`MIGRATIONS`] in order. Every step is written so
//! that running it again against an already migrated database changes
//! nothing, and each one is recorded in `schema_migrations`.

use std::path::Path;

use chrono::Utc;
use log::{debug, info};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};

use super::{StateStore, StoreError};
use crate::types::AppRecord;

struct Migration {
    version: u32,
    name: &'static str,
    apply: fn(&Transaction<'_>) -> rusqlite::Result<()>,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "create_apps",
        apply: create_apps,
    },
    Migration {
        version: 2,
        name: "adopt_legacy_schemas",
        apply: adopt_legacy_schemas,
    },
    Migration {
        version: 3,
        name: "purge_soft_deleted",
        apply: purge_soft_deleted,
    },
    Migration {
        version: 4,
        name: "unique_urn",
        apply: unique_urn,
    },
];

const CURRENT_SCHEMA_VERSION: u32 = 4;

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        let mut store = Self { conn };
        store.bootstrap()?;
        Ok(store)
    }

    #[cfg(test)]
    pub(crate) fn schema_version(&self) -> Result<u32, StoreError> {
        current_schema_version(&self.conn)
    }

    /// Starts a transaction that is rolled back unless committed.
    pub fn transaction(&mut self) -> Result<StoreTransaction<'_>, StoreError> {
        Ok(StoreTransaction {
            tx: self.conn.transaction()?,
        })
    }

    fn bootstrap(&mut self) -> Result<(), StoreError> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                applied_at TEXT NOT NULL
            );",
        )?;

        let current = current_schema_version(&self.conn)?;
        if current > CURRENT_SCHEMA_VERSION {
            return Err(StoreError::UnsupportedSchema {
                found: current,
                supported: CURRENT_SCHEMA_VERSION,
            });
        }

        for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
            info!(
                "Applying database migration {} ({})",
                migration.version, migration.name
            );
            let tx = self.conn.transaction()?;
            (migration.apply)(&tx)?;
            tx.execute(
                "INSERT OR REPLACE INTO schema_migrations (version, name, applied_at) VALUES (?1, ?2, ?3)",
                params![migration.version, migration.name, Utc::now().to_rfc3339()],
            )?;
            tx.commit()?;
        }

        Ok(())
    }
}

impl StateStore for SqliteStore {
    fn all(&self) -> Result<Vec<AppRecord>, StoreError> {
        all_records(&self.conn)
    }

    fn find(&self, urn: &str) -> Result<Option<AppRecord>, StoreError> {
        find_record(&self.conn, urn)
    }

    fn create(&mut self, record: &AppRecord) -> Result<(), StoreError> {
        insert_record(&self.conn, record)
    }

    fn update(&mut self, record: &AppRecord) -> Result<(), StoreError> {
        update_record(&self.conn, record)
    }

    fn delete(&mut self, urn: &str) -> Result<(), StoreError> {
        delete_record(&self.conn, urn)
    }
}

/// A [`StateStore`] view over an open transaction.
pub struct StoreTransaction<'a> {
    tx: Transaction<'a>,
}

impl StoreTransaction<'_> {
    pub fn commit(self) -> Result<(), StoreError> {
        self.tx.commit().map_err(Into::into)
    }
}

impl StateStore for StoreTransaction<'_> {
    fn all(&self) -> Result<Vec<AppRecord>, StoreError> {
        all_records(&self.tx)
    }

    fn find(&self, urn: &str) -> Result<Option<AppRecord>, StoreError> {
        find_record(&self.tx, urn)
    }

    fn create(&mut self, record: &AppRecord) -> Result<(), StoreError> {
        insert_record(&self.tx, record)
    }

    fn update(&mut self, record: &AppRecord) -> Result<(), StoreError> {
        update_record(&self.tx, record)
    }

    fn delete(&mut self, urn: &str) -> Result<(), StoreError> {
        delete_record(&self.tx, urn)
    }
}

fn map_record(row: &Row<'_>) -> rusqlite::Result<AppRecord> {
    Ok(AppRecord {
        urn: row.get(0)?,
        version: row.get(1)?,
        latest_version: row.get(2)?,
    })
}

fn all_records(conn: &Connection) -> Result<Vec<AppRecord>, StoreError> {
    let mut stmt = conn.prepare("SELECT urn, version, latest_version FROM apps ORDER BY id")?;
    let rows = stmt.query_map([], map_record)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
}

fn find_record(conn: &Connection, urn: &str) -> Result<Option<AppRecord>, StoreError> {
    conn.query_row(
        "SELECT urn, version, latest_version FROM apps WHERE urn = ?1",
        params![urn],
        map_record,
    )
    .optional()
    .map_err(Into::into)
}

fn insert_record(conn: &Connection, record: &AppRecord) -> Result<(), StoreError> {
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO apps (created_at, updated_at, urn, version, latest_version)
         VALUES (?1, ?1, ?2, ?3, ?4)",
        params![now, record.urn, record.version, record.latest_version],
    )?;
    debug!("Created record for {}", record.urn);
    Ok(())
}

fn update_record(conn: &Connection, record: &AppRecord) -> Result<(), StoreError> {
    conn.execute(
        "UPDATE apps SET version = ?1, latest_version = ?2, updated_at = ?3 WHERE urn = ?4",
        params![
            record.version,
            record.latest_version,
            Utc::now().to_rfc3339(),
            record.urn
        ],
    )?;
    debug!("Updated record for {}", record.urn);
    Ok(())
}

fn delete_record(conn: &Connection, urn: &str) -> Result<(), StoreError> {
    conn.execute("DELETE FROM apps WHERE urn = ?1", params![urn])?;
    Ok(())
}

fn current_schema_version(conn: &Connection) -> Result<u32, StoreError> {
    if !table_exists(conn, "schema_migrations")? {
        return Ok(0);
    }
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )
    .map_err(Into::into)
}

fn table_exists(conn: &Connection, name: &str) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1 LIMIT 1",
        params![name],
        |_| Ok(()),
    )
    .optional()
    .map(|found| found.is_some())
}

fn column_exists(conn: &Connection, table: &str, column: &str) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT 1 FROM pragma_table_info(?1) WHERE name = ?2 LIMIT 1",
        params![table, column],
        |_| Ok(()),
    )
    .optional()
    .map(|found| found.is_some())
}

fn create_apps(tx: &Transaction<'_>) -> rusqlite::Result<()> {
    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS apps (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            created_at TEXT,
            updated_at TEXT,
            urn TEXT NOT NULL,
            version INTEGER NOT NULL DEFAULT 0,
            latest_version INTEGER NOT NULL DEFAULT 0
        );",
    )
}

// Databases written before urns existed keyed apps by bare id in `schemas`.
fn adopt_legacy_schemas(tx: &Transaction<'_>) -> rusqlite::Result<()> {
    if !table_exists(tx, "schemas")? {
        return Ok(());
    }
    let adopted = tx.execute(
        "INSERT INTO apps (created_at, updated_at, urn, version, latest_version)
         SELECT ?1, ?1, id, version, latest_version FROM schemas
         WHERE id NOT IN (SELECT urn FROM apps)",
        params![Utc::now().to_rfc3339()],
    )?;
    tx.execute_batch("DROP TABLE schemas;")?;
    info!("Adopted {} records from legacy schemas table", adopted);
    Ok(())
}

fn purge_soft_deleted(tx: &Transaction<'_>) -> rusqlite::Result<()> {
    if !column_exists(tx, "apps", "deleted_at")? {
        return Ok(());
    }
    let purged = tx.execute("DELETE FROM apps WHERE deleted_at IS NOT NULL", [])?;
    if purged > 0 {
        info!("Purged {} soft-deleted records", purged);
    }
    Ok(())
}

fn unique_urn(tx: &Transaction<'_>) -> rusqlite::Result<()> {
    tx.execute_batch(
        "DELETE FROM apps WHERE id NOT IN (SELECT MIN(id) FROM apps GROUP BY urn);
         CREATE UNIQUE INDEX IF NOT EXISTS idx_apps_urn ON apps (urn);",
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(urn: &str, version: i64, latest_version: i64) -> AppRecord {
        AppRecord {
            urn: urn.into(),
            version,
            latest_version,
        }
    }

    #[test]
    fn fresh_store_is_fully_migrated() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert_eq!(store.schema_version().unwrap(), CURRENT_SCHEMA_VERSION);
        assert!(store.all().unwrap().is_empty());
    }

    #[test]
    fn crud_round_trip() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        store.create(&record("jellyfin:official", 3, 4)).unwrap();
        store.create(&record("immich:official", 1, 2)).unwrap();

        assert_eq!(
            store.find("jellyfin:official").unwrap(),
            Some(record("jellyfin:official", 3, 4))
        );

        store.update(&record("jellyfin:official", 4, 5)).unwrap();
        assert_eq!(
            store.find("jellyfin:official").unwrap(),
            Some(record("jellyfin:official", 4, 5))
        );

        store.delete("immich:official").unwrap();
        store.delete("never-existed:official").unwrap();
        assert_eq!(store.all().unwrap(), vec![record("jellyfin:official", 4, 5)]);
    }

    #[test]
    fn duplicate_urn_is_rejected() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        store.create(&record("jellyfin:official", 3, 4)).unwrap();
        assert!(store.create(&record("jellyfin:official", 3, 4)).is_err());
    }

    #[test]
    fn reopening_does_not_reapply_migrations() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tipimate.db");

        {
            let mut store = SqliteStore::open(&path).unwrap();
            store.create(&record("jellyfin:official", 3, 4)).unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.schema_version().unwrap(), CURRENT_SCHEMA_VERSION);
        assert_eq!(store.all().unwrap().len(), 1);
    }

    #[test]
    fn newer_schema_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tipimate.db");
        drop(SqliteStore::open(&path).unwrap());

        let conn = Connection::open(&path).unwrap();
        conn.execute(
            "INSERT INTO schema_migrations (version, name, applied_at) VALUES (99, 'future', 'now')",
            [],
        )
        .unwrap();
        drop(conn);

        assert!(matches!(
            SqliteStore::open(&path),
            Err(StoreError::UnsupportedSchema { found: 99, .. })
        ));
    }

    #[test]
    fn adopts_legacy_schemas_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tipicord.db");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE schemas (id TEXT PRIMARY KEY, version INTEGER, latest_version INTEGER);
             INSERT INTO schemas VALUES ('jellyfin', 3, 4);",
        )
        .unwrap();
        drop(conn);

        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.find("jellyfin").unwrap(), Some(record("jellyfin", 3, 4)));

        let conn = Connection::open(&path).unwrap();
        assert!(!table_exists(&conn, "schemas").unwrap());
    }

    #[test]
    fn cleans_up_soft_deleted_and_duplicate_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tipimate.db");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE apps (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                created_at DATETIME, updated_at DATETIME, deleted_at DATETIME,
                urn TEXT, version INTEGER, latest_version INTEGER
             );
             INSERT INTO apps (urn, version, latest_version) VALUES ('jellyfin:official', 3, 4);
             INSERT INTO apps (urn, version, latest_version) VALUES ('jellyfin:official', 9, 9);
             INSERT INTO apps (urn, version, latest_version, deleted_at)
                VALUES ('immich:official', 1, 2, '2024-01-01');",
        )
        .unwrap();
        drop(conn);

        let mut store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.all().unwrap(), vec![record("jellyfin:official", 3, 4)]);

        store.create(&record("immich:official", 1, 2)).unwrap();
        assert_eq!(store.all().unwrap().len(), 2);
    }

    #[test]
    fn dropped_transaction_rolls_back() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        {
            let mut tx = store.transaction().unwrap();
            tx.create(&record("jellyfin:official", 3, 4)).unwrap();
        }
        assert!(store.all().unwrap().is_empty());

        let mut tx = store.transaction().unwrap();
        tx.create(&record("jellyfin:official", 3, 4)).unwrap();
        tx.commit().unwrap();
        assert_eq!(store.all().unwrap().len(), 1);
    }
}
