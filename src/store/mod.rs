use crate::types::AppRecord;
use thiserror::Error;

pub mod sqlite;
pub use sqlite::SqliteStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("database schema version {found} is newer than supported version {supported}")]
    UnsupportedSchema { found: u32, supported: u32 },
}

/// Record store for the last observed version state of each app.
///
/// Keyed by urn. Writes take `&mut self` so a reconciliation pass has
/// exclusive access for its whole duration.
pub trait StateStore {
    fn all(&self) -> Result<Vec<AppRecord>, StoreError>;

    fn find(&self, urn: &str) -> Result<Option<AppRecord>, StoreError>;

    fn create(&mut self, record: &AppRecord) -> Result<(), StoreError>;

    /// Overwrites both version fields of an existing record.
    fn update(&mut self, record: &AppRecord) -> Result<(), StoreError>;

    /// Hard delete. Deleting a missing urn is not an error.
    fn delete(&mut self, urn: &str) -> Result<(), StoreError>;
}
