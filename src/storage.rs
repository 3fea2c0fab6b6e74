//! SQLite persistence for listings and their description embeddings.
//!
//! Every store call opens its own connection and drops it before returning,
//! so nothing is held open between calls and each call commits on its own.

mod embeddings;
mod listings;

pub use embeddings::EmbeddingStore;
pub use listings::ListingStore;

use rusqlite::Connection;
use std::path::{Path, PathBuf};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS listings (
    id INTEGER PRIMARY KEY,
    title TEXT NOT NULL,
    url TEXT NOT NULL,
    description TEXT,
    imageUrls TEXT,
    price REAL,
    location TEXT
);
CREATE TABLE IF NOT EXISTS embeddings (
    listing_id INTEGER PRIMARY KEY,
    embedding BLOB,
    FOREIGN KEY(listing_id) REFERENCES listings(id)
);
";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("embedding for listing {listing_id} is {len} bytes, not a whole number of f32s")]
    CorruptVector { listing_id: i64, len: usize },
}

/// Handle to the database file. Cheap to clone; holds no connection.
#[derive(Debug, Clone)]
pub struct Database {
    path: PathBuf,
}

impl Database {
    /// Ensure the file and both tables exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let db = Self { path };
        db.connect()?.execute_batch(SCHEMA)?;
        log::debug!("database ready at {}", db.path.display());

        Ok(db)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Scoped connection; released when the returned value is dropped.
    ///
    /// Foreign keys are enforced on every connection, so an embedding can only
    /// be written for a listing row that exists.
    pub(crate) fn connect(&self) -> Result<Connection, StoreError> {
        let conn = Connection::open(&self.path)?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(conn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_creates_parent_dirs_and_tables() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested/dir/listings.db");

        let db = Database::open(&path).unwrap();
        assert!(path.exists());

        let conn = db.connect().unwrap();
        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(tables, vec!["embeddings", "listings"]);
    }

    #[test]
    fn connections_enforce_foreign_keys() {
        let tmp = tempfile::tempdir().unwrap();
        let db = Database::open(tmp.path().join("listings.db")).unwrap();

        let enabled: i64 = db
            .connect()
            .unwrap()
            .pragma_query_value(None, "foreign_keys", |row| row.get(0))
            .unwrap();
        assert_eq!(enabled, 1);
    }

    #[test]
    fn open_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("listings.db");
        Database::open(&path).unwrap();
        Database::open(&path).unwrap();
    }
}
