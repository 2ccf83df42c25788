use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;
use thiserror::Error;

/// Errors from the profile backing store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Single-document storage keyed by namespace.
///
/// "Document absent" (`Ok(None)`) is a valid state distinct from
/// "document present but empty" (`Ok(Some(""))`).
pub trait DocumentStore: Send {
    fn get(&self, namespace: &str) -> Result<Option<String>, StoreError>;
    fn put(&self, namespace: &str, body: &str) -> Result<(), StoreError>;
}

/// SQLite-backed document store.
///
/// One row per namespace; `put` replaces the whole document. The connection
/// is guarded by a mutex: single-writer per store, no cross-process locking.
pub struct SqliteDocumentStore {
    conn: Mutex<Connection>,
}

impl SqliteDocumentStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory store, useful for tests and throwaway sessions.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn init_schema(conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS documents (
                namespace TEXT PRIMARY KEY,
                body TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            ",
        )?;
        Ok(())
    }
}

impl DocumentStore for SqliteDocumentStore {
    fn get(&self, namespace: &str) -> Result<Option<String>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let body = conn
            .query_row(
                "SELECT body FROM documents WHERE namespace = ?1",
                params![namespace],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(body)
    }

    fn put(&self, namespace: &str, body: &str) -> Result<(), StoreError> {
        let now = Utc::now().to_rfc3339();
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO documents (namespace, body, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(namespace) DO UPDATE SET body = ?2, updated_at = ?3",
            params![namespace, body, now],
        )?;
        Ok(())
    }
}
