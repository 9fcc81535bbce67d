//! Async SQLite executor using a dedicated background thread.
//!
//! Every statement runs on the single thread owned by `tokio_rusqlite`, so
//! queue operations are applied in the order they were submitted and never
//! block the Tokio runtime.
//!
//! Only SQL belongs inside [`AsyncDatabase::call`]. Network I/O and anything
//! else slow must happen outside the closure, otherwise it stalls every other
//! query waiting on the same thread.

use crate::{migrations, queries, DatabaseError, DatabaseResult, LocationFix, StoredFix};
use std::path::Path;
use tokio_rusqlite::Connection;
use tracing::info;

/// Convert a tokio_rusqlite::Error to DatabaseError.
fn from_tokio_rusqlite(e: tokio_rusqlite::Error) -> DatabaseError {
    match e {
        tokio_rusqlite::Error::Rusqlite(e) => DatabaseError::Sqlite(e),
        tokio_rusqlite::Error::Close(_) => DatabaseError::Connection("Connection closed".to_string()),
        other => DatabaseError::Connection(other.to_string()),
    }
}

/// Async SQLite database with a dedicated executor thread.
#[derive(Clone)]
pub struct AsyncDatabase {
    conn: Connection,
    path: String,
}

impl AsyncDatabase {
    /// Open a database at the given path.
    ///
    /// Creates the file and its parent directory if needed, enables WAL mode
    /// and runs pending migrations.
    pub async fn open(path: &Path) -> DatabaseResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let path_str = path.to_string_lossy().to_string();
        info!(path = %path_str, "Opening async database");

        let conn = Connection::open(path_str.clone())
            .await
            .map_err(|e| DatabaseError::Connection(e.to_string()))?;

        conn.call(|conn| {
            conn.execute_batch(
                "
                PRAGMA journal_mode = WAL;
                PRAGMA synchronous = NORMAL;
                PRAGMA temp_store = MEMORY;
                PRAGMA busy_timeout = 5000;
                ",
            )?;
            Ok(())
        })
        .await
        .map_err(from_tokio_rusqlite)?;

        let db = Self {
            conn,
            path: path_str,
        };
        db.call(migrations::run_migrations).await?;

        info!(path = %db.path, "Async database initialized with WAL mode");
        Ok(db)
    }

    /// Open an in-memory database. Contents are lost when the last clone is dropped.
    pub async fn open_in_memory() -> DatabaseResult<Self> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(|e| DatabaseError::Connection(e.to_string()))?;

        let db = Self {
            conn,
            path: ":memory:".to_string(),
        };
        db.call(migrations::run_migrations).await?;
        Ok(db)
    }

    /// Execute a closure on the database connection.
    ///
    /// The closure runs on the dedicated SQLite thread; the caller's task is
    /// parked until the result is ready.
    pub async fn call<F, T>(&self, f: F) -> DatabaseResult<T>
    where
        F: FnOnce(&rusqlite::Connection) -> DatabaseResult<T> + Send + 'static,
        T: Send + 'static,
    {
        // Our result rides inside tokio_rusqlite's Ok so both error layers survive.
        let outer_result = self.conn.call(move |conn| Ok(f(conn))).await;

        match outer_result {
            Ok(inner) => inner,
            Err(e) => Err(from_tokio_rusqlite(e)),
        }
    }

    /// Append a fix to the outbox and return its sequence id.
    pub async fn insert_fix(&self, fix: LocationFix) -> DatabaseResult<i64> {
        self.call(move |conn| queries::insert_fix(conn, &fix)).await
    }

    /// Read the oldest queued fix without removing it.
    pub async fn select_oldest_fix(&self) -> DatabaseResult<Option<StoredFix>> {
        self.call(queries::select_oldest_fix).await
    }

    /// Delete a fix by id. Returns whether a row was removed.
    pub async fn delete_fix(&self, id: i64) -> DatabaseResult<bool> {
        self.call(move |conn| queries::delete_fix(conn, id)).await
    }

    pub async fn count_fixes(&self) -> DatabaseResult<i64> {
        self.call(queries::count_fixes).await
    }


    /// Close the database connection after pending operations complete.
    pub async fn close(self) -> DatabaseResult<()> {
        self.conn
            .close()
            .await
            .map_err(|e| DatabaseError::Connection(format!("Failed to close database: {:?}", e)))?;
        info!(path = %self.path, "Database closed");
        Ok(())
    }
}
