use rusqlite::{Connection, OpenFlags};
use std::path::Path;
use tokio::task;
use crate::error::{Result, RagbenchError};

/// Read-only handle on an existing SQLite search index
pub struct IndexDb {
    path: std::path::PathBuf,
}

impl IndexDb {
    /// Create a new index handle; nothing is opened until first use
    pub fn new<P: AsRef<Path>>(db_path: P) -> Self {
        Self {
            path: db_path.as_ref().to_path_buf(),
        }
    }

    /// Open a read-only connection with read-tuned pragmas
    pub fn open_connection(path: &Path) -> Result<Connection> {
        // READ_ONLY fails fast on a missing file instead of creating an empty index;
        // NO_MUTEX since each connection lives on a single blocking task
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(RagbenchError::Database)?;

        // query_only guards the index against accidental writes;
        // 64MB cache and in-memory temp store for FTS5 ranking
        conn.execute_batch(
            "PRAGMA query_only = ON; \
             PRAGMA temp_store = MEMORY; \
             PRAGMA cache_size = -65536;"
        )?;

        Ok(conn)
    }

    /// Execute a closure with a connection in a blocking task
    pub async fn with_connection<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let path = self.path.clone();
        // rusqlite is synchronous; keep it off the async workers.
        // A fresh connection per call is cheap next to an FTS5 query
        task::spawn_blocking(move || {
            let conn = Self::open_connection(&path)?;
            f(&conn)
        })
        .await
        // JoinError: the closure panicked or the runtime is shutting down
        .map_err(|e| RagbenchError::Retrieval(format!("Index task failed: {}", e)))?
    }
}
