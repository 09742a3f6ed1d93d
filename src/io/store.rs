use std::path::Path;
use std::sync::{Arc, Mutex};

use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::debug;

use crate::models::{Candidate, Chunk, NewChunk};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("task join error: {0}")]
    Join(String),
    #[error("chunk {0} is already processed or does not exist")]
    AlreadyProcessed(i64),
}

/// A persisted p-value row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredPValue {
    pub id: i64,
    pub chunk_id: i64,
    pub quotation: String,
    pub test_statistic: Option<String>,
    pub p_value: String,
}

/// Row counts across the store
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreCounts {
    pub chunks: u64,
    pub processed_chunks: u64,
    pub p_values: u64,
}

/// SQLite-backed store of chunks and extracted p-values.
///
/// Cloning shares the underlying connection. All queries run on the blocking
/// pool; writes for a chunk go through a single transaction.
#[derive(Clone)]
pub struct ChunkStore {
    conn: Arc<Mutex<Connection>>,
}

impl ChunkStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;\
             PRAGMA synchronous=NORMAL;\
             PRAGMA busy_timeout=5000;",
        )?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Self::create_tables(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn create_tables(conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS chunks (\
               id INTEGER PRIMARY KEY,\
               text TEXT NOT NULL,\
               system_message TEXT NOT NULL,\
               prompt TEXT NOT NULL,\
               processed BOOLEAN NOT NULL DEFAULT FALSE\
             );\
             CREATE TABLE IF NOT EXISTS p_values (\
               id INTEGER PRIMARY KEY AUTOINCREMENT,\
               chunk_id INTEGER NOT NULL REFERENCES chunks(id),\
               quotation TEXT NOT NULL,\
               test_statistic TEXT,\
               p_value TEXT NOT NULL\
             );\
             CREATE INDEX IF NOT EXISTS idx_p_values_chunk_id ON p_values(chunk_id);",
        )?;
        Ok(())
    }

    /// Run `f` with the connection on the blocking pool.
    /// A poisoned lock is recovered; the connection itself is still usable.
    async fn with_conn<F, R>(&self, f: F) -> Result<R, StoreError>
    where
        F: FnOnce(&mut Connection) -> Result<R, StoreError> + Send + 'static,
        R: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            f(&mut guard)
        })
        .await
        .map_err(|e| StoreError::Join(e.to_string()))?
    }

    /// Add a chunk awaiting extraction
    pub async fn insert_chunk(&self, chunk: NewChunk) -> Result<i64, StoreError> {
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO chunks (text, system_message, prompt, processed) \
                 VALUES (?1, ?2, ?3, FALSE)",
                params![chunk.text, chunk.system_message, chunk.prompt_template],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    pub async fn chunk(&self, id: i64) -> Result<Option<Chunk>, StoreError> {
        self.with_conn(move |conn| {
            let chunk = conn
                .query_row(
                    "SELECT id, text, system_message, prompt, processed FROM chunks WHERE id = ?1",
                    params![id],
                    row_to_chunk,
                )
                .optional()?;
            Ok(chunk)
        })
        .await
    }

    /// Up to `limit` unprocessed chunks in insertion order
    pub async fn pending_chunks(&self, limit: usize) -> Result<Vec<Chunk>, StoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, text, system_message, prompt, processed FROM chunks \
                 WHERE NOT processed ORDER BY id LIMIT ?1",
            )?;
            let chunks = stmt
                .query_map(params![limit], row_to_chunk)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(chunks)
        })
        .await
    }

    /// Insert the accepted candidates and mark the chunk processed, atomically.
    ///
    /// Fails with [`StoreError::AlreadyProcessed`] (writing nothing) if the
    /// chunk is missing or was already marked.
    pub async fn record_results(
        &self,
        chunk_id: i64,
        candidates: Vec<Candidate>,
    ) -> Result<usize, StoreError> {
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;

            let marked = tx.execute(
                "UPDATE chunks SET processed = TRUE WHERE id = ?1 AND NOT processed",
                params![chunk_id],
            )?;
            if marked == 0 {
                // dropping the transaction rolls it back
                return Err(StoreError::AlreadyProcessed(chunk_id));
            }

            {
                let mut insert = tx.prepare(
                    "INSERT INTO p_values (chunk_id, quotation, test_statistic, p_value) \
                     VALUES (?1, ?2, ?3, ?4)",
                )?;
                for candidate in &candidates {
                    insert.execute(params![
                        chunk_id,
                        candidate.quotation,
                        candidate.statistic,
                        candidate.p.as_str(),
                    ])?;
                }
            }

            tx.commit()?;
            debug!("Chunk {}: stored {} p-values", chunk_id, candidates.len());
            Ok(candidates.len())
        })
        .await
    }

    pub async fn p_values_for_chunk(&self, chunk_id: i64) -> Result<Vec<StoredPValue>, StoreError> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, chunk_id, quotation, test_statistic, p_value FROM p_values \
                 WHERE chunk_id = ?1 ORDER BY id",
            )?;
            let rows = stmt
                .query_map(params![chunk_id], |row| {
                    Ok(StoredPValue {
                        id: row.get(0)?,
                        chunk_id: row.get(1)?,
                        quotation: row.get(2)?,
                        test_statistic: row.get(3)?,
                        p_value: row.get(4)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
    }

    pub async fn counts(&self) -> Result<StoreCounts, StoreError> {
        self.with_conn(|conn| {
            let (chunks, processed_chunks): (i64, i64) = conn.query_row(
                "SELECT COUNT(*), COALESCE(SUM(processed), 0) FROM chunks",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;
            let p_values: i64 =
                conn.query_row("SELECT COUNT(*) FROM p_values", [], |row| row.get(0))?;
            Ok(StoreCounts {
                chunks: chunks as u64,
                processed_chunks: processed_chunks as u64,
                p_values: p_values as u64,
            })
        })
        .await
    }
}

fn row_to_chunk(row: &Row<'_>) -> rusqlite::Result<Chunk> {
    Ok(Chunk {
        id: row.get(0)?,
        text: row.get(1)?,
        system_message: row.get(2)?,
        prompt_template: row.get(3)?,
        processed: row.get(4)?,
    })
}
