use thiserror::Error;
use tracing::debug;

use super::executor::RequestExecutor;
use super::shutdown::ShutdownSignal;
use crate::io::{ChunkStore, StoreError};
use crate::llm::{RequestError, parse_response};
use crate::models::Chunk;

/// Why a chunk was left unprocessed
#[derive(Debug, Error)]
pub enum ChunkError {
    #[error("chunk {chunk_id}: request failed: {source}")]
    Request {
        chunk_id: i64,
        #[source]
        source: RequestError,
    },

    #[error("chunk {chunk_id}: failed to store results: {source}")]
    Store {
        chunk_id: i64,
        #[source]
        source: StoreError,
    },

    #[error("chunk {0}: skipped after shutdown was requested")]
    Cancelled(i64),
}

impl ChunkError {
    pub fn chunk_id(&self) -> i64 {
        match self {
            ChunkError::Request { chunk_id, .. } | ChunkError::Store { chunk_id, .. } => *chunk_id,
            ChunkError::Cancelled(chunk_id) => *chunk_id,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ChunkError::Cancelled(_))
    }
}

/// Result of a successfully processed chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkOutcome {
    pub chunk_id: i64,
    /// Verified candidates persisted for the chunk
    pub candidates: usize,
}

/// Runs one chunk end to end: request, parse, verify, persist
pub struct ChunkProcessor {
    executor: RequestExecutor,
    store: ChunkStore,
}

impl ChunkProcessor {
    pub fn new(executor: RequestExecutor, store: ChunkStore) -> Self {
        Self { executor, store }
    }

    pub fn store(&self) -> &ChunkStore {
        &self.store
    }

    pub async fn process(&self, chunk: &Chunk) -> Result<ChunkOutcome, ChunkError> {
        let response = self
            .executor
            .complete(&chunk.system_message, &chunk.prompt_template, &chunk.text)
            .await
            .map_err(|source| ChunkError::Request {
                chunk_id: chunk.id,
                source,
            })?;

        self.persist(chunk, &response).await
    }

    /// Like [`process`](Self::process), but gives up while still waiting for
    /// admission if `shutdown` fires. Once the request is sent it completes.
    pub async fn process_with_shutdown(
        &self,
        chunk: &Chunk,
        shutdown: &ShutdownSignal,
    ) -> Result<ChunkOutcome, ChunkError> {
        if shutdown.is_triggered() {
            return Err(ChunkError::Cancelled(chunk.id));
        }

        let admitted = tokio::select! {
            biased;
            _ = shutdown.triggered() => return Err(ChunkError::Cancelled(chunk.id)),
            admitted = self.executor.admit(
                &chunk.system_message,
                &chunk.prompt_template,
                &chunk.text,
            ) => admitted,
        };
        let admission = admitted.map_err(|source| ChunkError::Request {
            chunk_id: chunk.id,
            source,
        })?;

        let response = self
            .executor
            .send(admission)
            .await
            .map_err(|source| ChunkError::Request {
                chunk_id: chunk.id,
                source,
            })?;

        self.persist(chunk, &response).await
    }

    async fn persist(&self, chunk: &Chunk, response: &str) -> Result<ChunkOutcome, ChunkError> {
        let candidates = parse_response(response, &chunk.text);
        debug!("Chunk {}: {} verified candidates", chunk.id, candidates.len());

        let stored = self
            .store
            .record_results(chunk.id, candidates)
            .await
            .map_err(|source| ChunkError::Store {
                chunk_id: chunk.id,
                source,
            })?;

        Ok(ChunkOutcome {
            chunk_id: chunk.id,
            candidates: stored,
        })
    }
}
