use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::processor::ChunkProcessor;
use super::shutdown::ShutdownSignal;
use crate::io::StoreError;

/// Configuration for a pipeline run
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Upper bound on chunks loaded for this run
    pub max_chunks: usize,
    /// Draw a terminal progress bar
    pub show_progress: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_chunks: 1000,
            show_progress: true,
        }
    }
}

/// Outcome of a pipeline run
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    /// Chunks loaded and handed to a task
    pub attempted: usize,
    pub succeeded: usize,
    /// Request or persistence failures; these chunks stay unprocessed
    pub failed: usize,
    /// Skipped because shutdown was requested before their request was sent
    pub cancelled: usize,
    /// Verified p-values persisted across all chunks
    pub candidates: usize,
    pub elapsed: Duration,
}

impl RunSummary {
    fn new(run_id: Uuid, started_at: DateTime<Utc>, attempted: usize) -> Self {
        Self {
            run_id,
            started_at,
            attempted,
            succeeded: 0,
            failed: 0,
            cancelled: 0,
            candidates: 0,
            elapsed: Duration::ZERO,
        }
    }
}

/// Process up to `max_chunks` unprocessed chunks concurrently.
///
/// Every chunk gets its own task; parallelism is limited only by the shared
/// budgets inside the processor. Chunk failures are counted, never fatal; only
/// failing to load the batch aborts the run.
pub async fn run_pipeline(
    processor: Arc<ChunkProcessor>,
    config: &PipelineConfig,
    shutdown: Arc<ShutdownSignal>,
) -> Result<RunSummary, StoreError> {
    let run_id = Uuid::new_v4();
    let started_at = Utc::now();
    let start = Instant::now();

    let chunks = processor.store().pending_chunks(config.max_chunks).await?;
    info!(
        "Run {}: processing {} unprocessed chunks (limit {})",
        run_id,
        chunks.len(),
        config.max_chunks
    );

    let mut summary = RunSummary::new(run_id, started_at, chunks.len());
    let progress = progress_bar(chunks.len(), config.show_progress);

    let mut tasks = JoinSet::new();
    for chunk in chunks {
        let processor = processor.clone();
        let shutdown = shutdown.clone();
        tasks.spawn(async move { processor.process_with_shutdown(&chunk, &shutdown).await });
    }

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok(outcome)) => {
                summary.succeeded += 1;
                summary.candidates += outcome.candidates;
                debug!(
                    "Chunk {}: {} p-values stored",
                    outcome.chunk_id, outcome.candidates
                );
            }
            Ok(Err(e)) if e.is_cancelled() => {
                summary.cancelled += 1;
                debug!("{}", e);
            }
            Ok(Err(e)) => {
                summary.failed += 1;
                warn!("{}", e);
            }
            Err(e) => {
                summary.failed += 1;
                warn!("Chunk task panicked: {}", e);
            }
        }
        progress.inc(1);
    }

    progress.finish_and_clear();
    summary.elapsed = start.elapsed();

    info!(
        "Run {}: {} succeeded, {} failed, {} cancelled, {} p-values stored in {:.1}s",
        run_id,
        summary.succeeded,
        summary.failed,
        summary.cancelled,
        summary.candidates,
        summary.elapsed.as_secs_f64()
    );

    Ok(summary)
}

fn progress_bar(len: usize, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new(len as u64);
    if let Ok(style) = ProgressStyle::default_bar().template(
        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} chunks ({eta})",
    ) {
        pb.set_style(style.progress_chars("█▓▒░"));
    }
    pb
}
