//! DocChat Ingest - The document processing worker pool
//!
//! Consumes ingestion jobs from the durable queue and drives each one
//! through the pipeline: extract -> chunk -> embed -> upsert. A
//! semaphore bounds how many documents are in flight at once; each
//! stage reports failures through the shared error taxonomy so the
//! queue can decide between retry and dead-letter.
//!
//! The pipeline embeds every chunk before writing any point, and wipes
//! a document's previous points before the upsert, so a redelivered
//! job converges on exactly one complete set of points per document.

use async_trait::async_trait;
use docchat_core::{
    DocChatError, Document, DocumentRegistry, DocumentStatus, EmbeddedPoint, IngestConfig,
    IngestionJob, PointPayload, Result,
};
use docchat_parser::{extract_pdf_text, split_text};
use docchat_queue::{ClaimedJob, JobQueue};
use docchat_vector::{EmbeddingClient, VectorStore};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use uuid::Uuid;

/// Seam for text extraction so the pipeline can be exercised without
/// real PDF fixtures
#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract(&self, path: &Path) -> Result<String>;
}

/// Production extractor backed by the PDF parser. Extraction is
/// CPU-bound, so it runs on the blocking pool.
pub struct PdfExtractor;

#[async_trait]
impl TextExtractor for PdfExtractor {
    async fn extract(&self, path: &Path) -> Result<String> {
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || extract_pdf_text(&path))
            .await
            .map_err(|e| DocChatError::Extraction(format!("extraction task panicked: {e}")))?
    }
}

/// Worker pool that processes ingestion jobs
pub struct IngestionWorker {
    registry: Arc<DocumentRegistry>,
    queue: Arc<dyn JobQueue>,
    extractor: Arc<dyn TextExtractor>,
    embedder: Arc<dyn EmbeddingClient>,
    store: Arc<dyn VectorStore>,
    config: IngestConfig,
}

impl IngestionWorker {
    pub fn new(
        registry: Arc<DocumentRegistry>,
        queue: Arc<dyn JobQueue>,
        extractor: Arc<dyn TextExtractor>,
        embedder: Arc<dyn EmbeddingClient>,
        store: Arc<dyn VectorStore>,
        config: IngestConfig,
    ) -> Self {
        Self {
            registry,
            queue,
            extractor,
            embedder,
            store,
            config,
        }
    }

    /// Poll-claim-process loop. Runs until the shutdown signal flips;
    /// in-flight jobs finish, unclaimed jobs stay queued.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency));
        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);
        tracing::info!(concurrency = self.config.concurrency, "ingestion worker started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            if let Err(e) = self.queue.reap_stale().await {
                tracing::warn!(error = %e, "failed to reap stale leases");
            }

            // Claim as many jobs as free permits allow, then wait
            loop {
                let Ok(permit) = Arc::clone(&semaphore).try_acquire_owned() else {
                    break;
                };
                match self.queue.claim().await {
                    Ok(Some(claimed)) => {
                        let worker = Arc::clone(&self);
                        tokio::spawn(async move {
                            worker.handle(claimed).await;
                            drop(permit);
                        });
                    }
                    Ok(None) => break,
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to claim job");
                        break;
                    }
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(poll_interval) => {}
                _ = shutdown.changed() => {}
            }
        }

        tracing::info!("ingestion worker stopped");
    }

    /// Process one claimed job end to end, including queue and registry
    /// bookkeeping
    pub async fn handle(&self, claimed: ClaimedJob) {
        let job = &claimed.job;
        let document_id = job.document_id;

        match self.registry.get(document_id) {
            Some(doc) if doc.status == DocumentStatus::Completed => {
                // Stale redelivery of finished work
                tracing::debug!(%document_id, "document already completed, dropping job");
                if let Err(e) = self.queue.complete(claimed.id).await {
                    tracing::warn!(%document_id, error = %e, "failed to ack duplicate job");
                }
                return;
            }
            Some(doc) if doc.status == DocumentStatus::Processing => {
                // Another worker holds this document; push the job back
                if let Err(e) = self
                    .queue
                    .fail(claimed.id, "document is already being processed", true)
                    .await
                {
                    tracing::warn!(%document_id, error = %e, "failed to requeue concurrent job");
                }
                return;
            }
            Some(_) => {}
            None => {
                // The registry is in-memory; after a restart the durable
                // queue outlives it. Rebuild the record from the job.
                tracing::info!(%document_id, "rebuilding registry record from queued job");
                self.registry.insert(rebuild_document(job));
            }
        }

        if let Err(e) = self.registry.mark_processing(document_id) {
            tracing::warn!(%document_id, error = %e, "could not mark document processing");
            if let Err(e) = self.queue.fail(claimed.id, &e.to_string(), true).await {
                tracing::warn!(%document_id, error = %e, "failed to requeue job");
            }
            return;
        }

        match self.process(job).await {
            Ok(points) => {
                if let Err(e) = self.registry.mark_completed(document_id) {
                    tracing::warn!(%document_id, error = %e, "could not mark document completed");
                }
                if let Err(e) = self.queue.complete(claimed.id).await {
                    tracing::warn!(%document_id, error = %e, "failed to ack completed job");
                }
                tracing::info!(%document_id, points, attempt = claimed.attempt, "document ingested");
            }
            Err(err) => {
                tracing::warn!(%document_id, attempt = claimed.attempt, error = %err, "ingestion failed");
                if let Err(e) = self.registry.mark_failed(document_id, &err.to_string()) {
                    tracing::warn!(%document_id, error = %e, "could not mark document failed");
                }
                if let Err(e) = self
                    .queue
                    .fail(claimed.id, &err.to_string(), err.is_retryable())
                    .await
                {
                    tracing::warn!(%document_id, error = %e, "failed to report job failure");
                }
            }
        }
    }

    /// The pipeline proper: extract, chunk, embed, upsert
    async fn process(&self, job: &IngestionJob) -> Result<usize> {
        let document_id = job.document_id;

        tracing::debug!(%document_id, path = %job.source_path.display(), "extracting text");
        let text = self.extractor.extract(&job.source_path).await?;

        tracing::debug!(%document_id, chars = text.len(), "chunking text");
        let chunks = split_text(&text, self.config.chunk_size, self.config.chunk_overlap);
        if chunks.is_empty() {
            return Err(DocChatError::Extraction(
                "document produced no chunks".to_string(),
            ));
        }

        tracing::debug!(%document_id, chunks = chunks.len(), "embedding chunks");
        let contents: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let vectors = self.embedder.embed_batch(&contents).await?;
        if vectors.len() != chunks.len() {
            return Err(DocChatError::EmbeddingProvider(format!(
                "embedded {} of {} chunks",
                vectors.len(),
                chunks.len()
            )));
        }

        let points: Vec<EmbeddedPoint> = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| EmbeddedPoint {
                id: Uuid::new_v4(),
                vector,
                payload: PointPayload {
                    content: chunk.content,
                    document_id: document_id.to_string(),
                    owner_id: job.owner_id.clone(),
                    chunk_index: chunk.index,
                },
            })
            .collect();

        // A retried job must not leave points from an earlier partial
        // attempt alongside the new set
        tracing::debug!(%document_id, points = points.len(), "upserting points");
        self.store
            .delete_by_document(&document_id.to_string())
            .await?;
        let count = points.len();
        self.store.upsert(points).await?;

        Ok(count)
    }
}

/// Reconstruct a registry record for a job whose document record was
/// lost with the previous process
fn rebuild_document(job: &IngestionJob) -> Document {
    let filename = job
        .source_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| job.document_id.to_string());

    Document {
        id: job.document_id,
        owner_id: job.owner_id.clone(),
        filename,
        source_path: job.source_path.clone(),
        created_at: chrono::Utc::now(),
        status: DocumentStatus::Pending,
        error: None,
    }
}

// ============================================================================
// Tests
// ============================================================================
