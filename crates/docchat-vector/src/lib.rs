//! DocChat Vector - Embedding generation and vector store access
//!
//! Provides the embedding client abstraction (OpenAI, Ollama) and the
//! schema-aware Qdrant wrapper used by both the ingestion pipeline and
//! the chat retrieval path, including the owner-relaxation fallback
//! search policy.

use async_trait::async_trait;
use docchat_core::{EmbeddedPoint, Result, SearchResult};

pub mod embedding;
pub mod qdrant_store;

pub use embedding::{create_embedding_client, EmbeddingClient, OllamaEmbedding, OpenAiEmbedding};
pub use qdrant_store::QdrantStore;

/// Exact-match filter for similarity search.
///
/// `document_id` is always required; `owner_id` is an advisory
/// isolation constraint, not a hard multi-tenant boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchFilter {
    pub document_id: String,
    pub owner_id: Option<String>,
}

/// Trait for vector store operations
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Idempotent collection bootstrap: creates the collection and its
    /// payload indexes only if absent. Safe to call on every start.
    async fn ensure_collection(&self) -> Result<()>;

    /// Insert or overwrite points by id. The whole batch is submitted
    /// in one call; a failed call reports the error rather than
    /// silently dropping part of the batch.
    async fn upsert(&self, points: Vec<EmbeddedPoint>) -> Result<()>;

    /// Filtered similarity search, sorted by descending relevance score
    async fn query(
        &self,
        vector: &[f32],
        filter: &SearchFilter,
        limit: usize,
    ) -> Result<Vec<SearchResult>>;

    /// Delete all points belonging to one document
    async fn delete_by_document(&self, document_id: &str) -> Result<u64>;
}

/// Similarity search with the owner-relaxation fallback.
///
/// Queries with both `documentId` and `ownerId` filters; when that
/// returns nothing, retries exactly once with only `documentId` and
/// returns the fallback result set. This tolerates owner-id mismatches
/// from upstream identity inconsistencies without failing the query.
/// The relaxation never goes further: dropping `documentId` would leak
/// content across documents.
pub async fn search_with_fallback(
    store: &dyn VectorStore,
    vector: &[f32],
    document_id: &str,
    owner_id: Option<&str>,
    limit: usize,
) -> Result<Vec<SearchResult>> {
    let filter = SearchFilter {
        document_id: document_id.to_string(),
        owner_id: owner_id.map(String::from),
    };

    let results = store.query(vector, &filter, limit).await?;
    if !results.is_empty() || filter.owner_id.is_none() {
        return Ok(results);
    }

    tracing::debug!(
        document_id,
        "owner-filtered search returned nothing; retrying with document filter only"
    );
    let relaxed = SearchFilter {
        document_id: document_id.to_string(),
        owner_id: None,
    };
    store.query(vector, &relaxed, limit).await
}
