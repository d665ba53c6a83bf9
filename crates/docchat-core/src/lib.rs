//! DocChat Core - Domain models, errors, and shared types
//!
//! This crate defines the core abstractions used throughout DocChat:
//! - Document lifecycle models (document, ingestion job, embedded point)
//! - Common error types with retry classification
//! - Configuration management
//! - The in-memory document registry

pub mod config;
pub mod registry;

pub use config::{
    AppConfig, ChatConfig, ConfigError, DatabaseConfig, IngestConfig, LlmConfig, LlmProvider,
    LoggingConfig, ServerConfig,
};
pub use registry::DocumentRegistry;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;
use uuid::Uuid;

// ============================================================================
// Error Types
// ============================================================================

/// Core error types for DocChat operations
#[derive(Error, Debug)]
pub enum DocChatError {
    /// Source document is unreadable or yields no text. Fatal for the
    /// job: retrying cannot help, so the queue dead-letters immediately.
    #[error("Text extraction failed: {0}")]
    Extraction(String),

    /// Upstream embedding API fault (rate limit, auth, network).
    /// Transient; retried via the queue's backoff policy.
    #[error("Embedding provider error: {0}")]
    EmbeddingProvider(String),

    /// Vector store connectivity or schema fault. Retryable.
    #[error("Vector store error: {0}")]
    VectorStore(String),

    /// Job queue storage fault. Retryable.
    #[error("Job queue error: {0}")]
    Queue(String),

    /// Legitimate empty retrieval outcome, not a fault. Surfaced to the
    /// caller as a handled 4xx response rather than a stream.
    #[error("No relevant content found for this document")]
    NoRelevantContent,

    /// The model stream failed mid-flight. Surfaced as an in-band error
    /// event; the transport still terminates cleanly.
    #[error("Model stream failed: {0}")]
    StreamUpstream(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl DocChatError {
    /// Whether the queue should schedule another attempt for a job that
    /// failed with this error.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::EmbeddingProvider(_) | Self::VectorStore(_) | Self::Queue(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, DocChatError>;

// ============================================================================
// Document Lifecycle
// ============================================================================

/// Processing status of an uploaded document.
///
/// Transitions are owned exclusively by the ingestion worker and are
/// monotonic: `Pending -> Processing -> {Completed, Failed}`. A
/// redelivered job may move `Failed -> Processing`; nothing ever goes
/// back to `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl std::fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Processing => write!(f, "processing"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// An uploaded PDF document tracked through ingestion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub owner_id: String,
    pub filename: String,
    pub source_path: PathBuf,
    pub created_at: DateTime<Utc>,
    pub status: DocumentStatus,
    /// Recorded on terminal failure
    pub error: Option<String>,
}

impl Document {
    /// Create a new pending document record
    pub fn new(
        owner_id: impl Into<String>,
        filename: impl Into<String>,
        source_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id: owner_id.into(),
            filename: filename.into(),
            source_path: source_path.into(),
            created_at: Utc::now(),
            status: DocumentStatus::Pending,
            error: None,
        }
    }
}

/// Payload handed through the job queue. Immutable once enqueued.
///
/// Serialized with the queue's wire keys: `documentId`, `ownerId`,
/// `sourcePath`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestionJob {
    pub document_id: Uuid,
    pub owner_id: String,
    pub source_path: PathBuf,
}

impl IngestionJob {
    pub fn for_document(doc: &Document) -> Self {
        Self {
            document_id: doc.id,
            owner_id: doc.owner_id.clone(),
            source_path: doc.source_path.clone(),
        }
    }
}

// ============================================================================
// Vector Store Types
// ============================================================================

/// Payload stored with each vector point.
///
/// Key names are part of the store schema (payload indexes are built on
/// `documentId` and `ownerId`), hence the camelCase renames.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointPayload {
    pub content: String,
    pub document_id: String,
    pub owner_id: String,
    pub chunk_index: u32,
}

/// One embedding vector plus its payload, ready for upsert.
///
/// The point id is freshly generated per point and is distinct from the
/// document id.
#[derive(Debug, Clone)]
pub struct EmbeddedPoint {
    pub id: Uuid,
    pub vector: Vec<f32>,
    pub payload: PointPayload,
}

/// One similarity search hit, consumed only to build a grounding prompt
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub id: String,
    pub score: f32,
    pub content: String,
    pub document_id: String,
    pub owner_id: String,
    pub chunk_index: u32,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_classification() {
        assert!(!DocChatError::Extraction("corrupt".into()).is_retryable());
        assert!(DocChatError::EmbeddingProvider("429".into()).is_retryable());
        assert!(DocChatError::VectorStore("conn refused".into()).is_retryable());
        assert!(DocChatError::Queue("locked".into()).is_retryable());
        assert!(!DocChatError::NoRelevantContent.is_retryable());
    }

    #[test]
    fn test_new_document_is_pending() {
        let doc = Document::new("user-1", "report.pdf", "/tmp/report.pdf");
        assert_eq!(doc.status, DocumentStatus::Pending);
        assert!(doc.error.is_none());
    }

    #[test]
    fn test_job_wire_keys() {
        let doc = Document::new("user-1", "report.pdf", "/tmp/report.pdf");
        let job = IngestionJob::for_document(&doc);
        let json = serde_json::to_value(&job).unwrap();

        assert_eq!(json["documentId"], doc.id.to_string());
        assert_eq!(json["ownerId"], "user-1");
        assert_eq!(json["sourcePath"], "/tmp/report.pdf");

        let back: IngestionJob = serde_json::from_value(json).unwrap();
        assert_eq!(back, job);
    }

    #[test]
    fn test_payload_wire_keys() {
        let payload = PointPayload {
            content: "chunk text".into(),
            document_id: "d1".into(),
            owner_id: "u1".into(),
            chunk_index: 3,
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["documentId"], "d1");
        assert_eq!(json["ownerId"], "u1");
        assert_eq!(json["chunkIndex"], 3);
        assert_eq!(json["content"], "chunk text");
    }
}
