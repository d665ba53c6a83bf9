//! In-memory document registry
//!
//! Tracks every registered document and its ingestion status. Status
//! transitions are monotonic and are only driven by the ingestion
//! worker; the chat path reads but never mutates.
//!
//! Documents are deliberately not persisted to a relational store;
//! the vector store holds the durable index and the queue holds the
//! durable work.

use crate::{DocChatError, Document, DocumentStatus, Result};
use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

/// Concurrent map of documents keyed by id.
///
/// All mutation is keyed by document id, so concurrent operations on
/// distinct documents never conflict.
#[derive(Debug, Default)]
pub struct DocumentRegistry {
    inner: RwLock<HashMap<Uuid, Document>>,
}

impl DocumentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new document record
    pub fn insert(&self, doc: Document) {
        let mut map = self.inner.write().unwrap_or_else(|e| e.into_inner());
        map.insert(doc.id, doc);
    }

    /// Fetch a document by id
    pub fn get(&self, id: Uuid) -> Option<Document> {
        let map = self.inner.read().unwrap_or_else(|e| e.into_inner());
        map.get(&id).cloned()
    }

    /// All documents belonging to one owner, newest first
    pub fn list_for_owner(&self, owner_id: &str) -> Vec<Document> {
        let map = self.inner.read().unwrap_or_else(|e| e.into_inner());
        let mut docs: Vec<Document> = map
            .values()
            .filter(|d| d.owner_id == owner_id)
            .cloned()
            .collect();
        docs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        docs
    }

    /// Remove a document record, returning it if present
    pub fn remove(&self, id: Uuid) -> Option<Document> {
        let mut map = self.inner.write().unwrap_or_else(|e| e.into_inner());
        map.remove(&id)
    }

    /// `pending|failed -> processing`, taken when a worker picks up a job.
    /// Redelivery of a failed job is allowed; a completed document is not
    /// reprocessed.
    pub fn mark_processing(&self, id: Uuid) -> Result<()> {
        self.transition(id, DocumentStatus::Processing, None)
    }

    /// `processing -> completed`
    pub fn mark_completed(&self, id: Uuid) -> Result<()> {
        self.transition(id, DocumentStatus::Completed, None)
    }

    /// `processing -> failed`, recording the error
    pub fn mark_failed(&self, id: Uuid, error: &str) -> Result<()> {
        self.transition(id, DocumentStatus::Failed, Some(error.to_string()))
    }

    fn transition(&self, id: Uuid, to: DocumentStatus, error: Option<String>) -> Result<()> {
        let mut map = self.inner.write().unwrap_or_else(|e| e.into_inner());
        let doc = map
            .get_mut(&id)
            .ok_or_else(|| DocChatError::NotFound(format!("document {id}")))?;

        if !allowed(doc.status, to) {
            return Err(DocChatError::Validation(format!(
                "invalid status transition {} -> {} for document {id}",
                doc.status, to
            )));
        }

        tracing::debug!(document_id = %id, from = %doc.status, to = %to, "document status transition");
        doc.status = to;
        match to {
            DocumentStatus::Failed => doc.error = error,
            // A successful retry clears the previous failure reason
            DocumentStatus::Completed => doc.error = None,
            _ => {}
        }
        Ok(())
    }
}

fn allowed(from: DocumentStatus, to: DocumentStatus) -> bool {
    use DocumentStatus::*;
    matches!(
        (from, to),
        (Pending, Processing)
            | (Failed, Processing)
            | (Processing, Completed)
            | (Processing, Failed)
    )
}
