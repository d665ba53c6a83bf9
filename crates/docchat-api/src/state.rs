//! Application state shared across handlers
//!
//! Every service handle is constructed once at startup and injected
//! here; handlers never build clients on the fly.

use docchat_chat::ChatEngine;
use docchat_core::{AppConfig, DocumentRegistry};
use docchat_queue::JobQueue;
use docchat_vector::VectorStore;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Application state shared across handlers
pub struct AppState {
    /// Application configuration
    pub config: AppConfig,
    /// Server start time
    pub start_time: Instant,
    /// Request counter
    pub request_count: AtomicU64,
    /// Document lifecycle registry
    pub registry: Arc<DocumentRegistry>,
    /// Durable ingestion job queue
    pub queue: Arc<dyn JobQueue>,
    /// Vector store, used directly for document deletion
    pub store: Arc<dyn VectorStore>,
    /// Retrieval-augmented chat engine
    pub chat: Arc<ChatEngine>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        registry: Arc<DocumentRegistry>,
        queue: Arc<dyn JobQueue>,
        store: Arc<dyn VectorStore>,
        chat: Arc<ChatEngine>,
    ) -> Self {
        Self {
            config,
            start_time: Instant::now(),
            request_count: AtomicU64::new(0),
            registry,
            queue,
            store,
            chat,
        }
    }

    /// Increment request counter
    pub fn increment_requests(&self) -> u64 {
        self.request_count.fetch_add(1, Ordering::SeqCst)
    }

    /// Get uptime in seconds
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
