//! Embedding client for generating vector representations
//!
//! Supports OpenAI and Ollama embedding APIs. Upstream failures are
//! reported as `EmbeddingProvider` errors so the ingestion worker's
//! job-retry policy handles them; nothing is swallowed internally.

use async_trait::async_trait;
use docchat_core::{DocChatError, LlmConfig, LlmProvider, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};

// ============================================================================
// Embedding Trait
// ============================================================================

/// Trait for embedding generation
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Generate embedding for a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embeddings for multiple texts (batch).
    ///
    /// Output is index-aligned with the input: one vector per text, in
    /// input order, never reordered.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Get embedding dimension
    fn dimension(&self) -> usize;
}

// ============================================================================
// OpenAI Embedding Client
// ============================================================================

/// OpenAI embedding API client
pub struct OpenAiEmbedding {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    dimension: usize,
    batch_size: usize,
}

#[derive(Debug, Serialize)]
struct OpenAiEmbeddingRequest {
    input: Vec<String>,
    model: String,
}

#[derive(Debug, Deserialize)]
struct OpenAiEmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

impl OpenAiEmbedding {
    /// Create a new OpenAI embedding client
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        let model = model.into();
        let dimension = match model.as_str() {
            "text-embedding-3-small" => 1536,
            "text-embedding-3-large" => 3072,
            "text-embedding-ada-002" => 1536,
            _ => 1536, // Default
        };

        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: "https://api.openai.com/v1".to_string(),
            model,
            dimension,
            batch_size: 128,
        }
    }

    /// Create from config
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let api_key = config
            .openai_api_key
            .as_ref()
            .ok_or_else(|| DocChatError::Config("OpenAI API key required".to_string()))?;

        let mut client = Self::new(api_key.clone(), config.embedding_model.clone());
        if let Some(url) = &config.openai_base_url {
            client.base_url = url.clone();
        }
        client.batch_size = config.embedding_batch_size.max(1);
        Ok(client)
    }

    async fn request_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let request = OpenAiEmbeddingRequest {
            input: texts.to_vec(),
            model: self.model.clone(),
        };

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| DocChatError::EmbeddingProvider(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(DocChatError::EmbeddingProvider(format!(
                "OpenAI embedding error ({status}): {error_text}"
            )));
        }

        let result: OpenAiEmbeddingResponse = response.json().await.map_err(|e| {
            DocChatError::EmbeddingProvider(format!("failed to parse embedding response: {e}"))
        })?;

        align_embeddings(result.data, texts.len(), self.dimension)
    }
}

/// Re-sort API results by their reported index and verify the batch is
/// complete and dimensionally consistent.
fn align_embeddings(
    mut data: Vec<EmbeddingData>,
    expected: usize,
    dimension: usize,
) -> Result<Vec<Vec<f32>>> {
    if data.len() != expected {
        return Err(DocChatError::EmbeddingProvider(format!(
            "expected {expected} embeddings, got {}",
            data.len()
        )));
    }

    data.sort_by_key(|e| e.index);

    for (i, entry) in data.iter().enumerate() {
        if entry.index != i {
            return Err(DocChatError::EmbeddingProvider(format!(
                "embedding indexes are not dense: missing index {i}"
            )));
        }
        if entry.embedding.len() != dimension {
            return Err(DocChatError::EmbeddingProvider(format!(
                "embedding {i} has dimension {}, expected {dimension}",
                entry.embedding.len()
            )));
        }
    }

    Ok(data.into_iter().map(|e| e.embedding).collect())
}

#[async_trait]
impl EmbeddingClient for OpenAiEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let results = self.embed_batch(&[text.to_string()]).await?;
        results
            .into_iter()
            .next()
            .ok_or_else(|| DocChatError::EmbeddingProvider("no embedding returned".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut embeddings = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            embeddings.extend(self.request_batch(batch).await?);
        }
        Ok(embeddings)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

// ============================================================================
// Ollama Embedding Client
// ============================================================================

/// Ollama embedding API client
pub struct OllamaEmbedding {
    client: Client,
    base_url: String,
    model: String,
    dimension: usize,
}

#[derive(Debug, Serialize)]
struct OllamaEmbeddingRequest {
    model: String,
    prompt: String,
}

#[derive(Debug, Deserialize)]
struct OllamaEmbeddingResponse {
    embedding: Vec<f32>,
}

impl OllamaEmbedding {
    /// Create a new Ollama embedding client
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        let model = model.into();
        let dimension = match model.as_str() {
            "nomic-embed-text" => 768,
            "mxbai-embed-large" => 1024,
            "all-minilm" => 384,
            _ => 768, // Default for most models
        };

        Self {
            client: Client::new(),
            base_url: base_url.into(),
            model,
            dimension,
        }
    }

    /// Create from config
    pub fn from_config(config: &LlmConfig) -> Self {
        Self::new(config.ollama_url.clone(), config.embedding_model.clone())
    }
}

#[async_trait]
impl EmbeddingClient for OllamaEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let request = OllamaEmbeddingRequest {
            model: self.model.clone(),
            prompt: text.to_string(),
        };

        let response = self
            .client
            .post(format!("{}/api/embeddings", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| DocChatError::EmbeddingProvider(format!("Ollama request failed: {e}")))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(DocChatError::EmbeddingProvider(format!(
                "Ollama embedding error: {error_text}"
            )));
        }

        let result: OllamaEmbeddingResponse = response.json().await.map_err(|e| {
            DocChatError::EmbeddingProvider(format!("failed to parse embedding response: {e}"))
        })?;

        Ok(result.embedding)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        // Ollama has no native batch embedding; process sequentially to
        // preserve input order
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

// ============================================================================
// Factory function
// ============================================================================

/// Create an embedding client from config
pub fn create_embedding_client(config: &LlmConfig) -> Result<Box<dyn EmbeddingClient>> {
    match config.provider {
        LlmProvider::OpenAI => Ok(Box::new(OpenAiEmbedding::from_config(config)?)),
        LlmProvider::Ollama => Ok(Box::new(OllamaEmbedding::from_config(config))),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(index: usize, value: f32, dim: usize) -> EmbeddingData {
        EmbeddingData {
            embedding: vec![value; dim],
            index,
        }
    }

    #[test]
    fn test_openai_dimension() {
        let client = OpenAiEmbedding::new("test-key", "text-embedding-3-small");
        assert_eq!(client.dimension(), 1536);

        let client = OpenAiEmbedding::new("test-key", "text-embedding-3-large");
        assert_eq!(client.dimension(), 3072);
    }

    #[test]
    fn test_ollama_dimension() {
        let client = OllamaEmbedding::new("http://localhost:11434", "nomic-embed-text");
        assert_eq!(client.dimension(), 768);

        let client = OllamaEmbedding::new("http://localhost:11434", "mxbai-embed-large");
        assert_eq!(client.dimension(), 1024);
    }

    #[test]
    fn test_align_restores_input_order() {
        // API responses may arrive out of order; alignment re-sorts by index
        let data = vec![entry(2, 2.0, 4), entry(0, 0.0, 4), entry(1, 1.0, 4)];
        let aligned = align_embeddings(data, 3, 4).unwrap();
        assert_eq!(aligned.len(), 3);
        for (i, vector) in aligned.iter().enumerate() {
            assert!(vector.iter().all(|v| *v == i as f32));
        }
    }

    #[test]
    fn test_align_rejects_incomplete_batch() {
        let data = vec![entry(0, 0.0, 4), entry(1, 1.0, 4)];
        let err = align_embeddings(data, 3, 4).unwrap_err();
        assert!(matches!(err, DocChatError::EmbeddingProvider(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_align_rejects_duplicate_indexes() {
        let data = vec![entry(0, 0.0, 4), entry(0, 1.0, 4), entry(2, 2.0, 4)];
        assert!(align_embeddings(data, 3, 4).is_err());
    }

    #[test]
    fn test_align_rejects_wrong_dimension() {
        let data = vec![entry(0, 0.0, 4), entry(1, 1.0, 3)];
        assert!(align_embeddings(data, 2, 4).is_err());
    }

    #[test]
    fn test_config_requires_api_key_for_openai() {
        let config = LlmConfig::default();
        assert!(OpenAiEmbedding::from_config(&config).is_err());
    }
}
