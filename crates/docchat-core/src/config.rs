//! DocChat configuration management
//!
//! Handles configuration from environment variables and TOML config
//! files with sensible defaults for development.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    /// Server configuration
    pub server: ServerConfig,

    /// Vector store and queue storage
    pub database: DatabaseConfig,

    /// LLM provider configuration
    pub llm: LlmConfig,

    /// Ingestion pipeline configuration
    pub ingest: IngestConfig,

    /// Retrieval and chat configuration
    pub chat: ChatConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        // Server
        if let Ok(host) = std::env::var("API_HOST") {
            config.server.host = host;
        }
        if let Ok(port) = std::env::var("API_PORT") {
            config.server.port = port.parse().map_err(|_| ConfigError::InvalidValue {
                key: "API_PORT".to_string(),
                value: port,
            })?;
        }

        // Qdrant
        if let Ok(url) = std::env::var("QDRANT_URL") {
            config.database.qdrant_url = url;
        }
        if let Ok(collection) = std::env::var("QDRANT_COLLECTION") {
            config.database.qdrant_collection = collection;
        }

        // Job queue storage
        if let Ok(url) = std::env::var("QUEUE_URL") {
            config.database.queue_url = url;
        }

        // LLM
        if let Ok(provider) = std::env::var("LLM_PROVIDER") {
            config.llm.provider = provider.parse()?;
        }
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            config.llm.openai_api_key = Some(key);
        }
        if let Ok(url) = std::env::var("OLLAMA_URL") {
            config.llm.ollama_url = url;
        }
        if let Ok(model) = std::env::var("LLM_MODEL") {
            config.llm.model = model;
        }
        if let Ok(model) = std::env::var("EMBEDDING_MODEL") {
            config.llm.embedding_model = model;
        }

        // Ingestion
        if let Ok(n) = std::env::var("INGEST_CONCURRENCY") {
            config.ingest.concurrency = n.parse().map_err(|_| ConfigError::InvalidValue {
                key: "INGEST_CONCURRENCY".to_string(),
                value: n,
            })?;
        }

        // CORS origins from environment variable (comma-separated)
        if let Ok(origins) = std::env::var("CORS_ORIGINS") {
            config.server.cors_origins = origins
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        // Logging
        if let Ok(level) = std::env::var("LOG_LEVEL") {
            config.logging.level = level;
        }

        Ok(config)
    }

    /// Load from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::FileReadError {
            path: path.clone(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path,
            message: e.to_string(),
        })
    }

    /// Merge with environment variables (env takes precedence)
    pub fn with_env_override(mut self) -> Result<Self, ConfigError> {
        let env_config = Self::from_env()?;

        if env_config.server.host != ServerConfig::default().host {
            self.server.host = env_config.server.host;
        }
        if env_config.server.port != ServerConfig::default().port {
            self.server.port = env_config.server.port;
        }

        // Always use env for sensitive values
        if env_config.llm.openai_api_key.is_some() {
            self.llm.openai_api_key = env_config.llm.openai_api_key;
        }

        Ok(self)
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Request timeout in seconds
    pub request_timeout_secs: u64,

    /// Maximum request body size in bytes
    pub max_body_size: usize,

    /// Allowed origins for CORS
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            request_timeout_secs: 300,
            max_body_size: 10 * 1024 * 1024, // 10MB
            // Empty by default - set via CORS_ORIGINS env var
            cors_origins: vec![],
        }
    }
}

/// Storage configuration: vector database plus queue backing store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Qdrant gRPC URL
    pub qdrant_url: String,

    /// Qdrant collection name
    pub qdrant_collection: String,

    /// Vector dimension (must match embedding model)
    pub vector_dimension: usize,

    /// SQLite URL backing the durable job queue
    pub queue_url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            qdrant_url: "http://localhost:6334".to_string(),
            qdrant_collection: "docchat_chunks".to_string(),
            vector_dimension: 1536, // OpenAI text-embedding-3-small
            queue_url: "sqlite:docchat-jobs.db?mode=rwc".to_string(),
        }
    }
}

/// LLM provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// LLM provider to use
    pub provider: LlmProvider,

    /// OpenAI API key
    pub openai_api_key: Option<String>,

    /// OpenAI API base URL (for Azure or compatible APIs)
    pub openai_base_url: Option<String>,

    /// Ollama server URL
    pub ollama_url: String,

    /// Chat model name
    pub model: String,

    /// Embedding model name
    pub embedding_model: String,

    /// Maximum inputs per embedding request
    pub embedding_batch_size: usize,

    /// Maximum tokens for completion
    pub max_tokens: u32,

    /// Temperature for generation
    pub temperature: f32,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::OpenAI,
            openai_api_key: None,
            openai_base_url: None,
            ollama_url: "http://localhost:11434".to_string(),
            model: "gpt-4o-mini".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            embedding_batch_size: 128,
            max_tokens: 2048,
            temperature: 0.5,
            timeout_secs: 60,
        }
    }
}

/// Supported LLM providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    OpenAI,
    Ollama,
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "ollama" => Ok(Self::Ollama),
            _ => Err(ConfigError::InvalidValue {
                key: "LLM_PROVIDER".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Ingestion pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Target chunk size in bytes
    pub chunk_size: usize,

    /// Overlap between consecutive chunks in bytes
    pub chunk_overlap: usize,

    /// Number of jobs processed simultaneously
    pub concurrency: usize,

    /// Attempts before a job is dead-lettered
    pub max_attempts: u32,

    /// Initial retry delay in milliseconds (exponential backoff base)
    pub retry_initial_delay_ms: u64,

    /// Maximum retry delay in milliseconds
    pub retry_max_delay_ms: u64,

    /// Queue poll interval in milliseconds
    pub poll_interval_ms: u64,

    /// Lease timeout before a running job is considered abandoned
    pub lease_timeout_secs: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            chunk_size: 3000,
            chunk_overlap: 300,
            concurrency: 5,
            max_attempts: 3,
            retry_initial_delay_ms: 1000,
            retry_max_delay_ms: 60_000,
            poll_interval_ms: 500,
            lease_timeout_secs: 300,
        }
    }
}

/// Retrieval and chat configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Number of chunks retrieved per question
    pub top_k: usize,

    /// Maximum grounding context length in characters
    pub max_context_length: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            max_context_length: 8000,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// JSON format for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.database.vector_dimension, 1536);
        assert_eq!(config.ingest.chunk_size, 3000);
        assert_eq!(config.ingest.chunk_overlap, 300);
        assert_eq!(config.ingest.concurrency, 5);
        assert_eq!(config.chat.top_k, 5);
    }

    #[test]
    fn test_llm_provider_parse() {
        assert_eq!(
            "openai".parse::<LlmProvider>().unwrap(),
            LlmProvider::OpenAI
        );
        assert_eq!(
            "ollama".parse::<LlmProvider>().unwrap(),
            LlmProvider::Ollama
        );
        assert!("invalid".parse::<LlmProvider>().is_err());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[server]
host = "127.0.0.1"
port = 9090
request_timeout_secs = 60
max_body_size = 1048576
cors_origins = []

[database]
qdrant_url = "http://qdrant:6334"
qdrant_collection = "test_chunks"
vector_dimension = 768
queue_url = "sqlite::memory:"

[llm]
provider = "ollama"
ollama_url = "http://ollama:11434"
model = "llama3"
embedding_model = "nomic-embed-text"
embedding_batch_size = 32
max_tokens = 1024
temperature = 0.2
timeout_secs = 30

[ingest]
chunk_size = 1000
chunk_overlap = 100
concurrency = 2
max_attempts = 5
retry_initial_delay_ms = 100
retry_max_delay_ms = 5000
poll_interval_ms = 50
lease_timeout_secs = 60

[chat]
top_k = 3
max_context_length = 4000

[logging]
level = "debug"
json_format = false
"#
        )
        .unwrap();

        let config = AppConfig::from_file(file.path()).unwrap();
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.database.qdrant_collection, "test_chunks");
        assert_eq!(config.llm.provider, LlmProvider::Ollama);
        assert_eq!(config.ingest.max_attempts, 5);
        assert_eq!(config.chat.top_k, 3);
    }
}
