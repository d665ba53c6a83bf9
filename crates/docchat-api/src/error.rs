//! API error handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use docchat_core::DocChatError;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// API error response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// Error code
    pub code: String,
    /// Human-readable message
    pub message: String,
    /// Additional details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn not_found(resource: &str) -> Self {
        Self::new("NOT_FOUND", format!("{resource} not found"))
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new("BAD_REQUEST", message)
    }

    pub fn internal_error() -> Self {
        Self::new("INTERNAL_ERROR", "Internal server error")
    }
}

/// Application error type
#[derive(Debug)]
pub enum AppError {
    NotFound(String),
    BadRequest(String),
    /// Retrieval legitimately found nothing to ground an answer on
    NoRelevantContent,
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, ApiError::not_found(&msg)),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, ApiError::bad_request(msg)),
            AppError::NoRelevantContent => (
                StatusCode::NOT_FOUND,
                ApiError::new(
                    "NO_RELEVANT_CONTENT",
                    "No relevant content found for this document",
                ),
            ),
            AppError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ApiError::internal_error().with_details(msg),
            ),
        };

        (status, Json(error)).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<DocChatError> for AppError {
    fn from(err: DocChatError) -> Self {
        match err {
            DocChatError::NotFound(msg) => AppError::NotFound(msg),
            DocChatError::Validation(msg) => AppError::BadRequest(msg),
            DocChatError::NoRelevantContent => AppError::NoRelevantContent,
            DocChatError::Extraction(msg) => AppError::BadRequest(format!("Extraction: {msg}")),
            DocChatError::EmbeddingProvider(msg) => {
                AppError::Internal(format!("Embedding provider: {msg}"))
            }
            DocChatError::VectorStore(msg) => AppError::Internal(format!("Vector store: {msg}")),
            DocChatError::Queue(msg) => AppError::Internal(format!("Job queue: {msg}")),
            DocChatError::StreamUpstream(msg) => AppError::Internal(format!("Model stream: {msg}")),
            DocChatError::Config(msg) => AppError::Internal(format!("Configuration: {msg}")),
            DocChatError::Other(err) => AppError::Internal(err.to_string()),
        }
    }
}
