//! Document lifecycle handlers
//!
//! Registering a document validates the source file and enqueues the
//! ingestion job; processing happens asynchronously in the worker
//! pool. Clients poll the document status until it is `completed`.

use crate::error::AppError;
use crate::handlers::require_owner;
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use docchat_core::{Document, DocumentStatus, IngestionJob};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

/// Document registration request
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegisterDocumentRequest {
    /// Path to the PDF on server-accessible storage
    #[schema(example = "/data/uploads/report.pdf")]
    pub source_path: String,

    /// Display name; defaults to the file name
    #[serde(default)]
    pub filename: Option<String>,
}

/// Document representation returned by the API
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DocumentResponse {
    pub id: Uuid,
    pub owner_id: String,
    pub filename: String,
    #[schema(value_type = String, example = "completed")]
    pub status: DocumentStatus,
    pub created_at: chrono::DateTime<chrono::Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<Document> for DocumentResponse {
    fn from(doc: Document) -> Self {
        Self {
            id: doc.id,
            owner_id: doc.owner_id,
            filename: doc.filename,
            status: doc.status,
            created_at: doc.created_at,
            error: doc.error,
        }
    }
}

/// Register a PDF for ingestion
#[utoipa::path(
    post,
    path = "/api/v1/documents",
    tag = "documents",
    request_body = RegisterDocumentRequest,
    responses(
        (status = 201, description = "Document registered and queued", body = DocumentResponse),
        (status = 400, description = "Invalid request", body = crate::error::ApiError)
    )
)]
pub async fn register_document(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<RegisterDocumentRequest>,
) -> Result<(StatusCode, Json<DocumentResponse>), AppError> {
    state.increment_requests();
    let owner_id = require_owner(&headers)?;

    let source_path = std::path::PathBuf::from(&req.source_path);
    if !source_path
        .extension()
        .map(|e| e.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false)
    {
        return Err(AppError::BadRequest("only PDF files are supported".into()));
    }
    if !source_path.is_file() {
        return Err(AppError::BadRequest(format!(
            "source file not found: {}",
            source_path.display()
        )));
    }

    let filename = req.filename.filter(|f| !f.trim().is_empty()).unwrap_or_else(|| {
        source_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document.pdf".to_string())
    });

    let doc = Document::new(owner_id, filename, source_path);
    state.registry.insert(doc.clone());
    state.queue.enqueue(&IngestionJob::for_document(&doc)).await?;

    tracing::info!(document_id = %doc.id, owner_id = %doc.owner_id, "document registered");
    Ok((StatusCode::CREATED, Json(doc.into())))
}

/// List the caller's documents
#[utoipa::path(
    get,
    path = "/api/v1/documents",
    tag = "documents",
    responses(
        (status = 200, description = "Documents, newest first", body = [DocumentResponse]),
        (status = 400, description = "Missing user header", body = crate::error::ApiError)
    )
)]
pub async fn list_documents(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<DocumentResponse>>, AppError> {
    state.increment_requests();
    let owner_id = require_owner(&headers)?;

    let docs = state
        .registry
        .list_for_owner(&owner_id)
        .into_iter()
        .map(DocumentResponse::from)
        .collect();
    Ok(Json(docs))
}

/// Fetch one document with its processing status.
///
/// Another owner's document is reported as not found rather than
/// forbidden, so callers cannot tell which ids exist.
#[utoipa::path(
    get,
    path = "/api/v1/documents/{id}",
    tag = "documents",
    params(("id" = Uuid, Path, description = "Document id")),
    responses(
        (status = 200, description = "Document found", body = DocumentResponse),
        (status = 400, description = "Missing user header", body = crate::error::ApiError),
        (status = 404, description = "Unknown document", body = crate::error::ApiError)
    )
)]
pub async fn get_document(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<DocumentResponse>, AppError> {
    state.increment_requests();
    let owner_id = require_owner(&headers)?;
    let doc = owned_document(&state, id, &owner_id)?;
    Ok(Json(doc.into()))
}

/// Delete a document and its indexed chunks
#[utoipa::path(
    delete,
    path = "/api/v1/documents/{id}",
    tag = "documents",
    params(("id" = Uuid, Path, description = "Document id")),
    responses(
        (status = 204, description = "Document deleted"),
        (status = 400, description = "Missing user header", body = crate::error::ApiError),
        (status = 404, description = "Unknown document", body = crate::error::ApiError)
    )
)]
pub async fn delete_document(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.increment_requests();
    let owner_id = require_owner(&headers)?;

    // ownership is checked before anything is removed
    owned_document(&state, id, &owner_id)?;
    state.registry.remove(id);
    state.store.delete_by_document(&id.to_string()).await?;

    tracing::info!(document_id = %id, owner_id = %owner_id, "document deleted");
    Ok(StatusCode::NO_CONTENT)
}

fn owned_document(state: &AppState, id: Uuid, owner_id: &str) -> Result<Document, AppError> {
    state
        .registry
        .get(id)
        .filter(|doc| doc.owner_id == owner_id)
        .ok_or_else(|| AppError::NotFound(format!("document {id}")))
}
