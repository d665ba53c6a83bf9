//! Streaming chat handler
//!
//! Bridges the pull-based answer stream onto SSE. The wire framing is
//! `data: {"text": ...}` per delta, `data: [DONE]` on completion, and
//! `data: {"error": ...}` when the model stream fails mid-answer.
//! Retrieval failures happen before the stream starts and surface as
//! plain HTTP errors instead.
//!
//! SSE transport is pull-driven: when the client disconnects, axum
//! drops the stream, which cancels the upstream model request.

use crate::error::AppError;
use crate::handlers::require_owner;
use crate::state::AppState;
use axum::{
    extract::State,
    http::HeaderMap,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use docchat_chat::ChatEvent;
use futures::stream::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

/// Chat request body
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    /// Document to answer about
    pub document_id: Uuid,

    /// User's question
    #[schema(example = "What does section 3 say about refunds?")]
    pub question: String,
}

#[derive(Serialize)]
struct DeltaFrame<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct ErrorFrame<'a> {
    error: &'a str,
}

/// Answer a question about a document as an SSE stream
#[utoipa::path(
    post,
    path = "/api/v1/chat",
    tag = "chat",
    request_body = ChatRequest,
    responses(
        (status = 200, description = "SSE stream of answer deltas", content_type = "text/event-stream"),
        (status = 400, description = "Invalid request", body = crate::error::ApiError),
        (status = 404, description = "No relevant content for this document", body = crate::error::ApiError)
    )
)]
pub async fn chat_stream(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<ChatRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    state.increment_requests();
    let owner_id = require_owner(&headers)?;

    // owner filtering is advisory: retrieval relaxes it on a miss, but
    // never the document filter
    let answer = state
        .chat
        .answer(&req.document_id.to_string(), Some(&owner_id), &req.question)
        .await?;

    let events = answer.map(|event| Ok(to_sse_event(event)));
    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

fn to_sse_event(event: ChatEvent) -> Event {
    match event {
        ChatEvent::Delta(text) => {
            let frame = serde_json::to_string(&DeltaFrame { text: &text })
                .unwrap_or_else(|_| r#"{"text":""}"#.to_string());
            Event::default().data(frame)
        }
        ChatEvent::Done => Event::default().data("[DONE]"),
        ChatEvent::Error(error) => {
            let frame = serde_json::to_string(&ErrorFrame { error: &error })
                .unwrap_or_else(|_| r#"{"error":"stream failed"}"#.to_string());
            Event::default().data(frame)
        }
    }
}
