//! API route definitions

use crate::handlers::{chat, documents};
use crate::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

/// Create API v1 routes
pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/documents",
            post(documents::register_document).get(documents::list_documents),
        )
        .route(
            "/documents/:id",
            get(documents::get_document).delete(documents::delete_document),
        )
        .route("/chat", post(chat::chat_stream))
}
