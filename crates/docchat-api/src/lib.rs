//! DocChat API - HTTP server
//!
//! REST endpoints for document registration and status, plus the SSE
//! chat endpoint. All service handles live in [`state::AppState`] and
//! are injected once at startup.

pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

use axum::http::HeaderValue;
use axum::{routing::get, Router};
use state::AppState;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health::health,
        handlers::health::ready,
        handlers::documents::register_document,
        handlers::documents::list_documents,
        handlers::documents::get_document,
        handlers::documents::delete_document,
        handlers::chat::chat_stream,
    ),
    components(schemas(
        error::ApiError,
        handlers::health::HealthResponse,
        handlers::health::ReadyResponse,
        handlers::documents::RegisterDocumentRequest,
        handlers::documents::DocumentResponse,
        handlers::chat::ChatRequest,
    )),
    tags(
        (name = "health", description = "Service health"),
        (name = "documents", description = "Document registration and lifecycle"),
        (name = "chat", description = "Retrieval-augmented chat")
    ),
    info(
        title = "DocChat API",
        description = "Chat with your PDF documents"
    )
)]
pub struct ApiDoc;

/// Build the application router
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.config.server.cors_origins);

    Router::new()
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))
        .nest("/api/v1", routes::api_routes())
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        // Development default
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }

    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| o.parse::<HeaderValue>().ok())
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(parsed))
        .allow_methods(Any)
        .allow_headers(Any)
}
