//! DocChat API server
//!
//! Wires the whole system together: configuration, vector store,
//! embedding and chat clients, the durable job queue, the ingestion
//! worker pool, and the HTTP server.

use docchat_api::{create_router, state::AppState};
use docchat_chat::{create_chat_model, ChatEngine};
use docchat_core::{AppConfig, DocumentRegistry};
use docchat_ingest::{IngestionWorker, PdfExtractor};
use docchat_queue::{JobQueue, QueueConfig, SqliteJobQueue};
use docchat_vector::{create_embedding_client, EmbeddingClient, QdrantStore, VectorStore};
use std::sync::Arc;
use tokio::sync::watch;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = load_config()?;
    init_tracing(&config);

    // Storage and model clients, constructed once and shared
    let store: Arc<dyn VectorStore> = Arc::new(QdrantStore::new(&config.database)?);
    store.ensure_collection().await?;

    let embedder: Arc<dyn EmbeddingClient> = Arc::from(create_embedding_client(&config.llm)?);
    let chat_model: Arc<dyn docchat_chat::ChatModel> = Arc::from(create_chat_model(&config.llm)?);

    let queue: Arc<dyn JobQueue> = Arc::new(
        SqliteJobQueue::connect(
            &config.database.queue_url,
            QueueConfig::from_ingest(&config.ingest),
        )
        .await?,
    );

    let registry = Arc::new(DocumentRegistry::new());

    let chat = Arc::new(ChatEngine::new(
        Arc::clone(&embedder),
        Arc::clone(&store),
        chat_model,
        config.chat.clone(),
    ));

    // Ingestion worker pool
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker = Arc::new(IngestionWorker::new(
        Arc::clone(&registry),
        Arc::clone(&queue),
        Arc::new(PdfExtractor),
        Arc::clone(&embedder),
        Arc::clone(&store),
        config.ingest.clone(),
    ));
    let worker_handle = tokio::spawn(worker.run(shutdown_rx));

    // HTTP server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let state = Arc::new(AppState::new(config, registry, queue, store, chat));
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("DocChat API listening on http://{addr}");
    tracing::info!("Swagger UI available at http://{addr}/swagger-ui/");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Stop the worker pool; in-flight jobs finish first
    let _ = shutdown_tx.send(true);
    let _ = worker_handle.await;
    tracing::info!("shutdown complete");

    Ok(())
}

fn load_config() -> anyhow::Result<AppConfig> {
    let config = match std::env::var("DOCCHAT_CONFIG") {
        Ok(path) => AppConfig::from_file(path)?.with_env_override()?,
        Err(_) => AppConfig::from_env()?,
    };
    Ok(config)
}

fn init_tracing(config: &AppConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("docchat={},tower_http=info", config.logging.level).into());

    if config.logging.json_format {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    tracing::info!("shutdown signal received");
}
