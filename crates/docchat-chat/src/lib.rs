//! DocChat Chat - Retrieval-augmented streaming answers
//!
//! Ties retrieval to generation: embed the question, fetch the most
//! relevant chunks for the target document, and stream the model's
//! grounded answer as a pull-based event stream. The consumer drives
//! the stream; dropping it cancels the upstream model request, so a
//! disconnected client costs nothing beyond the tokens already pulled.

pub mod model;
pub mod prompt;

pub use model::{create_chat_model, ChatModel, OllamaChatModel, OpenAiChatModel};
pub use prompt::build_grounding_prompt;

use docchat_core::{ChatConfig, DocChatError, Result};
use docchat_vector::{search_with_fallback, EmbeddingClient, VectorStore};
use futures::stream::{BoxStream, StreamExt};
use std::sync::Arc;

/// One event on the answer stream.
///
/// A stream yields zero or more `Delta`s followed by exactly one
/// terminal event, `Done` or `Error`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    /// One chunk of answer text
    Delta(String),
    /// The answer finished normally
    Done,
    /// The model stream failed mid-answer
    Error(String),
}

/// Stream of answer events. Dropping it aborts generation.
pub type ChatStream = BoxStream<'static, ChatEvent>;

/// The retrieval-augmented chat engine
pub struct ChatEngine {
    embedder: Arc<dyn EmbeddingClient>,
    store: Arc<dyn VectorStore>,
    model: Arc<dyn ChatModel>,
    config: ChatConfig,
}

impl ChatEngine {
    pub fn new(
        embedder: Arc<dyn EmbeddingClient>,
        store: Arc<dyn VectorStore>,
        model: Arc<dyn ChatModel>,
        config: ChatConfig,
    ) -> Self {
        Self {
            embedder,
            store,
            model,
            config,
        }
    }

    /// Answer a question about one document.
    ///
    /// Returns `NoRelevantContent` when retrieval finds nothing even
    /// after the owner-relaxation fallback; the caller turns that into
    /// a handled response rather than an empty stream.
    pub async fn answer(
        &self,
        document_id: &str,
        owner_id: Option<&str>,
        question: &str,
    ) -> Result<ChatStream> {
        if question.trim().is_empty() {
            return Err(DocChatError::Validation("question must not be empty".into()));
        }

        let query_vector = self.embedder.embed(question).await?;
        let results = search_with_fallback(
            self.store.as_ref(),
            &query_vector,
            document_id,
            owner_id,
            self.config.top_k,
        )
        .await?;

        if results.is_empty() {
            return Err(DocChatError::NoRelevantContent);
        }

        tracing::debug!(
            document_id,
            sections = results.len(),
            top_score = results[0].score,
            "retrieved grounding context"
        );

        let system = build_grounding_prompt(&results, self.config.max_context_length);
        let upstream = self.model.stream_chat(&system, question).await?;

        Ok(into_chat_stream(upstream))
    }
}

/// Wrap a raw delta stream into the terminal-event contract: deltas
/// until the upstream ends (`Done`) or fails (`Error`), after which the
/// stream yields nothing. The upstream is dropped at the terminal
/// event, which cancels the underlying request.
fn into_chat_stream(upstream: BoxStream<'static, Result<String>>) -> ChatStream {
    let events = futures::stream::unfold(Some(upstream), |state| async move {
        let mut upstream = state?;
        match upstream.next().await {
            Some(Ok(delta)) => Some((ChatEvent::Delta(delta), Some(upstream))),
            Some(Err(e)) => Some((ChatEvent::Error(e.to_string()), None)),
            None => Some((ChatEvent::Done, None)),
        }
    });
    Box::pin(events)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use docchat_core::{EmbeddedPoint, SearchResult};
    use docchat_vector::SearchFilter;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeEmbedder;

    #[async_trait]
    impl EmbeddingClient for FakeEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![0.1; 4])
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![0.1; 4]).collect())
        }

        fn dimension(&self) -> usize {
            4
        }
    }

    struct FixedStore {
        results: Vec<SearchResult>,
    }

    #[async_trait]
    impl VectorStore for FixedStore {
        async fn ensure_collection(&self) -> Result<()> {
            Ok(())
        }

        async fn upsert(&self, _points: Vec<EmbeddedPoint>) -> Result<()> {
            Ok(())
        }

        async fn query(
            &self,
            _vector: &[f32],
            _filter: &SearchFilter,
            _limit: usize,
        ) -> Result<Vec<SearchResult>> {
            Ok(self.results.clone())
        }

        async fn delete_by_document(&self, _document_id: &str) -> Result<u64> {
            Ok(0)
        }
    }

    /// Emits scripted deltas and counts how many were actually pulled
    struct CountingModel {
        deltas: Vec<Result<String>>,
        pulled: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ChatModel for CountingModel {
        async fn stream_chat(
            &self,
            _system: &str,
            _user: &str,
        ) -> Result<BoxStream<'static, Result<String>>> {
            let pulled = Arc::clone(&self.pulled);
            let deltas: Vec<Result<String>> = self
                .deltas
                .iter()
                .map(|d| match d {
                    Ok(s) => Ok(s.clone()),
                    Err(_) => Err(DocChatError::StreamUpstream("upstream failed".into())),
                })
                .collect();
            let stream = futures::stream::iter(deltas).inspect(move |_| {
                pulled.fetch_add(1, Ordering::SeqCst);
            });
            Ok(Box::pin(stream))
        }
    }

    fn hit(content: &str, score: f32) -> SearchResult {
        SearchResult {
            id: "p1".into(),
            score,
            content: content.into(),
            document_id: "d1".into(),
            owner_id: "u1".into(),
            chunk_index: 0,
        }
    }

    fn engine(results: Vec<SearchResult>, model: CountingModel) -> ChatEngine {
        ChatEngine::new(
            Arc::new(FakeEmbedder),
            Arc::new(FixedStore { results }),
            Arc::new(model),
            ChatConfig::default(),
        )
    }

    fn scripted(deltas: &[&str]) -> (CountingModel, Arc<AtomicUsize>) {
        let pulled = Arc::new(AtomicUsize::new(0));
        let model = CountingModel {
            deltas: deltas.iter().map(|d| Ok(d.to_string())).collect(),
            pulled: Arc::clone(&pulled),
        };
        (model, pulled)
    }

    #[tokio::test]
    async fn test_deltas_then_done() {
        let (model, _) = scripted(&["The ", "answer."]);
        let engine = engine(vec![hit("context", 0.9)], model);

        let stream = engine.answer("d1", Some("u1"), "what?").await.unwrap();
        let events: Vec<ChatEvent> = stream.collect().await;

        assert_eq!(
            events,
            vec![
                ChatEvent::Delta("The ".into()),
                ChatEvent::Delta("answer.".into()),
                ChatEvent::Done,
            ]
        );
    }

    #[tokio::test]
    async fn test_no_relevant_content_is_an_error_not_a_stream() {
        let (model, _) = scripted(&["unused"]);
        let engine = engine(vec![], model);

        let err = engine.answer("d1", Some("u1"), "what?").await.err().unwrap();
        assert!(matches!(err, DocChatError::NoRelevantContent));
    }

    #[tokio::test]
    async fn test_empty_question_is_rejected() {
        let (model, _) = scripted(&["unused"]);
        let engine = engine(vec![hit("context", 0.9)], model);

        let err = engine.answer("d1", Some("u1"), "   ").await.err().unwrap();
        assert!(matches!(err, DocChatError::Validation(_)));
    }

    #[tokio::test]
    async fn test_upstream_error_becomes_terminal_error_event() {
        let pulled = Arc::new(AtomicUsize::new(0));
        let model = CountingModel {
            deltas: vec![
                Ok("partial".to_string()),
                Err(DocChatError::StreamUpstream("boom".into())),
                Ok("never delivered".to_string()),
            ],
            pulled: Arc::clone(&pulled),
        };
        let engine = engine(vec![hit("context", 0.9)], model);

        let stream = engine.answer("d1", Some("u1"), "what?").await.unwrap();
        let events: Vec<ChatEvent> = stream.collect().await;

        assert_eq!(events.len(), 2);
        assert_eq!(events[0], ChatEvent::Delta("partial".into()));
        assert!(matches!(events[1], ChatEvent::Error(_)));
        // the delta after the error was never pulled
        assert_eq!(pulled.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_dropping_the_stream_stops_pulling() {
        let (model, pulled) = scripted(&["a", "b", "c", "d", "e"]);
        let engine = engine(vec![hit("context", 0.9)], model);

        let mut stream = engine.answer("d1", Some("u1"), "what?").await.unwrap();
        assert_eq!(stream.next().await, Some(ChatEvent::Delta("a".into())));
        assert_eq!(stream.next().await, Some(ChatEvent::Delta("b".into())));
        drop(stream);

        // nothing past the consumed prefix was ever pulled upstream
        assert_eq!(pulled.load(Ordering::SeqCst), 2);
    }
}
