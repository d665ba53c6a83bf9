//! Qdrant implementation for vector storage
//!
//! Provides connection management, idempotent collection bootstrap, and
//! the point operations for document chunk embeddings.

use crate::{SearchFilter, VectorStore};
use async_trait::async_trait;
use docchat_core::{DatabaseConfig, DocChatError, EmbeddedPoint, Result, SearchResult};
use qdrant_client::qdrant::{
    point_id::PointIdOptions, Condition, CreateCollectionBuilder,
    CreateFieldIndexCollectionBuilder, DeletePointsBuilder, Distance, FieldType, Filter,
    PointStruct, ScoredPoint, SearchPointsBuilder, UpsertPointsBuilder, VectorParamsBuilder,
};
use qdrant_client::Qdrant;
use uuid::Uuid;

/// Qdrant vector store implementation
pub struct QdrantStore {
    client: Qdrant,
    collection: String,
    dimension: usize,
}

impl QdrantStore {
    /// Create a new Qdrant connection
    pub fn new(config: &DatabaseConfig) -> Result<Self> {
        let client = Qdrant::from_url(&config.qdrant_url)
            .build()
            .map_err(|e| DocChatError::VectorStore(format!("Qdrant connection failed: {e}")))?;

        Ok(Self {
            client,
            collection: config.qdrant_collection.clone(),
            dimension: config.vector_dimension,
        })
    }
}

#[async_trait]
impl VectorStore for QdrantStore {
    async fn ensure_collection(&self) -> Result<()> {
        let collections = self
            .client
            .list_collections()
            .await
            .map_err(|e| DocChatError::VectorStore(format!("failed to list collections: {e}")))?;

        let exists = collections
            .collections
            .iter()
            .any(|c| c.name == self.collection);

        if !exists {
            tracing::info!(collection = %self.collection, dimension = self.dimension, "creating Qdrant collection");
            self.client
                .create_collection(
                    CreateCollectionBuilder::new(&self.collection).vectors_config(
                        VectorParamsBuilder::new(self.dimension as u64, Distance::Cosine),
                    ),
                )
                .await
                .map_err(|e| {
                    DocChatError::VectorStore(format!("failed to create collection: {e}"))
                })?;
        }

        // Index creation is idempotent server-side, so always issue it;
        // a collection created by an older build gets its indexes here.
        for field in ["documentId", "ownerId"] {
            self.client
                .create_field_index(CreateFieldIndexCollectionBuilder::new(
                    &self.collection,
                    field,
                    FieldType::Keyword,
                ))
                .await
                .map_err(|e| {
                    DocChatError::VectorStore(format!("failed to index payload field {field}: {e}"))
                })?;
        }

        Ok(())
    }

    async fn upsert(&self, points: Vec<EmbeddedPoint>) -> Result<()> {
        if points.is_empty() {
            return Ok(());
        }

        let count = points.len();
        let mut qdrant_points = Vec::with_capacity(count);
        for point in points {
            if point.vector.len() != self.dimension {
                return Err(DocChatError::VectorStore(format!(
                    "point {} has dimension {}, collection expects {}",
                    point.id,
                    point.vector.len(),
                    self.dimension
                )));
            }

            let payload_map: std::collections::HashMap<String, qdrant_client::qdrant::Value> =
                serde_json::to_value(&point.payload)
                    .unwrap_or_default()
                    .as_object()
                    .cloned()
                    .unwrap_or_default()
                    .into_iter()
                    .map(|(k, v)| (k, v.into()))
                    .collect();

            qdrant_points.push(PointStruct::new(
                point.id.to_string(),
                point.vector,
                payload_map,
            ));
        }

        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.collection, qdrant_points))
            .await
            .map_err(|e| DocChatError::VectorStore(format!("failed to upsert points: {e}")))?;

        tracing::debug!(collection = %self.collection, count, "upserted points");
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        filter: &SearchFilter,
        limit: usize,
    ) -> Result<Vec<SearchResult>> {
        let mut conditions = vec![Condition::matches(
            "documentId",
            filter.document_id.clone(),
        )];
        if let Some(owner_id) = &filter.owner_id {
            conditions.push(Condition::matches("ownerId", owner_id.clone()));
        }

        let results = self
            .client
            .search_points(
                SearchPointsBuilder::new(&self.collection, vector.to_vec(), limit as u64)
                    .filter(Filter::must(conditions))
                    .with_payload(true),
            )
            .await
            .map_err(|e| DocChatError::VectorStore(format!("vector search failed: {e}")))?;

        Ok(scored_points_to_results(results.result))
    }

    async fn delete_by_document(&self, document_id: &str) -> Result<u64> {
        let filter = Filter::must([Condition::matches("documentId", document_id.to_string())]);

        self.client
            .delete_points(DeletePointsBuilder::new(&self.collection).points(filter))
            .await
            .map_err(|e| DocChatError::VectorStore(format!("failed to delete points: {e}")))?;

        tracing::debug!(collection = %self.collection, document_id, "deleted points for document");
        // Deleted count is not reported by the delete response
        Ok(1)
    }
}

/// Decode raw scored points into search results, sorted by strictly
/// non-increasing score.
///
/// Qdrant already returns descending scores; the explicit sort keeps
/// the ordering contract local instead of trusting the backend.
fn scored_points_to_results(points: Vec<ScoredPoint>) -> Vec<SearchResult> {
    let mut results: Vec<SearchResult> = points
        .into_iter()
        .map(|point| {
            let payload = point.payload;
            let content = payload
                .get("content")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string())
                .unwrap_or_default();
            let document_id = payload
                .get("documentId")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string())
                .unwrap_or_default();
            let owner_id = payload
                .get("ownerId")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string())
                .unwrap_or_default();
            let chunk_index = payload
                .get("chunkIndex")
                .and_then(|v| v.as_integer())
                .unwrap_or(0) as u32;

            let id = point
                .id
                .and_then(|id| id.point_id_options)
                .map(|opt| match opt {
                    PointIdOptions::Uuid(u) => u,
                    PointIdOptions::Num(n) => n.to_string(),
                })
                .unwrap_or_else(|| Uuid::nil().to_string());

            SearchResult {
                id,
                score: point.score,
                content,
                document_id,
                owner_id,
                chunk_index,
            }
        })
        .collect();

    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use qdrant_client::qdrant::value::Kind;
    use qdrant_client::qdrant::{PointId, Value};
    use std::collections::HashMap;

    fn string_value(s: &str) -> Value {
        Value {
            kind: Some(Kind::StringValue(s.to_string())),
        }
    }

    fn integer_value(n: i64) -> Value {
        Value {
            kind: Some(Kind::IntegerValue(n)),
        }
    }

    fn point(uuid: &str, score: f32, content: &str, chunk_index: i64) -> ScoredPoint {
        let mut payload = HashMap::new();
        payload.insert("content".to_string(), string_value(content));
        payload.insert("documentId".to_string(), string_value("doc-1"));
        payload.insert("ownerId".to_string(), string_value("user-1"));
        payload.insert("chunkIndex".to_string(), integer_value(chunk_index));

        ScoredPoint {
            id: Some(PointId {
                point_id_options: Some(PointIdOptions::Uuid(uuid.to_string())),
            }),
            payload,
            score,
            ..Default::default()
        }
    }

    #[test]
    fn test_results_sorted_by_non_increasing_score() {
        let points = vec![
            point("a", 0.42, "mid", 1),
            point("b", 0.91, "best", 0),
            point("c", 0.17, "worst", 2),
            point("d", 0.91, "tied", 3),
        ];

        let results = scored_points_to_results(points);
        let scores: Vec<f32> = results.iter().map(|r| r.score).collect();
        assert!(scores.windows(2).all(|w| w[0] >= w[1]));
        assert_eq!(results[0].score, 0.91);
        assert_eq!(results[3].content, "worst");
    }

    #[test]
    fn test_payload_decoding() {
        let results = scored_points_to_results(vec![point(
            "8e7a9b1c-0000-0000-0000-000000000001",
            0.8,
            "chunk text",
            7,
        )]);

        assert_eq!(results.len(), 1);
        let r = &results[0];
        assert_eq!(r.id, "8e7a9b1c-0000-0000-0000-000000000001");
        assert_eq!(r.content, "chunk text");
        assert_eq!(r.document_id, "doc-1");
        assert_eq!(r.owner_id, "user-1");
        assert_eq!(r.chunk_index, 7);
    }

    #[test]
    fn test_numeric_id_and_missing_payload_fields() {
        let bare = ScoredPoint {
            id: Some(PointId {
                point_id_options: Some(PointIdOptions::Num(42)),
            }),
            payload: HashMap::new(),
            score: 0.5,
            ..Default::default()
        };

        let results = scored_points_to_results(vec![bare]);
        let r = &results[0];
        assert_eq!(r.id, "42");
        assert_eq!(r.content, "");
        assert_eq!(r.chunk_index, 0);
    }
}
