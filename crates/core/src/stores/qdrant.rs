use crate::error::ChatError;
use crate::models::{Chunk, EmbeddedChunk, RetrievedChunk};
use crate::traits::VectorIndex;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};

const BACKEND: &str = "qdrant";

/// Qdrant collection used as a throwaway index for the current upload batch.
pub struct QdrantIndex {
    endpoint: String,
    collection: String,
    client: Client,
    vector_size: usize,
}

impl QdrantIndex {
    pub fn new(endpoint: impl Into<String>, collection: impl Into<String>, vector_size: usize) -> Self {
        let endpoint: String = endpoint.into();
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            collection: collection.into(),
            client: Client::new(),
            vector_size,
        }
    }

    fn collection_url(&self) -> String {
        format!("{}/collections/{}", self.endpoint, self.collection)
    }

    async fn recreate_collection(&self) -> Result<(), ChatError> {
        let response = self
            .client
            .delete(self.collection_url())
            .send()
            .await
            .map_err(transport)?;
        if !response.status().is_success() && response.status() != StatusCode::NOT_FOUND {
            return Err(ChatError::index(BACKEND, response.status()));
        }

        let response = self
            .client
            .put(self.collection_url())
            .json(&json!({
                "vectors": { "size": self.vector_size, "distance": "Cosine" }
            }))
            .send()
            .await
            .map_err(transport)?;
        if !response.status().is_success() {
            return Err(ChatError::index(BACKEND, response.status()));
        }
        Ok(())
    }
}

fn transport(error: reqwest::Error) -> ChatError {
    ChatError::index(BACKEND, error)
}

fn point_for(entry: &EmbeddedChunk) -> Value {
    let chunk = &entry.chunk;
    json!({
        "id": chunk.chunk_index,
        "vector": entry.vector,
        "payload": {
            "chunk_id": chunk.chunk_id,
            "document_id": chunk.document_id,
            "source_name": chunk.source_name,
            "page": chunk.page,
            "chunk_index": chunk.chunk_index,
            "text": chunk.text,
        },
    })
}

fn hit_from(hit: &Value) -> Option<RetrievedChunk> {
    let payload = hit.pointer("/payload")?;
    let text = |key: &str| {
        payload
            .get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };
    Some(RetrievedChunk {
        chunk: Chunk {
            chunk_id: text("chunk_id"),
            document_id: text("document_id"),
            source_name: text("source_name"),
            page: payload.get("page").and_then(Value::as_u64).unwrap_or(0) as u32,
            chunk_index: payload.get("chunk_index").and_then(Value::as_u64).unwrap_or(0),
            text: text("text"),
        },
        score: hit.pointer("/score").and_then(Value::as_f64).unwrap_or(0.0) as f32,
    })
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    fn backend(&self) -> &str {
        BACKEND
    }

    async fn rebuild(&self, chunks: &[EmbeddedChunk]) -> Result<(), ChatError> {
        if let Some(bad) = chunks.iter().find(|entry| entry.vector.len() != self.vector_size) {
            return Err(ChatError::index(
                BACKEND,
                format!(
                    "embedding dimension {} != {}",
                    bad.vector.len(),
                    self.vector_size
                ),
            ));
        }

        self.recreate_collection().await?;

        if chunks.is_empty() {
            return Ok(());
        }

        let points: Vec<Value> = chunks.iter().map(point_for).collect();
        let response = self
            .client
            .put(format!("{}/points?wait=true", self.collection_url()))
            .json(&json!({ "points": points }))
            .send()
            .await
            .map_err(transport)?;

        if !response.status().is_success() {
            return Err(ChatError::index(BACKEND, response.status()));
        }

        Ok(())
    }

    async fn search_vector(
        &self,
        query_vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<RetrievedChunk>, ChatError> {
        if query_vector.len() != self.vector_size {
            return Err(ChatError::index(
                BACKEND,
                format!(
                    "query vector dim {} is not {}",
                    query_vector.len(),
                    self.vector_size
                ),
            ));
        }

        let response = self
            .client
            .post(format!("{}/points/search", self.collection_url()))
            .json(&json!({
                "vector": query_vector,
                "limit": top_k,
                "with_payload": true,
            }))
            .send()
            .await
            .map_err(transport)?;

        if !response.status().is_success() {
            return Err(ChatError::index(BACKEND, response.status()));
        }

        let parsed: Value = response.json().await.map_err(transport)?;
        Ok(parsed
            .pointer("/result")
            .and_then(Value::as_array)
            .map(|hits| hits.iter().filter_map(hit_from).collect())
            .unwrap_or_default())
    }

    async fn len(&self) -> Result<usize, ChatError> {
        let response = self
            .client
            .get(self.collection_url())
            .send()
            .await
            .map_err(transport)?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(0);
        }
        if !response.status().is_success() {
            return Err(ChatError::index(BACKEND, response.status()));
        }

        let parsed: Value = response.json().await.map_err(transport)?;
        Ok(parsed
            .pointer("/result/points_count")
            .and_then(Value::as_u64)
            .unwrap_or(0) as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Path, State};
    use axum::routing::{post, put};
    use axum::{Json, Router};
    use std::sync::{Arc, Mutex};

    /// Minimal Qdrant REST stand-in that records every call it receives.
    #[derive(Clone, Default)]
    struct FakeQdrant {
        calls: Arc<Mutex<Vec<String>>>,
        fail_upsert: bool,
    }

    impl FakeQdrant {
        fn record(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    async fn drop_collection(State(fake): State<FakeQdrant>, Path(name): Path<String>) -> StatusCode {
        fake.record(format!("DELETE {name}"));
        StatusCode::NOT_FOUND
    }

    async fn create_collection(
        State(fake): State<FakeQdrant>,
        Path(name): Path<String>,
        Json(body): Json<Value>,
    ) -> Json<Value> {
        fake.record(format!(
            "CREATE {name} size={} distance={}",
            body["vectors"]["size"], body["vectors"]["distance"]
        ));
        Json(json!({ "result": true }))
    }

    async fn collection_info(State(fake): State<FakeQdrant>, Path(name): Path<String>) -> Json<Value> {
        fake.record(format!("INFO {name}"));
        Json(json!({ "result": { "points_count": 2 } }))
    }

    async fn upsert_points(
        State(fake): State<FakeQdrant>,
        Path(name): Path<String>,
        Json(body): Json<Value>,
    ) -> (StatusCode, Json<Value>) {
        let count = body["points"].as_array().map_or(0, Vec::len);
        fake.record(format!("UPSERT {name} points={count}"));
        if fake.fail_upsert {
            (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "status": { "error": "disk full" } })))
        } else {
            (StatusCode::OK, Json(json!({ "result": { "status": "completed" } })))
        }
    }

    async fn search_points(
        State(fake): State<FakeQdrant>,
        Path(name): Path<String>,
        Json(body): Json<Value>,
    ) -> Json<Value> {
        fake.record(format!("SEARCH {name} limit={}", body["limit"]));
        Json(json!({
            "result": [{
                "id": 1,
                "score": 0.75,
                "payload": {
                    "chunk_id": "c1",
                    "document_id": "doc",
                    "source_name": "notes.pdf",
                    "page": 2,
                    "chunk_index": 1,
                    "text": "Beta."
                }
            }]
        }))
    }

    async fn serve(fake: FakeQdrant) -> String {
        let app = Router::new()
            .route(
                "/collections/:name",
                put(create_collection)
                    .delete(drop_collection)
                    .get(collection_info),
            )
            .route("/collections/:name/points", put(upsert_points))
            .route("/collections/:name/points/search", post(search_points))
            .with_state(fake);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{address}/")
    }

    fn embedded(chunk_index: u64, text: &str) -> EmbeddedChunk {
        EmbeddedChunk {
            chunk: Chunk {
                chunk_id: format!("c{chunk_index}"),
                document_id: "doc".to_string(),
                source_name: "notes.pdf".to_string(),
                page: chunk_index as u32 + 1,
                chunk_index,
                text: text.to_string(),
            },
            vector: vec![1.0, 0.0],
        }
    }

    #[tokio::test]
    async fn rebuild_recreates_the_collection_then_upserts() {
        let fake = FakeQdrant::default();
        let index = QdrantIndex::new(serve(fake.clone()).await, "chunks", 2);

        index
            .rebuild(&[embedded(0, "Alpha."), embedded(1, "Beta.")])
            .await
            .unwrap();
        let hits = index.search_vector(&[0.0, 1.0], 4).await.unwrap();
        let count = index.len().await.unwrap();

        assert_eq!(
            fake.calls(),
            vec![
                "DELETE chunks".to_string(),
                "CREATE chunks size=2 distance=\"Cosine\"".to_string(),
                "UPSERT chunks points=2".to_string(),
                "SEARCH chunks limit=4".to_string(),
                "INFO chunks".to_string(),
            ]
        );
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk.text, "Beta.");
        assert_eq!(hits[0].chunk.page, 2);
        assert!((hits[0].score - 0.75).abs() < 1e-6);
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn rejected_upsert_is_an_index_error() {
        let fake = FakeQdrant {
            fail_upsert: true,
            ..FakeQdrant::default()
        };
        let index = QdrantIndex::new(serve(fake.clone()).await, "chunks", 2);

        let result = index.rebuild(&[embedded(0, "Alpha.")]).await;

        match result {
            Err(ChatError::Index { backend, details }) => {
                assert_eq!(backend, "qdrant");
                assert!(details.contains("500"), "{details}");
            }
            other => panic!("expected an index error, got {other:?}"),
        }
        assert_eq!(fake.calls().last().map(String::as_str), Some("UPSERT chunks points=1"));
    }

    #[tokio::test]
    async fn empty_batch_only_recreates_the_collection() {
        let fake = FakeQdrant::default();
        let index = QdrantIndex::new(serve(fake.clone()).await, "chunks", 2);

        index.rebuild(&[]).await.unwrap();

        assert_eq!(fake.calls().len(), 2);
        assert!(fake.calls()[1].starts_with("CREATE chunks"));
    }

    #[test]
    fn points_round_trip_through_payload() {
        let entry = EmbeddedChunk {
            chunk: Chunk {
                chunk_id: "abc".to_string(),
                document_id: "doc".to_string(),
                source_name: "manual.pdf".to_string(),
                page: 2,
                chunk_index: 7,
                text: "Beta.".to_string(),
            },
            vector: vec![0.5, 0.5],
        };

        let point = point_for(&entry);
        assert_eq!(point["id"], 7);

        let hit = json!({ "id": 7, "score": 0.9, "payload": point["payload"].clone() });
        let retrieved = hit_from(&hit).expect("hit should parse");
        assert_eq!(retrieved.chunk, entry.chunk);
        assert!((retrieved.score - 0.9).abs() < 1e-6);
    }

    #[tokio::test]
    async fn wrong_query_dimension_fails_before_any_request() {
        let index = QdrantIndex::new("http://127.0.0.1:1", "chunks", 4);
        let result = index.search_vector(&[1.0], 3).await;
        assert!(matches!(result, Err(ChatError::Index { .. })));
    }
}
