use std::sync::Arc;

use anyhow::{Context, Result};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::{RetrievalResult, TextChunk};
use crate::retrieval::VectorIndex;

/// Qdrant collection holding one point per chunk, with the chunk itself as payload.
#[derive(Clone)]
pub struct QdrantStore {
    client: Client,
    base_url: String,
    collection: String,
    known_vector_size: Arc<RwLock<Option<usize>>>,
}

impl QdrantStore {
    pub fn new(base_url: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            collection: collection.into(),
            known_vector_size: Arc::new(RwLock::new(None)),
        }
    }

    pub async fn recreate_collection(&self, vector_size: usize) -> Result<()> {
        let delete_url = format!("{}/collections/{}", self.base_url, self.collection);
        let _ = self.client.delete(&delete_url).send().await;
        *self.known_vector_size.write().await = None;

        self.ensure_collection(vector_size).await?;
        Ok(())
    }

    pub async fn ensure_collection(&self, vector_size: usize) -> Result<()> {
        {
            let known = self.known_vector_size.read().await;
            if let Some(existing) = *known {
                if existing == vector_size {
                    return Ok(());
                }
            }
        }

        let create_url = format!("{}/collections/{}", self.base_url, self.collection);
        let payload = json!({
            "vectors": {
                "size": vector_size,
                "distance": "Cosine"
            }
        });

        self.client
            .put(create_url)
            .json(&payload)
            .send()
            .await
            .context("failed to contact qdrant while creating collection")?
            .error_for_status()
            .context("qdrant failed to create collection")?;

        *self.known_vector_size.write().await = Some(vector_size);
        Ok(())
    }

    pub async fn upsert_points(&self, points: &[QdrantPoint]) -> Result<()> {
        if points.is_empty() {
            return Ok(());
        }

        let vector_size = points[0].vector.len();
        self.ensure_collection(vector_size).await?;

        let upsert_url = format!(
            "{}/collections/{}/points?wait=true",
            self.base_url, self.collection
        );
        let body = json!({ "points": points });

        self.client
            .put(upsert_url)
            .json(&body)
            .send()
            .await
            .context("failed to contact qdrant during upsert")?
            .error_for_status()
            .context("qdrant upsert returned non-success status")?;

        Ok(())
    }

    pub async fn search(&self, vector: &[f32], limit: usize) -> Result<Vec<RetrievalResult>> {
        if vector.is_empty() || limit == 0 {
            return Ok(vec![]);
        }

        let url = format!(
            "{}/collections/{}/points/search",
            self.base_url, self.collection
        );

        let body = json!({
            "vector": vector,
            "limit": limit,
            "with_payload": true,
        });

        let response = self
            .client
            .post(url)
            .json(&body)
            .send()
            .await
            .context("failed to contact qdrant during search")?;

        // No collection yet means nothing has been ingested.
        if response.status() == StatusCode::NOT_FOUND {
            tracing::debug!(collection = %self.collection, "qdrant collection missing");
            return Ok(vec![]);
        }

        let response = response
            .error_for_status()
            .context("qdrant search returned non-success status")?
            .json::<QdrantSearchResponse>()
            .await
            .context("failed to decode qdrant search response")?;

        Ok(response.into_results())
    }
}

impl VectorIndex for QdrantStore {
    async fn reset(&self, dimensions: usize) -> Result<()> {
        self.recreate_collection(dimensions).await
    }

    async fn index(&self, entries: &[(TextChunk, Vec<f32>)]) -> Result<()> {
        let points: Vec<QdrantPoint> = entries
            .iter()
            .map(|(chunk, vector)| QdrantPoint {
                id: Uuid::new_v4().to_string(),
                vector: vector.clone(),
                payload: chunk.clone(),
            })
            .collect();
        self.upsert_points(&points).await
    }

    async fn knn_search(&self, vector: &[f32], k: usize) -> Result<Vec<RetrievalResult>> {
        self.search(vector, k).await
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct QdrantPoint {
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: TextChunk,
}

#[derive(Debug, Deserialize)]
struct QdrantSearchResponse {
    result: Vec<QdrantResultPoint>,
}

impl QdrantSearchResponse {
    fn into_results(self) -> Vec<RetrievalResult> {
        self.result
            .into_iter()
            .filter_map(|point| {
                Some(RetrievalResult {
                    chunk: point.payload?,
                    score: point.score,
                })
            })
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct QdrantResultPoint {
    score: f32,
    payload: Option<TextChunk>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_search_response_payloads() {
        let body = r#"{
            "result": [
                {"id": "a", "score": 0.91, "payload": {
                    "content": "배열의 길이", "page_number": 3,
                    "word_count": 2, "source_path": "java.pdf"}},
                {"id": "b", "score": 0.40, "payload": null}
            ],
            "status": "ok",
            "time": 0.001
        }"#;
        let response: QdrantSearchResponse = serde_json::from_str(body).expect("decodes");
        let results = response.into_results();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk.page_number, 3);
        assert!((results[0].score - 0.91).abs() < 1e-6);
    }

    #[test]
    fn points_serialise_chunk_as_payload() {
        let point = QdrantPoint {
            id: "p".to_string(),
            vector: vec![0.5, 0.5],
            payload: TextChunk {
                content: "int x;".to_string(),
                page_number: 40,
                word_count: 2,
                source_path: "java.pdf".to_string(),
            },
        };
        let value = serde_json::to_value(&point).expect("serialises");
        assert_eq!(value["payload"]["page_number"], 40);
        assert_eq!(value["payload"]["content"], "int x;");
    }
}
