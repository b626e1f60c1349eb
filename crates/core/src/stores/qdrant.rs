use crate::traits::VectorIndex;
use crate::{Chunk, IndexedVector, QueryError, ScoredVector};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

pub struct QdrantStore {
    endpoint: String,
    collection: String,
    client: Client,
}

impl QdrantStore {
    pub fn new(
        endpoint: impl Into<String>,
        collection: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, QueryError> {
        let endpoint = endpoint.into();
        url::Url::parse(&endpoint)?;
        Ok(Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            collection: collection.into(),
            client: Client::builder().timeout(timeout).build()?,
        })
    }

    fn collection_url(&self) -> String {
        format!("{}/collections/{}", self.endpoint, self.collection)
    }
}

/// Points per `PUT`; keeps request bodies well under Qdrant's size limit.
const UPSERT_BATCH: usize = 256;

fn upsert_bodies(vectors: &[IndexedVector], batch_size: usize) -> Result<Vec<Value>, QueryError> {
    vectors
        .chunks(batch_size.max(1))
        .map(|batch| {
            let points = batch
                .iter()
                .map(|vector| {
                    Ok(json!({
                        "id": vector.id,
                        "vector": vector.embedding,
                        "payload": serde_json::to_value(&vector.chunk)?,
                    }))
                })
                .collect::<Result<Vec<_>, QueryError>>()?;
            Ok(json!({ "points": points }))
        })
        .collect()
}

fn backend_error(status: StatusCode) -> QueryError {
    QueryError::BackendResponse {
        backend: "qdrant".to_string(),
        details: status.to_string(),
    }
}

#[async_trait]
impl VectorIndex for QdrantStore {
    async fn exists(&self) -> Result<bool, QueryError> {
        let response = self.client.get(self.collection_url()).send().await?;
        match response.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => Err(backend_error(status)),
        }
    }

    async fn destroy(&self) -> Result<(), QueryError> {
        let response = self.client.delete(self.collection_url()).send().await?;
        let status = response.status();
        if status.is_success() || status == StatusCode::NOT_FOUND {
            Ok(())
        } else {
            Err(backend_error(status))
        }
    }

    async fn create(&self, dimensions: usize, embedding_model: &str) -> Result<(), QueryError> {
        debug!(collection = %self.collection, dimensions, embedding_model, "creating qdrant collection");
        let response = self
            .client
            .put(self.collection_url())
            .json(&json!({
                "vectors": { "size": dimensions, "distance": "Cosine" }
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(backend_error(response.status()));
        }
        Ok(())
    }

    async fn upsert(&self, vectors: &[IndexedVector]) -> Result<(), QueryError> {
        if vectors.is_empty() {
            return Ok(());
        }

        let url = format!("{}/points?wait=true", self.collection_url());
        let bodies = upsert_bodies(vectors, UPSERT_BATCH)?;
        let total = bodies.len();
        for (position, body) in bodies.iter().enumerate() {
            let response = self.client.put(&url).json(body).send().await?;
            if !response.status().is_success() {
                return Err(backend_error(response.status()));
            }
            debug!(batch = position + 1, total, "qdrant points written");
        }

        Ok(())
    }

    async fn query(&self, vector: &[f32], limit: usize) -> Result<Vec<ScoredVector>, QueryError> {
        let response = self
            .client
            .post(format!("{}/points/search", self.collection_url()))
            .json(&json!({
                "vector": vector,
                "limit": limit,
                "with_payload": true,
                "with_vector": true,
            }))
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        if !response.status().is_success() {
            return Err(backend_error(response.status()));
        }

        let parsed: Value = response.json().await?;
        parse_search_hits(&parsed)
    }
}

fn parse_search_hits(parsed: &Value) -> Result<Vec<ScoredVector>, QueryError> {
    let hits = parsed
        .pointer("/result")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let mut result = Vec::new();
    for hit in hits {
        let id = match hit.pointer("/id") {
            Some(Value::String(id)) => id.clone(),
            Some(Value::Number(id)) => id.to_string(),
            _ => String::new(),
        };
        let score = hit.pointer("/score").and_then(Value::as_f64).unwrap_or(0.0) as f32;
        let embedding = hit
            .pointer("/vector")
            .and_then(Value::as_array)
            .map(|values| {
                values
                    .iter()
                    .filter_map(Value::as_f64)
                    .map(|value| value as f32)
                    .collect()
            })
            .unwrap_or_default();
        let payload = hit.pointer("/payload").cloned().ok_or_else(|| {
            QueryError::BackendResponse {
                backend: "qdrant".to_string(),
                details: format!("hit {id} has no payload"),
            }
        })?;
        let chunk: Chunk = serde_json::from_value(payload)?;

        result.push(ScoredVector {
            id,
            score,
            embedding,
            chunk,
        });
    }

    Ok(result)
}
