use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::traits::{StoredRecord, VectorStore};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use url::Url;

/// Chroma-compatible vector store over its HTTP API. Collection ids are
/// resolved by name on each call; the store keeps no other state.
pub struct ChromaStore {
    client: Client,
    endpoint: String,
    collection: String,
    distance_metric: String,
}

impl ChromaStore {
    pub fn new(
        endpoint: impl Into<String>,
        collection: impl Into<String>,
        distance_metric: impl Into<String>,
    ) -> Result<Self, StoreError> {
        let endpoint = endpoint.into();
        Url::parse(&endpoint)?;
        Ok(Self {
            client: Client::new(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            collection: collection.into(),
            distance_metric: distance_metric.into(),
        })
    }

    pub fn from_config(config: &StoreConfig) -> Result<Self, StoreError> {
        Self::new(
            config.endpoint.clone(),
            config.collection.clone(),
            config.distance_metric.clone(),
        )
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1{path}", self.endpoint)
    }

    async fn collection_id(&self) -> Result<String, StoreError> {
        let response = self
            .client
            .get(self.url(&format!("/collections/{}", self.collection)))
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(StoreError::MissingCollection(self.collection.clone()));
        }
        if !response.status().is_success() {
            return Err(StoreError::Backend {
                backend: "chroma".to_string(),
                details: response.status().to_string(),
            });
        }

        let parsed: Value = response.json().await?;
        parsed
            .pointer("/id")
            .and_then(Value::as_str)
            .map(ToString::to_string)
            .ok_or_else(|| StoreError::Backend {
                backend: "chroma".to_string(),
                details: "collection response missing id".to_string(),
            })
    }

    fn check_status(backend_call: &str, status: StatusCode) -> Result<(), StoreError> {
        if status.is_success() {
            Ok(())
        } else {
            Err(StoreError::Backend {
                backend: "chroma".to_string(),
                details: format!("{backend_call} returned {status}"),
            })
        }
    }
}

#[async_trait]
impl VectorStore for ChromaStore {
    async fn ensure_collection(&self) -> Result<(), StoreError> {
        let response = self
            .client
            .post(self.url("/collections"))
            .json(&json!({
                "name": self.collection,
                "metadata": { "hnsw:space": self.distance_metric },
                "get_or_create": true,
            }))
            .send()
            .await?;

        Self::check_status("create collection", response.status())
    }

    async fn upsert(
        &self,
        ids: &[String],
        vectors: &[Vec<f32>],
        documents: &[String],
        metadatas: &[Value],
    ) -> Result<(), StoreError> {
        if ids.len() != vectors.len() || ids.len() != documents.len() || ids.len() != metadatas.len()
        {
            return Err(StoreError::Backend {
                backend: "chroma".to_string(),
                details: format!(
                    "upsert length mismatch: {} ids, {} vectors, {} documents, {} metadatas",
                    ids.len(),
                    vectors.len(),
                    documents.len(),
                    metadatas.len()
                ),
            });
        }
        if ids.is_empty() {
            return Ok(());
        }

        let collection_id = self.collection_id().await?;
        let response = self
            .client
            .post(self.url(&format!("/collections/{collection_id}/upsert")))
            .json(&json!({
                "ids": ids,
                "embeddings": vectors,
                "documents": documents,
                "metadatas": metadatas,
            }))
            .send()
            .await?;

        Self::check_status("upsert", response.status())
    }

    async fn query(
        &self,
        vector: &[f32],
        k: usize,
        where_filter: Option<Value>,
    ) -> Result<Vec<StoredRecord>, StoreError> {
        let collection_id = self.collection_id().await?;

        let mut body = json!({
            "query_embeddings": [vector],
            "n_results": k,
            "include": ["documents", "metadatas", "distances"],
        });
        if let Some(filter) = where_filter {
            body["where"] = filter;
        }

        let response = self
            .client
            .post(self.url(&format!("/collections/{collection_id}/query")))
            .json(&body)
            .send()
            .await?;

        Self::check_status("query", response.status())?;
        let parsed: Value = response.json().await?;
        parse_query_rows(&parsed)
    }

    async fn count(&self) -> Result<usize, StoreError> {
        let collection_id = self.collection_id().await?;
        let response = self
            .client
            .get(self.url(&format!("/collections/{collection_id}/count")))
            .send()
            .await?;

        Self::check_status("count", response.status())?;
        let parsed: Value = response.json().await?;
        parsed
            .as_u64()
            .map(|count| count as usize)
            .ok_or_else(|| StoreError::Backend {
                backend: "chroma".to_string(),
                details: "count response was not a number".to_string(),
            })
    }

    async fn delete_where(&self, where_filter: Value) -> Result<(), StoreError> {
        let collection_id = self.collection_id().await?;
        let response = self
            .client
            .post(self.url(&format!("/collections/{collection_id}/delete")))
            .json(&json!({ "where": where_filter }))
            .send()
            .await?;

        Self::check_status("delete", response.status())
    }

    async fn delete_collection(&self) -> Result<(), StoreError> {
        let response = self
            .client
            .delete(self.url(&format!("/collections/{}", self.collection)))
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        Self::check_status("delete collection", response.status())
    }
}

/// Flattens Chroma's per-query nested arrays (`ids[0]`, `documents[0]`, ...)
/// into ranked rows. Missing documents or metadata collapse to empty values
/// rather than failing the whole result set.
fn parse_query_rows(parsed: &Value) -> Result<Vec<StoredRecord>, StoreError> {
    let ids = parsed
        .pointer("/ids/0")
        .and_then(Value::as_array)
        .ok_or_else(|| StoreError::Backend {
            backend: "chroma".to_string(),
            details: "query response missing ids".to_string(),
        })?;
    let documents = parsed.pointer("/documents/0").and_then(Value::as_array);
    let metadatas = parsed.pointer("/metadatas/0").and_then(Value::as_array);
    let distances = parsed.pointer("/distances/0").and_then(Value::as_array);

    let mut rows = Vec::with_capacity(ids.len());
    for (position, id) in ids.iter().enumerate() {
        let at = |column: Option<&Vec<Value>>| {
            column
                .and_then(|values| values.get(position))
                .cloned()
                .unwrap_or(Value::Null)
        };

        rows.push(StoredRecord {
            id: id.as_str().unwrap_or_default().to_string(),
            document: at(documents)
                .as_str()
                .unwrap_or_default()
                .to_string(),
            metadata: at(metadatas),
            distance: at(distances).as_f64().unwrap_or(0.0),
        });
    }

    Ok(rows)
}
