use crate::error::StoreError;
use async_trait::async_trait;
use serde_json::Value;

/// One ranked row returned by a vector-store query, distance under the
/// store's native metric (ascending distance = descending relevance).
#[derive(Debug, Clone)]
pub struct StoredRecord {
    pub id: String,
    pub document: String,
    pub metadata: Value,
    pub distance: f64,
}

/// Vector store collaborator. Metadata values are scalar (string/int);
/// `where_filter` carries store-native equality predicates.
#[async_trait]
pub trait VectorStore {
    /// Creates the collection if it does not exist yet.
    async fn ensure_collection(&self) -> Result<(), StoreError>;

    /// Writes rows keyed by id, replacing rows whose ids already exist.
    /// All four slices run in parallel and must have equal length.
    async fn upsert(
        &self,
        ids: &[String],
        vectors: &[Vec<f32>],
        documents: &[String],
        metadatas: &[Value],
    ) -> Result<(), StoreError>;

    /// Nearest-neighbor lookup: the `k` rows closest to `vector`, ranked by
    /// ascending distance, optionally pre-filtered by `where_filter`.
    /// Fails with [`StoreError::MissingCollection`] when nothing was ever
    /// ingested.
    async fn query(
        &self,
        vector: &[f32],
        k: usize,
        where_filter: Option<Value>,
    ) -> Result<Vec<StoredRecord>, StoreError>;

    async fn count(&self) -> Result<usize, StoreError>;

    /// Deletes every row matching `where_filter`.
    async fn delete_where(&self, where_filter: Value) -> Result<(), StoreError>;

    /// Drops the whole collection. Deleting a collection that does not
    /// exist is not an error.
    async fn delete_collection(&self) -> Result<(), StoreError>;
}
