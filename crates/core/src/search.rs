use crate::config::SearchConfig;
use crate::embeddings::{EmbeddingClient, EmbeddingProvider};
use crate::error::{EmbeddingError, SearchError};
use crate::models::{ChunkKind, SearchHit, SearchRequest};
use crate::traits::{StoredRecord, VectorStore};
use serde_json::{json, Value};

/// Over-fetch factor applied when an in-process text filter will thin the
/// store's candidates.
const POST_FILTER_FETCH_FACTOR: usize = 3;

/// Turns free-text queries into ranked, optionally filtered hits.
pub struct SearchEngine<S, E> {
    store: S,
    embedder: EmbeddingClient<E>,
    config: SearchConfig,
}

impl<S, E> SearchEngine<S, E>
where
    S: VectorStore,
    E: EmbeddingProvider,
{
    pub fn new(store: S, embedder: EmbeddingClient<E>, config: SearchConfig) -> Self {
        Self {
            store,
            embedder,
            config,
        }
    }

    /// Runs one search. Results arrive in the store's native rank order
    /// (descending similarity) and that order survives post-filtering.
    pub async fn search(&self, request: &SearchRequest) -> Result<Vec<SearchHit>, SearchError> {
        let query = request.query.trim();
        if query.is_empty() {
            return Err(SearchError::InvalidQuery("query is empty".to_string()));
        }

        let limit = request
            .limit
            .unwrap_or(self.config.default_results)
            .min(self.config.max_results);

        let query_texts = [query.to_string()];
        let query_vector = self
            .embedder
            .embed(&query_texts)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| {
                EmbeddingError::Provider("provider returned no vector for the query".to_string())
            })?;

        // substring filters run in-process, so fetch extra candidates to
        // compensate for what they discard
        let text_filtered = request.author.is_some() || request.book_title.is_some();
        let fetch = if text_filtered {
            limit * POST_FILTER_FETCH_FACTOR
        } else {
            limit
        };

        let kind_filter = request
            .kind
            .map(|kind| json!({ "chunk_kind": { "$eq": kind.as_str() } }));

        let rows = self
            .store
            .query(&query_vector, fetch, kind_filter)
            .await
            .map_err(SearchError::from_store)?;

        let mut hits: Vec<SearchHit> = rows.into_iter().map(hit_from_record).collect();

        if let Some(author) = &request.author {
            let needle = author.to_lowercase();
            hits.retain(|hit| hit.book_author.to_lowercase().contains(&needle));
        }
        if let Some(title) = &request.book_title {
            let needle = title.to_lowercase();
            hits.retain(|hit| hit.book_title.to_lowercase().contains(&needle));
        }

        hits.truncate(limit);
        Ok(hits)
    }

    /// Searches within books whose author contains `author`.
    pub async fn search_by_author(
        &self,
        author: &str,
        query: &str,
        limit: Option<usize>,
    ) -> Result<Vec<SearchHit>, SearchError> {
        self.search(&SearchRequest {
            query: query.to_string(),
            limit,
            author: Some(author.to_string()),
            ..SearchRequest::default()
        })
        .await
    }

    /// Searches within books whose title contains `book_title`.
    pub async fn search_by_book(
        &self,
        book_title: &str,
        query: &str,
        limit: Option<usize>,
    ) -> Result<Vec<SearchHit>, SearchError> {
        self.search(&SearchRequest {
            query: query.to_string(),
            limit,
            book_title: Some(book_title.to_string()),
            ..SearchRequest::default()
        })
        .await
    }
}

fn hit_from_record(record: StoredRecord) -> SearchHit {
    let metadata = &record.metadata;
    let text_field = |key: &str| {
        metadata
            .pointer(&format!("/{key}"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };
    let number_field = |key: &str| {
        metadata
            .pointer(&format!("/{key}"))
            .and_then(Value::as_u64)
            .unwrap_or(0)
    };

    let kind = match metadata.pointer("/chunk_kind").and_then(Value::as_str) {
        Some("chapter") => ChunkKind::Chapter,
        _ => ChunkKind::Paragraph,
    };

    SearchHit {
        book_title: text_field("book_title"),
        book_author: text_field("book_author"),
        chapter_title: text_field("chapter_title"),
        chapter_number: number_field("chapter_number") as u32,
        kind,
        word_count: number_field("word_count") as usize,
        text: record.document,
        similarity: 1.0 - record.distance,
    }
}
