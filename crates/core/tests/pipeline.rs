//! Drives the full ingest-then-search pipeline through in-memory
//! collaborator fakes: a deterministic character-ngram embedder and a
//! cosine-ranked vector store.

use async_trait::async_trait;
use book_search_core::{
    ChunkKind, EmbeddingClient, EmbeddingError, EmbeddingProvider, IndexLedger, IngestOutcome,
    IngestionEngine, PlainTextParser, SearchEngine, SearchError, SearchRequest, StoreError,
    StoredRecord, SystemConfig, VectorStore,
};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

const DIMENSIONS: usize = 64;

/// Deterministic local embedding: hashed character trigrams, normalized so
/// cosine ranking behaves like a real provider's.
fn ngram_vector(text: &str) -> Vec<f32> {
    let mut vector = vec![0f32; DIMENSIONS];
    let lowered = text.to_lowercase();
    let chars: Vec<char> = lowered.chars().collect();

    for window in chars.windows(3) {
        let token: String = window.iter().collect();
        let mut hash = 1469598103934665603u64;
        for byte in token.bytes() {
            hash ^= byte as u64;
            hash = hash.wrapping_mul(1099511628211);
        }
        vector[(hash % DIMENSIONS as u64) as usize] += 1.0;
    }

    let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
    if magnitude > 0.0 {
        for value in &mut vector {
            *value /= magnitude;
        }
    }
    vector
}

#[derive(Clone, Default)]
struct FakeProvider;

#[async_trait]
impl EmbeddingProvider for FakeProvider {
    async fn create_embeddings(
        &self,
        _model: &str,
        inputs: &[String],
    ) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(inputs.iter().map(|input| ngram_vector(input)).collect())
    }
}

#[derive(Clone)]
struct StoredRow {
    vector: Vec<f32>,
    document: String,
    metadata: Value,
}

#[derive(Default)]
struct FakeStoreInner {
    exists: bool,
    rows: BTreeMap<String, StoredRow>,
    upsert_calls: usize,
}

/// Cosine-distance vector store held entirely in memory. Clones share
/// state, so an ingestion engine and a search engine can see one index.
#[derive(Clone, Default)]
struct FakeStore {
    inner: Arc<Mutex<FakeStoreInner>>,
}

fn predicate_matches(metadata: &Value, filter: &Value) -> bool {
    if let Some(clauses) = filter.get("$and").and_then(Value::as_array) {
        return clauses.iter().all(|clause| predicate_matches(metadata, clause));
    }
    filter.as_object().is_some_and(|fields| {
        fields.iter().all(|(field, predicate)| {
            let expected = predicate.get("$eq").unwrap_or(predicate);
            metadata.get(field) == Some(expected)
        })
    })
}

#[async_trait]
impl VectorStore for FakeStore {
    async fn ensure_collection(&self) -> Result<(), StoreError> {
        self.inner.lock().unwrap().exists = true;
        Ok(())
    }

    async fn upsert(
        &self,
        ids: &[String],
        vectors: &[Vec<f32>],
        documents: &[String],
        metadatas: &[Value],
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.exists {
            return Err(StoreError::MissingCollection("book_chunks".to_string()));
        }
        inner.upsert_calls += 1;
        for index in 0..ids.len() {
            inner.rows.insert(
                ids[index].clone(),
                StoredRow {
                    vector: vectors[index].clone(),
                    document: documents[index].clone(),
                    metadata: metadatas[index].clone(),
                },
            );
        }
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        k: usize,
        where_filter: Option<Value>,
    ) -> Result<Vec<StoredRecord>, StoreError> {
        let inner = self.inner.lock().unwrap();
        if !inner.exists {
            return Err(StoreError::MissingCollection("book_chunks".to_string()));
        }

        let mut ranked: Vec<StoredRecord> = inner
            .rows
            .iter()
            .filter(|(_, row)| {
                where_filter
                    .as_ref()
                    .map_or(true, |filter| predicate_matches(&row.metadata, filter))
            })
            .map(|(id, row)| {
                let dot: f32 = row
                    .vector
                    .iter()
                    .zip(vector.iter())
                    .map(|(a, b)| a * b)
                    .sum();
                StoredRecord {
                    id: id.clone(),
                    document: row.document.clone(),
                    metadata: row.metadata.clone(),
                    distance: f64::from(1.0 - dot),
                }
            })
            .collect();

        ranked.sort_by(|left, right| left.distance.total_cmp(&right.distance));
        ranked.truncate(k);
        Ok(ranked)
    }

    async fn count(&self) -> Result<usize, StoreError> {
        let inner = self.inner.lock().unwrap();
        if !inner.exists {
            return Err(StoreError::MissingCollection("book_chunks".to_string()));
        }
        Ok(inner.rows.len())
    }

    async fn delete_where(&self, where_filter: Value) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.exists {
            return Err(StoreError::MissingCollection("book_chunks".to_string()));
        }
        inner
            .rows
            .retain(|_, row| !predicate_matches(&row.metadata, &where_filter));
        Ok(())
    }

    async fn delete_collection(&self) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.exists = false;
        inner.rows.clear();
        Ok(())
    }
}

type TestEngine = IngestionEngine<PlainTextParser, FakeStore, FakeProvider>;

fn words(count: usize) -> String {
    vec!["lorem"; count].join(" ")
}

fn fast_embedding(config: &SystemConfig) -> book_search_core::EmbeddingConfig {
    let mut embedding = config.embedding.clone();
    embedding.base_delay_ms = 1;
    embedding
}

fn engine_for(library: &TempDir, store: FakeStore) -> TestEngine {
    let config = SystemConfig::rooted(library.path());
    let embedder = EmbeddingClient::new(FakeProvider, fast_embedding(&config));
    let ledger = IndexLedger::open(&config.paths.ledger_file).unwrap();
    IngestionEngine::new(PlainTextParser, store, embedder, ledger, config)
}

fn searcher_for(library: &TempDir, store: FakeStore) -> SearchEngine<FakeStore, FakeProvider> {
    let config = SystemConfig::rooted(library.path());
    let embedder = EmbeddingClient::new(FakeProvider, fast_embedding(&config));
    SearchEngine::new(store, embedder, config.search)
}

/// One ~4000-token chapter built from three ~1340-token paragraphs: the
/// chapter lands in the large band whole, and each paragraph closes its own
/// group, so chunking yields one chapter chunk and three paragraph chunks.
fn banded_book_contents() -> String {
    format!("### Economy\n{0}\n\n{0}\n\n{0}\n", words(1030))
}

fn topical_paragraph(sentence: &str) -> String {
    let mut body = String::new();
    for _ in 0..30 {
        body.push_str(sentence);
        body.push(' ');
    }
    body.trim_end().to_string()
}

#[tokio::test]
async fn ingest_records_ledger_entry_and_store_rows() {
    let library = TempDir::new().unwrap();
    std::fs::write(
        library.path().join("Thoreau - Walden.txt"),
        banded_book_contents(),
    )
    .unwrap();

    let store = FakeStore::default();
    let mut engine = engine_for(&library, store.clone());

    let outcome = engine
        .ingest_book(&library.path().join("Thoreau - Walden.txt"), false)
        .await
        .unwrap();
    assert_eq!(
        outcome,
        IngestOutcome::Indexed {
            chapter_chunks: 1,
            paragraph_chunks: 3,
        }
    );

    let stats = engine.status();
    assert_eq!(stats.books, 1);
    assert_eq!(stats.chapter_chunks, 1);
    assert_eq!(stats.paragraph_chunks, 3);
    assert!(stats.last_update.is_some());

    assert_eq!(engine.stored_chunk_count().await.unwrap(), 4);
}

#[tokio::test]
async fn unchanged_book_is_skipped_without_store_writes() {
    let library = TempDir::new().unwrap();
    let path = library.path().join("Thoreau - Walden.txt");
    std::fs::write(&path, banded_book_contents()).unwrap();

    let store = FakeStore::default();
    let mut engine = engine_for(&library, store.clone());

    engine.ingest_book(&path, false).await.unwrap();
    let writes_after_first = store.inner.lock().unwrap().upsert_calls;

    let second = engine.ingest_book(&path, false).await.unwrap();
    assert_eq!(second, IngestOutcome::Unchanged);
    assert_eq!(store.inner.lock().unwrap().upsert_calls, writes_after_first);
}

#[tokio::test]
async fn changed_content_reingests_and_drops_stale_chunks() {
    let library = TempDir::new().unwrap();
    let path = library.path().join("Thoreau - Walden.txt");
    std::fs::write(&path, banded_book_contents()).unwrap();

    let store = FakeStore::default();
    let mut engine = engine_for(&library, store.clone());
    engine.ingest_book(&path, false).await.unwrap();
    assert_eq!(engine.stored_chunk_count().await.unwrap(), 4);

    // shrink the book to a single in-band paragraph; the four old chunks
    // must not survive as stale rows
    std::fs::write(&path, format!("### Economy\n{}\n", words(250))).unwrap();
    let outcome = engine.ingest_book(&path, false).await.unwrap();
    assert_eq!(
        outcome,
        IngestOutcome::Indexed {
            chapter_chunks: 0,
            paragraph_chunks: 1,
        }
    );
    assert_eq!(engine.stored_chunk_count().await.unwrap(), 1);
}

#[tokio::test]
async fn library_pass_isolates_per_book_failures() {
    let library = TempDir::new().unwrap();
    std::fs::write(
        library.path().join("Thoreau - Walden.txt"),
        banded_book_contents(),
    )
    .unwrap();
    // invalid UTF-8 makes this book unparseable
    std::fs::write(
        library.path().join("Broken - Book.txt"),
        [0xffu8, 0xfe, 0x00, 0x01],
    )
    .unwrap();

    let store = FakeStore::default();
    let mut engine = engine_for(&library, store.clone());

    let report = engine.ingest_library(false).await;
    assert_eq!(report.found, 2);
    assert_eq!(report.processed, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(report.chapter_chunks, 1);
    assert_eq!(report.paragraph_chunks, 3);
}

#[tokio::test]
async fn empty_book_is_never_marked_ingested() {
    let library = TempDir::new().unwrap();
    let path = library.path().join("Thoreau - Walden.txt");
    // far below the paragraph band's lower bound
    std::fs::write(&path, "a few words only\n").unwrap();

    let store = FakeStore::default();
    let mut engine = engine_for(&library, store.clone());

    assert_eq!(
        engine.ingest_book(&path, false).await.unwrap(),
        IngestOutcome::Empty
    );
    // still Empty on the next run, never Unchanged
    assert_eq!(
        engine.ingest_book(&path, false).await.unwrap(),
        IngestOutcome::Empty
    );
    assert_eq!(engine.status().books, 0);
}

#[tokio::test]
async fn search_ranks_by_similarity_and_honors_filters() {
    let library = TempDir::new().unwrap();
    std::fs::write(
        library.path().join("Melville - Moby Dick.txt"),
        topical_paragraph(
            "the white whale surfaced near the ship while the harpoon crew held its breath",
        ),
    )
    .unwrap();
    std::fs::write(
        library.path().join("Austen - Emma.txt"),
        topical_paragraph(
            "the garden party gathered by the roses while tea was poured in the afternoon sun",
        ),
    )
    .unwrap();

    let store = FakeStore::default();
    let mut engine = engine_for(&library, store.clone());
    let report = engine.ingest_library(false).await;
    assert_eq!(report.processed, 2);

    let searcher = searcher_for(&library, store.clone());

    let hits = searcher
        .search(&SearchRequest {
            query: "white whale harpoon".to_string(),
            limit: Some(5),
            ..SearchRequest::default()
        })
        .await
        .unwrap();

    assert!(!hits.is_empty());
    assert!(hits.len() <= 5);
    assert_eq!(hits[0].book_title, "Moby Dick");
    for pair in hits.windows(2) {
        assert!(pair[0].similarity >= pair[1].similarity);
    }

    // substring author filter, case-insensitive
    let filtered = searcher
        .search_by_author("melv", "the afternoon sun", None)
        .await
        .unwrap();
    assert!(!filtered.is_empty());
    assert!(filtered
        .iter()
        .all(|hit| hit.book_author.to_lowercase().contains("melv")));

    // kind filter is applied store-side; nothing here is a chapter chunk
    let chapters_only = searcher
        .search(&SearchRequest {
            query: "white whale".to_string(),
            kind: Some(ChunkKind::Chapter),
            ..SearchRequest::default()
        })
        .await
        .unwrap();
    assert!(chapters_only.is_empty());
}

#[tokio::test]
async fn search_respects_result_limit() {
    let library = TempDir::new().unwrap();
    std::fs::write(
        library.path().join("Thoreau - Walden.txt"),
        banded_book_contents(),
    )
    .unwrap();

    let store = FakeStore::default();
    let mut engine = engine_for(&library, store.clone());
    engine.ingest_library(false).await;

    let searcher = searcher_for(&library, store.clone());
    let hits = searcher
        .search(&SearchRequest {
            query: "lorem".to_string(),
            limit: Some(2),
            ..SearchRequest::default()
        })
        .await
        .unwrap();

    assert_eq!(hits.len(), 2);
}

#[tokio::test]
async fn cleared_index_reports_not_initialized_on_search() {
    let library = TempDir::new().unwrap();
    std::fs::write(
        library.path().join("Thoreau - Walden.txt"),
        banded_book_contents(),
    )
    .unwrap();

    let store = FakeStore::default();
    let mut engine = engine_for(&library, store.clone());
    engine.ingest_library(false).await;
    engine.clear_index().await.unwrap();
    assert_eq!(engine.status().books, 0);

    let searcher = searcher_for(&library, store.clone());
    let error = searcher
        .search(&SearchRequest {
            query: "anything".to_string(),
            ..SearchRequest::default()
        })
        .await
        .unwrap_err();

    assert!(matches!(error, SearchError::IndexNotInitialized(_)));
}
