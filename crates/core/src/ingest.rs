use crate::chunking::build_chunks;
use crate::config::SystemConfig;
use crate::embeddings::{EmbeddingClient, EmbeddingProvider};
use crate::error::IngestError;
use crate::ledger::IndexLedger;
use crate::models::{
    BookMetadata, ChunkKind, IngestOutcome, LedgerStats, LibraryReport, TextChunk,
};
use crate::parser::BookParser;
use crate::traits::VectorStore;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// SHA-256 of the file's bytes, hex-encoded. This is the content version
/// the ledger keys incremental updates on.
pub fn digest_file(path: &Path) -> Result<String, IngestError> {
    let bytes = fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

/// Ledger key for a book: `author/title`.
pub fn document_key(metadata: &BookMetadata) -> String {
    format!("{}/{}", metadata.author, metadata.title)
}

/// Store-side predicate selecting every chunk of one book.
fn book_filter(metadata: &BookMetadata) -> Value {
    json!({
        "$and": [
            { "book_author": { "$eq": metadata.author } },
            { "book_title": { "$eq": metadata.title } },
        ]
    })
}

/// Orchestrates hash, parse, chunk, embed, persist, and ledger bookkeeping
/// for single books and whole libraries. Owns the ledger exclusively; books
/// are processed strictly one at a time.
pub struct IngestionEngine<P, S, E> {
    parser: P,
    store: S,
    embedder: EmbeddingClient<E>,
    ledger: IndexLedger,
    config: SystemConfig,
}

impl<P, S, E> IngestionEngine<P, S, E>
where
    P: BookParser,
    S: VectorStore,
    E: EmbeddingProvider,
{
    pub fn new(
        parser: P,
        store: S,
        embedder: EmbeddingClient<E>,
        ledger: IndexLedger,
        config: SystemConfig,
    ) -> Self {
        Self {
            parser,
            store,
            embedder,
            ledger,
            config,
        }
    }

    /// Ingests one book. Unless `force` is set, a book whose content hash
    /// matches its ledger entry is skipped without touching the store.
    pub async fn ingest_book(
        &mut self,
        path: &Path,
        force: bool,
    ) -> Result<IngestOutcome, IngestError> {
        let content_hash = digest_file(path)?;
        let parsed = self.parser.parse(path)?;
        let key = document_key(&parsed.metadata);

        if !force && self.ledger.is_current(&key, &content_hash) {
            return Ok(IngestOutcome::Unchanged);
        }

        let mut chunks: Vec<TextChunk> = Vec::new();
        for chapter in &parsed.chapters {
            chunks.extend(build_chunks(chapter, &parsed.metadata, &self.config.chunking));
        }
        if chunks.is_empty() {
            // not recorded, so the book is retried on the next pass
            return Ok(IngestOutcome::Empty);
        }

        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
        let vectors = self.embedder.embed(&texts).await?;

        let ids: Vec<String> = chunks.iter().map(TextChunk::chunk_id).collect();
        let metadatas: Vec<Value> = chunks.iter().map(TextChunk::store_metadata).collect();

        self.store.ensure_collection().await?;
        // a shrunk re-ingestion must not leave stale chunks behind
        self.store.delete_where(book_filter(&parsed.metadata)).await?;
        self.store.upsert(&ids, &vectors, &texts, &metadatas).await?;

        let chapter_chunks = chunks
            .iter()
            .filter(|chunk| chunk.kind == ChunkKind::Chapter)
            .count();
        let paragraph_chunks = chunks.len() - chapter_chunks;

        self.ledger
            .record(&key, path, &content_hash, chapter_chunks, paragraph_chunks)?;

        Ok(IngestOutcome::Indexed {
            chapter_chunks,
            paragraph_chunks,
        })
    }

    /// Ingests every discovered book, one at a time. A failing book is
    /// logged and counted but never aborts the pass; ledger entries are
    /// flushed per book, so prior progress survives any failure.
    pub async fn ingest_library(&mut self, force: bool) -> LibraryReport {
        let files = self.discover_books();
        let mut report = LibraryReport {
            found: files.len(),
            ..LibraryReport::default()
        };

        for path in files {
            match self.ingest_book(&path, force).await {
                Ok(IngestOutcome::Indexed {
                    chapter_chunks,
                    paragraph_chunks,
                }) => {
                    report.processed += 1;
                    report.chapter_chunks += chapter_chunks;
                    report.paragraph_chunks += paragraph_chunks;
                    info!(
                        path = %path.display(),
                        chapter_chunks,
                        paragraph_chunks,
                        "book indexed"
                    );
                }
                Ok(IngestOutcome::Unchanged) => {
                    report.skipped += 1;
                    debug!(path = %path.display(), "book unchanged, skipped");
                }
                Ok(IngestOutcome::Empty) => {
                    report.skipped += 1;
                    warn!(path = %path.display(), "book produced no chunks");
                }
                Err(error) => {
                    report.failed += 1;
                    warn!(path = %path.display(), %error, "book ingestion failed");
                }
            }
        }

        report
    }

    /// All parseable book files under the library root, sorted, excluding
    /// anything inside the system's own data directory.
    pub fn discover_books(&self) -> Vec<PathBuf> {
        let extensions = self.parser.extensions();
        let mut files = Vec::new();

        for entry in WalkDir::new(&self.config.paths.books_root)
            .into_iter()
            .filter_map(|item| item.ok())
        {
            if !entry.file_type().is_file() {
                continue;
            }
            if self.config.paths.is_inside_data_dir(entry.path()) {
                continue;
            }

            let matches = entry
                .path()
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| {
                    extensions
                        .iter()
                        .any(|known| known.eq_ignore_ascii_case(ext))
                });

            if matches {
                files.push(entry.path().to_path_buf());
            }
        }

        files.sort_unstable();
        files
    }

    /// Drops the whole collection and the ledger. The collection is only
    /// recreated by the next ingestion; searching a cleared index fails
    /// until then.
    pub async fn clear_index(&mut self) -> Result<(), IngestError> {
        self.store.delete_collection().await?;
        self.ledger.clear()?;
        info!("index cleared");
        Ok(())
    }

    pub fn status(&self) -> LedgerStats {
        self.ledger.stats()
    }

    /// Live row count from the vector store.
    pub async fn stored_chunk_count(&self) -> Result<usize, IngestError> {
        Ok(self.store.count().await?)
    }
}
