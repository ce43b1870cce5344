pub mod chunking;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod ingest;
pub mod ledger;
pub mod models;
pub mod parser;
pub mod search;
pub mod stores;
pub mod traits;

pub use chunking::{build_chunks, estimate_tokens};
pub use config::{
    ChunkingConfig, EmbeddingConfig, LibraryPaths, SearchConfig, StoreConfig, SystemConfig,
};
pub use embeddings::{EmbeddingClient, EmbeddingProvider, OpenAiProvider};
pub use error::{EmbeddingError, IngestError, SearchError, StoreError};
pub use ingest::{digest_file, document_key, IngestionEngine};
pub use ledger::IndexLedger;
pub use models::{
    BookMetadata, Chapter, ChunkKind, IngestOutcome, LedgerEntry, LedgerStats, LibraryReport,
    ParsedBook, SearchHit, SearchRequest, TextChunk,
};
pub use parser::{BookParser, PlainTextParser};
pub use search::SearchEngine;
pub use stores::ChromaStore;
pub use traits::{StoredRecord, VectorStore};
