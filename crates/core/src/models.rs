use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Book-level metadata handed over by the document parser. Optional fields
/// are filled with defaults by the parser, never left to error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookMetadata {
    pub title: String,
    pub author: String,
    pub language: Option<String>,
    pub publisher: Option<String>,
}

/// One chapter of a parsed book, in reading order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chapter {
    pub title: String,
    pub body: String,
    pub number: u32,
    pub word_count: usize,
}

/// A parsed book: metadata plus its chapters in order.
#[derive(Debug, Clone)]
pub struct ParsedBook {
    pub metadata: BookMetadata,
    pub chapters: Vec<Chapter>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChunkKind {
    Chapter,
    Paragraph,
}

impl ChunkKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ChunkKind::Chapter => "chapter",
            ChunkKind::Paragraph => "paragraph",
        }
    }
}

/// One indexable unit of text at a given granularity. Immutable once built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextChunk {
    pub text: String,
    pub kind: ChunkKind,
    pub book_title: String,
    pub book_author: String,
    pub chapter_title: Option<String>,
    pub chapter_number: Option<u32>,
    pub chunk_index: u32,
    pub word_count: usize,
}

impl TextChunk {
    /// Deterministic identity key. Re-ingesting byte-identical content
    /// produces the same ids, so store writes are idempotent upserts.
    pub fn chunk_id(&self) -> String {
        let base = format!(
            "{}_{}_{}",
            self.book_author,
            self.book_title,
            self.kind.as_str()
        );
        let chapter = self.chapter_number.unwrap_or(0);
        match self.kind {
            ChunkKind::Chapter => format!("{base}_ch{chapter}"),
            ChunkKind::Paragraph => format!("{base}_ch{chapter}_p{}", self.chunk_index),
        }
    }

    /// Flat metadata for the vector store. Optional fields collapse to
    /// `""`/`0` because store metadata values are scalar only.
    pub fn store_metadata(&self) -> Value {
        json!({
            "chunk_kind": self.kind.as_str(),
            "book_title": self.book_title,
            "book_author": self.book_author,
            "chapter_title": self.chapter_title.clone().unwrap_or_default(),
            "chapter_number": self.chapter_number.unwrap_or(0),
            "chunk_index": self.chunk_index,
            "word_count": self.word_count,
        })
    }
}

/// Result of ingesting a single book. `Unchanged` and `Empty` are distinct
/// so callers can tell "already indexed" from "indexed nothing".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// The ledger already holds this document key at the current content hash.
    Unchanged,
    /// The book parsed but produced zero chunks; the ledger is untouched so
    /// the book is retried on every future pass.
    Empty,
    Indexed {
        chapter_chunks: usize,
        paragraph_chunks: usize,
    },
}

/// Aggregate outcome of a library-wide ingestion pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LibraryReport {
    pub found: usize,
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub chapter_chunks: usize,
    pub paragraph_chunks: usize,
}

/// A single retrieval hit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub book_title: String,
    pub book_author: String,
    pub chapter_title: String,
    pub chapter_number: u32,
    pub kind: ChunkKind,
    pub word_count: usize,
    pub text: String,
    /// `1 - distance` under the store's native metric. Only comparable
    /// within one index and one metric; in [0, 1] for cosine only.
    pub similarity: f64,
}

impl SearchHit {
    pub fn preview(&self, max_chars: usize) -> String {
        if self.text.chars().count() <= max_chars {
            return self.text.clone();
        }
        let cut: String = self.text.chars().take(max_chars).collect();
        format!("{cut}...")
    }
}

/// A free-text retrieval request with optional metadata filters.
#[derive(Debug, Clone, Default)]
pub struct SearchRequest {
    pub query: String,
    pub limit: Option<usize>,
    /// Equality filter applied store-side, before ranking.
    pub kind: Option<ChunkKind>,
    /// Case-insensitive substring match, applied in-process after ranking.
    pub author: Option<String>,
    /// Case-insensitive substring match, applied in-process after ranking.
    pub book_title: Option<String>,
}

/// Ledger entry for one ingested book, keyed by `author/title`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub content_hash: String,
    pub source_path: String,
    pub chapter_chunks: usize,
    pub paragraph_chunks: usize,
    pub indexed_at: DateTime<Utc>,
}

/// Statistics derived from the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerStats {
    pub books: usize,
    pub chapter_chunks: usize,
    pub paragraph_chunks: usize,
    pub last_update: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(kind: ChunkKind, chapter: u32, index: u32) -> TextChunk {
        TextChunk {
            text: "body".to_string(),
            kind,
            book_title: "Walden".to_string(),
            book_author: "Thoreau".to_string(),
            chapter_title: Some("Economy".to_string()),
            chapter_number: Some(chapter),
            chunk_index: index,
            word_count: 1,
        }
    }

    #[test]
    fn chunk_ids_encode_granularity_and_position() {
        assert_eq!(
            chunk(ChunkKind::Chapter, 2, 0).chunk_id(),
            "Thoreau_Walden_chapter_ch2"
        );
        assert_eq!(
            chunk(ChunkKind::Paragraph, 2, 5).chunk_id(),
            "Thoreau_Walden_paragraph_ch2_p5"
        );
    }

    #[test]
    fn chunk_ids_are_stable_across_rebuilds() {
        assert_eq!(
            chunk(ChunkKind::Paragraph, 1, 3).chunk_id(),
            chunk(ChunkKind::Paragraph, 1, 3).chunk_id()
        );
    }

    #[test]
    fn store_metadata_flattens_optionals_to_scalars() {
        let mut unnumbered = chunk(ChunkKind::Paragraph, 1, 0);
        unnumbered.chapter_number = None;
        unnumbered.chapter_title = None;

        let metadata = unnumbered.store_metadata();
        assert_eq!(metadata["chapter_number"], 0);
        assert_eq!(metadata["chapter_title"], "");
        assert_eq!(metadata["chunk_kind"], "paragraph");
    }

    #[test]
    fn preview_truncates_with_ellipsis() {
        let hit = SearchHit {
            book_title: "Walden".to_string(),
            book_author: "Thoreau".to_string(),
            chapter_title: "Economy".to_string(),
            chapter_number: 1,
            kind: ChunkKind::Paragraph,
            word_count: 1,
            text: "abcdefghij".to_string(),
            similarity: 0.5,
        };
        assert_eq!(hit.preview(4), "abcd...");
        assert_eq!(hit.preview(20), "abcdefghij");
    }
}
