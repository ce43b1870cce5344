use crate::error::IngestError;
use crate::models::{LedgerEntry, LedgerStats};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct LedgerData {
    #[serde(default)]
    indexed_books: BTreeMap<String, LedgerEntry>,
    #[serde(default)]
    total_indexed: usize,
    #[serde(default)]
    last_update: Option<DateTime<Utc>>,
}

/// Durable record of which books have been ingested and at what content
/// version. One JSON file, loaded fully at open and rewritten fully after
/// every mutation; a crash mid-write can corrupt it, which surfaces as
/// [`IngestError::LedgerCorruption`] at the next open.
#[derive(Debug)]
pub struct IndexLedger {
    path: PathBuf,
    data: LedgerData,
}

impl IndexLedger {
    /// Opens the ledger at `path`. A missing file is an empty ledger; a
    /// malformed one is corruption and is never repaired automatically.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, IngestError> {
        let path = path.into();
        let data = if path.exists() {
            let raw = fs::read_to_string(&path)?;
            serde_json::from_str(&raw).map_err(|error| {
                IngestError::LedgerCorruption(format!("{}: {error}", path.display()))
            })?
        } else {
            LedgerData::default()
        };
        Ok(Self { path, data })
    }

    /// True iff `document_key` is recorded at exactly `content_hash`. This
    /// is the sole incremental-update signal.
    pub fn is_current(&self, document_key: &str, content_hash: &str) -> bool {
        self.data
            .indexed_books
            .get(document_key)
            .is_some_and(|entry| entry.content_hash == content_hash)
    }

    pub fn entry(&self, document_key: &str) -> Option<&LedgerEntry> {
        self.data.indexed_books.get(document_key)
    }

    /// Adds or overwrites the entry for `document_key` and persists at once.
    pub fn record(
        &mut self,
        document_key: &str,
        source_path: &Path,
        content_hash: &str,
        chapter_chunks: usize,
        paragraph_chunks: usize,
    ) -> Result<(), IngestError> {
        let now = Utc::now();
        self.data.indexed_books.insert(
            document_key.to_string(),
            LedgerEntry {
                content_hash: content_hash.to_string(),
                source_path: source_path.to_string_lossy().to_string(),
                chapter_chunks,
                paragraph_chunks,
                indexed_at: now,
            },
        );
        self.data.total_indexed = self.data.indexed_books.len();
        self.data.last_update = Some(now);
        self.persist()
    }

    pub fn clear(&mut self) -> Result<(), IngestError> {
        self.data = LedgerData::default();
        self.persist()
    }

    pub fn stats(&self) -> LedgerStats {
        let chapter_chunks = self
            .data
            .indexed_books
            .values()
            .map(|entry| entry.chapter_chunks)
            .sum();
        let paragraph_chunks = self
            .data
            .indexed_books
            .values()
            .map(|entry| entry.paragraph_chunks)
            .sum();
        LedgerStats {
            books: self.data.indexed_books.len(),
            chapter_chunks,
            paragraph_chunks,
            last_update: self.data.last_update,
        }
    }

    fn persist(&self) -> Result<(), IngestError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let raw = serde_json::to_string_pretty(&self.data)?;
        fs::write(&self.path, raw)?;
        Ok(())
    }
}
