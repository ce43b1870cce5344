use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Size bands for the two chunk granularities, in estimated tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    pub chapter_min_tokens: usize,
    pub chapter_max_tokens: usize,
    pub paragraph_min_tokens: usize,
    pub paragraph_max_tokens: usize,
    /// A trailing paragraph at most this many tokens is repeated into the
    /// next paragraph chunk. Zero disables overlap.
    pub overlap_tokens: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chapter_min_tokens: 2_000,
            chapter_max_tokens: 5_000,
            paragraph_min_tokens: 300,
            paragraph_max_tokens: 500,
            overlap_tokens: 50,
        }
    }
}

/// Embedding provider settings, passed to the client at construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub api_base: String,
    pub api_key: String,
    pub model: String,
    /// Retry budget per batch request.
    pub max_retries: u32,
    /// First backoff delay; doubles on every further attempt.
    pub base_delay_ms: u64,
    /// Descending per-batch token ceilings for adaptive batching.
    pub token_ceilings: Vec<usize>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.openai.com/v1".to_string(),
            api_key: String::new(),
            model: "text-embedding-3-small".to_string(),
            max_retries: 3,
            base_delay_ms: 1_000,
            token_ceilings: vec![5_500, 4_000, 3_000, 2_000, 1_500],
        }
    }
}

/// Vector store connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub endpoint: String,
    pub collection: String,
    pub distance_metric: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8000".to_string(),
            collection: "book_chunks".to_string(),
            distance_metric: "cosine".to_string(),
        }
    }
}

/// Result-count bounds for retrieval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    pub default_results: usize,
    pub max_results: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_results: 10,
            max_results: 50,
        }
    }
}

/// Filesystem layout: where books live and where the system keeps its data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryPaths {
    pub books_root: PathBuf,
    /// Excluded from book discovery.
    pub data_dir: PathBuf,
    pub ledger_file: PathBuf,
}

impl LibraryPaths {
    /// Standard layout under a library root: data in `<root>/.book-search`.
    pub fn rooted(books_root: impl Into<PathBuf>) -> Self {
        let books_root = books_root.into();
        let data_dir = books_root.join(".book-search");
        let ledger_file = data_dir.join("ledger.json");
        Self {
            books_root,
            data_dir,
            ledger_file,
        }
    }

    pub fn is_inside_data_dir(&self, path: &Path) -> bool {
        path.starts_with(&self.data_dir)
    }
}

/// Explicit configuration handed to each component at construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemConfig {
    pub paths: LibraryPaths,
    pub chunking: ChunkingConfig,
    pub embedding: EmbeddingConfig,
    pub store: StoreConfig,
    pub search: SearchConfig,
}

impl SystemConfig {
    pub fn rooted(books_root: impl Into<PathBuf>) -> Self {
        Self {
            paths: LibraryPaths::rooted(books_root),
            chunking: ChunkingConfig::default(),
            embedding: EmbeddingConfig::default(),
            store: StoreConfig::default(),
            search: SearchConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rooted_layout_nests_data_under_root() {
        let config = SystemConfig::rooted("/library");
        assert_eq!(config.paths.books_root, PathBuf::from("/library"));
        assert_eq!(config.paths.data_dir, PathBuf::from("/library/.book-search"));
        assert_eq!(
            config.paths.ledger_file,
            PathBuf::from("/library/.book-search/ledger.json")
        );
    }

    #[test]
    fn data_dir_is_recognized_for_exclusion() {
        let paths = LibraryPaths::rooted("/library");
        assert!(paths.is_inside_data_dir(Path::new("/library/.book-search/ledger.json")));
        assert!(!paths.is_inside_data_dir(Path::new("/library/walden.txt")));
    }

    #[test]
    fn chunking_defaults_keep_bands_ordered() {
        let bands = ChunkingConfig::default();
        assert!(bands.chapter_min_tokens < bands.chapter_max_tokens);
        assert!(bands.paragraph_min_tokens < bands.paragraph_max_tokens);
        assert!(bands.paragraph_max_tokens < bands.chapter_min_tokens);
    }
}
