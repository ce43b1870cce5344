use thiserror::Error;

#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// The provider rejected the request for exceeding its token/length
    /// limit. This signature drives the adaptive-batching ceiling descent.
    #[error("embedding request over token limit: {0}")]
    TokenLimit(String),

    #[error("embedding provider error: {0}")]
    Provider(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

impl EmbeddingError {
    pub fn is_token_limit(&self) -> bool {
        matches!(self, EmbeddingError::TokenLimit(_))
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("collection not found: {0}")]
    MissingCollection(String),

    #[error("invalid response from {backend}: {details}")]
    Backend { backend: String, details: String },
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("document parse error: {0}")]
    Parse(String),

    #[error("path has no file name: {0}")]
    MissingFileName(String),

    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("ledger file is corrupt: {0}")]
    LedgerCorruption(String),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("index not initialized (collection {0} does not exist); run ingestion first")]
    IndexNotInitialized(String),

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error(transparent)]
    Store(StoreError),
}

impl SearchError {
    /// A missing collection means nothing was ever ingested; other store
    /// failures keep their own identity.
    pub fn from_store(error: StoreError) -> Self {
        match error {
            StoreError::MissingCollection(name) => SearchError::IndexNotInitialized(name),
            other => SearchError::Store(other),
        }
    }
}

pub type Result<T, E = IngestError> = std::result::Result<T, E>;
