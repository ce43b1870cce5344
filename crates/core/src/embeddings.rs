use crate::config::EmbeddingConfig;
use crate::error::EmbeddingError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

/// Request-side token estimate: roughly four characters per token.
const CHARS_PER_TOKEN: usize = 4;

pub fn estimate_request_tokens(text: &str) -> usize {
    text.chars().count() / CHARS_PER_TOKEN
}

/// External embedding provider: a list of texts in, one vector per text out,
/// order-preserving. Token/length overflow must surface as
/// [`EmbeddingError::TokenLimit`] so the client can shrink its batches.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn create_embeddings(
        &self,
        model: &str,
        inputs: &[String],
    ) -> Result<Vec<Vec<f32>>, EmbeddingError>;
}

/// Splits `texts` into batches whose estimated token sum stays under
/// `ceiling`. A text too large on its own is hard-truncated to fit; a batch
/// closes before the text that would overflow it; no batch is empty.
pub fn partition_batches(texts: &[String], ceiling: usize) -> Vec<Vec<String>> {
    let mut batches = Vec::new();
    let mut current: Vec<String> = Vec::new();
    let mut current_tokens = 0usize;

    for text in texts {
        let mut text = text.clone();
        let mut tokens = estimate_request_tokens(&text);
        if tokens > ceiling {
            text = text.chars().take(ceiling * CHARS_PER_TOKEN).collect();
            tokens = ceiling;
        }

        if !current.is_empty() && current_tokens + tokens > ceiling {
            batches.push(std::mem::take(&mut current));
            current_tokens = 0;
        }

        current.push(text);
        current_tokens += tokens;
    }

    if !current.is_empty() {
        batches.push(current);
    }

    batches
}

/// Order-preserving batch embedding over an [`EmbeddingProvider`], with
/// bounded retries per batch and adaptive per-batch token ceilings.
pub struct EmbeddingClient<P> {
    provider: P,
    config: EmbeddingConfig,
}

impl<P: EmbeddingProvider> EmbeddingClient<P> {
    pub fn new(provider: P, config: EmbeddingConfig) -> Self {
        Self { provider, config }
    }

    /// Embeds every text, returning one vector per input in input order.
    ///
    /// Each candidate ceiling partitions the inputs afresh; a token-limit
    /// failure that survives the retry budget abandons the ceiling and
    /// restarts at the next smaller one. Any other failure propagates
    /// immediately. No state is kept between calls.
    pub async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut last_error = None;
        let ceilings = &self.config.token_ceilings;

        for (position, &ceiling) in ceilings.iter().enumerate() {
            match self.embed_at_ceiling(texts, ceiling).await {
                Ok(vectors) => return Ok(vectors),
                Err(error) => {
                    let smaller_remains = position + 1 < ceilings.len();
                    if error.is_token_limit() && smaller_remains {
                        warn!(ceiling, %error, "token ceiling rejected, shrinking batches");
                        last_error = Some(error);
                        continue;
                    }
                    return Err(error);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| EmbeddingError::Provider("no token ceilings configured".to_string())))
    }

    async fn embed_at_ceiling(
        &self,
        texts: &[String],
        ceiling: usize,
    ) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in partition_batches(texts, ceiling) {
            vectors.extend(self.call_with_retry(&batch).await?);
        }
        Ok(vectors)
    }

    async fn call_with_retry(&self, batch: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let mut attempt = 0u32;
        loop {
            match self.provider.create_embeddings(&self.config.model, batch).await {
                Ok(vectors) => {
                    if vectors.len() != batch.len() {
                        return Err(EmbeddingError::Provider(format!(
                            "provider returned {} vectors for {} inputs",
                            vectors.len(),
                            batch.len()
                        )));
                    }
                    return Ok(vectors);
                }
                Err(error) => {
                    attempt += 1;
                    if attempt >= self.config.max_retries.max(1) {
                        return Err(error);
                    }
                    let delay = self.config.base_delay_ms << (attempt - 1);
                    warn!(attempt, delay_ms = delay, %error, "embedding request failed, backing off");
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                }
            }
        }
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingRow>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingRow {
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<ApiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// OpenAI-compatible `/embeddings` endpoint over HTTP.
pub struct OpenAiProvider {
    client: reqwest::Client,
    api_base: String,
    api_key: String,
}

impl OpenAiProvider {
    pub fn new(api_base: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: api_base.into(),
            api_key: api_key.into(),
        }
    }

    pub fn from_config(config: &EmbeddingConfig) -> Self {
        Self::new(config.api_base.clone(), config.api_key.clone())
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiProvider {
    async fn create_embeddings(
        &self,
        model: &str,
        inputs: &[String],
    ) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let response = self
            .client
            .post(format!(
                "{}/embeddings",
                self.api_base.trim_end_matches('/')
            ))
            .bearer_auth(&self.api_key)
            .json(&EmbeddingsRequest { model, input: inputs })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let message = response
                .json::<ApiErrorBody>()
                .await
                .ok()
                .and_then(|body| body.error)
                .map(|detail| detail.message)
                .unwrap_or_else(|| status.to_string());

            let lowered = message.to_lowercase();
            if lowered.contains("maximum context length") || lowered.contains("token") {
                return Err(EmbeddingError::TokenLimit(message));
            }
            return Err(EmbeddingError::Provider(message));
        }

        let parsed: EmbeddingsResponse = response.json().await?;
        let mut rows = parsed.data;
        rows.sort_by_key(|row| row.index);
        Ok(rows.into_iter().map(|row| row.embedding).collect())
    }
}
