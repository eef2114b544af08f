//! HTTP embedding client (OpenAI-compatible request shape)
//!
//! Payload is `{"input": [...], "model": "..."}`. Responses are accepted in
//! either the OpenAI shape (`data[i].embedding`) or the alternate provider
//! shape (`embeddings[i].vector`). The credential travels as both
//! `Authorization: Bearer` and `apikey` headers.

use std::time::Duration;

use rand::Rng;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use async_trait::async_trait;
use mnemo_core::{EmbeddingProvider, MemoryError, Result};

/// Maximum inputs per provider request
pub const MAX_BATCH_SIZE: usize = 64;
/// Retry attempts for transient provider failures
const MAX_ATTEMPTS: u32 = 3;
/// Base retry delay
const RETRY_BASE: Duration = Duration::from_millis(500);
/// Retry delay cap
const RETRY_CAP: Duration = Duration::from_secs(5);

/// Client configuration
#[derive(Debug, Clone)]
pub struct EmbeddingClientConfig {
    /// Provider endpoint, e.g. `https://api.openai.com/v1/embeddings`
    pub url: String,
    /// Credential sent as bearer token and `apikey` header
    pub api_key: Option<String>,
    /// Model identifier sent with every request
    pub model: String,
    /// Declared output dimension; every vector is validated against it
    pub dimension: usize,
    /// Total deadline per HTTP call
    pub request_timeout: Duration,
    /// TCP connect timeout
    pub connect_timeout: Duration,
}

impl EmbeddingClientConfig {
    /// Configuration with default timeouts (30 s total, 10 s connect)
    #[must_use]
    pub fn new(url: impl Into<String>, model: impl Into<String>, dimension: usize) -> Self {
        Self {
            url: url.into(),
            api_key: None,
            model: model.into(),
            dimension,
            request_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
        }
    }

    /// Set the credential
    #[must_use]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }
}

/// Batched embedding client with retry and dimension validation
pub struct HttpEmbeddingClient {
    config: EmbeddingClientConfig,
    client: reqwest::Client,
}

impl HttpEmbeddingClient {
    /// Build the client
    ///
    /// # Errors
    ///
    /// `Config` when the underlying HTTP client cannot be constructed.
    pub fn new(config: EmbeddingClientConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| MemoryError::Config(format!("http client construction failed: {e}")))?;
        Ok(Self { config, client })
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let request = EmbeddingRequest {
            input: texts,
            model: &self.config.model,
        };

        let mut attempt: u32 = 0;
        let response = loop {
            match self.send_once(&request).await {
                Ok(response) => break response,
                Err(err) if err.is_transient() && attempt + 1 < MAX_ATTEMPTS => {
                    let delay = jittered_delay(attempt);
                    warn!(
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient embedding failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        };

        let vectors = response.into_vectors();
        if vectors.len() != texts.len() {
            return Err(MemoryError::embedding(format!(
                "provider returned {} embeddings for {} inputs",
                vectors.len(),
                texts.len()
            )));
        }
        for vector in &vectors {
            if vector.len() != self.config.dimension {
                return Err(MemoryError::embedding(format!(
                    "provider returned dimension {} but {} is configured",
                    vector.len(),
                    self.config.dimension
                )));
            }
        }
        Ok(vectors)
    }

    async fn send_once(&self, request: &EmbeddingRequest<'_>) -> Result<EmbeddingResponse> {
        let mut builder = self.client.post(&self.config.url).json(request);
        if let Some(key) = &self.config.api_key {
            builder = builder.bearer_auth(key).header("apikey", key);
        }

        let response = builder.send().await.map_err(|e| {
            MemoryError::embedding_transient(format!("embedding request failed: {e}"))
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = format!("embedding provider returned {status}: {body}");
            // 5xx and 429 are worth retrying; other 4xx are caller errors.
            return if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
                Err(MemoryError::embedding_transient(message))
            } else {
                Err(MemoryError::embedding(message))
            };
        }

        response
            .json::<EmbeddingResponse>()
            .await
            .map_err(|e| MemoryError::embedding(format!("embedding response parse failed: {e}")))
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingClient {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(MAX_BATCH_SIZE) {
            vectors.extend(self.embed_batch(batch).await?);
        }
        debug!(count = vectors.len(), "embedded documents");
        Ok(vectors)
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        // Documented behavior: empty query maps to the zero vector.
        if text.is_empty() {
            return Ok(vec![0.0; self.config.dimension]);
        }

        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| MemoryError::embedding("provider returned no embedding"))
    }

    fn dimension(&self) -> usize {
        self.config.dimension
    }

    fn model_id(&self) -> &str {
        &self.config.model
    }
}

fn jittered_delay(attempt: u32) -> Duration {
    let exp = RETRY_BASE.saturating_mul(1_u32 << attempt.min(8));
    let ceiling = exp.min(RETRY_CAP);
    let half = ceiling / 2;
    if half.is_zero() {
        return ceiling;
    }
    let jitter_ms = rand::thread_rng().gen_range(0..=half.as_millis() as u64);
    half + Duration::from_millis(jitter_ms)
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    input: &'a [String],
    model: &'a str,
}

/// Accepts both `data[].embedding` and `embeddings[].vector` shapes
#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    #[serde(default)]
    data: Vec<EmbeddingItem>,
    #[serde(default)]
    embeddings: Vec<EmbeddingItem>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingItem {
    #[serde(default)]
    embedding: Option<Vec<f32>>,
    #[serde(default)]
    vector: Option<Vec<f32>>,
}

impl EmbeddingResponse {
    fn into_vectors(self) -> Vec<Vec<f32>> {
        let items = if self.data.is_empty() {
            self.embeddings
        } else {
            self.data
        };
        items
            .into_iter()
            .filter_map(|item| item.embedding.or(item.vector))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(dimension: usize) -> HttpEmbeddingClient {
        HttpEmbeddingClient::new(EmbeddingClientConfig::new(
            "http://localhost:1/v1/embeddings",
            "text-embedding-3-large",
            dimension,
        ))
        .unwrap()
    }

    #[tokio::test]
    async fn empty_documents_make_no_http_call() {
        // The endpoint is unreachable, so any HTTP attempt would error.
        let result = client(8).embed_documents(&[]).await.unwrap();
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn empty_query_is_the_zero_vector() {
        let vector = client(8).embed_query("").await.unwrap();
        assert_eq!(vector, vec![0.0; 8]);
    }

    #[test]
    fn openai_response_shape_parses() {
        let raw = r#"{"data":[{"embedding":[0.1,0.2]},{"embedding":[0.3,0.4]}],"model":"m"}"#;
        let response: EmbeddingResponse = serde_json::from_str(raw).unwrap();
        let vectors = response.into_vectors();
        assert_eq!(vectors.len(), 2);
        assert_eq!(vectors[0], vec![0.1, 0.2]);
    }

    #[test]
    fn alternate_response_shape_parses() {
        let raw = r#"{"embeddings":[{"vector":[1.0,2.0]}]}"#;
        let response: EmbeddingResponse = serde_json::from_str(raw).unwrap();
        let vectors = response.into_vectors();
        assert_eq!(vectors, vec![vec![1.0, 2.0]]);
    }

    #[test]
    fn retry_delay_stays_under_cap() {
        for attempt in 0..6 {
            assert!(jittered_delay(attempt) <= RETRY_CAP);
        }
    }
}
