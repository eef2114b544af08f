//! Cross-encoder reranking
//!
//! A reranker scores `(query, document)` pairs directly through a
//! pluggable [`RerankModel`], remote (HTTP) or local. The model is loaded
//! lazily: the first call blocks on initialization, later calls reuse the
//! loaded instance lock-free.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::{debug, info};

use async_trait::async_trait;
use mnemo_core::{MemoryError, RerankModel, Result};

use crate::fusion::{HybridRetriever, RankedResult};

/// Default scoring batch size
pub const DEFAULT_BATCH_SIZE: usize = 32;
/// Default candidate pool handed to the reranker by the integrated flow
pub const DEFAULT_RERANK_TOP_K: usize = 100;

/// Candidate entering the reranker: `(doc_id, initial_score, content)`
pub type RerankCandidate = (String, f32, String);

type Loader = Box<dyn FnOnce() -> Result<Arc<dyn RerankModel>> + Send>;

/// Batched reranker over a lazily-initialized model
pub struct CrossEncoderReranker {
    model: OnceCell<Arc<dyn RerankModel>>,
    loader: Mutex<Option<Loader>>,
    batch_size: usize,
}

impl CrossEncoderReranker {
    /// Reranker over an already-constructed model
    #[must_use]
    pub fn new(model: Arc<dyn RerankModel>) -> Self {
        let cell = OnceCell::new();
        cell.set(model).ok();
        Self {
            model: cell,
            loader: Mutex::new(None),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Reranker whose model is constructed on first use
    #[must_use]
    pub fn lazy(loader: impl FnOnce() -> Result<Arc<dyn RerankModel>> + Send + 'static) -> Self {
        Self {
            model: OnceCell::new(),
            loader: Mutex::new(Some(Box::new(loader))),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Override the scoring batch size
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    async fn model(&self) -> Result<&Arc<dyn RerankModel>> {
        self.model
            .get_or_try_init(|| async move {
                let loader = self.loader.lock().take().ok_or_else(|| {
                    MemoryError::Config("reranker model loader already consumed".into())
                })?;
                let model = loader()?;
                info!(model = model.model_id(), "reranker model initialized");
                Ok(model)
            })
            .await
    }

    /// Score all candidates and return them in descending score order
    ///
    /// Every candidate is scored in batches of the configured size.
    /// `top_k = Some(n)` truncates the reranked list.
    pub async fn rerank(
        &self,
        query: &str,
        candidates: Vec<RerankCandidate>,
        top_k: Option<usize>,
    ) -> Result<Vec<RerankCandidate>> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let model = self.model().await?;

        let mut scores = Vec::with_capacity(candidates.len());
        for batch in candidates.chunks(self.batch_size) {
            let pairs: Vec<(String, String)> = batch
                .iter()
                .map(|(_, _, content)| (query.to_string(), content.clone()))
                .collect();
            let batch_scores = model.score(&pairs).await?;
            if batch_scores.len() != batch.len() {
                return Err(MemoryError::Config(format!(
                    "reranker returned {} scores for {} pairs",
                    batch_scores.len(),
                    batch.len()
                )));
            }
            scores.extend(batch_scores);
        }

        let mut reranked: Vec<RerankCandidate> = candidates
            .into_iter()
            .zip(scores)
            .map(|((doc_id, _initial, content), score)| (doc_id, score, content))
            .collect();

        reranked.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        if let Some(top_k) = top_k {
            reranked.truncate(top_k);
        }
        debug!(results = reranked.len(), "rerank complete");
        Ok(reranked)
    }
}

/// Remote reranker model speaking a JSON pairs/scores contract
///
/// Request: `{"model": ..., "pairs": [[query, text], ...]}`.
/// Response: `{"scores": [...]}` with one score per pair.
pub struct HttpRerankModel {
    url: String,
    api_key: Option<String>,
    model: String,
    client: reqwest::Client,
}

impl HttpRerankModel {
    /// Build a remote model client
    ///
    /// # Errors
    ///
    /// `Config` when the HTTP client cannot be constructed.
    pub fn new(
        url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .connect_timeout(std::time::Duration::from_secs(10))
            .build()
            .map_err(|e| MemoryError::Config(format!("http client construction failed: {e}")))?;
        Ok(Self {
            url: url.into(),
            api_key,
            model: model.into(),
            client,
        })
    }
}

#[derive(Debug, Serialize)]
struct RerankRequest<'a> {
    model: &'a str,
    pairs: &'a [(String, String)],
}

#[derive(Debug, Deserialize)]
struct RerankResponse {
    scores: Vec<f32>,
}

#[async_trait]
impl RerankModel for HttpRerankModel {
    async fn score(&self, pairs: &[(String, String)]) -> Result<Vec<f32>> {
        if pairs.is_empty() {
            return Ok(Vec::new());
        }

        let request = RerankRequest {
            model: &self.model,
            pairs,
        };
        let mut builder = self.client.post(&self.url).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| MemoryError::embedding_transient(format!("rerank request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = format!("reranker returned {status}: {body}");
            return if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
                Err(MemoryError::embedding_transient(message))
            } else {
                Err(MemoryError::embedding(message))
            };
        }

        let parsed: RerankResponse = response
            .json()
            .await
            .map_err(|e| MemoryError::embedding(format!("rerank response parse failed: {e}")))?;
        Ok(parsed.scores)
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

/// Hybrid retrieval followed by cross-encoder reranking
///
/// Retrieves a large candidate pool from the hybrid retriever, attaches
/// full document content from the injected `doc_id -> content` map, and
/// reranks down to the requested size.
pub struct HybridRetrieverWithReranking {
    hybrid: HybridRetriever,
    reranker: CrossEncoderReranker,
    rerank_top_k: usize,
}

impl HybridRetrieverWithReranking {
    /// Compose a hybrid retriever and reranker
    #[must_use]
    pub const fn new(hybrid: HybridRetriever, reranker: CrossEncoderReranker) -> Self {
        Self {
            hybrid,
            reranker,
            rerank_top_k: DEFAULT_RERANK_TOP_K,
        }
    }

    /// Override the pre-rerank candidate pool size
    #[must_use]
    pub const fn with_rerank_top_k(mut self, rerank_top_k: usize) -> Self {
        self.rerank_top_k = rerank_top_k;
        self
    }

    /// Retrieve, attach content, rerank, truncate to `top_k`
    ///
    /// Candidates missing from `content` fall back to their doc id as
    /// scoring text.
    pub async fn search(
        &self,
        query: &str,
        top_k: usize,
        content: &HashMap<String, String>,
    ) -> Result<Vec<RankedResult>> {
        let raw = self.hybrid.search(query, self.rerank_top_k).await?;
        if raw.is_empty() {
            return Ok(Vec::new());
        }

        let candidates: Vec<RerankCandidate> = raw
            .into_iter()
            .map(|(doc_id, score)| {
                let text = content.get(&doc_id).cloned().unwrap_or_else(|| doc_id.clone());
                (doc_id, score, text)
            })
            .collect();

        let reranked = self.reranker.rerank(query, candidates, Some(top_k)).await?;
        Ok(reranked
            .into_iter()
            .map(|(doc_id, score, _)| (doc_id, score))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scores a pair by how many query tokens appear in the document.
    struct OverlapModel {
        calls: AtomicUsize,
    }

    impl OverlapModel {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl RerankModel for OverlapModel {
        async fn score(&self, pairs: &[(String, String)]) -> Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(pairs
                .iter()
                .map(|(query, text)| {
                    let text = text.to_lowercase();
                    query
                        .to_lowercase()
                        .split_whitespace()
                        .filter(|token| text.contains(token))
                        .count() as f32
                })
                .collect())
        }

        fn model_id(&self) -> &str {
            "overlap-test-model"
        }
    }

    fn candidates() -> Vec<RerankCandidate> {
        vec![
            (
                "doc2".to_string(),
                0.65,
                "Contract law fundamentals".to_string(),
            ),
            (
                "doc1".to_string(),
                0.7,
                "EB-1A visa for extraordinary ability".to_string(),
            ),
            (
                "doc3".to_string(),
                0.6,
                "EB-1A application requirements".to_string(),
            ),
        ]
    }

    #[tokio::test]
    async fn rerank_orders_by_model_score() {
        let reranker = CrossEncoderReranker::new(Arc::new(OverlapModel::new()));
        let reranked = reranker
            .rerank("EB-1A extraordinary ability criteria", candidates(), Some(2))
            .await
            .unwrap();

        assert_eq!(reranked.len(), 2);
        assert_eq!(reranked[0].0, "doc1");
        assert_eq!(reranked[1].0, "doc3");
    }

    #[tokio::test]
    async fn empty_candidates_short_circuit() {
        let reranker = CrossEncoderReranker::new(Arc::new(OverlapModel::new()));
        let reranked = reranker.rerank("anything", Vec::new(), None).await.unwrap();
        assert!(reranked.is_empty());
    }

    #[tokio::test]
    async fn batching_splits_large_candidate_lists() {
        let model = Arc::new(OverlapModel::new());
        let reranker = CrossEncoderReranker::new(model.clone()).with_batch_size(2);

        let many: Vec<RerankCandidate> = (0..5)
            .map(|i| (format!("doc{i}"), 0.5, format!("content number {i}")))
            .collect();
        reranker.rerank("content", many, None).await.unwrap();

        // 5 candidates at batch size 2 -> 3 model calls.
        assert_eq!(model.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn lazy_model_initializes_once() {
        let inits = Arc::new(AtomicUsize::new(0));
        let inits_clone = inits.clone();
        let reranker = CrossEncoderReranker::lazy(move || {
            inits_clone.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(OverlapModel::new()) as Arc<dyn RerankModel>)
        });

        reranker
            .rerank("query", candidates(), Some(1))
            .await
            .unwrap();
        reranker
            .rerank("query", candidates(), Some(1))
            .await
            .unwrap();
        assert_eq!(inits.load(Ordering::SeqCst), 1);
    }
}
