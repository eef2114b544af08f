//! Reranker model trait

use async_trait::async_trait;

use crate::error::Result;

/// Scores `(query, document)` pairs directly
///
/// The concrete implementation may be remote (HTTP) or local (in-process);
/// callers batch pairs before invoking `score`.
#[async_trait]
pub trait RerankModel: Send + Sync {
    /// Relevance score per pair, same order as input, higher is better
    async fn score(&self, pairs: &[(String, String)]) -> Result<Vec<f32>>;

    /// Model identifier for logging
    fn model_id(&self) -> &str;
}
