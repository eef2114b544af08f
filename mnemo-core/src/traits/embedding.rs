//! Embedding provider trait

use async_trait::async_trait;

use crate::error::Result;

/// Produces fixed-dimension embeddings for document and query texts
///
/// Implementations must accept arbitrary-length input (batching internally
/// if needed) and return one vector per input text, each of length
/// `dimension()`. An empty query input yields a zero-vector, never an error.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a batch of document texts
    ///
    /// Empty input returns an empty list without any provider call.
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single query string
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>>;

    /// Output vector dimension
    fn dimension(&self) -> usize;

    /// Identifier of the model producing the vectors
    fn model_id(&self) -> &str;
}
