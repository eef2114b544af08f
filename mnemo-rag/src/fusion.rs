//! Reciprocal rank fusion and the hybrid retriever
//!
//! RRF combines rankings from retrievers with incomparable score scales by
//! summing `w_i / (k + rank_i)` per document. Deterministic by
//! construction: ties break on the lowest minimum rank across inputs, then
//! lexicographic document id.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use mnemo_core::traits::semantic::SearchFilters;
use mnemo_core::{MemoryError, Result, SemanticMemoryStore};

use crate::bm25::Bm25Index;

/// Default RRF constant
pub const DEFAULT_RRF_K: f64 = 60.0;
/// Over-retrieval multiplier applied to each leg before fusion
pub const OVER_RETRIEVAL_FACTOR: usize = 2;

/// `(doc_id, score)` pair as produced by one retriever
pub type RankedResult = (String, f32);
/// `(doc_id, score, metadata)` for the metadata-preserving variant
pub type RankedResultWithMetadata = (String, f32, BTreeMap<String, Value>);

/// Reciprocal rank fusion over an arbitrary number of rankings
#[derive(Debug, Clone)]
pub struct ReciprocalRankFusion {
    k: f64,
    weights: Option<Vec<f64>>,
}

impl Default for ReciprocalRankFusion {
    fn default() -> Self {
        Self {
            k: DEFAULT_RRF_K,
            weights: None,
        }
    }
}

impl ReciprocalRankFusion {
    /// Fusion with constant `k` and equal weights
    #[must_use]
    pub const fn new(k: f64) -> Self {
        Self { k, weights: None }
    }

    /// Fusion with explicit per-ranking weights
    ///
    /// The weight count must match the ranking count at fuse time.
    #[must_use]
    pub const fn with_weights(k: f64, weights: Vec<f64>) -> Self {
        Self {
            k,
            weights: Some(weights),
        }
    }

    /// Fuse rankings into one `(doc_id, fused_score)` list, descending
    ///
    /// Empty rankings contribute nothing. Documents are deduplicated by id.
    ///
    /// # Errors
    ///
    /// `Config` when configured weights do not match the ranking count.
    pub fn fuse(
        &self,
        rankings: &[Vec<RankedResult>],
        top_k: Option<usize>,
    ) -> Result<Vec<RankedResult>> {
        let weights = self.effective_weights(rankings.len())?;

        // doc_id -> (fused score, lowest rank seen across inputs)
        let mut fused: HashMap<&str, (f64, usize)> = HashMap::new();
        for (ranking, weight) in rankings.iter().zip(&weights) {
            for (rank0, (doc_id, _score)) in ranking.iter().enumerate() {
                let rank = rank0 + 1;
                #[allow(clippy::cast_precision_loss)]
                let contribution = weight / (self.k + rank as f64);
                let entry = fused.entry(doc_id.as_str()).or_insert((0.0, rank));
                entry.0 += contribution;
                entry.1 = entry.1.min(rank);
            }
        }

        let mut ordered: Vec<(&str, (f64, usize))> = fused.into_iter().collect();
        ordered.sort_by(|(id_a, (score_a, min_a)), (id_b, (score_b, min_b))| {
            score_b
                .partial_cmp(score_a)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| min_a.cmp(min_b))
                .then_with(|| id_a.cmp(id_b))
        });

        if let Some(top_k) = top_k {
            ordered.truncate(top_k);
        }

        #[allow(clippy::cast_possible_truncation)]
        let fused = ordered
            .into_iter()
            .map(|(id, (score, _))| (id.to_string(), score as f32))
            .collect();
        Ok(fused)
    }

    /// Fuse rankings, attaching metadata from the first ranking that
    /// contained each document (stable first occurrence)
    ///
    /// # Errors
    ///
    /// `Config` when configured weights do not match the ranking count.
    pub fn fuse_with_metadata(
        &self,
        rankings: &[Vec<RankedResultWithMetadata>],
        top_k: Option<usize>,
    ) -> Result<Vec<RankedResultWithMetadata>> {
        let simple: Vec<Vec<RankedResult>> = rankings
            .iter()
            .map(|ranking| {
                ranking
                    .iter()
                    .map(|(id, score, _)| (id.clone(), *score))
                    .collect()
            })
            .collect();

        let fused = self.fuse(&simple, top_k)?;

        let mut metadata_map: HashMap<&str, &BTreeMap<String, Value>> = HashMap::new();
        for ranking in rankings {
            for (doc_id, _, metadata) in ranking {
                metadata_map.entry(doc_id.as_str()).or_insert(metadata);
            }
        }

        Ok(fused
            .into_iter()
            .map(|(doc_id, score)| {
                let metadata = metadata_map
                    .get(doc_id.as_str())
                    .map(|m| (*m).clone())
                    .unwrap_or_default();
                (doc_id, score, metadata)
            })
            .collect())
    }

    fn effective_weights(&self, ranking_count: usize) -> Result<Vec<f64>> {
        match &self.weights {
            Some(weights) if weights.len() != ranking_count => Err(MemoryError::Config(format!(
                "weight count {} does not match ranking count {ranking_count}",
                weights.len()
            ))),
            Some(weights) => Ok(weights.clone()),
            #[allow(clippy::cast_precision_loss)]
            None => Ok(vec![
                1.0 / ranking_count.max(1) as f64;
                ranking_count
            ]),
        }
    }
}

/// Sparse (keyword) retriever capability
#[async_trait]
pub trait SparseRetriever: Send + Sync {
    /// Top `top_k` results, score descending
    async fn search_sparse(&self, query: &str, top_k: usize) -> Result<Vec<RankedResult>>;
}

#[async_trait]
impl SparseRetriever for Bm25Index {
    async fn search_sparse(&self, query: &str, top_k: usize) -> Result<Vec<RankedResult>> {
        Ok(self.search(query, top_k))
    }
}

/// Dense (vector) retriever capability
#[async_trait]
pub trait DenseRetriever: Send + Sync {
    /// Top `top_k` results, score descending
    async fn search_dense(&self, query: &str, top_k: usize) -> Result<Vec<RankedResult>>;
}

/// Adapter exposing a semantic store as a dense retriever
///
/// Document ids are the record texts, matching the sparse side so fusion
/// deduplicates across retrievers.
pub struct SemanticStoreAdapter {
    store: Arc<dyn SemanticMemoryStore>,
    user_id: Option<String>,
    filters: SearchFilters,
}

impl SemanticStoreAdapter {
    /// Adapt `store` with no default scoping
    #[must_use]
    pub fn new(store: Arc<dyn SemanticMemoryStore>) -> Self {
        Self {
            store,
            user_id: None,
            filters: SearchFilters::default(),
        }
    }

    /// Scope all queries to one owner
    #[must_use]
    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Apply default filters to all queries
    #[must_use]
    pub fn with_filters(mut self, filters: SearchFilters) -> Self {
        self.filters = filters;
        self
    }
}

#[async_trait]
impl DenseRetriever for SemanticStoreAdapter {
    async fn search_dense(&self, query: &str, top_k: usize) -> Result<Vec<RankedResult>> {
        let scored = self
            .store
            .search(query, self.user_id.as_deref(), top_k, &self.filters)
            .await?;
        Ok(scored
            .into_iter()
            .map(|s| (s.record.text, s.score))
            .collect())
    }
}

/// Hybrid retriever: parallel sparse + dense fan-out fused by RRF
///
/// Each leg is invoked with `OVER_RETRIEVAL_FACTOR * top_k` to improve
/// fusion quality; the fused ranking is truncated back to `top_k`.
/// Supplied weights are normalized to sum to 1.
pub struct HybridRetriever {
    sparse: Arc<dyn SparseRetriever>,
    dense: Arc<dyn DenseRetriever>,
    fusion: ReciprocalRankFusion,
    sparse_weight: f64,
    dense_weight: f64,
}

impl HybridRetriever {
    /// Create a retriever with the given weights
    ///
    /// # Errors
    ///
    /// `Config` when the weights do not sum to a positive value.
    pub fn new(
        sparse: Arc<dyn SparseRetriever>,
        dense: Arc<dyn DenseRetriever>,
        sparse_weight: f64,
        dense_weight: f64,
    ) -> Result<Self> {
        let total = sparse_weight + dense_weight;
        if total <= 0.0 {
            return Err(MemoryError::Config(
                "retrieval weights must sum to a positive value".into(),
            ));
        }
        let sparse_weight = sparse_weight / total;
        let dense_weight = dense_weight / total;

        Ok(Self {
            sparse,
            dense,
            fusion: ReciprocalRankFusion::with_weights(
                DEFAULT_RRF_K,
                vec![sparse_weight, dense_weight],
            ),
            sparse_weight,
            dense_weight,
        })
    }

    /// Current normalized `(sparse, dense)` weights
    #[must_use]
    pub const fn weights(&self) -> (f64, f64) {
        (self.sparse_weight, self.dense_weight)
    }

    /// Hybrid search fused to `top_k` results
    ///
    /// Both legs run in parallel; per-ranking order is preserved going into
    /// fusion, and fusion tie-breaks are deterministic.
    pub async fn search(&self, query: &str, top_k: usize) -> Result<Vec<RankedResult>> {
        let over_k = top_k.saturating_mul(OVER_RETRIEVAL_FACTOR).max(top_k);

        let (sparse, dense) = tokio::join!(
            self.sparse.search_sparse(query, over_k),
            self.dense.search_dense(query, over_k),
        );
        let rankings = vec![sparse?, dense?];

        let fused = self.fusion.fuse(&rankings, Some(top_k))?;
        debug!(
            results = fused.len(),
            top_k, "hybrid retrieval fused"
        );
        Ok(fused)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ranking(pairs: &[(&str, f32)]) -> Vec<RankedResult> {
        pairs.iter().map(|(id, s)| ((*id).to_string(), *s)).collect()
    }

    #[test]
    fn rrf_scores_match_the_formula() {
        let fusion = ReciprocalRankFusion::with_weights(60.0, vec![1.0, 1.0]);
        let rankings = vec![
            ranking(&[("d1", 0.9), ("d2", 0.7), ("d3", 0.5)]),
            ranking(&[("d2", 0.95), ("d1", 0.6), ("d4", 0.4)]),
        ];
        let fused = fusion.fuse(&rankings, None).unwrap();

        let score = |id: &str| fused.iter().find(|(d, _)| d == id).unwrap().1;
        let expected = (1.0_f64 / 61.0 + 1.0 / 62.0) as f32;
        assert!((score("d1") - expected).abs() < 1e-6);
        assert!((score("d2") - expected).abs() < 1e-6);

        // Top two are d1 and d2; ids are unique.
        let top_two: Vec<&str> = fused.iter().take(2).map(|(d, _)| d.as_str()).collect();
        assert!(top_two.contains(&"d1") && top_two.contains(&"d2"));
        let mut ids: Vec<&String> = fused.iter().map(|(d, _)| d).collect();
        ids.dedup();
        assert_eq!(ids.len(), fused.len());
    }

    #[test]
    fn rrf_is_deterministic() {
        let fusion = ReciprocalRankFusion::default();
        let rankings = vec![
            ranking(&[("a", 1.0), ("b", 0.9), ("c", 0.8)]),
            ranking(&[("c", 1.0), ("a", 0.9), ("d", 0.8)]),
        ];
        let first = fusion.fuse(&rankings, None).unwrap();
        for _ in 0..10 {
            assert_eq!(fusion.fuse(&rankings, None).unwrap(), first);
        }
    }

    #[test]
    fn ties_break_on_min_rank_then_id() {
        let fusion = ReciprocalRankFusion::default();
        // b and a have identical contributions and identical min ranks, so
        // lexicographic id ordering decides.
        let rankings = vec![ranking(&[("b", 1.0)]), ranking(&[("a", 1.0)])];
        let fused = fusion.fuse(&rankings, None).unwrap();
        assert_eq!(fused[0].0, "a");
        assert_eq!(fused[1].0, "b");
    }

    #[test]
    fn empty_ranking_contributes_nothing() {
        let fusion = ReciprocalRankFusion::default();
        let alone = fusion
            .fuse(&[ranking(&[("x", 1.0), ("y", 0.5)])], None)
            .unwrap();
        let with_empty = fusion
            .fuse(&[ranking(&[("x", 1.0), ("y", 0.5)]), Vec::new()], None)
            .unwrap();

        let order_alone: Vec<&String> = alone.iter().map(|(d, _)| d).collect();
        let order_with_empty: Vec<&String> = with_empty.iter().map(|(d, _)| d).collect();
        assert_eq!(order_alone, order_with_empty);
    }

    #[test]
    fn weight_mismatch_is_a_config_error() {
        let fusion = ReciprocalRankFusion::with_weights(60.0, vec![0.5]);
        let err = fusion
            .fuse(&[ranking(&[("a", 1.0)]), ranking(&[("b", 1.0)])], None)
            .unwrap_err();
        assert!(err.to_string().contains("weight count"));
    }

    #[test]
    fn top_k_truncates() {
        let fusion = ReciprocalRankFusion::default();
        let fused = fusion
            .fuse(
                &[ranking(&[("a", 1.0), ("b", 0.9), ("c", 0.8)])],
                Some(2),
            )
            .unwrap();
        assert_eq!(fused.len(), 2);
    }

    #[test]
    fn metadata_keeps_first_occurrence() {
        let fusion = ReciprocalRankFusion::default();
        let mut sparse_meta = BTreeMap::new();
        sparse_meta.insert("origin".to_string(), Value::from("bm25"));
        let mut dense_meta = BTreeMap::new();
        dense_meta.insert("origin".to_string(), Value::from("vector"));

        let rankings = vec![
            vec![("d1".to_string(), 0.9, sparse_meta)],
            vec![("d1".to_string(), 0.95, dense_meta)],
        ];
        let fused = fusion.fuse_with_metadata(&rankings, None).unwrap();
        assert_eq!(fused.len(), 1);
        assert_eq!(fused[0].2["origin"], Value::from("bm25"));
    }

    #[tokio::test]
    async fn hybrid_weights_are_normalized() {
        struct Empty;
        #[async_trait]
        impl SparseRetriever for Empty {
            async fn search_sparse(&self, _q: &str, _k: usize) -> Result<Vec<RankedResult>> {
                Ok(Vec::new())
            }
        }
        #[async_trait]
        impl DenseRetriever for Empty {
            async fn search_dense(&self, _q: &str, _k: usize) -> Result<Vec<RankedResult>> {
                Ok(Vec::new())
            }
        }

        let retriever =
            HybridRetriever::new(Arc::new(Empty), Arc::new(Empty), 2.0, 6.0).unwrap();
        let (sparse, dense) = retriever.weights();
        assert!((sparse - 0.25).abs() < 1e-9);
        assert!((dense - 0.75).abs() < 1e-9);

        assert!(retriever.search("anything", 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn hybrid_output_is_bounded_and_sourced_from_inputs() {
        struct FixedSparse;
        #[async_trait]
        impl SparseRetriever for FixedSparse {
            async fn search_sparse(&self, _q: &str, _k: usize) -> Result<Vec<RankedResult>> {
                Ok(ranking(&[("s1", 3.0), ("shared", 2.0)]))
            }
        }
        struct FixedDense;
        #[async_trait]
        impl DenseRetriever for FixedDense {
            async fn search_dense(&self, _q: &str, _k: usize) -> Result<Vec<RankedResult>> {
                Ok(ranking(&[("shared", 0.9), ("d1", 0.8)]))
            }
        }

        let retriever =
            HybridRetriever::new(Arc::new(FixedSparse), Arc::new(FixedDense), 0.5, 0.5).unwrap();
        let results = retriever.search("q", 2).await.unwrap();

        assert!(results.len() <= 2);
        // Every returned id came from one of the input rankings.
        for (id, _) in &results {
            assert!(["s1", "shared", "d1"].contains(&id.as_str()));
        }
        // The shared document tops the fused ranking.
        assert_eq!(results[0].0, "shared");
    }
}
