//! Semantic memory store trait
//!
//! Persists `MemoryRecord`s with embeddings and answers three query modes:
//! similarity search, enumeration, and count. Knowledge-base and
//! case-document variants are default methods that delegate to the generic
//! `search` with preset filters, so every backend gets them for free.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{MemoryRecord, MemoryType};

/// Tag that marks shared knowledge-base records
pub const KNOWLEDGE_BASE_TAG: &str = "knowledge_base";

/// RRF constant used by the default hybrid interleave
const HYBRID_RRF_K: f64 = 60.0;

/// A record paired with its retrieval score
///
/// Scores are `1 - cosine_distance`, clamped to `[0, 1]`.
#[derive(Debug, Clone)]
pub struct ScoredRecord {
    /// The retrieved record
    pub record: MemoryRecord,
    /// Similarity (or fused) score, descending in result lists
    pub score: f32,
}

/// Metadata filters for similarity search
///
/// The store's configured namespace is always applied in addition to these.
#[derive(Debug, Clone, Default)]
pub struct SearchFilters {
    /// Equality filter on record kind
    pub memory_type: Option<MemoryType>,
    /// Record tags must contain all of these (set-contains subset)
    pub tags: Vec<String>,
    /// Equality filter on provenance
    pub source: Option<String>,
    /// Equality filter on case scoping key
    pub case_id: Option<String>,
}

impl SearchFilters {
    /// Filter restricted to knowledge-base records
    #[must_use]
    pub fn knowledge_base() -> Self {
        Self {
            tags: vec![KNOWLEDGE_BASE_TAG.to_string()],
            ..Self::default()
        }
    }

    /// Filter restricted to one case
    #[must_use]
    pub fn for_case(case_id: impl Into<String>) -> Self {
        Self {
            case_id: Some(case_id.into()),
            ..Self::default()
        }
    }
}

/// Namespace-level store statistics
#[derive(Debug, Clone)]
pub struct StoreStats {
    /// Total records in the namespace
    pub total_records: u64,
    /// Configured embedding dimension
    pub dimension: usize,
    /// Namespace the store is scoped to
    pub namespace: String,
}

/// Semantic memory store backed by vector similarity
///
/// Ranking semantics: similarity descending, ties broken by `created_at`
/// descending then id lexicographic. Insert assigns missing ids, computes
/// embeddings for records lacking them, and writes all rows of one call in
/// a single transaction.
#[async_trait]
pub trait SemanticMemoryStore: Send + Sync {
    /// Insert records, returning the count written
    ///
    /// # Errors
    ///
    /// `Validation` for empty text, `Embedding` when vectors cannot be
    /// produced, `Config` on dimension mismatch, `Store` on persistence
    /// failure.
    async fn insert(&self, records: Vec<MemoryRecord>) -> Result<usize>;

    /// Similarity search, up to `top_k` results, score descending
    async fn search(
        &self,
        query: &str,
        user_id: Option<&str>,
        top_k: usize,
        filters: &SearchFilters,
    ) -> Result<Vec<ScoredRecord>>;

    /// Enumerate records, optionally restricted to one owner
    async fn list(&self, user_id: Option<&str>) -> Result<Vec<MemoryRecord>>;

    /// Count records in the namespace
    async fn count(&self) -> Result<u64>;

    /// Delete every record owned by `user_id`, returning the count removed
    async fn delete_by_user(&self, user_id: &str) -> Result<u64>;

    /// Delete records by id, returning the count removed
    ///
    /// Used by consolidation to retire merged-away records.
    async fn delete_by_ids(&self, ids: &[String]) -> Result<u64>;

    /// Namespace statistics
    async fn stats(&self) -> Result<StoreStats>;

    /// Connectivity probe; never returns an error
    async fn health_check(&self) -> bool;

    /// Search shared knowledge-base records (no user filter)
    async fn search_knowledge_base(&self, query: &str, top_k: usize) -> Result<Vec<ScoredRecord>> {
        self.search(query, None, top_k, &SearchFilters::knowledge_base())
            .await
    }

    /// Search records scoped to one case
    async fn search_case_documents(
        &self,
        query: &str,
        case_id: &str,
        user_id: Option<&str>,
        top_k: usize,
    ) -> Result<Vec<ScoredRecord>> {
        self.search(query, user_id, top_k, &SearchFilters::for_case(case_id))
            .await
    }

    /// Weighted hybrid of knowledge-base and case-document retrieval
    ///
    /// Runs both legs in parallel and interleaves by reciprocal rank fusion
    /// with weights `(kb_weight, 1 - kb_weight)`. Without a `case_id` the
    /// second leg is a plain user-scoped search. `kb_weight` outside
    /// `[0, 1]` is a `Config` error.
    async fn search_hybrid(
        &self,
        query: &str,
        case_id: Option<&str>,
        user_id: Option<&str>,
        top_k: usize,
        kb_weight: f32,
    ) -> Result<Vec<ScoredRecord>> {
        if !(0.0..=1.0).contains(&kb_weight) {
            return Err(crate::error::MemoryError::Config(format!(
                "kb_weight must be in [0, 1], got {kb_weight}"
            )));
        }

        let case_leg = async {
            match case_id {
                Some(case) => {
                    self.search_case_documents(query, case, user_id, top_k)
                        .await
                }
                None => self.search(query, user_id, top_k, &SearchFilters::default()).await,
            }
        };

        let (kb, case) = tokio::join!(self.search_knowledge_base(query, top_k), case_leg);
        let rankings = [kb?, case?];
        let weights = [f64::from(kb_weight), f64::from(1.0 - kb_weight)];

        Ok(rrf_interleave(rankings, &weights, top_k))
    }
}

/// Weighted reciprocal-rank interleave of scored-record rankings
///
/// Deduplicates by record id (first occurrence keeps the record), scores by
/// `Σ w_i / (k + rank_i)`, and breaks ties by the lowest minimum rank
/// across inputs, then id lexicographic.
fn rrf_interleave(
    rankings: [Vec<ScoredRecord>; 2],
    weights: &[f64; 2],
    top_k: usize,
) -> Vec<ScoredRecord> {
    let mut fused: HashMap<String, (f64, usize, ScoredRecord)> = HashMap::new();

    for (ranking, weight) in rankings.into_iter().zip(weights.iter()) {
        for (rank0, scored) in ranking.into_iter().enumerate() {
            let rank = rank0 + 1;
            let id = scored.record.id.clone().unwrap_or_else(|| scored.record.text.clone());
            let contribution = weight / (HYBRID_RRF_K + rank as f64);
            let entry = fused.entry(id).or_insert((0.0, rank, scored));
            entry.0 += contribution;
            entry.1 = entry.1.min(rank);
        }
    }

    let mut ordered: Vec<(String, (f64, usize, ScoredRecord))> = fused.into_iter().collect();
    ordered.sort_by(|(id_a, (score_a, min_a, _)), (id_b, (score_b, min_b, _))| {
        score_b
            .partial_cmp(score_a)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| min_a.cmp(min_b))
            .then_with(|| id_a.cmp(id_b))
    });

    ordered
        .into_iter()
        .take(top_k)
        .map(|(_, (score, _, mut scored))| {
            #[allow(clippy::cast_possible_truncation)]
            {
                scored.score = score as f32;
            }
            scored
        })
        .collect()
}
