//! In-memory semantic store with real vector scoring

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use mnemo_core::traits::semantic::{ScoredRecord, SearchFilters, StoreStats};
use mnemo_core::{
    cosine_similarity, EmbeddingProvider, MemoryError, MemoryRecord, Result, SemanticMemoryStore,
};

/// Semantic memory held in a process-local map
///
/// Embeddings are computed through the injected provider on insert and at
/// query time, exactly like the PostgreSQL path.
pub struct InMemorySemanticStore {
    records: Arc<RwLock<HashMap<String, MemoryRecord>>>,
    embedder: Arc<dyn EmbeddingProvider>,
    namespace: String,
}

impl InMemorySemanticStore {
    /// Create an empty store scoped to `namespace`
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, namespace: impl Into<String>) -> Self {
        Self {
            records: Arc::new(RwLock::new(HashMap::new())),
            embedder,
            namespace: namespace.into(),
        }
    }

    fn matches(record: &MemoryRecord, user_id: Option<&str>, filters: &SearchFilters) -> bool {
        if let Some(user) = user_id {
            if record.user_id != user {
                return false;
            }
        }
        if let Some(memory_type) = filters.memory_type {
            if record.memory_type != memory_type {
                return false;
            }
        }
        if let Some(source) = &filters.source {
            if record.source.as_deref() != Some(source.as_str()) {
                return false;
            }
        }
        if let Some(case_id) = &filters.case_id {
            if record.case_id.as_deref() != Some(case_id.as_str()) {
                return false;
            }
        }
        filters.tags.iter().all(|tag| record.tags.contains(tag))
    }

    async fn embed_missing(&self, records: &mut [MemoryRecord]) -> Result<()> {
        let missing: Vec<usize> = records
            .iter()
            .enumerate()
            .filter(|(_, r)| r.embedding.is_none())
            .map(|(i, _)| i)
            .collect();
        if missing.is_empty() {
            return Ok(());
        }

        let texts: Vec<String> = missing.iter().map(|&i| records[i].text.clone()).collect();
        let vectors = self.embedder.embed_documents(&texts).await?;
        if vectors.len() != texts.len() {
            return Err(MemoryError::embedding(format!(
                "embedding count {} does not match input count {}",
                vectors.len(),
                texts.len()
            )));
        }

        let model = self.embedder.model_id().to_string();
        for (&index, vector) in missing.iter().zip(vectors) {
            records[index].embedding = Some(vector);
            records[index].embedding_model = Some(model.clone());
        }
        Ok(())
    }
}

#[async_trait]
impl SemanticMemoryStore for InMemorySemanticStore {
    async fn insert(&self, mut records: Vec<MemoryRecord>) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let dimension = self.embedder.dimension();
        for record in &records {
            if record.text.trim().is_empty() {
                return Err(MemoryError::Validation(
                    "memory record text must be non-empty".into(),
                ));
            }
            if let Some(embedding) = &record.embedding {
                if embedding.len() != dimension {
                    return Err(MemoryError::Config(format!(
                        "embedding dimension {} does not match configured dimension {dimension}",
                        embedding.len()
                    )));
                }
            }
        }

        self.embed_missing(&mut records).await?;

        let count = records.len();
        let mut map = self.records.write();
        for mut record in records {
            let id = record.ensure_id().to_string();
            map.insert(id, record);
        }
        Ok(count)
    }

    async fn search(
        &self,
        query: &str,
        user_id: Option<&str>,
        top_k: usize,
        filters: &SearchFilters,
    ) -> Result<Vec<ScoredRecord>> {
        let query_embedding = self.embedder.embed_query(query).await?;

        let mut scored: Vec<ScoredRecord> = {
            let map = self.records.read();
            map.values()
                .filter(|r| Self::matches(r, user_id, filters))
                .filter_map(|r| {
                    r.embedding.as_ref().map(|embedding| ScoredRecord {
                        score: cosine_similarity(&query_embedding, embedding).clamp(0.0, 1.0),
                        record: r.clone(),
                    })
                })
                .collect()
        };

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.record.created_at.cmp(&a.record.created_at))
                .then_with(|| a.record.id.cmp(&b.record.id))
        });
        scored.truncate(top_k);
        Ok(scored)
    }

    async fn list(&self, user_id: Option<&str>) -> Result<Vec<MemoryRecord>> {
        let mut records: Vec<MemoryRecord> = {
            let map = self.records.read();
            map.values()
                .filter(|r| user_id.map_or(true, |u| r.user_id == u))
                .cloned()
                .collect()
        };
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(records)
    }

    async fn count(&self) -> Result<u64> {
        Ok(self.records.read().len() as u64)
    }

    async fn delete_by_user(&self, user_id: &str) -> Result<u64> {
        let mut map = self.records.write();
        let before = map.len();
        map.retain(|_, r| r.user_id != user_id);
        Ok((before - map.len()) as u64)
    }

    async fn delete_by_ids(&self, ids: &[String]) -> Result<u64> {
        let mut map = self.records.write();
        let mut deleted = 0;
        for id in ids {
            if map.remove(id).is_some() {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    async fn stats(&self) -> Result<StoreStats> {
        Ok(StoreStats {
            total_records: self.records.read().len() as u64,
            dimension: self.embedder.dimension(),
            namespace: self.namespace.clone(),
        })
    }

    async fn health_check(&self) -> bool {
        true
    }
}
