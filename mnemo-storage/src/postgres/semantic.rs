//! pgvector-backed semantic memory store
//!
//! Similarity is `1 - cosine_distance`, clamped to `[0, 1]`. Ties break by
//! `created_at` descending, then id lexicographic. Each `insert` call
//! writes all of its rows in one transaction.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pgvector::Vector;
use tokio_postgres::Row;
use tracing::debug;

use mnemo_core::traits::semantic::{ScoredRecord, SearchFilters, StoreStats};
use mnemo_core::{
    EmbeddingProvider, MemoryError, MemoryRecord, MemoryType, Result, SemanticMemoryStore,
};

use super::backend::PostgresBackend;
use super::map_pg_error;
use crate::retry::with_retry;

const SEARCH_SQL: &str = "\
SELECT id, user_id, case_id, thread_id, text, type, source, tags, metadata, \
       embedding, embedding_model, salience, confidence, created_at, \
       (embedding <=> $1) AS distance \
FROM mnemo.semantic_memory \
WHERE namespace = $2 \
  AND embedding IS NOT NULL \
  AND ($3::text IS NULL OR user_id = $3) \
  AND ($4::text IS NULL OR type = $4) \
  AND ($5::text IS NULL OR source = $5) \
  AND ($6::text IS NULL OR case_id = $6) \
  AND ($7::text[] IS NULL OR tags @> $7) \
ORDER BY distance ASC, created_at DESC, id ASC \
LIMIT $8";

const INSERT_SQL: &str = "\
INSERT INTO mnemo.semantic_memory \
    (id, namespace, user_id, case_id, thread_id, text, type, source, tags, metadata, \
     embedding, embedding_model, embedding_dimension, salience, confidence, created_at) \
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16) \
ON CONFLICT (id) DO UPDATE SET \
    text = EXCLUDED.text, \
    tags = EXCLUDED.tags, \
    metadata = EXCLUDED.metadata, \
    embedding = EXCLUDED.embedding, \
    embedding_model = EXCLUDED.embedding_model, \
    salience = EXCLUDED.salience, \
    confidence = EXCLUDED.confidence, \
    updated_at = now()";

/// Canonical semantic store: records and vectors live in PostgreSQL
pub struct PostgresSemanticStore {
    backend: Arc<PostgresBackend>,
    embedder: Arc<dyn EmbeddingProvider>,
    namespace: String,
}

impl PostgresSemanticStore {
    /// Create a store scoped to `namespace`
    pub fn new(
        backend: Arc<PostgresBackend>,
        embedder: Arc<dyn EmbeddingProvider>,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            backend,
            embedder,
            namespace: namespace.into(),
        }
    }

    /// Configured vector dimension
    #[must_use]
    pub fn dimension(&self) -> usize {
        self.embedder.dimension()
    }

    fn validate(&self, records: &[MemoryRecord]) -> Result<()> {
        let dimension = self.dimension();
        for record in records {
            if record.text.trim().is_empty() {
                return Err(MemoryError::Validation(
                    "memory record text must be non-empty".into(),
                ));
            }
            if let Some(embedding) = &record.embedding {
                if embedding.len() != dimension {
                    return Err(MemoryError::Config(format!(
                        "embedding dimension {} does not match configured dimension {}",
                        embedding.len(),
                        dimension
                    )));
                }
            }
        }
        Ok(())
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

    fn row_to_record(row: &Row) -> Result<MemoryRecord> {
        let metadata: serde_json::Value = row.try_get("metadata").map_err(row_error)?;
        let metadata: BTreeMap<String, serde_json::Value> = match metadata {
            serde_json::Value::Object(map) => map.into_iter().collect(),
            _ => BTreeMap::new(),
        };

        let type_str: String = row.try_get("type").map_err(row_error)?;
        let embedding: Option<Vector> = row.try_get("embedding").map_err(row_error)?;

        Ok(MemoryRecord {
            id: Some(row.try_get::<_, String>("id").map_err(row_error)?),
            user_id: row.try_get("user_id").map_err(row_error)?,
            case_id: row.try_get("case_id").map_err(row_error)?,
            thread_id: row.try_get("thread_id").map_err(row_error)?,
            memory_type: MemoryType::parse(&type_str).unwrap_or_default(),
            text: row.try_get("text").map_err(row_error)?,
            embedding: embedding.map(|v| v.to_vec()),
            embedding_model: row.try_get("embedding_model").map_err(row_error)?,
            salience: row.try_get("salience").map_err(row_error)?,
            confidence: row.try_get("confidence").map_err(row_error)?,
            created_at: row
                .try_get::<_, DateTime<Utc>>("created_at")
                .map_err(row_error)?,
            source: row.try_get("source").map_err(row_error)?,
            tags: row.try_get("tags").map_err(row_error)?,
            metadata,
        })
    }
}

fn row_error(err: tokio_postgres::Error) -> MemoryError {
    MemoryError::store(format!("row decode failed: {err}"))
}

#[async_trait]
impl SemanticMemoryStore for PostgresSemanticStore {
    async fn insert(&self, mut records: Vec<MemoryRecord>) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }
        debug!(
            count = records.len(),
            namespace = %self.namespace,
            "inserting semantic records"
        );

        self.validate(&records)?;
        self.embed_missing(&mut records).await?;

        for record in &mut records {
            record.ensure_id();
        }

        let dimension = i32::try_from(self.dimension())
            .map_err(|_| MemoryError::Config("embedding dimension exceeds i32".into()))?;

        with_retry("semantic.insert", || {
            let records = records.clone();
            async move {
                let mut client = self.backend.client().await?;
                let tx = client
                    .transaction()
                    .await
                    .map_err(|e| map_pg_error("begin insert transaction", &e))?;

                for record in &records {
                    let embedding = record.embedding.clone().map(Vector::from);
                    let metadata = serde_json::Value::Object(
                        record.metadata.clone().into_iter().collect(),
                    );
                    tx.execute(
                        INSERT_SQL,
                        &[
                            &record.id,
                            &self.namespace,
                            &record.user_id,
                            &record.case_id,
                            &record.thread_id,
                            &record.text,
                            &record.memory_type.as_str(),
                            &record.source,
                            &record.tags,
                            &metadata,
                            &embedding,
                            &record.embedding_model,
                            &dimension,
                            &record.salience,
                            &record.confidence,
                            &record.created_at,
                        ],
                    )
                    .await
                    .map_err(|e| map_pg_error("insert semantic record", &e))?;
                }

                tx.commit()
                    .await
                    .map_err(|e| map_pg_error("commit insert transaction", &e))?;
                Ok(records.len())
            }
        })
        .await
    }

    async fn search(
        &self,
        query: &str,
        user_id: Option<&str>,
        top_k: usize,
        filters: &SearchFilters,
    ) -> Result<Vec<ScoredRecord>> {
        let query_embedding = Vector::from(self.embedder.embed_query(query).await?);
        let limit = i64::try_from(top_k).unwrap_or(i64::MAX);

        let type_filter = filters.memory_type.map(MemoryType::as_str);
        let tags_filter: Option<Vec<String>> = if filters.tags.is_empty() {
            None
        } else {
            Some(filters.tags.clone())
        };

        let rows = with_retry("semantic.search", || {
            let query_embedding = query_embedding.clone();
            let tags_filter = tags_filter.clone();
            async move {
                let client = self.backend.client().await?;
                client
                    .query(
                        SEARCH_SQL,
                        &[
                            &query_embedding,
                            &self.namespace,
                            &user_id,
                            &type_filter,
                            &filters.source,
                            &filters.case_id,
                            &tags_filter,
                            &limit,
                        ],
                    )
                    .await
                    .map_err(|e| map_pg_error("semantic search", &e))
            }
        })
        .await?;

        let mut results = Vec::with_capacity(rows.len());
        for row in &rows {
            let distance: f64 = row.try_get("distance").map_err(row_error)?;
            #[allow(clippy::cast_possible_truncation)]
            let score = (1.0 - distance).clamp(0.0, 1.0) as f32;
            results.push(ScoredRecord {
                record: Self::row_to_record(row)?,
                score,
            });
        }
        debug!(results = results.len(), "semantic search complete");
        Ok(results)
    }

    async fn list(&self, user_id: Option<&str>) -> Result<Vec<MemoryRecord>> {
        let rows = with_retry("semantic.list", || async move {
            let client = self.backend.client().await?;
            client
                .query(
                    "SELECT id, user_id, case_id, thread_id, text, type, source, tags, \
                     metadata, embedding, embedding_model, salience, confidence, created_at \
                     FROM mnemo.semantic_memory \
                     WHERE namespace = $1 AND ($2::text IS NULL OR user_id = $2) \
                     ORDER BY created_at DESC, id ASC",
                    &[&self.namespace, &user_id],
                )
                .await
                .map_err(|e| map_pg_error("semantic list", &e))
        })
        .await?;

        rows.iter().map(Self::row_to_record).collect()
    }

    async fn count(&self) -> Result<u64> {
        let row = with_retry("semantic.count", || async move {
            let client = self.backend.client().await?;
            client
                .query_one(
                    "SELECT count(*) FROM mnemo.semantic_memory WHERE namespace = $1",
                    &[&self.namespace],
                )
                .await
                .map_err(|e| map_pg_error("semantic count", &e))
        })
        .await?;

        let count: i64 = row.try_get(0).map_err(row_error)?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    async fn delete_by_user(&self, user_id: &str) -> Result<u64> {
        with_retry("semantic.delete_by_user", || async move {
            let client = self.backend.client().await?;
            client
                .execute(
                    "DELETE FROM mnemo.semantic_memory WHERE namespace = $1 AND user_id = $2",
                    &[&self.namespace, &user_id],
                )
                .await
                .map_err(|e| map_pg_error("semantic delete by user", &e))
        })
        .await
    }

    async fn delete_by_ids(&self, ids: &[String]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        with_retry("semantic.delete_by_ids", || async move {
            let client = self.backend.client().await?;
            client
                .execute(
                    "DELETE FROM mnemo.semantic_memory \
                     WHERE namespace = $1 AND id = ANY($2::text[])",
                    &[&self.namespace, &ids],
                )
                .await
                .map_err(|e| map_pg_error("semantic delete by ids", &e))
        })
        .await
    }

    async fn stats(&self) -> Result<StoreStats> {
        Ok(StoreStats {
            total_records: self.count().await?,
            dimension: self.dimension(),
            namespace: self.namespace.clone(),
        })
    }

    async fn health_check(&self) -> bool {
        self.backend.health_check().await
    }
}
