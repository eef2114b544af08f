//! PostgreSQL working-memory (RMT buffer) store
//!
//! Each write replaces the whole slot object for the thread. The optional
//! `expires_at` column feeds the background TTL sweep.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio_postgres::Row;

use mnemo_core::{MemoryError, Result, RmtBuffer, WorkingMemoryStore};

use super::backend::PostgresBackend;
use super::map_pg_error;
use crate::retry::with_retry;

const UPSERT_SQL: &str = "\
INSERT INTO mnemo.rmt_buffers (thread_id, slots, updated_at, expires_at) \
VALUES ($1, $2, now(), $3) \
ON CONFLICT (thread_id) DO UPDATE SET \
    slots = EXCLUDED.slots, \
    updated_at = now(), \
    expires_at = EXCLUDED.expires_at";

/// RMT buffer store backed by the `rmt_buffers` relation
pub struct PostgresWorkingMemory {
    backend: Arc<PostgresBackend>,
}

impl PostgresWorkingMemory {
    /// Create a store over the shared backend
    #[must_use]
    pub fn new(backend: Arc<PostgresBackend>) -> Self {
        Self { backend }
    }

    async fn upsert(
        &self,
        thread_id: &str,
        slots: BTreeMap<String, String>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let slots_json = serde_json::to_value(&slots)?;
        with_retry("working.set_buffer", || {
            let slots_json = slots_json.clone();
            async move {
                let client = self.backend.client().await?;
                client
                    .execute(UPSERT_SQL, &[&thread_id, &slots_json, &expires_at])
                    .await
                    .map_err(|e| map_pg_error("upsert RMT buffer", &e))?;
                Ok(())
            }
        })
        .await
    }

    fn row_to_buffer(row: &Row) -> Result<RmtBuffer> {
        let slots_json: serde_json::Value = row.try_get("slots").map_err(row_error)?;
        let slots: BTreeMap<String, String> = serde_json::from_value(slots_json)?;
        Ok(RmtBuffer {
            thread_id: row.try_get("thread_id").map_err(row_error)?,
            slots,
            updated_at: row
                .try_get::<_, DateTime<Utc>>("updated_at")
                .map_err(row_error)?,
            expires_at: row.try_get("expires_at").map_err(row_error)?,
        })
    }
}

fn row_error(err: tokio_postgres::Error) -> MemoryError {
    MemoryError::store(format!("row decode failed: {err}"))
}

#[async_trait]
impl WorkingMemoryStore for PostgresWorkingMemory {
    async fn set_buffer(&self, thread_id: &str, slots: BTreeMap<String, String>) -> Result<()> {
        self.upsert(thread_id, slots, None).await
    }

    async fn set_buffer_with_ttl(
        &self,
        thread_id: &str,
        slots: BTreeMap<String, String>,
        ttl: Duration,
    ) -> Result<()> {
        self.upsert(thread_id, slots, Some(Utc::now() + ttl)).await
    }

    async fn get_buffer(&self, thread_id: &str) -> Result<Option<RmtBuffer>> {
        let row = with_retry("working.get_buffer", || async move {
            let client = self.backend.client().await?;
            client
                .query_opt(
                    "SELECT thread_id, slots, updated_at, expires_at \
                     FROM mnemo.rmt_buffers WHERE thread_id = $1",
                    &[&thread_id],
                )
                .await
                .map_err(|e| map_pg_error("get RMT buffer", &e))
        })
        .await?;

        row.as_ref().map(Self::row_to_buffer).transpose()
    }

    async fn delete_buffer(&self, thread_id: &str) -> Result<bool> {
        let deleted = with_retry("working.delete_buffer", || async move {
            let client = self.backend.client().await?;
            client
                .execute(
                    "DELETE FROM mnemo.rmt_buffers WHERE thread_id = $1",
                    &[&thread_id],
                )
                .await
                .map_err(|e| map_pg_error("delete RMT buffer", &e))
        })
        .await?;
        Ok(deleted > 0)
    }

    async fn list_all(&self) -> Result<Vec<RmtBuffer>> {
        let rows = with_retry("working.list_all", || async move {
            let client = self.backend.client().await?;
            client
                .query(
                    "SELECT thread_id, slots, updated_at, expires_at \
                     FROM mnemo.rmt_buffers ORDER BY thread_id",
                    &[],
                )
                .await
                .map_err(|e| map_pg_error("list RMT buffers", &e))
        })
        .await?;

        rows.iter().map(Self::row_to_buffer).collect()
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        with_retry("working.purge_expired", || async move {
            let client = self.backend.client().await?;
            client
                .execute(
                    "DELETE FROM mnemo.rmt_buffers \
                     WHERE expires_at IS NOT NULL AND expires_at <= $1",
                    &[&now],
                )
                .await
                .map_err(|e| map_pg_error("purge expired RMT buffers", &e))
        })
        .await
    }

    async fn health_check(&self) -> bool {
        self.backend.health_check().await
    }
}
