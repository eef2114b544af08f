//! PostgreSQL episodic event store
//!
//! Append-only audit timeline. Rows are never updated; chronological reads
//! order by `(timestamp, event_id)`.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_postgres::Row;
use tracing::debug;

use mnemo_core::traits::episodic::validate_event;
use mnemo_core::{AuditEvent, EpisodicStore, EventQuery, MemoryError, Result};

use super::backend::PostgresBackend;
use super::map_pg_error;
use crate::retry::with_retry;

const THREAD_EVENTS_SQL: &str = "\
SELECT event_id, user_id, thread_id, source, action, payload, tags, timestamp \
FROM mnemo.episodic_memory \
WHERE thread_id = $1 \
ORDER BY timestamp ASC, event_id ASC";

const RECENT_SQL: &str = "\
SELECT event_id, user_id, thread_id, source, action, payload, tags, timestamp \
FROM mnemo.episodic_memory \
ORDER BY timestamp DESC, event_id DESC \
LIMIT $1";

const ALL_SQL: &str = "\
SELECT event_id, user_id, thread_id, source, action, payload, tags, timestamp \
FROM mnemo.episodic_memory \
ORDER BY timestamp ASC, event_id ASC";

const QUERY_SQL: &str = "\
SELECT event_id, user_id, thread_id, source, action, payload, tags, timestamp \
FROM mnemo.episodic_memory \
WHERE ($1::text IS NULL OR thread_id = $1) \
  AND ($2::text IS NULL OR user_id = $2) \
  AND ($3::timestamptz IS NULL OR timestamp >= $3) \
  AND ($4::timestamptz IS NULL OR timestamp <= $4) \
  AND ($5::text[] IS NULL OR \
       EXISTS (SELECT 1 FROM unnest(tags) t WHERE lower(t) = ANY($5::text[]))) \
ORDER BY timestamp ASC, event_id ASC";

/// Episodic store backed by the `episodic_memory` relation
pub struct PostgresEpisodicStore {
    backend: Arc<PostgresBackend>,
}

impl PostgresEpisodicStore {
    /// Create a store over the shared backend
    #[must_use]
    pub fn new(backend: Arc<PostgresBackend>) -> Self {
        Self { backend }
    }

    fn row_to_event(row: &Row) -> Result<AuditEvent> {
        let payload: serde_json::Value = row.try_get("payload").map_err(row_error)?;
        let payload: BTreeMap<String, serde_json::Value> = match payload {
            serde_json::Value::Object(map) => map.into_iter().collect(),
            _ => BTreeMap::new(),
        };

        Ok(AuditEvent {
            event_id: row.try_get("event_id").map_err(row_error)?,
            timestamp: row
                .try_get::<_, DateTime<Utc>>("timestamp")
                .map_err(row_error)?,
            user_id: row.try_get("user_id").map_err(row_error)?,
            thread_id: Some(row.try_get::<_, String>("thread_id").map_err(row_error)?),
            source: row.try_get("source").map_err(row_error)?,
            action: row.try_get("action").map_err(row_error)?,
            payload,
            tags: row.try_get("tags").map_err(row_error)?,
        })
    }
}

fn row_error(err: tokio_postgres::Error) -> MemoryError {
    MemoryError::store(format!("row decode failed: {err}"))
}

#[async_trait]
impl EpisodicStore for PostgresEpisodicStore {
    async fn append(&self, event: AuditEvent) -> Result<()> {
        validate_event(&event)?;

        let thread = event.thread().to_string();
        let payload = serde_json::Value::Object(event.payload.clone().into_iter().collect());

        with_retry("episodic.append", || {
            let payload = payload.clone();
            let thread = thread.clone();
            let event = event.clone();
            async move {
                let client = self.backend.client().await?;
                client
                    .execute(
                        "INSERT INTO mnemo.episodic_memory \
                         (event_id, user_id, thread_id, source, action, payload, tags, timestamp) \
                         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
                        &[
                            &event.event_id,
                            &event.user_id,
                            &thread,
                            &event.source,
                            &event.action,
                            &payload,
                            &event.tags,
                            &event.timestamp,
                        ],
                    )
                    .await
                    .map_err(|e| map_pg_error("append audit event", &e))?;
                Ok(())
            }
        })
        .await
    }

    async fn thread_events(
        &self,
        thread_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<AuditEvent>> {
        let rows = with_retry("episodic.thread_events", || async move {
            let client = self.backend.client().await?;
            client
                .query(THREAD_EVENTS_SQL, &[&thread_id])
                .await
                .map_err(|e| map_pg_error("thread events", &e))
        })
        .await?;

        let mut events: Vec<AuditEvent> =
            rows.iter().map(Self::row_to_event).collect::<Result<_>>()?;

        if let Some(limit) = limit {
            if limit > 0 && events.len() > limit {
                events.drain(..events.len() - limit);
            }
        }
        Ok(events)
    }

    async fn recent(&self, limit: usize) -> Result<Vec<AuditEvent>> {
        let limit_i64 = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = with_retry("episodic.recent", || async move {
            let client = self.backend.client().await?;
            client
                .query(RECENT_SQL, &[&limit_i64])
                .await
                .map_err(|e| map_pg_error("recent events", &e))
        })
        .await?;

        rows.iter().map(Self::row_to_event).collect()
    }

    async fn all_by_thread(&self) -> Result<BTreeMap<String, Vec<AuditEvent>>> {
        let rows = with_retry("episodic.all", || async move {
            let client = self.backend.client().await?;
            client
                .query(ALL_SQL, &[])
                .await
                .map_err(|e| map_pg_error("all events", &e))
        })
        .await?;

        let mut grouped: BTreeMap<String, Vec<AuditEvent>> = BTreeMap::new();
        for row in &rows {
            let event = Self::row_to_event(row)?;
            grouped
                .entry(event.thread().to_string())
                .or_default()
                .push(event);
        }
        Ok(grouped)
    }

    async fn query(&self, query: &EventQuery) -> Result<Vec<AuditEvent>> {
        let tags: Option<Vec<String>> = query
            .tags
            .as_ref()
            .map(|tags| tags.iter().map(|t| t.to_lowercase()).collect());

        let rows = with_retry("episodic.query", || {
            let tags = tags.clone();
            async move {
                let client = self.backend.client().await?;
                client
                    .query(
                        QUERY_SQL,
                        &[
                            &query.thread_id,
                            &query.user_id,
                            &query.since,
                            &query.until,
                            &tags,
                        ],
                    )
                    .await
                    .map_err(|e| map_pg_error("event query", &e))
            }
        })
        .await?;

        let mut events: Vec<AuditEvent> =
            rows.iter().map(Self::row_to_event).collect::<Result<_>>()?;

        if let Some(limit) = query.limit {
            if limit > 0 && events.len() > limit {
                events.drain(..events.len() - limit);
            }
        }
        debug!(results = events.len(), "episodic query complete");
        Ok(events)
    }

    async fn purge_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        with_retry("episodic.purge", || async move {
            let client = self.backend.client().await?;
            client
                .execute(
                    "DELETE FROM mnemo.episodic_memory WHERE timestamp < $1",
                    &[&cutoff],
                )
                .await
                .map_err(|e| map_pg_error("purge events", &e))
        })
        .await
    }

    async fn health_check(&self) -> bool {
        self.backend.health_check().await
    }
}
