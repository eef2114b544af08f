//! Memory hierarchy facade
//!
//! One entry point for orchestrators needing a coherent context view:
//! semantic retrieval, the recent episodic window, reflection of the most
//! recent event, and the RMT snapshot, assembled in a single call.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use mnemo_core::traits::semantic::{ScoredRecord, SearchFilters};
use mnemo_core::{AuditEvent, Clock, EventQuery, MemoryRecord, Result, SystemClock};

use crate::consolidation::ConsolidationOutcome;
use crate::manager::{HealthStatus, MemoryManager};

/// Default episodic look-back window (6 hours)
pub const DEFAULT_SINCE_HOURS: i64 = 6;
/// Default retrieval depth
pub const DEFAULT_TOP_K: usize = 8;

/// Aggregated view returned by [`MemoryHierarchy::load_context`]
#[derive(Debug, Clone)]
pub struct MemoryContext {
    /// Records reflected from the most recent episodic event
    pub reflected: Vec<MemoryRecord>,
    /// Semantic retrieval results for the query (empty without a query)
    pub retrieved: Vec<ScoredRecord>,
    /// Episodic events inside the look-back window
    pub episodic_events: Vec<AuditEvent>,
    /// Current RMT slots for the thread
    pub rmt_slots: BTreeMap<String, String>,
}

/// Composes episodic, semantic, and working memory into one facade
pub struct MemoryHierarchy {
    manager: Arc<MemoryManager>,
    clock: Arc<dyn Clock>,
}

impl MemoryHierarchy {
    /// Facade over `manager` with the system clock
    #[must_use]
    pub fn new(manager: Arc<MemoryManager>) -> Self {
        Self {
            manager,
            clock: Arc::new(SystemClock),
        }
    }

    /// Override the clock (tests)
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// The underlying manager
    #[must_use]
    pub fn manager(&self) -> &Arc<MemoryManager> {
        &self.manager
    }

    /// Log an event into episodic memory, optionally reflecting it into
    /// semantic memory
    ///
    /// # Errors
    ///
    /// As the underlying append and insert.
    pub async fn record_event(
        &self,
        event: AuditEvent,
        reflect: bool,
    ) -> Result<Vec<MemoryRecord>> {
        self.manager.log_audit(event.clone()).await?;
        if reflect {
            self.manager.reflect_event(&event).await
        } else {
            Ok(Vec::new())
        }
    }

    /// Bulk variant of [`MemoryHierarchy::record_event`]
    ///
    /// # Errors
    ///
    /// Stops at the first failing event.
    pub async fn record_events(
        &self,
        events: Vec<AuditEvent>,
        reflect: bool,
    ) -> Result<Vec<MemoryRecord>> {
        let mut reflected = Vec::new();
        for event in events {
            reflected.extend(self.record_event(event, reflect).await?);
        }
        Ok(reflected)
    }

    /// Persist the RMT buffer for a conversation thread
    ///
    /// # Errors
    ///
    /// As the working-memory store.
    pub async fn update_working_memory(
        &self,
        thread_id: &str,
        slots: BTreeMap<String, String>,
    ) -> Result<()> {
        self.manager.set_rmt(thread_id, slots).await
    }

    /// Assemble the full memory context for agent orchestration
    ///
    /// 1. Semantic retrieval for `query` (skipped when `None`)
    /// 2. Episodic events in `[now - since, now]` for the thread/user
    /// 3. Reflection of the most recent event in the window
    /// 4. RMT snapshot (empty mapping when absent)
    ///
    /// `since = None` disables the window's lower bound entirely.
    ///
    /// # Errors
    ///
    /// `Cancelled` when retrieval exceeds its deadline; store errors
    /// otherwise.
    pub async fn load_context(
        &self,
        thread_id: &str,
        query: Option<&str>,
        user_id: Option<&str>,
        top_k: usize,
        since: Option<Duration>,
    ) -> Result<MemoryContext> {
        let retrieved = match query {
            Some(query) => {
                self.manager
                    .retrieve(query, user_id, top_k, &SearchFilters::default())
                    .await?
            }
            None => Vec::new(),
        };

        let now = self.clock.now();
        let mut event_query = EventQuery::for_thread(thread_id).until(now);
        if let Some(window) = since {
            event_query = event_query.since(now - window);
        }
        if let Some(user) = user_id {
            event_query = event_query.user(user);
        }
        let episodic_events = self.manager.episodic().query(&event_query).await?;

        // Only the most recent event reflects, bounding writes per
        // context load.
        let reflected = match episodic_events.last() {
            Some(latest) => self.manager.reflect_event(latest).await?,
            None => Vec::new(),
        };

        let rmt_slots = self.manager.get_rmt(thread_id).await?;

        debug!(
            thread_id,
            retrieved = retrieved.len(),
            events = episodic_events.len(),
            reflected = reflected.len(),
            "context loaded"
        );
        Ok(MemoryContext {
            reflected,
            retrieved,
            episodic_events,
            rmt_slots,
        })
    }

    /// Formatted episodic snapshot for a thread
    ///
    /// # Errors
    ///
    /// As the episodic store.
    pub async fn thread_snapshot(&self, thread_id: &str) -> Result<String> {
        self.manager.snapshot_thread(thread_id).await
    }

    /// Bullet summaries of the last `hours` of a thread
    ///
    /// # Errors
    ///
    /// As the episodic store.
    pub async fn recent_timeline(&self, thread_id: &str, hours: i64) -> Result<Vec<String>> {
        let now = self.clock.now();
        let query = EventQuery::for_thread(thread_id)
            .since(now - Duration::hours(hours))
            .until(now);
        let events = self.manager.episodic().query(&query).await?;

        Ok(events
            .iter()
            .map(|event| {
                let detail = event
                    .payload
                    .get("summary")
                    .or_else(|| event.payload.get("text"))
                    .and_then(serde_json::Value::as_str)
                    .unwrap_or_default();
                format!(
                    "{} • {}:{} {}",
                    event.timestamp.format("%Y-%m-%dT%H:%M:%S"),
                    event.source,
                    event.action,
                    detail
                )
                .trim_end()
                .to_string()
            })
            .collect())
    }

    /// Invoke semantic consolidation
    ///
    /// # Errors
    ///
    /// As the consolidation engine.
    pub async fn consolidate(&self, user_id: Option<&str>) -> Result<ConsolidationOutcome> {
        self.manager.consolidate(user_id).await
    }

    /// Keep episodic memory bounded
    ///
    /// # Errors
    ///
    /// As the episodic store.
    pub async fn purge_episodic_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        self.manager.episodic().purge_before(cutoff).await
    }

    /// Backend health information; never raises
    pub async fn health_check(&self) -> HealthStatus {
        self.manager.health_check().await
    }
}

/// Render retrieval results into a numbered context block for prompting
///
/// Each result becomes `[n] text`; the footer lists the query. Empty
/// results render an empty string.
#[must_use]
pub fn render_context(query: &str, results: &[ScoredRecord]) -> String {
    if results.is_empty() {
        return String::new();
    }

    let mut sections: Vec<String> = results
        .iter()
        .enumerate()
        .map(|(i, scored)| format!("[{}] {}", i + 1, scored.record.text))
        .collect();
    sections.push(format!("(retrieved for: {query})"));
    sections.join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use mnemo_core::MemoryRecord;

    #[test]
    fn render_context_numbers_results() {
        let results = vec![
            ScoredRecord {
                record: MemoryRecord::new("u1", "first fact"),
                score: 0.9,
            },
            ScoredRecord {
                record: MemoryRecord::new("u1", "second fact"),
                score: 0.8,
            },
        ];
        let block = render_context("the query", &results);
        assert!(block.contains("[1] first fact"));
        assert!(block.contains("[2] second fact"));
        assert!(block.contains("the query"));
    }

    #[test]
    fn render_context_empty_is_empty() {
        assert!(render_context("q", &[]).is_empty());
    }
}
