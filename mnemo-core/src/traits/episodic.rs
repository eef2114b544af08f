//! Episodic memory store trait
//!
//! Append-only timeline of `AuditEvent`s supporting thread-grouped reads
//! and flexible filtering. No event is ever rewritten after creation;
//! chronological reads tie-break on `event_id`.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::{MemoryError, Result};
use crate::types::{AuditEvent, EventQuery};

/// Validate an event before append
///
/// # Errors
///
/// `Validation` when `source` or `action` is empty.
pub fn validate_event(event: &AuditEvent) -> Result<()> {
    if event.source.trim().is_empty() {
        return Err(MemoryError::Validation(
            "audit event source must be non-empty".into(),
        ));
    }
    if event.action.trim().is_empty() {
        return Err(MemoryError::Validation(
            "audit event action must be non-empty".into(),
        ));
    }
    Ok(())
}

/// Append-only episodic event store
#[async_trait]
pub trait EpisodicStore: Send + Sync {
    /// Append one event
    ///
    /// # Errors
    ///
    /// `Validation` for empty source/action, `Store` on persistence failure.
    async fn append(&self, event: AuditEvent) -> Result<()>;

    /// Events of one thread, chronologically ascending
    ///
    /// With `limit = Some(n)`, `n > 0`, only the last `n` entries are kept.
    async fn thread_events(
        &self,
        thread_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<AuditEvent>>;

    /// Most recent events across all threads, newest first, up to `limit`
    async fn recent(&self, limit: usize) -> Result<Vec<AuditEvent>>;

    /// All events grouped by thread id
    ///
    /// Returns an owned copy, never a live view. Unsuitable for large
    /// corpora; admin-only.
    async fn all_by_thread(&self) -> Result<BTreeMap<String, Vec<AuditEvent>>>;

    /// Filtered event retrieval per `EventQuery` semantics
    async fn query(&self, query: &EventQuery) -> Result<Vec<AuditEvent>>;

    /// Delete events with `timestamp < cutoff`, returning the count removed
    async fn purge_before(&self, cutoff: DateTime<Utc>) -> Result<u64>;

    /// Connectivity probe; never returns an error
    async fn health_check(&self) -> bool;
}

/// Apply `EventQuery` filters to one event (shared by in-memory backends)
#[must_use]
pub fn event_matches(event: &AuditEvent, query: &EventQuery) -> bool {
    if let Some(thread_id) = &query.thread_id {
        if event.thread() != thread_id {
            return false;
        }
    }
    if let Some(user_id) = &query.user_id {
        if event.user_id.as_deref() != Some(user_id.as_str()) {
            return false;
        }
    }
    if let Some(since) = query.since {
        if event.timestamp < since {
            return false;
        }
    }
    if let Some(until) = query.until {
        if event.timestamp > until {
            return false;
        }
    }
    if let Some(tags) = &query.tags {
        let wanted: Vec<String> = tags.iter().map(|t| t.to_lowercase()).collect();
        let has_overlap = event
            .tags
            .iter()
            .any(|t| wanted.contains(&t.to_lowercase()));
        if !has_overlap {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_source_and_action() {
        let event = AuditEvent::new("", "act");
        assert!(validate_event(&event).is_err());

        let event = AuditEvent::new("src", "  ");
        assert!(validate_event(&event).is_err());

        let event = AuditEvent::new("workflow_node", "node_complete");
        assert!(validate_event(&event).is_ok());
    }

    #[test]
    fn tag_matching_is_case_insensitive() {
        let event = AuditEvent::new("s", "a").with_tags(vec!["Milestone".into()]);
        let query = EventQuery {
            tags: Some(vec!["milestone".into()]),
            ..EventQuery::default()
        };
        assert!(event_matches(&event, &query));

        let query = EventQuery {
            tags: Some(vec!["preference".into()]),
            ..EventQuery::default()
        };
        assert!(!event_matches(&event, &query));
    }

    #[test]
    fn window_bounds_are_inclusive() {
        let event = AuditEvent::new("s", "a");
        let query = EventQuery::default()
            .since(event.timestamp)
            .until(event.timestamp);
        assert!(event_matches(&event, &query));
    }
}
