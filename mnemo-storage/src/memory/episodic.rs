//! In-memory episodic event store

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use mnemo_core::traits::episodic::{event_matches, validate_event};
use mnemo_core::{AuditEvent, EpisodicStore, EventQuery, Result};

/// Append-only event log held in a process-local vector
#[derive(Default)]
pub struct InMemoryEpisodicStore {
    events: Arc<RwLock<Vec<AuditEvent>>>,
}

impl InMemoryEpisodicStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn sorted_chronological(mut events: Vec<AuditEvent>) -> Vec<AuditEvent> {
        events.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then_with(|| a.event_id.cmp(&b.event_id))
        });
        events
    }
}

#[async_trait]
impl EpisodicStore for InMemoryEpisodicStore {
    async fn append(&self, event: AuditEvent) -> Result<()> {
        validate_event(&event)?;
        self.events.write().push(event);
        Ok(())
    }

    async fn thread_events(
        &self,
        thread_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<AuditEvent>> {
        let matching: Vec<AuditEvent> = {
            let events = self.events.read();
            events
                .iter()
                .filter(|e| e.thread() == thread_id)
                .cloned()
                .collect()
        };

        let mut events = Self::sorted_chronological(matching);
        if let Some(limit) = limit {
            if limit > 0 && events.len() > limit {
                events.drain(..events.len() - limit);
            }
        }
        Ok(events)
    }

    async fn recent(&self, limit: usize) -> Result<Vec<AuditEvent>> {
        let mut events = Self::sorted_chronological(self.events.read().clone());
        events.reverse();
        events.truncate(limit);
        Ok(events)
    }

    async fn all_by_thread(&self) -> Result<BTreeMap<String, Vec<AuditEvent>>> {
        let events = Self::sorted_chronological(self.events.read().clone());
        let mut grouped: BTreeMap<String, Vec<AuditEvent>> = BTreeMap::new();
        for event in events {
            grouped
                .entry(event.thread().to_string())
                .or_default()
                .push(event);
        }
        Ok(grouped)
    }

    async fn query(&self, query: &EventQuery) -> Result<Vec<AuditEvent>> {
        let matching: Vec<AuditEvent> = {
            let events = self.events.read();
            events
                .iter()
                .filter(|e| event_matches(e, query))
                .cloned()
                .collect()
        };

        let mut events = Self::sorted_chronological(matching);
        if let Some(limit) = query.limit {
            if limit > 0 && events.len() > limit {
                events.drain(..events.len() - limit);
            }
        }
        Ok(events)
    }

    async fn purge_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut events = self.events.write();
        let before = events.len();
        events.retain(|e| e.timestamp >= cutoff);
        Ok((before - events.len()) as u64)
    }

    async fn health_check(&self) -> bool {
        true
    }
}
