//! In-memory working-memory (RMT buffer) store

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;

use mnemo_core::{Result, RmtBuffer, WorkingMemoryStore};

/// RMT buffers held in a process-local map
#[derive(Default)]
pub struct InMemoryWorkingMemory {
    buffers: Arc<RwLock<HashMap<String, RmtBuffer>>>,
}

impl InMemoryWorkingMemory {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WorkingMemoryStore for InMemoryWorkingMemory {
    async fn set_buffer(&self, thread_id: &str, slots: BTreeMap<String, String>) -> Result<()> {
        let buffer = RmtBuffer::new(thread_id, slots);
        self.buffers.write().insert(thread_id.to_string(), buffer);
        Ok(())
    }

    async fn set_buffer_with_ttl(
        &self,
        thread_id: &str,
        slots: BTreeMap<String, String>,
        ttl: Duration,
    ) -> Result<()> {
        let mut buffer = RmtBuffer::new(thread_id, slots);
        buffer.expires_at = Some(Utc::now() + ttl);
        self.buffers.write().insert(thread_id.to_string(), buffer);
        Ok(())
    }

    async fn get_buffer(&self, thread_id: &str) -> Result<Option<RmtBuffer>> {
        Ok(self.buffers.read().get(thread_id).cloned())
    }

    async fn delete_buffer(&self, thread_id: &str) -> Result<bool> {
        Ok(self.buffers.write().remove(thread_id).is_some())
    }

    async fn list_all(&self) -> Result<Vec<RmtBuffer>> {
        let mut buffers: Vec<RmtBuffer> = self.buffers.read().values().cloned().collect();
        buffers.sort_by(|a, b| a.thread_id.cmp(&b.thread_id));
        Ok(buffers)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut buffers = self.buffers.write();
        let before = buffers.len();
        buffers.retain(|_, buffer| !buffer.is_expired(now));
        Ok((before - buffers.len()) as u64)
    }

    async fn health_check(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slots(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[tokio::test]
    async fn set_then_get_is_last_writer_wins() {
        let store = InMemoryWorkingMemory::new();

        store
            .set_buffer("t1", slots(&[("persona", "legal assistant")]))
            .await
            .unwrap();
        store
            .set_buffer(
                "t1",
                slots(&[("persona", "paralegal"), ("open_loops", "file RFE")]),
            )
            .await
            .unwrap();

        let buffer = store.get_buffer("t1").await.unwrap().unwrap();
        assert_eq!(buffer.slots["persona"], "paralegal");
        assert_eq!(buffer.slots["open_loops"], "file RFE");
        assert_eq!(buffer.slots.len(), 2);
    }

    #[tokio::test]
    async fn absent_buffer_is_none() {
        let store = InMemoryWorkingMemory::new();
        assert!(store.get_buffer("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_reports_existence() {
        let store = InMemoryWorkingMemory::new();
        store.set_buffer("t1", slots(&[])).await.unwrap();
        assert!(store.delete_buffer("t1").await.unwrap());
        assert!(!store.delete_buffer("t1").await.unwrap());
    }

    #[tokio::test]
    async fn purge_removes_only_expired() {
        let store = InMemoryWorkingMemory::new();
        store
            .set_buffer_with_ttl("old", slots(&[]), Duration::seconds(-5))
            .await
            .unwrap();
        store
            .set_buffer_with_ttl("fresh", slots(&[]), Duration::hours(1))
            .await
            .unwrap();
        store.set_buffer("eternal", slots(&[])).await.unwrap();

        let purged = store.purge_expired(Utc::now()).await.unwrap();
        assert_eq!(purged, 1);
        assert!(store.get_buffer("old").await.unwrap().is_none());
        assert!(store.get_buffer("fresh").await.unwrap().is_some());
        assert!(store.get_buffer("eternal").await.unwrap().is_some());
    }
}
