//! Working-memory (RMT buffer) store trait
//!
//! Small mutable per-thread slot store for conversational state. Writes are
//! last-writer-wins full replacements; there is no merge at this layer.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::error::Result;
use crate::types::RmtBuffer;

/// Per-thread slot store with optional TTL
#[async_trait]
pub trait WorkingMemoryStore: Send + Sync {
    /// Upsert the buffer for a thread, replacing the whole value object
    async fn set_buffer(&self, thread_id: &str, slots: BTreeMap<String, String>) -> Result<()>;

    /// Upsert with a TTL; the buffer becomes eligible for the background
    /// sweep once `now + ttl` passes
    async fn set_buffer_with_ttl(
        &self,
        thread_id: &str,
        slots: BTreeMap<String, String>,
        ttl: Duration,
    ) -> Result<()>;

    /// Current buffer for a thread, or `None` when absent
    async fn get_buffer(&self, thread_id: &str) -> Result<Option<RmtBuffer>>;

    /// Remove a thread's buffer, returning whether one existed
    async fn delete_buffer(&self, thread_id: &str) -> Result<bool>;

    /// All buffers (admin / sweep support)
    async fn list_all(&self) -> Result<Vec<RmtBuffer>>;

    /// Delete buffers whose TTL passed before `now`, returning the count
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64>;

    /// Connectivity probe; never returns an error
    async fn health_check(&self) -> bool;
}
