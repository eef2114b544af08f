//! Unified memory manager
//!
//! The facade collaborators talk to: write/reflect, audit logging,
//! retrieval, RMT buffers, consolidation, thread snapshots, and health.
//! Holds the three stores by capability; no additional state.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Duration as ChronoDuration;
use tracing::debug;

use mnemo_core::traits::semantic::{ScoredRecord, SearchFilters};
use mnemo_core::{
    AuditEvent, Clock, EpisodicStore, MemoryError, MemoryRecord, Result, SemanticMemoryStore,
    SystemClock, WorkingMemoryStore,
};
use mnemo_rag::DeterministicEmbedder;
use mnemo_storage::{InMemoryEpisodicStore, InMemorySemanticStore, InMemoryWorkingMemory};

use crate::consolidation::{ConsolidationConfig, ConsolidationEngine, ConsolidationOutcome};
use crate::reflection::{HeuristicReflection, ReflectionPolicy};

/// Default retrieval deadline
pub const RETRIEVAL_DEADLINE: Duration = Duration::from_secs(10);
/// Default consolidation deadline
pub const CONSOLIDATION_DEADLINE: Duration = Duration::from_secs(15 * 60);

/// Per-backend health report; probes never raise
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthStatus {
    /// Semantic store reachable
    pub semantic: bool,
    /// Episodic store reachable
    pub episodic: bool,
    /// Working memory reachable
    pub working: bool,
}

/// Composes the three stores behind one API
pub struct MemoryManager {
    semantic: Arc<dyn SemanticMemoryStore>,
    episodic: Arc<dyn EpisodicStore>,
    working: Arc<dyn WorkingMemoryStore>,
    reflection: Arc<dyn ReflectionPolicy>,
    consolidation: ConsolidationEngine,
    retrieval_deadline: Duration,
}

impl MemoryManager {
    /// Assemble a manager from store implementations
    #[must_use]
    pub fn new(
        semantic: Arc<dyn SemanticMemoryStore>,
        episodic: Arc<dyn EpisodicStore>,
        working: Arc<dyn WorkingMemoryStore>,
    ) -> Self {
        Self::with_parts(
            semantic,
            episodic,
            working,
            Arc::new(HeuristicReflection),
            ConsolidationConfig::default(),
            Arc::new(SystemClock),
        )
    }

    /// Full control over the reflection policy, consolidation tuning, and
    /// clock
    #[must_use]
    pub fn with_parts(
        semantic: Arc<dyn SemanticMemoryStore>,
        episodic: Arc<dyn EpisodicStore>,
        working: Arc<dyn WorkingMemoryStore>,
        reflection: Arc<dyn ReflectionPolicy>,
        consolidation: ConsolidationConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let engine = ConsolidationEngine::new(Arc::clone(&semantic), consolidation, clock);
        Self {
            semantic,
            episodic,
            working,
            reflection,
            consolidation: engine,
            retrieval_deadline: RETRIEVAL_DEADLINE,
        }
    }

    /// In-memory manager for development and tests
    ///
    /// Uses the deterministic embedder, so retrieval properties hold
    /// without any external provider.
    #[must_use]
    pub fn new_in_memory() -> Self {
        let embedder = Arc::new(DeterministicEmbedder::default());
        Self::new(
            Arc::new(InMemorySemanticStore::new(embedder, "dev")),
            Arc::new(InMemoryEpisodicStore::new()),
            Arc::new(InMemoryWorkingMemory::new()),
        )
    }

    /// Override the retrieval deadline
    #[must_use]
    pub const fn with_retrieval_deadline(mut self, deadline: Duration) -> Self {
        self.retrieval_deadline = deadline;
        self
    }

    /// The semantic store
    #[must_use]
    pub fn semantic(&self) -> &Arc<dyn SemanticMemoryStore> {
        &self.semantic
    }

    /// The episodic store
    #[must_use]
    pub fn episodic(&self) -> &Arc<dyn EpisodicStore> {
        &self.episodic
    }

    /// The working-memory store
    #[must_use]
    pub fn working(&self) -> &Arc<dyn WorkingMemoryStore> {
        &self.working
    }

    /// Persist records into semantic memory, returning them with assigned
    /// ids
    ///
    /// # Errors
    ///
    /// As [`SemanticMemoryStore::insert`].
    pub async fn write(&self, mut records: Vec<MemoryRecord>) -> Result<Vec<MemoryRecord>> {
        for record in &mut records {
            record.ensure_id();
        }
        self.semantic.insert(records.clone()).await?;
        Ok(records)
    }

    /// Run the reflection policy over `event` and persist the result
    ///
    /// # Errors
    ///
    /// As [`SemanticMemoryStore::insert`].
    pub async fn reflect_event(&self, event: &AuditEvent) -> Result<Vec<MemoryRecord>> {
        let records = self.reflection.reflect(event);
        if records.is_empty() {
            return Ok(Vec::new());
        }
        self.write(records).await
    }

    /// Append an audit event to episodic memory
    ///
    /// # Errors
    ///
    /// As [`EpisodicStore::append`].
    pub async fn log_audit(&self, event: AuditEvent) -> Result<()> {
        self.episodic.append(event).await
    }

    /// Semantic retrieval under the configured deadline
    ///
    /// # Errors
    ///
    /// `Cancelled` on deadline expiry, otherwise as
    /// [`SemanticMemoryStore::search`].
    pub async fn retrieve(
        &self,
        query: &str,
        user_id: Option<&str>,
        top_k: usize,
        filters: &SearchFilters,
    ) -> Result<Vec<ScoredRecord>> {
        tokio::time::timeout(
            self.retrieval_deadline,
            self.semantic.search(query, user_id, top_k, filters),
        )
        .await
        .map_err(|_| MemoryError::Cancelled("retrieval deadline expired".into()))?
    }

    /// Weighted knowledge-base/case hybrid retrieval under the deadline
    ///
    /// # Errors
    ///
    /// `Cancelled` on deadline expiry, `Config` for an out-of-range
    /// weight, otherwise as the underlying searches.
    pub async fn retrieve_hybrid(
        &self,
        query: &str,
        case_id: Option<&str>,
        user_id: Option<&str>,
        top_k: usize,
        kb_weight: f32,
    ) -> Result<Vec<ScoredRecord>> {
        tokio::time::timeout(
            self.retrieval_deadline,
            self.semantic
                .search_hybrid(query, case_id, user_id, top_k, kb_weight),
        )
        .await
        .map_err(|_| MemoryError::Cancelled("retrieval deadline expired".into()))?
    }

    /// Consolidate semantic memory, optionally scoped to one user
    ///
    /// # Errors
    ///
    /// `Cancelled` after 15 minutes, otherwise as the engine.
    pub async fn consolidate(&self, user_id: Option<&str>) -> Result<ConsolidationOutcome> {
        tokio::time::timeout(CONSOLIDATION_DEADLINE, self.consolidation.consolidate(user_id))
            .await
            .map_err(|_| MemoryError::Cancelled("consolidation deadline expired".into()))?
    }

    /// Replace the RMT buffer for a thread
    ///
    /// # Errors
    ///
    /// As [`WorkingMemoryStore::set_buffer`].
    pub async fn set_rmt(
        &self,
        thread_id: &str,
        slots: BTreeMap<String, String>,
    ) -> Result<()> {
        self.working.set_buffer(thread_id, slots).await
    }

    /// Replace the RMT buffer with a TTL
    ///
    /// # Errors
    ///
    /// As [`WorkingMemoryStore::set_buffer_with_ttl`].
    pub async fn set_rmt_with_ttl(
        &self,
        thread_id: &str,
        slots: BTreeMap<String, String>,
        ttl: ChronoDuration,
    ) -> Result<()> {
        self.working.set_buffer_with_ttl(thread_id, slots, ttl).await
    }

    /// Current RMT slots for a thread (empty mapping when absent)
    ///
    /// # Errors
    ///
    /// As [`WorkingMemoryStore::get_buffer`].
    pub async fn get_rmt(&self, thread_id: &str) -> Result<BTreeMap<String, String>> {
        Ok(self
            .working
            .get_buffer(thread_id)
            .await?
            .map(|buffer| buffer.slots)
            .unwrap_or_default())
    }

    /// Formatted audit timeline for a thread
    ///
    /// # Errors
    ///
    /// As [`EpisodicStore::thread_events`].
    pub async fn snapshot_thread(&self, thread_id: &str) -> Result<String> {
        let events = self.episodic.thread_events(thread_id, None).await?;
        debug!(events = events.len(), thread_id, "rendering thread snapshot");
        Ok(events
            .iter()
            .map(|event| {
                format!(
                    "{} {}:{} {}",
                    event.timestamp.to_rfc3339(),
                    event.source,
                    event.action,
                    serde_json::Value::Object(event.payload.clone().into_iter().collect())
                )
            })
            .collect::<Vec<_>>()
            .join("\n"))
    }

    /// Probe every backend; never raises
    pub async fn health_check(&self) -> HealthStatus {
        HealthStatus {
            semantic: self.semantic.health_check().await,
            episodic: self.episodic.health_check().await,
            working: self.working.health_check().await,
        }
    }
}
