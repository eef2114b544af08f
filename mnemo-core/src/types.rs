//! Core types for the memory system

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Kind of memory a record represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryType {
    /// Long-lived fact retrievable by meaning
    Semantic,
    /// Reflected episodic content
    Episodic,
    /// Persona / identity material
    Persona,
    /// Unresolved task or follow-up
    OpenLoop,
}

impl MemoryType {
    /// Storage-layer string form
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Semantic => "semantic",
            Self::Episodic => "episodic",
            Self::Persona => "persona",
            Self::OpenLoop => "open_loop",
        }
    }

    /// Parse from the storage-layer string form
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "semantic" => Some(Self::Semantic),
            "episodic" => Some(Self::Episodic),
            "persona" => Some(Self::Persona),
            "open_loop" => Some(Self::OpenLoop),
            _ => None,
        }
    }
}

impl Default for MemoryType {
    fn default() -> Self {
        Self::Semantic
    }
}

/// Normalized memory item stored in semantic memory
///
/// `text` is the canonical retrievable unit. If `embedding` is present its
/// length must equal the configured system dimension and `embedding_model`
/// records which model produced it. `(user_id, type, text)` is the natural
/// dedup key at consolidation time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    /// Stable unique identifier, created on insert if absent
    #[serde(default)]
    pub id: Option<String>,

    /// Owner key
    pub user_id: String,

    /// Optional case scoping key
    #[serde(default)]
    pub case_id: Option<String>,

    /// Optional thread scoping key
    #[serde(default)]
    pub thread_id: Option<String>,

    /// Memory kind
    #[serde(rename = "type", default)]
    pub memory_type: MemoryType,

    /// Non-empty content
    pub text: String,

    /// Vector embedding of `text`, dimension-validated on insert
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,

    /// Model id that produced `embedding`
    #[serde(default)]
    pub embedding_model: Option<String>,

    /// Importance in [0, 1]
    #[serde(default = "default_salience")]
    pub salience: f32,

    /// Certainty in [0, 1]
    #[serde(default = "default_confidence")]
    pub confidence: f32,

    /// Creation time, immutable
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,

    /// Provenance string (e.g. `pdf://petition.pdf`)
    #[serde(default)]
    pub source: Option<String>,

    /// Ordered, duplicate-free tag list
    #[serde(default)]
    pub tags: Vec<String>,

    /// Schema-free extension metadata
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

fn default_salience() -> f32 {
    0.7
}

fn default_confidence() -> f32 {
    0.6
}

impl MemoryRecord {
    /// Create a semantic record with defaults
    #[must_use]
    pub fn new(user_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: None,
            user_id: user_id.into(),
            case_id: None,
            thread_id: None,
            memory_type: MemoryType::Semantic,
            text: text.into(),
            embedding: None,
            embedding_model: None,
            salience: default_salience(),
            confidence: default_confidence(),
            created_at: Utc::now(),
            source: None,
            tags: Vec::new(),
            metadata: BTreeMap::new(),
        }
    }

    /// Set the record kind
    #[must_use]
    pub const fn with_type(mut self, memory_type: MemoryType) -> Self {
        self.memory_type = memory_type;
        self
    }

    /// Set the provenance string
    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Set the tag list
    #[must_use]
    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    /// Set the case scoping key
    #[must_use]
    pub fn with_case_id(mut self, case_id: impl Into<String>) -> Self {
        self.case_id = Some(case_id.into());
        self
    }

    /// Append a tag if not already present, preserving insertion order
    pub fn add_tag(&mut self, tag: impl Into<String>) {
        let tag = tag.into();
        if !self.tags.iter().any(|t| *t == tag) {
            self.tags.push(tag);
        }
    }

    /// Assign a fresh id if none is set, returning the effective id
    pub fn ensure_id(&mut self) -> &str {
        if self.id.is_none() {
            self.id = Some(Uuid::new_v4().to_string());
        }
        self.id.as_deref().unwrap_or_default()
    }
}

/// Structured audit event captured on each command or workflow transition
///
/// Append-only: never mutated after creation. Reflection policies may
/// convert events into `MemoryRecord`s.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Unique event id
    #[serde(default = "generate_id")]
    pub event_id: String,

    /// When the event occurred
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,

    /// Owner key, if attributable
    #[serde(default)]
    pub user_id: Option<String>,

    /// Conversation thread; `"global"` when absent
    #[serde(default)]
    pub thread_id: Option<String>,

    /// Origin, e.g. `workflow_node`
    pub source: String,

    /// Action name, e.g. `handle_command`
    pub action: String,

    /// Structured event detail
    #[serde(default)]
    pub payload: BTreeMap<String, Value>,

    /// Free-form labels
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Thread id applied when an event carries none
pub const GLOBAL_THREAD: &str = "global";

impl AuditEvent {
    /// Create an event with a fresh id and current timestamp
    #[must_use]
    pub fn new(source: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            event_id: generate_id(),
            timestamp: Utc::now(),
            user_id: None,
            thread_id: None,
            source: source.into(),
            action: action.into(),
            payload: BTreeMap::new(),
            tags: Vec::new(),
        }
    }

    /// Set the owner key
    #[must_use]
    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Set the thread id
    #[must_use]
    pub fn with_thread(mut self, thread_id: impl Into<String>) -> Self {
        self.thread_id = Some(thread_id.into());
        self
    }

    /// Insert a payload entry
    #[must_use]
    pub fn with_payload(mut self, key: impl Into<String>, value: Value) -> Self {
        self.payload.insert(key.into(), value);
        self
    }

    /// Set the tag list
    #[must_use]
    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    /// Effective thread id (`"global"` fallback)
    #[must_use]
    pub fn thread(&self) -> &str {
        self.thread_id.as_deref().unwrap_or(GLOBAL_THREAD)
    }
}

/// Filter options for episodic event retrieval
///
/// Events match when their timestamp falls inside `[since, until]`, the
/// user id equals the filter if present, and the event's tag set intersects
/// the query tags (case-insensitive). Results are chronological; `limit`
/// trims from the tail, keeping the latest entries.
#[derive(Debug, Clone, Default)]
pub struct EventQuery {
    /// Restrict to one thread
    pub thread_id: Option<String>,
    /// Restrict to one owner
    pub user_id: Option<String>,
    /// Match events whose tags intersect this set (case-insensitive)
    pub tags: Option<Vec<String>>,
    /// Inclusive lower bound on timestamp
    pub since: Option<DateTime<Utc>>,
    /// Inclusive upper bound on timestamp
    pub until: Option<DateTime<Utc>>,
    /// Keep only the latest N matches
    pub limit: Option<usize>,
}

impl EventQuery {
    /// Query scoped to a single thread
    #[must_use]
    pub fn for_thread(thread_id: impl Into<String>) -> Self {
        Self {
            thread_id: Some(thread_id.into()),
            ..Self::default()
        }
    }

    /// Set the inclusive lower time bound
    #[must_use]
    pub const fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    /// Set the inclusive upper time bound
    #[must_use]
    pub const fn until(mut self, until: DateTime<Utc>) -> Self {
        self.until = Some(until);
        self
    }

    /// Restrict to one owner
    #[must_use]
    pub fn user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }
}

/// Per-thread working-memory buffer (RMT slots)
///
/// Recognized slots are `persona`, `long_term_facts`, `open_loops`, and
/// `recent_summary`; unknown slots are preserved. Each write replaces the
/// whole value object (last-writer-wins, no partial patching).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RmtBuffer {
    /// Owning conversation thread
    pub thread_id: String,

    /// Slot name to slot content
    pub slots: BTreeMap<String, String>,

    /// Last write time
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,

    /// Optional TTL deadline; swept by the background purge
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl RmtBuffer {
    /// Create a buffer with the given slots, stamped now
    #[must_use]
    pub fn new(thread_id: impl Into<String>, slots: BTreeMap<String, String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            slots,
            updated_at: Utc::now(),
            expires_at: None,
        }
    }

    /// Whether the buffer has passed its TTL at `now`
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

fn generate_id() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn record_defaults() {
        let rec = MemoryRecord::new("u1", "EB-1A requires extraordinary ability");
        assert_eq!(rec.memory_type, MemoryType::Semantic);
        assert!((rec.salience - 0.7).abs() < f32::EPSILON);
        assert!((rec.confidence - 0.6).abs() < f32::EPSILON);
        assert!(rec.id.is_none());
        assert!(rec.embedding.is_none());
    }

    #[test]
    fn ensure_id_is_stable() {
        let mut rec = MemoryRecord::new("u1", "fact");
        let first = rec.ensure_id().to_string();
        let second = rec.ensure_id().to_string();
        assert_eq!(first, second);
    }

    #[test]
    fn add_tag_deduplicates() {
        let mut rec = MemoryRecord::new("u1", "fact");
        rec.add_tag("milestone");
        rec.add_tag("milestone");
        rec.add_tag("preference");
        assert_eq!(rec.tags, vec!["milestone", "preference"]);
    }

    #[test]
    fn event_thread_fallback() {
        let event = AuditEvent::new("workflow_node", "node_complete");
        assert_eq!(event.thread(), GLOBAL_THREAD);

        let event = event.with_thread("t-42");
        assert_eq!(event.thread(), "t-42");
    }

    #[test]
    fn memory_type_round_trip() {
        for t in [
            MemoryType::Semantic,
            MemoryType::Episodic,
            MemoryType::Persona,
            MemoryType::OpenLoop,
        ] {
            assert_eq!(MemoryType::parse(t.as_str()), Some(t));
        }
        assert_eq!(MemoryType::parse("unknown"), None);
    }

    #[test]
    fn record_serde_round_trip() {
        let mut rec = MemoryRecord::new("u1", "fact").with_source("test");
        rec.metadata.insert("chunk_index".into(), json!(3));
        let encoded = serde_json::to_string(&rec).unwrap();
        let decoded: MemoryRecord = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded.text, "fact");
        assert_eq!(decoded.metadata["chunk_index"], json!(3));
    }

    #[test]
    fn buffer_expiry() {
        let now = Utc::now();
        let mut buf = RmtBuffer::new("t1", BTreeMap::new());
        assert!(!buf.is_expired(now));
        buf.expires_at = Some(now - chrono::Duration::seconds(1));
        assert!(buf.is_expired(now));
    }
}
