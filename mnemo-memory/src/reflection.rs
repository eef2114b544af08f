//! Reflection policy: audit events into semantic memory
//!
//! The default policy is a string heuristic, so the core carries no LLM
//! dependency. An LLM-backed extractor can be swapped in behind the same
//! trait.

use mnemo_core::{AuditEvent, MemoryRecord, MemoryType};

/// Maximum characters of payload detail carried into the summary
const DETAIL_LIMIT: usize = 200;

/// Converts an audit event into zero or more memory records
pub trait ReflectionPolicy: Send + Sync {
    /// Records to persist for `event`
    fn reflect(&self, event: &AuditEvent) -> Vec<MemoryRecord>;
}

/// Compress an event to a one-line summary
///
/// Shape: `[{source}] {action} u={user_id|?} {payload.summary|payload.text|""}`,
/// detail truncated to 200 characters.
#[must_use]
pub fn compress_event(event: &AuditEvent) -> String {
    let user = event
        .user_id
        .as_ref()
        .map_or_else(|| "u=?".to_string(), |u| format!("u={u}"));

    let detail = event
        .payload
        .get("summary")
        .or_else(|| event.payload.get("text"))
        .map(|value| match value {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .unwrap_or_default();
    let detail: String = detail.chars().take(DETAIL_LIMIT).collect();

    format!("[{}] {} {} {}", event.source, event.action, user, detail)
        .trim()
        .to_string()
}

/// Heuristic salience picker: notable events become semantic facts
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicReflection;

impl ReflectionPolicy for HeuristicReflection {
    fn reflect(&self, event: &AuditEvent) -> Vec<MemoryRecord> {
        let text = compress_event(event);

        let mut tags = Vec::new();
        let event_tags_lower: Vec<String> =
            event.tags.iter().map(|t| t.to_lowercase()).collect();
        if matches!(event.action.as_str(), "handle_command" | "node_complete")
            || event_tags_lower.iter().any(|t| t == "milestone")
        {
            tags.push("milestone".to_string());
        }
        if event_tags_lower.iter().any(|t| t == "preference") {
            tags.push("preference".to_string());
        }

        let user_id = event.user_id.clone().unwrap_or_else(|| "anonymous".into());
        let mut record = MemoryRecord::new(user_id, text)
            .with_type(MemoryType::Semantic)
            .with_source(event.source.clone())
            .with_tags(tags);
        record.thread_id = event.thread_id.clone();
        record.salience = 0.7;
        record.confidence = 0.6;

        vec![record]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn summary_carries_source_action_user_and_detail() {
        let event = AuditEvent::new("workflow_node", "node_complete")
            .with_user("u1")
            .with_payload("summary", json!("drafted the petition outline"));
        let line = compress_event(&event);
        assert_eq!(
            line,
            "[workflow_node] node_complete u=u1 drafted the petition outline"
        );
    }

    #[test]
    fn missing_user_and_payload_degrade_gracefully() {
        let event = AuditEvent::new("telegram", "message_in");
        assert_eq!(compress_event(&event), "[telegram] message_in u=?");
    }

    #[test]
    fn detail_is_truncated_to_200_chars() {
        let event = AuditEvent::new("s", "a").with_payload("text", json!("x".repeat(500)));
        let line = compress_event(&event);
        assert!(line.chars().count() <= "[s] a u=? ".len() + 200);
    }

    #[test]
    fn milestone_actions_are_tagged() {
        let policy = HeuristicReflection;
        let records = policy.reflect(&AuditEvent::new("bot", "handle_command").with_user("u1"));
        assert_eq!(records.len(), 1);
        assert!(records[0].tags.contains(&"milestone".to_string()));
        assert!((records[0].salience - 0.7).abs() < f32::EPSILON);
        assert!((records[0].confidence - 0.6).abs() < f32::EPSILON);
        assert_eq!(records[0].memory_type, MemoryType::Semantic);
    }

    #[test]
    fn milestone_tag_on_event_also_counts() {
        let policy = HeuristicReflection;
        let event = AuditEvent::new("bot", "ordinary_action")
            .with_tags(vec!["Milestone".to_string()]);
        let records = policy.reflect(&event);
        assert!(records[0].tags.contains(&"milestone".to_string()));
    }

    #[test]
    fn preference_tag_carries_over() {
        let policy = HeuristicReflection;
        let event = AuditEvent::new("bot", "noted").with_tags(vec!["preference".to_string()]);
        let records = policy.reflect(&event);
        assert!(records[0].tags.contains(&"preference".to_string()));
        assert!(!records[0].tags.contains(&"milestone".to_string()));
    }

    #[test]
    fn anonymous_owner_when_event_has_no_user() {
        let policy = HeuristicReflection;
        let records = policy.reflect(&AuditEvent::new("bot", "seen"));
        assert_eq!(records[0].user_id, "anonymous");
    }
}
