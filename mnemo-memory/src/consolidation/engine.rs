//! Consolidation engine: decay, cluster, merge, compress

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, info, warn};

use mnemo_core::{cosine_similarity, Clock, MemoryRecord, Result, SemanticMemoryStore};

use super::{ConsolidationConfig, ConsolidationOutcome};

/// Metadata key recording when a record's salience was last decayed
///
/// Decay is applied incrementally from this marker (falling back to
/// `created_at` for records never decayed), so repeating a pass at an
/// unchanged clock multiplies salience by `0.5^0 = 1` and is a no-op.
const LAST_DECAY_KEY: &str = "last_decay_at";

/// Time-based importance decay factor
///
/// `factor = 0.5 ^ (age_days / half_life)`, floored at `min_importance`.
/// Ages at or below zero decay by 1.0 (no change).
#[must_use]
pub fn calculate_decay(
    created_at: DateTime<Utc>,
    reference: DateTime<Utc>,
    half_life_days: f64,
    min_importance: f32,
) -> f32 {
    let age_days = (reference - created_at).num_seconds() as f64 / 86_400.0;
    if age_days <= 0.0 || half_life_days <= 0.0 {
        return 1.0;
    }

    #[allow(clippy::cast_possible_truncation)]
    let decay = 0.5_f64.powf(age_days / half_life_days) as f32;
    decay.max(min_importance)
}

/// Start of the next decay interval for a record
///
/// The `last_decay_at` marker when present and valid (clamped to no
/// earlier than `created_at`), otherwise `created_at`.
fn decay_reference(record: &MemoryRecord) -> DateTime<Utc> {
    record
        .metadata
        .get(LAST_DECAY_KEY)
        .and_then(Value::as_str)
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        .map(|stamp| stamp.with_timezone(&Utc))
        .map_or(record.created_at, |stamp| stamp.max(record.created_at))
}

/// Greedy single-link clustering by cosine similarity
///
/// For each unvisited record `i`, every later unvisited `j` with
/// `cos(e_i, e_j) >= threshold` joins `i`'s cluster. Records without
/// embeddings never cluster. Only clusters with two or more members are
/// returned (as indices into `records`).
fn find_clusters(records: &[MemoryRecord], threshold: f32) -> Vec<Vec<usize>> {
    let embedded: Vec<usize> = records
        .iter()
        .enumerate()
        .filter(|(_, r)| r.embedding.is_some())
        .map(|(i, _)| i)
        .collect();
    if embedded.len() < 2 {
        return Vec::new();
    }

    let mut visited = vec![false; records.len()];
    let mut clusters = Vec::new();

    for (position, &i) in embedded.iter().enumerate() {
        if visited[i] {
            continue;
        }
        visited[i] = true;
        let mut cluster = vec![i];

        for &j in &embedded[position + 1..] {
            if visited[j] {
                continue;
            }
            let similarity = cosine_similarity(
                records[i].embedding.as_deref().unwrap_or_default(),
                records[j].embedding.as_deref().unwrap_or_default(),
            );
            if similarity >= threshold {
                visited[j] = true;
                cluster.push(j);
            }
        }

        if cluster.len() > 1 {
            clusters.push(cluster);
        }
    }

    clusters
}

/// Merge a duplicate cluster into one record
///
/// The member with the highest `(salience, created_at)` becomes the base:
/// its text, embedding, salience, and provenance survive. Tags union
/// (base order first), confidence averages across members, and metadata
/// gains `merged_from` and `merge_count`. The merged id is
/// `merged_<md5(base.text)[..12]>`, deterministic from the surviving text.
#[must_use]
pub fn merge_cluster(members: &[MemoryRecord]) -> MemoryRecord {
    debug_assert!(!members.is_empty());
    if members.len() == 1 {
        return members[0].clone();
    }

    let mut sorted: Vec<&MemoryRecord> = members.iter().collect();
    sorted.sort_by(|a, b| {
        b.salience
            .partial_cmp(&a.salience)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.created_at.cmp(&a.created_at))
    });
    let base = sorted[0];

    let mut merged = base.clone();

    for record in &sorted[1..] {
        for tag in &record.tags {
            if !merged.tags.contains(tag) {
                merged.tags.push(tag.clone());
            }
        }
    }

    #[allow(clippy::cast_precision_loss)]
    let confidence =
        sorted.iter().map(|r| r.confidence).sum::<f32>() / sorted.len() as f32;
    merged.confidence = confidence;

    let merged_from: Vec<Value> = sorted
        .iter()
        .filter_map(|r| r.id.clone())
        .map(Value::from)
        .collect();
    merged
        .metadata
        .insert("merged_from".to_string(), Value::Array(merged_from));
    merged
        .metadata
        .insert("merge_count".to_string(), Value::from(sorted.len()));

    let digest = md5::compute(base.text.as_bytes());
    let hex = format!("{digest:x}");
    merged.id = Some(format!("merged_{}", &hex[..12]));

    merged
}

/// Store-backed consolidation engine
///
/// Each cluster merge is all-or-nothing: the merged record is written
/// before the merged-away ids are deleted, so a failure mid-run never
/// loses the surviving text.
pub struct ConsolidationEngine {
    store: Arc<dyn SemanticMemoryStore>,
    config: ConsolidationConfig,
    clock: Arc<dyn Clock>,
}

impl ConsolidationEngine {
    /// Create an engine over `store`
    pub fn new(
        store: Arc<dyn SemanticMemoryStore>,
        config: ConsolidationConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            config,
            clock,
        }
    }

    /// Run one consolidation pass, optionally scoped to `user_id`
    ///
    /// # Errors
    ///
    /// `Store` when any rewrite fails; the store is left with at worst a
    /// fully-applied prefix of cluster merges.
    pub async fn consolidate(&self, user_id: Option<&str>) -> Result<ConsolidationOutcome> {
        let mut records = self.store.list(user_id).await?;
        let mut outcome = ConsolidationOutcome {
            total_before: records.len(),
            ..ConsolidationOutcome::default()
        };
        if records.is_empty() {
            return Ok(outcome);
        }

        // Step 1: decay salience. Each record decays over the interval
        // since its last decay pass (first pass: since creation), and the
        // marker advances to `now`, so re-running at the same clock
        // changes nothing.
        if self.config.enable_decay {
            let now = self.clock.now();
            let mut touched = Vec::new();
            for record in &mut records {
                let decay_start = decay_reference(record);
                let factor = calculate_decay(
                    decay_start,
                    now,
                    self.config.decay_half_life_days,
                    self.config.min_importance,
                );
                let decayed = (record.salience * factor).max(self.config.min_importance);
                if (decayed - record.salience).abs() > f32::EPSILON {
                    record.salience = decayed;
                    record
                        .metadata
                        .insert(LAST_DECAY_KEY.to_string(), Value::from(now.to_rfc3339()));
                    touched.push(record.clone());
                }
            }
            outcome.decayed = touched.len();
            if !touched.is_empty() {
                self.store.insert(touched).await?;
            }
        }

        // Step 2: cluster and merge, or exact-text dedup as fallback.
        if self.config.use_semantic_dedup {
            let clusters = find_clusters(&records, self.config.similarity_threshold);
            for cluster in &clusters {
                let members: Vec<MemoryRecord> =
                    cluster.iter().map(|&i| records[i].clone()).collect();
                let merged = merge_cluster(&members);
                let merged_id = merged.id.clone();

                let retired: Vec<String> = members
                    .iter()
                    .filter_map(|r| r.id.clone())
                    .filter(|id| Some(id) != merged_id.as_ref())
                    .collect();

                // Write the survivor first so a failure between the two
                // statements never drops the surviving text.
                self.store.insert(vec![merged]).await?;
                self.store.delete_by_ids(&retired).await?;

                outcome.merged += members.len() - 1;
                outcome
                    .clusters
                    .push(members.iter().filter_map(|r| r.id.clone()).collect());
            }
            outcome.deduplicated = outcome.merged;
        } else {
            let mut seen: BTreeSet<(String, String, String)> = BTreeSet::new();
            let mut retired = Vec::new();
            for record in &records {
                let key = (
                    record.user_id.clone(),
                    record.memory_type.as_str().to_string(),
                    record.text.clone(),
                );
                if seen.contains(&key) {
                    if let Some(id) = &record.id {
                        retired.push(id.clone());
                    }
                } else {
                    seen.insert(key);
                }
            }
            outcome.deduplicated = retired.len();
            if !retired.is_empty() {
                self.store.delete_by_ids(&retired).await?;
            }
        }

        // Step 3: compress by keeping top salience when still over the cap.
        let mut remaining = self.store.list(user_id).await?;
        if self.config.enable_compression
            && remaining.len() > self.config.compression_threshold
            && remaining.len() > self.config.max_memories_per_user
        {
            remaining.sort_by(|a, b| {
                b.salience
                    .partial_cmp(&a.salience)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            let excess: Vec<String> = remaining
                .iter()
                .skip(self.config.max_memories_per_user)
                .filter_map(|r| r.id.clone())
                .collect();
            outcome.compressed = excess.len();
            if !excess.is_empty() {
                self.store.delete_by_ids(&excess).await?;
                warn!(removed = excess.len(), "compressed low-salience memories");
            }
            remaining.truncate(self.config.max_memories_per_user);
        }

        outcome.total_after = remaining.len();
        info!(
            before = outcome.total_before,
            after = outcome.total_after,
            merged = outcome.merged,
            decayed = outcome.decayed,
            "consolidation pass complete"
        );
        debug!(clusters = outcome.clusters.len(), "cluster detail");
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record_with_embedding(
        user: &str,
        text: &str,
        embedding: Vec<f32>,
        salience: f32,
    ) -> MemoryRecord {
        let mut record = MemoryRecord::new(user, text);
        record.embedding = Some(embedding);
        record.salience = salience;
        record.ensure_id();
        record
    }

    #[test]
    fn decay_halves_per_half_life() {
        let now = Utc::now();
        let factor = calculate_decay(now - Duration::days(30), now, 30.0, 0.1);
        assert!((factor - 0.5).abs() < 0.01);

        let factor = calculate_decay(now - Duration::days(60), now, 30.0, 0.1);
        assert!((factor - 0.25).abs() < 0.01);
    }

    #[test]
    fn decay_is_floored_and_capped() {
        let now = Utc::now();
        // Far in the past: hits the floor.
        let factor = calculate_decay(now - Duration::days(3650), now, 30.0, 0.1);
        assert!((factor - 0.1).abs() < f32::EPSILON);
        // Future creation time: no decay.
        let factor = calculate_decay(now + Duration::days(1), now, 30.0, 0.1);
        assert!((factor - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn decay_reference_prefers_the_marker() {
        let now = Utc::now();
        let mut record = record_with_embedding("u1", "fact", vec![1.0, 0.0], 0.5);
        record.created_at = now - Duration::days(10);
        assert_eq!(decay_reference(&record), record.created_at);

        let marker = now - Duration::days(2);
        record.metadata.insert(
            LAST_DECAY_KEY.to_string(),
            Value::from(marker.to_rfc3339()),
        );
        assert_eq!(decay_reference(&record), marker);

        // Garbage markers fall back to creation time.
        record
            .metadata
            .insert(LAST_DECAY_KEY.to_string(), Value::from("not a timestamp"));
        assert_eq!(decay_reference(&record), record.created_at);

        // Markers before creation are clamped.
        let too_early = record.created_at - Duration::days(5);
        record.metadata.insert(
            LAST_DECAY_KEY.to_string(),
            Value::from(too_early.to_rfc3339()),
        );
        assert_eq!(decay_reference(&record), record.created_at);
    }

    #[test]
    fn double_decay_composes_like_doubled_age() {
        let now = Utc::now();
        let once = f64::from(calculate_decay(now - Duration::days(20), now, 30.0, 0.0));
        let doubled = f64::from(calculate_decay(now - Duration::days(40), now, 30.0, 0.0));
        assert!((once * once - doubled).abs() < 1e-5);
    }

    #[test]
    fn clustering_groups_similar_embeddings() {
        let records = vec![
            record_with_embedding("u1", "fact a", vec![1.0, 0.0, 0.0], 0.9),
            record_with_embedding("u1", "fact a'", vec![0.99, 0.1, 0.0], 0.5),
            record_with_embedding("u1", "fact b", vec![0.0, 1.0, 0.0], 0.7),
        ];
        let clusters = find_clusters(&records, 0.95);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0], vec![0, 1]);
    }

    #[test]
    fn records_without_embeddings_never_cluster() {
        let mut bare = MemoryRecord::new("u1", "no embedding");
        bare.ensure_id();
        let records = vec![
            bare,
            record_with_embedding("u1", "fact", vec![1.0, 0.0], 0.5),
        ];
        assert!(find_clusters(&records, 0.5).is_empty());
    }

    #[test]
    fn merge_keeps_highest_salience_base_and_unions_tags() {
        let mut low = record_with_embedding("u1", "low text", vec![1.0, 0.0], 0.3);
        low.tags = vec!["alpha".into()];
        low.confidence = 0.4;
        let mut high = record_with_embedding("u1", "high text", vec![0.99, 0.1], 0.9);
        high.tags = vec!["beta".into()];
        high.confidence = 0.8;

        let merged = merge_cluster(&[low.clone(), high.clone()]);

        assert_eq!(merged.text, "high text");
        assert!(merged.tags.contains(&"alpha".to_string()));
        assert!(merged.tags.contains(&"beta".to_string()));
        assert!((merged.confidence - 0.6).abs() < 1e-6);
        assert_eq!(merged.metadata["merge_count"], Value::from(2_usize));
        let merged_from = merged.metadata["merged_from"].as_array().unwrap();
        assert_eq!(merged_from.len(), 2);
        assert!(merged.id.as_deref().unwrap().starts_with("merged_"));
        assert_eq!(merged.id.as_deref().unwrap().len(), "merged_".len() + 12);
    }

    #[test]
    fn merged_id_is_deterministic_from_base_text() {
        let a = record_with_embedding("u1", "same base", vec![1.0, 0.0], 0.9);
        let b = record_with_embedding("u1", "other", vec![0.99, 0.05], 0.1);
        let first = merge_cluster(&[a.clone(), b.clone()]);
        let second = merge_cluster(&[a, b]);
        assert_eq!(first.id, second.id);
    }
}
