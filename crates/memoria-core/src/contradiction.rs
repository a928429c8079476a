//! Contradiction detector.
//!
//! The exact classification heuristics are an open design choice rather than
//! a fixed mapping — this module picks one consistent, testable scheme
//! (similarity-gated polarity and marker-word checks) rather than chasing
//! any particular reference behavior.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::embedding::cosine_similarity;
use crate::model::{ContradictionType, MemoryRecord, Severity};
use crate::store::{Filter, Store, COLLECTION_MEMORIES};

const TOP_K: usize = 20;
const SIMILARITY_THRESHOLD: f32 = 0.75;
const DIRECT_SIMILARITY_THRESHOLD: f32 = 0.88;
const PROBABILITY_THRESHOLD: f64 = 0.5;

const NEGATIVE_MARKERS: &[&str] = &["dislike", "hate", "don't", "doesn't", "won't", "never", "stopped", "no longer", "not anymore", " no "];
const TEMPORAL_MARKERS: &[&str] = &["before", "after", " now", "previously", "currently", "used to", "today", "anymore"];

/// A contradiction candidate surfaced for a new atom against an existing memory.
#[derive(Debug, Clone)]
pub struct ContradictionCandidate {
    pub target_id: String,
    pub target_created_at: DateTime<Utc>,
    pub similarity: f32,
    pub contradiction_type: ContradictionType,
    pub probability: f64,
    pub severity: Severity,
    pub explanation: String,
}

fn has_any(text_lower: &str, markers: &[&str]) -> bool {
    markers.iter().any(|m| text_lower.contains(m))
}

fn tokens(text: &str) -> BTreeSet<String> {
    text.to_lowercase()
        .split_whitespace()
        .map(|t| t.trim_matches(|c: char| !c.is_alphanumeric()).to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

/// Classify the relationship between an existing memory and a candidate
/// atom that is already known to be semantically similar. Returns `None`
/// when no heuristic fires.
fn classify(
    candidate: &MemoryRecord,
    candidate_is_preference_like: bool,
    new_text: &str,
    new_tags: &BTreeSet<String>,
    new_is_preference_like: bool,
    similarity: f32,
) -> Option<(ContradictionType, f64)> {
    let c_lower = candidate.text.to_lowercase();
    let n_lower = new_text.to_lowercase();
    let c_negative = has_any(&c_lower, NEGATIVE_MARKERS);
    let n_negative = has_any(&n_lower, NEGATIVE_MARKERS);
    let opposite_polarity = c_negative != n_negative;
    let shared_tags = candidate.tags.intersection(new_tags).next().is_some();
    let shared_tokens = tokens(&candidate.text).intersection(&tokens(new_text)).next().is_some();

    if candidate_is_preference_like && new_is_preference_like && shared_tags && opposite_polarity {
        return Some((ContradictionType::Preference, similarity as f64 * 0.95));
    }
    if shared_tokens && (has_any(&c_lower, TEMPORAL_MARKERS) || has_any(&n_lower, TEMPORAL_MARKERS)) {
        return Some((ContradictionType::Temporal, similarity as f64 * 0.85));
    }
    if similarity >= DIRECT_SIMILARITY_THRESHOLD && opposite_polarity {
        return Some((ContradictionType::Direct, similarity as f64 * 1.0));
    }
    if similarity >= SIMILARITY_THRESHOLD && shared_tokens {
        return Some((ContradictionType::ContextDependent, similarity as f64 * 0.7));
    }
    None
}

/// Detect contradictions for a candidate atom against an agent's existing
/// memories. On any store failure, logs and returns an empty list — a
/// broken similarity lookup must never block the pipeline.
pub async fn detect(
    store: &dyn Store,
    agent_id: &str,
    new_text: &str,
    new_tags: &BTreeSet<String>,
    new_is_preference_like: bool,
    new_embedding: &[f32],
) -> Vec<ContradictionCandidate> {
    let candidates = match store.find(COLLECTION_MEMORIES, Filter::new().eq("agentId", agent_id), None, None).await {
        Ok(docs) => docs,
        Err(e) => {
            warn!(error = %e, "contradiction detector: candidate retrieval failed, skipping");
            return Vec::new();
        }
    };

    let mut scored: Vec<(f32, MemoryRecord)> = candidates
        .into_iter()
        .filter_map(|doc| bson::from_document::<MemoryRecord>(doc).ok())
        .map(|m| (cosine_similarity(new_embedding, &m.embedding), m))
        .filter(|(sim, _)| *sim >= SIMILARITY_THRESHOLD)
        .collect();

    scored.sort_by(|(sim_a, rec_a), (sim_b, rec_b)| {
        sim_b.partial_cmp(sim_a).unwrap_or(std::cmp::Ordering::Equal).then_with(|| rec_a.created_at.cmp(&rec_b.created_at))
    });
    scored.truncate(TOP_K);

    let mut out = Vec::new();
    for (similarity, candidate) in scored {
        let is_pref_like = candidate.memory_type.is_preference_like();
        let Some((kind, probability)) = classify(&candidate, is_pref_like, new_text, new_tags, new_is_preference_like, similarity) else {
            continue;
        };
        if probability < PROBABILITY_THRESHOLD {
            continue;
        }
        let severity = Severity::from_probability(probability);
        out.push(ContradictionCandidate {
            target_id: candidate.id.clone(),
            target_created_at: candidate.created_at,
            similarity,
            contradiction_type: kind,
            probability,
            severity,
            explanation: format!(
                "new statement \"{new_text}\" appears to {} the existing memory \"{}\"",
                match kind {
                    ContradictionType::Direct => "directly contradict",
                    ContradictionType::Preference => "reverse a stated preference in",
                    ContradictionType::Temporal => "supersede, with a time qualifier,",
                    ContradictionType::ContextDependent => "conflict, depending on context, with",
                },
                candidate.text
            ),
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Layer, MemoryType, RememberOptions};
    use crate::store::{memory_store::InMemoryStore, to_insertable_document};
    use std::collections::BTreeSet;

    async fn seed(store: &InMemoryStore, agent: &str, text: &str, embedding: Vec<f32>, memory_type: MemoryType) -> MemoryRecord {
        let now = Utc::now();
        let opts = RememberOptions { memory_type: Some(memory_type), ..Default::default() };
        let m = MemoryRecord::new(agent, text, embedding, 4, opts, now).unwrap();
        let doc = to_insertable_document(&m).unwrap();
        let id = store.insert_one(COLLECTION_MEMORIES, doc).await.unwrap();
        let mut m = m;
        m.id = id;
        m
    }

    #[tokio::test]
    async fn direct_contradiction_detected_for_near_identical_opposite_polarity() {
        let store = InMemoryStore::new();
        seed(&store, "agent-A", "I love dark mode and never use light themes", vec![1.0, 0.0, 0.0, 0.0], MemoryType::Preference).await;

        let results = detect(
            &store,
            "agent-A",
            "I hate dark mode and never use light themes",
            &BTreeSet::new(),
            true,
            &[0.99, 0.01, 0.0, 0.0],
        )
        .await;

        assert_eq!(results.len(), 1);
        assert!(results[0].probability >= 0.5);
    }

    #[tokio::test]
    async fn dissimilar_memories_produce_no_candidates() {
        let store = InMemoryStore::new();
        seed(&store, "agent-A", "The sky is blue", vec![1.0, 0.0, 0.0, 0.0], MemoryType::Fact).await;

        let results = detect(&store, "agent-A", "Rust has a strong type system", &BTreeSet::new(), false, &[0.0, 0.0, 0.0, 1.0]).await;
        assert!(results.is_empty());
    }
}
