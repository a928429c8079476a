//! Memory record — the primary entity of the reliability engine.
//!
//! A memory combines embedded content with reliability state (confidence,
//! strength) and a small set of graph relations to other memories.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Memory tier, determining decay rate and retention policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Layer {
    Working,
    #[default]
    Episodic,
    Semantic,
    Archival,
}

impl Layer {
    pub fn as_str(&self) -> &'static str {
        match self {
            Layer::Working => "working",
            Layer::Episodic => "episodic",
            Layer::Semantic => "semantic",
            Layer::Archival => "archival",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "working" => Some(Layer::Working),
            "episodic" => Some(Layer::Episodic),
            "semantic" => Some(Layer::Semantic),
            "archival" => Some(Layer::Archival),
            _ => None,
        }
    }
}

impl std::fmt::Display for Layer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Classification of what a memory represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MemoryType {
    #[default]
    Fact,
    Preference,
    Decision,
    Observation,
    Episode,
    Opinion,
}

impl MemoryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryType::Fact => "fact",
            MemoryType::Preference => "preference",
            MemoryType::Decision => "decision",
            MemoryType::Observation => "observation",
            MemoryType::Episode => "episode",
            MemoryType::Opinion => "opinion",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "fact" => Some(MemoryType::Fact),
            "preference" => Some(MemoryType::Preference),
            "decision" => Some(MemoryType::Decision),
            "observation" => Some(MemoryType::Observation),
            "episode" => Some(MemoryType::Episode),
            "opinion" => Some(MemoryType::Opinion),
            _ => None,
        }
    }

    /// Whether this type participates in preference-style contradiction checks.
    pub fn is_preference_like(&self) -> bool {
        matches!(self, MemoryType::Preference | MemoryType::Opinion)
    }
}

impl std::fmt::Display for MemoryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Relationship types for a [`GraphEdge`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EdgeType {
    Precedes,
    Causes,
    Supports,
    Contradicts,
    DerivesFrom,
    Supersedes,
    MentionsEntity,
    CoOccurs,
    ContextOf,
}

impl EdgeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeType::Precedes => "PRECEDES",
            EdgeType::Causes => "CAUSES",
            EdgeType::Supports => "SUPPORTS",
            EdgeType::Contradicts => "CONTRADICTS",
            EdgeType::DerivesFrom => "DERIVES_FROM",
            EdgeType::Supersedes => "SUPERSEDES",
            EdgeType::MentionsEntity => "MENTIONS_ENTITY",
            EdgeType::CoOccurs => "CO_OCCURS",
            EdgeType::ContextOf => "CONTEXT_OF",
        }
    }

    /// Edges of these types get a reverse edge pushed onto the target during graph-apply.
    pub fn is_symmetric_on_apply(&self) -> bool {
        matches!(self, EdgeType::CoOccurs | EdgeType::Contradicts)
    }
}

impl std::fmt::Display for EdgeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A directed edge embedded in a memory record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphEdge {
    pub edge_type: EdgeType,
    pub target_id: String,
    pub weight: f64,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// Severity bucket for a detected contradiction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    High,
    Medium,
    Low,
}

impl Severity {
    pub fn from_probability(p: f64) -> Self {
        if p >= 0.85 {
            Severity::High
        } else if p >= 0.65 {
            Severity::Medium
        } else {
            Severity::Low
        }
    }
}

/// Kind of contradiction relationship between two memories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContradictionType {
    Direct,
    ContextDependent,
    Temporal,
    Preference,
}

/// Resolution state for a recorded contradiction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionStatus {
    Open,
    Resolved,
    Dismissed,
}

/// A contradiction embedded on a memory, referencing another memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contradiction {
    pub target_id: String,
    pub detected_at: DateTime<Utc>,
    pub contradiction_type: ContradictionType,
    pub explanation: String,
    pub probability: f64,
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<ResolutionStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution_note: Option<String>,
}

/// The primary memory record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryRecord {
    pub id: String,
    pub agent_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_episode_id: Option<String>,

    pub text: String,
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,

    pub embedding: Vec<f32>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,

    pub confidence: f64,
    pub strength: f64,
    pub reinforcement_count: u64,
    pub last_reinforced_at: DateTime<Utc>,

    pub layer: Layer,
    pub memory_type: MemoryType,

    #[serde(default)]
    pub edges: Vec<GraphEdge>,
    #[serde(default)]
    pub contradictions: Vec<Contradiction>,
}

/// Error returned when constructing or mutating a memory violates an invariant.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum MemoryValidationError {
    #[error("text must not be empty")]
    EmptyText,
    #[error("embedding dimension {actual} does not match deployment dimension {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("{field} must lie in [0,1], got {value}")]
    OutOfUnitRange { field: &'static str, value: f64 },
}

/// Options accepted by `Remember` when creating a new memory.
#[derive(Debug, Clone, Default)]
pub struct RememberOptions {
    pub tags: BTreeSet<String>,
    pub metadata: BTreeMap<String, serde_json::Value>,
    pub ttl_seconds: Option<i64>,
    pub memory_type: Option<MemoryType>,
    pub layer: Option<Layer>,
    pub confidence: Option<f64>,
    pub source_session_id: Option<String>,
    pub source_episode_id: Option<String>,
    pub project_id: Option<String>,
}

impl MemoryRecord {
    /// Construct a new memory with the same defaults Remember applies.
    ///
    /// `id` is assigned by the store on insert; callers pass an empty string
    /// placeholder here and the store fills it in.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        agent_id: impl Into<String>,
        text: impl Into<String>,
        embedding: Vec<f32>,
        expected_dimension: usize,
        opts: RememberOptions,
        now: DateTime<Utc>,
    ) -> Result<Self, MemoryValidationError> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(MemoryValidationError::EmptyText);
        }
        if embedding.len() != expected_dimension {
            return Err(MemoryValidationError::DimensionMismatch {
                expected: expected_dimension,
                actual: embedding.len(),
            });
        }
        let confidence = opts.confidence.unwrap_or(0.6);
        if !(0.0..=1.0).contains(&confidence) {
            return Err(MemoryValidationError::OutOfUnitRange {
                field: "confidence",
                value: confidence,
            });
        }
        let expires_at = opts
            .ttl_seconds
            .map(|ttl| now + chrono::Duration::seconds(ttl));

        Ok(Self {
            id: String::new(),
            agent_id: agent_id.into(),
            project_id: opts.project_id,
            source_session_id: opts.source_session_id,
            source_episode_id: opts.source_episode_id,
            text,
            tags: opts.tags,
            metadata: opts.metadata,
            embedding,
            created_at: now,
            updated_at: now,
            expires_at,
            confidence,
            strength: 1.0,
            reinforcement_count: 0,
            last_reinforced_at: now,
            layer: opts.layer.unwrap_or_default(),
            memory_type: opts.memory_type.unwrap_or_default(),
            edges: Vec::new(),
            contradictions: Vec::new(),
        })
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remember_defaults_match_spec() {
        let now = Utc::now();
        let m = MemoryRecord::new(
            "agent-A",
            "User prefers dark mode",
            vec![0.0; 4],
            4,
            RememberOptions::default(),
            now,
        )
        .unwrap();
        assert_eq!(m.confidence, 0.6);
        assert_eq!(m.strength, 1.0);
        assert_eq!(m.layer, Layer::Episodic);
        assert_eq!(m.memory_type, MemoryType::Fact);
        assert_eq!(m.created_at, m.updated_at);
    }

    #[test]
    fn empty_text_rejected() {
        let now = Utc::now();
        let err = MemoryRecord::new("a", "   ", vec![0.0; 4], 4, RememberOptions::default(), now)
            .unwrap_err();
        assert_eq!(err, MemoryValidationError::EmptyText);
    }

    #[test]
    fn dimension_mismatch_rejected() {
        let now = Utc::now();
        let err = MemoryRecord::new("a", "hi", vec![0.0; 3], 4, RememberOptions::default(), now)
            .unwrap_err();
        assert_eq!(
            err,
            MemoryValidationError::DimensionMismatch {
                expected: 4,
                actual: 3
            }
        );
    }

    #[test]
    fn out_of_range_confidence_rejected() {
        let now = Utc::now();
        let opts = RememberOptions {
            confidence: Some(1.5),
            ..Default::default()
        };
        let err = MemoryRecord::new("a", "hi", vec![0.0; 4], 4, opts, now).unwrap_err();
        assert_eq!(
            err,
            MemoryValidationError::OutOfUnitRange {
                field: "confidence",
                value: 1.5
            }
        );
    }

    #[test]
    fn layer_roundtrip() {
        for l in [Layer::Working, Layer::Episodic, Layer::Semantic, Layer::Archival] {
            assert_eq!(Layer::parse(l.as_str()), Some(l));
        }
    }
}
