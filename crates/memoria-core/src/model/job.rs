//! Reflection job — a persisted record of one pipeline execution.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The ten pipeline stages, in their fixed execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StageName {
    Extract,
    Deduplicate,
    ConflictCheck,
    Classify,
    ConfidenceUpdate,
    DecayPass,
    EntityUpdate,
    GraphLink,
    GraphApply,
    GlobalDeduplicate,
}

impl StageName {
    /// The static, unpermutable stage order of the reflection pipeline.
    pub const ORDER: [StageName; 10] = [
        StageName::Extract,
        StageName::Deduplicate,
        StageName::ConflictCheck,
        StageName::Classify,
        StageName::ConfidenceUpdate,
        StageName::DecayPass,
        StageName::EntityUpdate,
        StageName::GraphLink,
        StageName::GraphApply,
        StageName::GlobalDeduplicate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StageName::Extract => "extract",
            StageName::Deduplicate => "deduplicate",
            StageName::ConflictCheck => "conflict-check",
            StageName::Classify => "classify",
            StageName::ConfidenceUpdate => "confidence-update",
            StageName::DecayPass => "decay-pass",
            StageName::EntityUpdate => "entity-update",
            StageName::GraphLink => "graph-link",
            StageName::GraphApply => "graph-apply",
            StageName::GlobalDeduplicate => "global-deduplicate",
        }
    }
}

impl std::fmt::Display for StageName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Status of a single stage's execution within a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    Running,
    Complete,
    Failed,
}

/// The recorded outcome of one stage execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageResult {
    pub stage: StageName,
    pub status: StageStatus,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub counts: BTreeMap<String, i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StageResult {
    pub fn running(stage: StageName, now: DateTime<Utc>) -> Self {
        Self {
            stage,
            status: StageStatus::Running,
            started_at: now,
            completed_at: None,
            counts: BTreeMap::new(),
            error: None,
        }
    }
}

/// Overall status of a reflection job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Complete,
    Failed,
}

/// Persisted record of one reflection pipeline execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReflectionJob {
    pub id: String,
    pub agent_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub stages: Vec<StageResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl ReflectionJob {
    pub fn new(agent_id: impl Into<String>, session_id: Option<String>, metadata: BTreeMap<String, serde_json::Value>, now: DateTime<Utc>) -> Self {
        Self {
            id: String::new(),
            agent_id: agent_id.into(),
            session_id,
            status: JobStatus::Pending,
            created_at: now,
            started_at: None,
            completed_at: None,
            stages: Vec::new(),
            error: None,
            metadata,
        }
    }

    /// Upsert a stage result in-place: replaces the entry with a matching
    /// stage name, or appends if none exists. Mirrors the atomic
    /// update-or-push protocol of the job queue at the in-process level.
    pub fn upsert_stage(&mut self, result: StageResult) {
        if let Some(existing) = self.stages.iter_mut().find(|s| s.stage == result.stage) {
            *existing = result;
        } else {
            self.stages.push(result);
        }
    }
}
