//! Pending edge — a graph edge proposed by a stage but not yet materialized
//! onto the source memory. Destroyed by graph-apply (applied or orphaned).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::memory::EdgeType;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingEdge {
    pub id: String,
    pub source_id: String,
    pub target_id: String,
    pub edge_type: EdgeType,
    pub weight: f64,
    pub probability: f64,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl PendingEdge {
    pub fn new(
        source_id: impl Into<String>,
        target_id: impl Into<String>,
        edge_type: EdgeType,
        weight: f64,
        probability: f64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: String::new(),
            source_id: source_id.into(),
            target_id: target_id.into(),
            edge_type,
            weight,
            probability,
            created_at: now,
            metadata: None,
        }
    }
}
