//! Episode — narrative record of a session, from which memories are derived.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::memory::Layer;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Episode {
    pub id: String,
    pub agent_id: String,
    pub session_id: String,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    pub title: String,
    pub narrative: String,
    #[serde(default)]
    pub participants: Vec<String>,
    #[serde(default)]
    pub dominant_topics: Vec<String>,
    #[serde(default)]
    pub derived_memory_ids: Vec<String>,
    #[serde(default)]
    pub narrative_embedding: Vec<f32>,
    pub strength: f64,
    pub layer: Layer,
}

impl Episode {
    pub fn new(agent_id: impl Into<String>, session_id: impl Into<String>, title: impl Into<String>, narrative: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: String::new(),
            agent_id: agent_id.into(),
            session_id: session_id.into(),
            started_at: now,
            ended_at: None,
            title: title.into(),
            narrative: narrative.into(),
            participants: Vec::new(),
            dominant_topics: Vec::new(),
            derived_memory_ids: Vec::new(),
            narrative_embedding: Vec::new(),
            strength: 1.0,
            layer: Layer::Episodic,
        }
    }
}
