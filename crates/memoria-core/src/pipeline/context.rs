//! Pipeline context: a structured record threaded through the ten
//! stages, with optional fields for per-stage artifacts rather than a
//! heterogeneous mutable bag.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::embedding::Embedder;
use crate::llm::LlmClient;
use crate::store::Store;

/// A proposed memory emerging from extraction, not yet persisted.
#[derive(Debug, Clone)]
pub struct CandidateAtom {
    pub text: String,
    pub tags: std::collections::BTreeSet<String>,
    pub memory_type: Option<crate::model::MemoryType>,
    pub confidence: Option<f64>,
    pub embedding: Vec<f32>,
    /// Set by deduplicate when a near-duplicate existing memory was found.
    pub likely_duplicate_of: Option<String>,
    /// Set by conflict-check when contradictions were detected.
    pub contradictions: Vec<crate::contradiction::ContradictionCandidate>,
    /// Set by classify once a layer/type decision and persistence have happened.
    pub persisted_id: Option<String>,
    pub layer: Option<crate::model::Layer>,
}

impl CandidateAtom {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tags: Default::default(),
            memory_type: None,
            confidence: None,
            embedding: Vec::new(),
            likely_duplicate_of: None,
            contradictions: Vec::new(),
            persisted_id: None,
            layer: None,
        }
    }
}

/// Threaded through all ten pipeline stages. Each stage reads some fields and
/// writes others; statistics accumulate under stage-name-prefixed keys
/// (`decay_pass_decayed`, `graph-apply_applied`, ...).
pub struct PipelineContext<'a> {
    pub agent_id: String,
    pub session_id: Option<String>,
    pub job_id: String,
    pub now: DateTime<Utc>,

    pub session_transcript: String,

    pub extracted_atoms: Vec<CandidateAtom>,
    pub deduplicated_atoms: Vec<CandidateAtom>,
    pub classified_atoms: Vec<CandidateAtom>,

    pub stats: BTreeMap<String, i64>,
    pub metadata: BTreeMap<String, Value>,

    pub store: &'a dyn Store,
    pub embedder: Arc<dyn Embedder>,
    pub llm: Arc<dyn LlmClient>,
}

impl<'a> PipelineContext<'a> {
    pub fn new(
        agent_id: impl Into<String>,
        session_id: Option<String>,
        job_id: impl Into<String>,
        session_transcript: impl Into<String>,
        now: DateTime<Utc>,
        store: &'a dyn Store,
        embedder: Arc<dyn Embedder>,
        llm: Arc<dyn LlmClient>,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            session_id,
            job_id: job_id.into(),
            now,
            session_transcript: session_transcript.into(),
            extracted_atoms: Vec::new(),
            deduplicated_atoms: Vec::new(),
            classified_atoms: Vec::new(),
            stats: BTreeMap::new(),
            metadata: BTreeMap::new(),
            store,
            embedder,
            llm,
        }
    }

    pub fn record_stat(&mut self, stage: &str, key: &str, value: i64) {
        *self.stats.entry(format!("{stage}_{key}")).or_insert(0) += value;
    }
}
