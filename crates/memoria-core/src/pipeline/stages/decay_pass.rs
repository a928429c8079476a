//! Stage 6: decay-pass. Invokes the temporal-decay calculator over all of
//! the agent's memories in batches of 100, bulk-updating those whose
//! strength actually changed, and counts archival/expiration candidates.
//! Also used directly (without a full job) by the scheduler's daily decay
//! routine.

use async_trait::async_trait;

use crate::decay::{decay, is_archival_candidate, is_expiration_candidate};
use crate::error::CoreError;
use crate::model::{MemoryRecord, StageName};
use crate::pipeline::{PipelineContext, Stage};
use crate::store::{Filter, Store, Update, COLLECTION_MEMORIES};

const BATCH_SIZE: usize = 100;

/// Stats for one decay pass, shared by the pipeline stage and the
/// scheduler's standalone decay routine.
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecaySummary {
    pub total_memories: u64,
    pub decayed: u64,
    pub archival_candidates: u64,
    pub expiration_candidates: u64,
}

/// Runs a decay pass for one agent (or, if `agent_id` is `None`, every
/// agent) directly against the store, independent of any pipeline job.
pub async fn run_decay_pass(store: &dyn Store, agent_id: Option<&str>, now: chrono::DateTime<chrono::Utc>) -> Result<DecaySummary, CoreError> {
    let filter = match agent_id {
        Some(id) => Filter::new().eq("agentId", id),
        None => Filter::new(),
    };
    let docs = store.find(COLLECTION_MEMORIES, filter, None, None).await?;
    let records: Vec<MemoryRecord> = docs.into_iter().filter_map(|d| bson::from_document(d).ok()).collect();

    let mut summary = DecaySummary { total_memories: records.len() as u64, ..Default::default() };

    for chunk in records.chunks(BATCH_SIZE) {
        let mut ops = Vec::new();
        for m in chunk {
            let new_strength = decay(m.strength, m.last_reinforced_at, m.layer, now);
            if is_archival_candidate(new_strength) {
                summary.archival_candidates += 1;
            }
            if is_expiration_candidate(new_strength) {
                summary.expiration_candidates += 1;
            }
            if (new_strength - m.strength).abs() > f64::EPSILON {
                summary.decayed += 1;
                ops.push((Filter::new().eq("id", m.id.as_str()), Update::new().set("strength", new_strength)));
            }
        }
        if !ops.is_empty() {
            store.bulk_write(COLLECTION_MEMORIES, ops).await?;
        }
    }
    Ok(summary)
}

pub struct DecayPassStage;

#[async_trait]
impl Stage for DecayPassStage {
    fn name(&self) -> StageName {
        StageName::DecayPass
    }

    async fn execute(&self, ctx: &mut PipelineContext<'_>) -> Result<(), CoreError> {
        let summary = run_decay_pass(ctx.store, Some(&ctx.agent_id), ctx.now).await?;
        ctx.record_stat("decay-pass", "total_memories", summary.total_memories as i64);
        ctx.record_stat("decay-pass", "decayed", summary.decayed as i64);
        ctx.record_stat("decay-pass", "archival_candidates", summary.archival_candidates as i64);
        ctx.record_stat("decay-pass", "expiration_candidates", summary.expiration_candidates as i64);
        Ok(())
    }
}
