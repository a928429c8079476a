//! Stage 9: graph-apply. Materializes pending edges proposed by
//! entity-update and graph-link onto the memories they reference, then
//! discards the pending record either way. A missing source or target is
//! not a pipeline failure — it means the referenced memory was deleted or
//! merged away by an earlier stage or a concurrent job, so the edge is
//! simply dropped and counted.

use async_trait::async_trait;

use crate::error::CoreError;
use crate::model::{GraphEdge, PendingEdge, StageName};
use crate::pipeline::{PipelineContext, Stage};
use crate::store::{Filter, Update, UpdateOptions, COLLECTION_MEMORIES, COLLECTION_PENDING_EDGES};

pub struct GraphApplyStage;

const MIN_PROBABILITY: f64 = 0.5;

#[async_trait]
impl Stage for GraphApplyStage {
    fn name(&self) -> StageName {
        StageName::GraphApply
    }

    async fn execute(&self, ctx: &mut PipelineContext<'_>) -> Result<(), CoreError> {
        let docs = ctx.store.find(COLLECTION_PENDING_EDGES, Filter::new().gte("probability", MIN_PROBABILITY), None, None).await?;
        let mut edges: Vec<PendingEdge> = docs.into_iter().filter_map(|d| bson::from_document(d).ok()).collect();
        edges.sort_by(|a, b| b.probability.partial_cmp(&a.probability).unwrap_or(std::cmp::Ordering::Equal));

        let mut applied = 0i64;
        let mut skipped = 0i64;
        let mut reverse_applied = 0i64;

        for pending in edges {
            let source = ctx.store.find_one(COLLECTION_MEMORIES, Filter::new().eq("id", pending.source_id.as_str())).await?;
            if source.is_none() {
                ctx.store.delete_one(COLLECTION_PENDING_EDGES, Filter::new().eq("id", pending.id.as_str())).await?;
                skipped += 1;
                continue;
            }

            let edge = GraphEdge {
                edge_type: pending.edge_type,
                target_id: pending.target_id.clone(),
                weight: pending.weight,
                created_at: ctx.now,
                metadata: pending.metadata.clone(),
            };
            let edge_bson = bson::to_bson(&edge).map_err(|e| CoreError::StoreUnavailable(e.to_string()))?;
            let update = Update::new().push("edges", edge_bson).set("updatedAt", ctx.now.to_rfc3339());
            ctx.store.update_one(COLLECTION_MEMORIES, Filter::new().eq("id", pending.source_id.as_str()), update, UpdateOptions::default()).await?;
            applied += 1;

            if pending.edge_type.is_symmetric_on_apply() {
                let target = ctx.store.find_one(COLLECTION_MEMORIES, Filter::new().eq("id", pending.target_id.as_str())).await?;
                if target.is_some() {
                    let reverse = GraphEdge {
                        edge_type: pending.edge_type,
                        target_id: pending.source_id.clone(),
                        weight: pending.weight,
                        created_at: ctx.now,
                        metadata: pending.metadata.clone(),
                    };
                    let reverse_bson = bson::to_bson(&reverse).map_err(|e| CoreError::StoreUnavailable(e.to_string()))?;
                    let reverse_update = Update::new().push("edges", reverse_bson).set("updatedAt", ctx.now.to_rfc3339());
                    ctx.store.update_one(COLLECTION_MEMORIES, Filter::new().eq("id", pending.target_id.as_str()), reverse_update, UpdateOptions::default()).await?;
                    reverse_applied += 1;
                }
            }

            ctx.store.delete_one(COLLECTION_PENDING_EDGES, Filter::new().eq("id", pending.id.as_str())).await?;
        }

        ctx.record_stat("graph-apply", "applied", applied);
        ctx.record_stat("graph-apply", "skipped_missing_source", skipped);
        ctx.record_stat("graph-apply", "reverse_applied", reverse_applied);
        Ok(())
    }
}
