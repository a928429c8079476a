//! Stage 5: confidence-update. Applies contradiction or reinforcement
//! updates to existing memories based on what stages 2-3 found for each atom.

use async_trait::async_trait;

use crate::confidence;
use crate::error::CoreError;
use crate::model::StageName;
use crate::pipeline::{PipelineContext, Stage};
use crate::store::{Filter, Update, UpdateOptions, COLLECTION_MEMORIES};

pub struct ConfidenceUpdateStage;

#[async_trait]
impl Stage for ConfidenceUpdateStage {
    fn name(&self) -> StageName {
        StageName::ConfidenceUpdate
    }

    async fn execute(&self, ctx: &mut PipelineContext<'_>) -> Result<(), CoreError> {
        let mut contradictions_applied = 0i64;
        let mut reinforcements_applied = 0i64;

        for atom in &ctx.classified_atoms {
            let atom_confidence = atom.confidence.unwrap_or(0.6);

            for c in &atom.contradictions {
                let Some(target) = ctx.store.find_one(COLLECTION_MEMORIES, Filter::new().eq("id", c.target_id.as_str())).await? else {
                    continue;
                };
                let current_confidence = target.get_f64("confidence").unwrap_or(0.6);
                let new_confidence = confidence::apply_contradiction(current_confidence, atom_confidence);
                let update = Update::new().set("confidence", new_confidence).set("updatedAt", ctx.now.to_rfc3339());
                ctx.store
                    .update_one(COLLECTION_MEMORIES, Filter::new().eq("id", c.target_id.as_str()), update, UpdateOptions::default())
                    .await?;
                contradictions_applied += 1;
            }

            if let Some(dup_of) = &atom.likely_duplicate_of {
                let Some(target) = ctx.store.find_one(COLLECTION_MEMORIES, Filter::new().eq("id", dup_of.as_str())).await? else {
                    continue;
                };
                let current_confidence = target.get_f64("confidence").unwrap_or(0.6);
                let new_confidence = confidence::reinforce(current_confidence);
                let update = Update::new()
                    .set("confidence", new_confidence)
                    .set("updatedAt", ctx.now.to_rfc3339())
                    .inc("reinforcementCount", 1_i64);
                ctx.store.update_one(COLLECTION_MEMORIES, Filter::new().eq("id", dup_of.as_str()), update, UpdateOptions::default()).await?;
                reinforcements_applied += 1;
            }
        }

        ctx.record_stat("confidence-update", "contradictions_applied", contradictions_applied);
        ctx.record_stat("confidence-update", "reinforcements_applied", reinforcements_applied);
        Ok(())
    }
}
