//! Stage 3: conflict-check. For each deduplicated atom, runs contradiction
//! detection and attaches any contradictions found to the atom's metadata.

use async_trait::async_trait;

use crate::contradiction;
use crate::error::CoreError;
use crate::model::StageName;
use crate::pipeline::{PipelineContext, Stage};

pub struct ConflictCheckStage;

#[async_trait]
impl Stage for ConflictCheckStage {
    fn name(&self) -> StageName {
        StageName::ConflictCheck
    }

    async fn execute(&self, ctx: &mut PipelineContext<'_>) -> Result<(), CoreError> {
        let mut conflicts = 0i64;
        let mut atoms = std::mem::take(&mut ctx.deduplicated_atoms);
        for atom in &mut atoms {
            let is_preference_like = atom
                .memory_type
                .map(|t| t.is_preference_like())
                .unwrap_or(false);
            let found = contradiction::detect(ctx.store, &ctx.agent_id, &atom.text, &atom.tags, is_preference_like, &atom.embedding).await;
            conflicts += found.len() as i64;
            atom.contradictions = found;
        }
        ctx.record_stat("conflict-check", "conflicts", conflicts);
        ctx.deduplicated_atoms = atoms;
        Ok(())
    }
}
