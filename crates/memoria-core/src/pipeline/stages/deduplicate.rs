//! Stage 2: deduplicate. For each atom, finds near-duplicates of existing
//! memories (cosine >= 0.92 against the same agent). A match stamps
//! `metadata.likelyDuplicateOf`; otherwise the atom is retained as-is.

use async_trait::async_trait;

use crate::embedding::{cosine_similarity, EmbedRole};
use crate::error::CoreError;
use crate::model::{MemoryRecord, StageName};
use crate::pipeline::{PipelineContext, Stage};
use crate::store::{Filter, COLLECTION_MEMORIES};

const NEAR_DUPLICATE_THRESHOLD: f32 = 0.92;

pub struct DeduplicateStage;

#[async_trait]
impl Stage for DeduplicateStage {
    fn name(&self) -> StageName {
        StageName::Deduplicate
    }

    async fn execute(&self, ctx: &mut PipelineContext<'_>) -> Result<(), CoreError> {
        let texts: Vec<String> = ctx.extracted_atoms.iter().map(|a| a.text.clone()).collect();
        let embeddings = if texts.is_empty() {
            Vec::new()
        } else {
            ctx.embedder.embed(&texts, EmbedRole::Document).await?
        };

        let existing_docs = ctx.store.find(COLLECTION_MEMORIES, Filter::new().eq("agentId", ctx.agent_id.as_str()), None, None).await?;
        let existing: Vec<MemoryRecord> = existing_docs.into_iter().filter_map(|d| bson::from_document(d).ok()).collect();

        let mut atoms = std::mem::take(&mut ctx.extracted_atoms);
        let mut duplicate_count = 0i64;
        for (atom, embedding) in atoms.iter_mut().zip(embeddings.into_iter()) {
            atom.embedding = embedding;
            let best = existing
                .iter()
                .map(|m| (cosine_similarity(&atom.embedding, &m.embedding), m))
                .filter(|(sim, _)| *sim >= NEAR_DUPLICATE_THRESHOLD)
                .max_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
            if let Some((_, m)) = best {
                atom.likely_duplicate_of = Some(m.id.clone());
                duplicate_count += 1;
            }
        }
        ctx.record_stat("deduplicate", "likely_duplicates", duplicate_count);
        ctx.record_stat("deduplicate", "retained", atoms.len() as i64 - duplicate_count);
        ctx.deduplicated_atoms = atoms;
        Ok(())
    }
}
