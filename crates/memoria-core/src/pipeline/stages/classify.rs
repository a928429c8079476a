//! Stage 4: classify. Assigns final layer and memoryType per atom using
//! rules keyed on text cues and tags, then persists new (non-duplicate)
//! atoms to the store.

use async_trait::async_trait;

use crate::error::CoreError;
use crate::model::{Layer, MemoryRecord, MemoryType, RememberOptions, StageName};
use crate::pipeline::{PipelineContext, Stage};
use crate::store::{to_insertable_document, COLLECTION_MEMORIES};

pub struct ClassifyStage;

/// Rule-based layer/type assignment keyed on lexical cues. The exact
/// heuristics are an open design choice — this satisfies the testable
/// properties without claiming to be the one true mapping.
fn classify_text(text: &str) -> (Layer, MemoryType) {
    let lower = text.to_lowercase();
    if lower.contains("prefer") || lower.contains(" like ") || lower.starts_with("like ") || lower.contains("favorite") {
        (Layer::Episodic, MemoryType::Preference)
    } else if lower.contains("decided") || lower.contains("will use") || lower.contains("going to") {
        (Layer::Episodic, MemoryType::Decision)
    } else if lower.contains("i think") || lower.contains("in my opinion") || lower.contains("believe") {
        (Layer::Episodic, MemoryType::Opinion)
    } else if lower.contains("noticed") || lower.contains("observed") || lower.contains("saw that") {
        (Layer::Episodic, MemoryType::Observation)
    } else {
        (Layer::Episodic, MemoryType::Fact)
    }
}

#[async_trait]
impl Stage for ClassifyStage {
    fn name(&self) -> StageName {
        StageName::Classify
    }

    async fn execute(&self, ctx: &mut PipelineContext<'_>) -> Result<(), CoreError> {
        let mut atoms = std::mem::take(&mut ctx.deduplicated_atoms);
        let mut persisted = 0i64;

        for atom in &mut atoms {
            let (layer, memory_type) = classify_text(&atom.text);
            let layer = atom.layer.unwrap_or(layer);
            let memory_type = atom.memory_type.unwrap_or(memory_type);
            atom.layer = Some(layer);
            atom.memory_type = Some(memory_type);

            if atom.likely_duplicate_of.is_none() {
                let opts = RememberOptions {
                    tags: atom.tags.clone(),
                    memory_type: Some(memory_type),
                    layer: Some(layer),
                    confidence: atom.confidence,
                    source_session_id: ctx.session_id.clone(),
                    ..Default::default()
                };
                let record = MemoryRecord::new(&ctx.agent_id, &atom.text, atom.embedding.clone(), atom.embedding.len(), opts, ctx.now)?;
                let doc = to_insertable_document(&record)?;
                let id = ctx.store.insert_one(COLLECTION_MEMORIES, doc).await?;
                atom.persisted_id = Some(id);
                persisted += 1;
            }
        }

        ctx.record_stat("classify", "persisted", persisted);
        ctx.classified_atoms = atoms;
        Ok(())
    }
}
