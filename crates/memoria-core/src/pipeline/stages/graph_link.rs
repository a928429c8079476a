//! Stage 8: graph-link. Proposes relational edges between atoms persisted
//! this run: `CO_OCCURS`/`PRECEDES` for atoms sharing a session, `CAUSES`
//! when causal language links adjacent atoms, and `SUPERSEDES` when
//! conflict-check flagged a temporal contradiction against an older memory.
//! Every edge is staged as a [`PendingEdge`] for graph-apply to materialize.

use async_trait::async_trait;

use crate::error::CoreError;
use crate::model::{ContradictionType, EdgeType, PendingEdge, StageName};
use crate::pipeline::{PipelineContext, Stage};
use crate::store::{to_insertable_document, COLLECTION_PENDING_EDGES};

pub struct GraphLinkStage;

const CO_OCCURS_PROBABILITY: f64 = 0.6;
const CO_OCCURS_WEIGHT: f64 = 0.3;
const PRECEDES_PROBABILITY: f64 = 0.55;
const PRECEDES_WEIGHT: f64 = 0.3;
const CAUSES_PROBABILITY: f64 = 0.65;
const CAUSES_WEIGHT: f64 = 0.45;

const CAUSAL_MARKERS: &[&str] = &["because", "so that", "which caused", "led to", "as a result", "therefore"];

fn has_causal_language(text: &str) -> bool {
    let lower = text.to_lowercase();
    CAUSAL_MARKERS.iter().any(|m| lower.contains(m))
}

#[async_trait]
impl Stage for GraphLinkStage {
    fn name(&self) -> StageName {
        StageName::GraphLink
    }

    async fn execute(&self, ctx: &mut PipelineContext<'_>) -> Result<(), CoreError> {
        let persisted_ids: Vec<(usize, String)> = ctx
            .classified_atoms
            .iter()
            .enumerate()
            .filter_map(|(i, atom)| atom.persisted_id.clone().map(|id| (i, id)))
            .collect();

        let mut co_occurs = 0i64;
        let mut precedes = 0i64;
        let mut causes = 0i64;
        let mut supersedes = 0i64;

        for window in persisted_ids.windows(2) {
            let (_, prev_id) = &window[0];
            let (curr_idx, curr_id) = &window[1];

            let precedes_edge = PendingEdge::new(prev_id.clone(), curr_id.clone(), EdgeType::Precedes, PRECEDES_WEIGHT, PRECEDES_PROBABILITY, ctx.now);
            ctx.store.insert_one(COLLECTION_PENDING_EDGES, to_insertable_document(&precedes_edge)?).await?;
            precedes += 1;

            let co_occurs_edge = PendingEdge::new(prev_id.clone(), curr_id.clone(), EdgeType::CoOccurs, CO_OCCURS_WEIGHT, CO_OCCURS_PROBABILITY, ctx.now);
            ctx.store.insert_one(COLLECTION_PENDING_EDGES, to_insertable_document(&co_occurs_edge)?).await?;
            co_occurs += 1;

            if has_causal_language(&ctx.classified_atoms[*curr_idx].text) {
                let causes_edge = PendingEdge::new(prev_id.clone(), curr_id.clone(), EdgeType::Causes, CAUSES_WEIGHT, CAUSES_PROBABILITY, ctx.now);
                ctx.store.insert_one(COLLECTION_PENDING_EDGES, to_insertable_document(&causes_edge)?).await?;
                causes += 1;
            }
        }

        for atom in &ctx.classified_atoms {
            let Some(source_id) = atom.persisted_id.clone() else {
                continue;
            };
            for contradiction in &atom.contradictions {
                if contradiction.contradiction_type == ContradictionType::Temporal {
                    let edge = PendingEdge::new(source_id.clone(), contradiction.target_id.clone(), EdgeType::Supersedes, 0.5, contradiction.probability, ctx.now);
                    ctx.store.insert_one(COLLECTION_PENDING_EDGES, to_insertable_document(&edge)?).await?;
                    supersedes += 1;
                }
            }
        }

        ctx.record_stat("graph-link", "co_occurs_proposed", co_occurs);
        ctx.record_stat("graph-link", "precedes_proposed", precedes);
        ctx.record_stat("graph-link", "causes_proposed", causes);
        ctx.record_stat("graph-link", "supersedes_proposed", supersedes);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_causal_markers() {
        assert!(has_causal_language("The build broke because the config changed"));
        assert!(!has_causal_language("The build takes four minutes"));
    }
}
