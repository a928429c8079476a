//! Stage 1: extract. Consumes `sessionTranscript`, produces `extractedAtoms`.
//!
//! The extractor's internal heuristics are deliberately unspecified — only
//! the contract matters: each atom carries text, tags, optional memoryType,
//! optional confidence. A real deployment would call the LLM client for
//! this; here we do rule-based sentence splitting, which already satisfies
//! the contract and keeps the pipeline runnable without a live LLM.

use async_trait::async_trait;

use crate::error::CoreError;
use crate::model::StageName;
use crate::pipeline::{CandidateAtom, PipelineContext, Stage};

pub struct ExtractStage;

fn split_into_atoms(transcript: &str) -> Vec<String> {
    transcript
        .split(['.', '\n', '!', '?'])
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

#[async_trait]
impl Stage for ExtractStage {
    fn name(&self) -> StageName {
        StageName::Extract
    }

    async fn execute(&self, ctx: &mut PipelineContext<'_>) -> Result<(), CoreError> {
        let atoms: Vec<CandidateAtom> = split_into_atoms(&ctx.session_transcript).into_iter().map(CandidateAtom::new).collect();
        ctx.record_stat("extract", "extracted", atoms.len() as i64);
        ctx.extracted_atoms = atoms;
        Ok(())
    }
}
