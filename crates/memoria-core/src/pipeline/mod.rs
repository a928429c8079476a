//! Reflection pipeline: a staged, resumable, stateful job executor.

pub mod context;
pub mod executor;
pub mod stages;

pub use context::{CandidateAtom, PipelineContext};
pub use executor::PipelineExecutor;

use async_trait::async_trait;

use crate::error::CoreError;
use crate::model::StageName;

/// A single pipeline stage. Stages are modeled as a tagged enumeration of
/// kinds sharing one execution method, not as a class hierarchy — each is a
/// small zero-sized struct implementing this trait.
#[async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> StageName;
    async fn execute(&self, ctx: &mut PipelineContext<'_>) -> Result<(), CoreError>;
}

/// The ten stages in their fixed, unpermutable execution order.
pub fn default_stages() -> Vec<Box<dyn Stage>> {
    vec![
        Box::new(stages::extract::ExtractStage),
        Box::new(stages::deduplicate::DeduplicateStage),
        Box::new(stages::conflict_check::ConflictCheckStage),
        Box::new(stages::classify::ClassifyStage),
        Box::new(stages::confidence_update::ConfidenceUpdateStage),
        Box::new(stages::decay_pass::DecayPassStage),
        Box::new(stages::entity_update::EntityUpdateStage),
        Box::new(stages::graph_link::GraphLinkStage),
        Box::new(stages::graph_apply::GraphApplyStage),
        Box::new(stages::global_dedup::GlobalDeduplicateStage),
    ]
}
