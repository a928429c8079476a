//! Seed scenario 6: a job survives a mid-pipeline stage failure with the
//! error recorded, later stages never appended to `job.stages`.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use memoria_core::embedding::MockEmbedder;
use memoria_core::error::CoreError;
use memoria_core::llm::NullLlmClient;
use memoria_core::model::{JobStatus, StageName, StageStatus};
use memoria_core::pipeline::executor::RunOutcome;
use memoria_core::pipeline::stages::classify::ClassifyStage;
use memoria_core::pipeline::stages::deduplicate::DeduplicateStage;
use memoria_core::pipeline::stages::extract::ExtractStage;
use memoria_core::pipeline::{PipelineContext, PipelineExecutor, Stage};
use memoria_core::queue::JobQueue;
use memoria_core::store::memory_store::InMemoryStore;
use memoria_daemon::MemoryFacade;

use std::collections::BTreeMap;

struct EmbedderDownOnConflictCheck;

#[async_trait]
impl Stage for EmbedderDownOnConflictCheck {
    fn name(&self) -> StageName {
        StageName::ConflictCheck
    }

    async fn execute(&self, _ctx: &mut PipelineContext<'_>) -> Result<(), CoreError> {
        Err(CoreError::EmbedderFailed("embedder down".into()))
    }
}

#[tokio::test]
async fn job_survives_stage_failure_with_recorded_error() {
    let facade = MemoryFacade::new(Arc::new(InMemoryStore::new()), Arc::new(MockEmbedder::new()), Arc::new(NullLlmClient));
    let now = Utc::now();

    let job_id = facade
        .trigger_reflection("agent-A", None, "User prefers dark mode. Switched to MongoDB today.", BTreeMap::new(), now)
        .await
        .unwrap();

    let queue = JobQueue::new(facade.store().as_ref());
    assert!(queue.claim(&job_id).await.unwrap());

    let executor = PipelineExecutor::new(facade.store().as_ref(), facade.embedder().clone(), facade.llm().clone()).with_stages(vec![
        Box::new(ExtractStage),
        Box::new(DeduplicateStage),
        Box::new(EmbedderDownOnConflictCheck),
        Box::new(ClassifyStage),
    ]);

    let outcome = executor.run(&job_id, "agent-A", None, "User prefers dark mode. Switched to MongoDB today.", now).await.unwrap();
    assert_eq!(outcome, RunOutcome::Failed);

    let job = queue.get(&job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.stages.len(), 3, "stages 4-10 must be absent from the document");
    assert_eq!(job.stages[0].stage, StageName::Extract);
    assert_eq!(job.stages[0].status, StageStatus::Complete);
    assert_eq!(job.stages[1].stage, StageName::Deduplicate);
    assert_eq!(job.stages[1].status, StageStatus::Complete);
    assert_eq!(job.stages[2].stage, StageName::ConflictCheck);
    assert_eq!(job.stages[2].status, StageStatus::Failed);
    assert!(job.stages[2].error.as_deref().unwrap_or_default().contains("embedder down"));
    assert!(job.error.unwrap().contains("embedder down"));
}

/// `updateStageResult` idempotence, exercised through the public `JobQueue`
/// API rather than `memoria-core`'s own in-module test.
#[tokio::test]
async fn claiming_an_already_running_job_fails_for_the_second_caller() {
    let facade = MemoryFacade::new(Arc::new(InMemoryStore::new()), Arc::new(MockEmbedder::new()), Arc::new(NullLlmClient));
    let job_id = facade.trigger_reflection("agent-A", None, "", BTreeMap::new(), Utc::now()).await.unwrap();

    let queue = JobQueue::new(facade.store().as_ref());
    assert!(queue.claim(&job_id).await.unwrap());
    assert!(!queue.claim(&job_id).await.unwrap());
}
