//! Pipeline executor: runs the ten stages in order against one job,
//! recording a result per stage and handling failure isolation.
//!
//! A stage failure does not roll back earlier stages' side effects — reads
//! and writes against [`crate::store::Store`] are the persisted truth, and
//! reflection is designed to be idempotent over its window: re-running the
//! same transcript converges on the same end state modulo timestamps.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};

use crate::embedding::Embedder;
use crate::error::CoreError;
use crate::llm::LlmClient;
use crate::model::{JobStatus, StageName, StageResult, StageStatus};
use crate::queue::JobQueue;
use crate::store::Store;

use super::{default_stages, PipelineContext, Stage};

/// Soft per-job deadline. Checked at each stage boundary — the pipeline has
/// no mid-stage suspension points to interrupt, so a stage already running
/// when the deadline passes is allowed to finish; the *next* stage is the one
/// that observes the timeout.
pub const DEFAULT_JOB_DEADLINE_SECONDS: i64 = 600;

pub struct PipelineExecutor<'a> {
    store: &'a dyn Store,
    embedder: Arc<dyn Embedder>,
    llm: Arc<dyn LlmClient>,
    stages: Vec<Box<dyn Stage>>,
    deadline_seconds: i64,
}

/// Outcome of running one job to completion (or failure).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Complete,
    Failed,
}

impl<'a> PipelineExecutor<'a> {
    pub fn new(store: &'a dyn Store, embedder: Arc<dyn Embedder>, llm: Arc<dyn LlmClient>) -> Self {
        Self {
            store,
            embedder,
            llm,
            stages: default_stages(),
            deadline_seconds: DEFAULT_JOB_DEADLINE_SECONDS,
        }
    }

    pub fn with_deadline_seconds(mut self, seconds: i64) -> Self {
        self.deadline_seconds = seconds;
        self
    }

    /// Overrides the stage list. Exists so tests can inject a deliberately
    /// failing stage and exercise the executor's failure-isolation behavior
    /// end to end rather than only unit-testing each stage in isolation.
    pub fn with_stages(mut self, stages: Vec<Box<dyn Stage>>) -> Self {
        self.stages = stages;
        self
    }

    /// Runs every stage of `job_id`, which must already be in the `running`
    /// state. Persists a result for each stage as it completes and the job's
    /// final status, matching the atomic upsert protocol of the job queue.
    pub async fn run(
        &self,
        job_id: &str,
        agent_id: &str,
        session_id: Option<String>,
        session_transcript: &str,
        started_at: DateTime<Utc>,
    ) -> Result<RunOutcome, CoreError> {
        let queue = JobQueue::new(self.store);
        let mut ctx = PipelineContext::new(
            agent_id,
            session_id,
            job_id,
            session_transcript,
            Utc::now(),
            self.store,
            Arc::clone(&self.embedder),
            Arc::clone(&self.llm),
        );

        for stage in &self.stages {
            let now = Utc::now();
            if (now - started_at).num_seconds() > self.deadline_seconds {
                let error = format!("job exceeded soft deadline of {}s before stage '{}'", self.deadline_seconds, stage.name());
                queue
                    .update_stage_result(job_id, failed_result(stage.name(), now, "deadline exceeded"))
                    .await?;
                queue.update_status(job_id, JobStatus::Failed, Some(error)).await?;
                return Ok(RunOutcome::Failed);
            }

            ctx.now = now;
            queue.update_stage_result(job_id, StageResult::running(stage.name(), now)).await?;

            let stage_start = Instant::now();
            let before_stats = ctx.stats.clone();
            let outcome = stage.execute(&mut ctx).await;
            let _elapsed = stage_start.elapsed();

            match outcome {
                Ok(()) => {
                    let counts = stats_delta_for_stage(stage.name(), &before_stats, &ctx.stats);
                    let mut result = StageResult::running(stage.name(), now);
                    result.status = StageStatus::Complete;
                    result.completed_at = Some(Utc::now());
                    result.counts = counts;
                    queue.update_stage_result(job_id, result).await?;
                }
                Err(e) => {
                    queue.update_stage_result(job_id, failed_result(stage.name(), now, &e.to_string())).await?;
                    queue.update_status(job_id, JobStatus::Failed, Some(e.to_string())).await?;
                    return Ok(RunOutcome::Failed);
                }
            }
        }

        queue.update_status(job_id, JobStatus::Complete, None).await?;
        Ok(RunOutcome::Complete)
    }
}

fn failed_result(stage: StageName, started_at: DateTime<Utc>, error: &str) -> StageResult {
    let mut result = StageResult::running(stage, started_at);
    result.status = StageStatus::Failed;
    result.completed_at = Some(Utc::now());
    result.error = Some(error.to_string());
    result
}

/// Stats accumulate cumulatively under stage-prefixed keys across a whole
/// run; a stage's own recorded counts are only the keys it just added.
fn stats_delta_for_stage(
    stage: StageName,
    before: &std::collections::BTreeMap<String, i64>,
    after: &std::collections::BTreeMap<String, i64>,
) -> std::collections::BTreeMap<String, i64> {
    let prefix = format!("{}_", stage.as_str());
    after
        .iter()
        .filter(|(k, _)| k.starts_with(&prefix))
        .filter(|(k, v)| before.get(*k) != Some(*v))
        .map(|(k, v)| (k.clone(), *v))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::MockEmbedder;
    use crate::llm::NullLlmClient;
    use crate::model::{JobStatus, ReflectionJob};
    use crate::store::memory_store::InMemoryStore;
    use std::collections::BTreeMap;

    async fn run_job(store: &InMemoryStore, transcript: &str) -> (String, RunOutcome) {
        let queue = JobQueue::new(store);
        let now = Utc::now();
        let job = ReflectionJob::new("agent-A", Some("session-1".to_string()), BTreeMap::new(), now);
        let job_id = queue.create(job).await.unwrap();
        queue.update_status(&job_id, JobStatus::Running, None).await.unwrap();

        let executor = PipelineExecutor::new(store, Arc::new(MockEmbedder::new()), Arc::new(NullLlmClient));
        let outcome = executor.run(&job_id, "agent-A", Some("session-1".to_string()), transcript, now).await.unwrap();
        (job_id, outcome)
    }

    #[tokio::test]
    async fn empty_transcript_completes_with_zero_counts() {
        let store = InMemoryStore::new();
        let (job_id, outcome) = run_job(&store, "").await;
        assert_eq!(outcome, RunOutcome::Complete);

        let queue = JobQueue::new(&store);
        let job = queue.get(&job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Complete);
        assert_eq!(job.stages.len(), 10, "all ten stages must be recorded");
        let extract = job.stages.iter().find(|s| s.stage == StageName::Extract).unwrap();
        assert_eq!(extract.counts.get("extract_extracted"), Some(&0));
    }

    #[tokio::test]
    async fn full_transcript_persists_new_memories() {
        let store = InMemoryStore::new();
        let (_job_id, outcome) = run_job(&store, "User prefers dark mode. Decided to use PostgreSQL.").await;
        assert_eq!(outcome, RunOutcome::Complete);

        let count = store.count_documents(crate::store::COLLECTION_MEMORIES, crate::store::Filter::new()).await.unwrap();
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn stage_failure_stops_pipeline_and_omits_later_stages() {
        struct AlwaysFails;
        #[async_trait::async_trait]
        impl Stage for AlwaysFails {
            fn name(&self) -> StageName {
                StageName::ConflictCheck
            }
            async fn execute(&self, _ctx: &mut PipelineContext<'_>) -> Result<(), CoreError> {
                Err(CoreError::EmbedderFailed("embedder down".into()))
            }
        }

        let store = InMemoryStore::new();
        let queue = JobQueue::new(&store);
        let now = Utc::now();
        let job = ReflectionJob::new("agent-A", None, BTreeMap::new(), now);
        let job_id = queue.create(job).await.unwrap();
        queue.update_status(&job_id, JobStatus::Running, None).await.unwrap();

        let executor = PipelineExecutor::new(&store, Arc::new(MockEmbedder::new()), Arc::new(NullLlmClient)).with_stages(vec![
            Box::new(super::super::stages::extract::ExtractStage),
            Box::new(super::super::stages::deduplicate::DeduplicateStage),
            Box::new(AlwaysFails),
            Box::new(super::super::stages::classify::ClassifyStage),
        ]);
        let outcome = executor.run(&job_id, "agent-A", None, "Switched to MongoDB today.", now).await.unwrap();
        assert_eq!(outcome, RunOutcome::Failed);

        let job = queue.get(&job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.stages.len(), 3, "stages after the failure must never be recorded");
        assert_eq!(job.stages[2].status, StageStatus::Failed);
        assert!(job.error.unwrap().contains("embedder down"));
    }
}
