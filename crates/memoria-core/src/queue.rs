//! Job queue: persists pipeline runs and survives daemon restarts.

use chrono::Utc;

use crate::error::CoreError;
use crate::model::{JobStatus, ReflectionJob, StageResult};
use crate::store::{to_insertable_document, Filter, Sort, SortDirection, Store, Update, UpdateOptions, COLLECTION_REFLECTION_JOBS};

pub struct JobQueue<'a> {
    store: &'a dyn Store,
}

impl<'a> JobQueue<'a> {
    pub fn new(store: &'a dyn Store) -> Self {
        Self { store }
    }

    /// Inserts a `pending` job with empty stages. Returns the new job id.
    pub async fn create(&self, job: ReflectionJob) -> Result<String, CoreError> {
        let doc = to_insertable_document(&job)?;
        self.store.insert_one(COLLECTION_REFLECTION_JOBS, doc).await
    }

    /// Returns `None` for unknown or malformed ids rather than an error.
    pub async fn get(&self, job_id: &str) -> Result<Option<ReflectionJob>, CoreError> {
        let doc = self.store.find_one(COLLECTION_REFLECTION_JOBS, Filter::new().eq("id", job_id)).await?;
        Ok(doc.and_then(|d| bson::from_document(d).ok()))
    }

    /// Sets status; on `running` sets `startedAt`, on `complete`/`failed` sets `completedAt`.
    pub async fn update_status(&self, job_id: &str, status: JobStatus, error: Option<String>) -> Result<(), CoreError> {
        let now = Utc::now();
        let status_str = match status {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Complete => "complete",
            JobStatus::Failed => "failed",
        };
        let mut update = Update::new().set("status", status_str);
        match status {
            JobStatus::Running => update = update.set("startedAt", now.to_rfc3339()),
            JobStatus::Complete | JobStatus::Failed => update = update.set("completedAt", now.to_rfc3339()),
            JobStatus::Pending => {}
        }
        if let Some(err) = error {
            update = update.set("error", err);
        }
        self.store
            .update_one(COLLECTION_REFLECTION_JOBS, Filter::new().eq("id", job_id), update, UpdateOptions::default())
            .await?;
        Ok(())
    }

    /// Atomic upsert into the `stages` array: first attempts a positional
    /// `$set` against `{id, stages.stage=name}`; if nothing matched, `$push`es
    /// the result instead. Exactly one entry per stage name survives either way.
    pub async fn update_stage_result(&self, job_id: &str, result: StageResult) -> Result<(), CoreError> {
        let stage_doc = bson::to_bson(&result).map_err(|e| CoreError::StoreUnavailable(e.to_string()))?;
        let filter = Filter::new().eq("id", job_id).eq("stages.stage", result.stage.as_str());
        let update = Update::new().set("stages.$", stage_doc.clone());
        let r = self.store.update_one(COLLECTION_REFLECTION_JOBS, filter, update, UpdateOptions::default()).await?;
        if r.matched_count == 0 {
            let push_update = Update::new().push("stages", stage_doc);
            self.store
                .update_one(COLLECTION_REFLECTION_JOBS, Filter::new().eq("id", job_id), push_update, UpdateOptions::default())
                .await?;
        }
        Ok(())
    }

    /// Most-recent-first.
    pub async fn list_jobs(&self, agent_id: &str, limit: usize) -> Result<Vec<ReflectionJob>, CoreError> {
        let docs = self
            .store
            .find(
                COLLECTION_REFLECTION_JOBS,
                Filter::new().eq("agentId", agent_id),
                Some(Sort { field: "createdAt", direction: SortDirection::Descending }),
                Some(limit),
            )
            .await?;
        Ok(docs.into_iter().filter_map(|d| bson::from_document(d).ok()).collect())
    }

    /// Oldest-first.
    pub async fn get_pending(&self, limit: usize) -> Result<Vec<ReflectionJob>, CoreError> {
        let docs = self
            .store
            .find(
                COLLECTION_REFLECTION_JOBS,
                Filter::new().eq("status", "pending"),
                Some(Sort { field: "createdAt", direction: SortDirection::Ascending }),
                Some(limit),
            )
            .await?;
        Ok(docs.into_iter().filter_map(|d| bson::from_document(d).ok()).collect())
    }

    /// Conditional claim: `{id, status:"pending"} -> {status:"running"}`. If
    /// the update matches 0 documents, another worker already claimed it.
    pub async fn claim(&self, job_id: &str) -> Result<bool, CoreError> {
        let now = Utc::now();
        let filter = Filter::new().eq("id", job_id).eq("status", "pending");
        let update = Update::new().set("status", "running").set("startedAt", now.to_rfc3339());
        let r = self.store.update_one(COLLECTION_REFLECTION_JOBS, filter, update, UpdateOptions::default()).await?;
        Ok(r.matched_count > 0)
    }

    /// Deletes terminal jobs whose `completedAt` predates the cutoff. Returns the count removed.
    pub async fn cleanup_old_jobs(&self, older_than_days: i64) -> Result<u64, CoreError> {
        let cutoff = Utc::now() - chrono::Duration::days(older_than_days);
        let filter = Filter::new().in_("status", vec!["complete".into(), "failed".into()]).lt("completedAt", cutoff.to_rfc3339());
        let r = self.store.delete_many(COLLECTION_REFLECTION_JOBS, filter).await?;
        Ok(r.deleted_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{StageName, StageStatus};
    use crate::store::memory_store::InMemoryStore;
    use std::collections::BTreeMap;

    #[tokio::test]
    async fn update_stage_result_is_idempotent_per_stage_name() {
        let store = InMemoryStore::new();
        let queue = JobQueue::new(&store);
        let now = Utc::now();
        let job = ReflectionJob::new("agent-A", None, BTreeMap::new(), now);
        let job_id = queue.create(job).await.unwrap();

        let mut r1 = StageResult::running(StageName::Extract, now);
        r1.status = StageStatus::Complete;
        queue.update_stage_result(&job_id, r1).await.unwrap();

        let mut r2 = StageResult::running(StageName::Extract, now);
        r2.status = StageStatus::Complete;
        r2.counts.insert("extracted".into(), 3);
        queue.update_stage_result(&job_id, r2).await.unwrap();

        let job = queue.get(&job_id).await.unwrap().unwrap();
        assert_eq!(job.stages.len(), 1);
        assert_eq!(job.stages[0].counts.get("extracted"), Some(&3));
    }

    #[tokio::test]
    async fn claim_is_single_winner() {
        let store = InMemoryStore::new();
        let queue = JobQueue::new(&store);
        let job = ReflectionJob::new("agent-A", None, BTreeMap::new(), Utc::now());
        let job_id = queue.create(job).await.unwrap();

        assert!(queue.claim(&job_id).await.unwrap());
        assert!(!queue.claim(&job_id).await.unwrap(), "second claim on an already-running job must fail");
    }

    #[tokio::test]
    async fn cleanup_removes_only_old_terminal_jobs() {
        let store = InMemoryStore::new();
        let queue = JobQueue::new(&store);
        let old_completed_at = Utc::now() - chrono::Duration::days(40);

        let mut old_job = ReflectionJob::new("agent-A", None, BTreeMap::new(), old_completed_at);
        old_job.status = JobStatus::Complete;
        old_job.completed_at = Some(old_completed_at);
        queue.create(old_job).await.unwrap();

        let recent_job = ReflectionJob::new("agent-A", None, BTreeMap::new(), Utc::now());
        queue.create(recent_job).await.unwrap();

        let removed = queue.cleanup_old_jobs(30).await.unwrap();
        assert_eq!(removed, 1);
    }
}
