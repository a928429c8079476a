//! Scheduler (C10): three background loops sharing one shutdown signal —
//! the job dispatcher, the daily decay pass, and daily job-queue cleanup.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveTime, TimeZone, Utc};
use tokio::sync::watch;
use tracing::{error, info, warn};

use memoria_core::pipeline::PipelineExecutor;
use memoria_core::queue::JobQueue;

use crate::facade::MemoryFacade;

/// Dispatcher polls for pending jobs at this cadence; one job is claimed and
/// run per tick, serializing reflection per daemon as spec.md's default
/// concurrency requires.
const DISPATCH_INTERVAL: Duration = Duration::from_secs(1);
const DISPATCH_MAX_BACKOFF: Duration = Duration::from_secs(60);

const CLEANUP_RETENTION_DAYS: i64 = 30;
const DECAY_HOUR: u32 = 2;

/// Runs the job dispatcher until `shutdown` fires. Claims at most one pending
/// job per tick and hands it to [`PipelineExecutor`]; errors are logged and
/// back off with doubling up to [`DISPATCH_MAX_BACKOFF`] rather than
/// propagated, matching the "scheduler loops never propagate errors" policy.
pub async fn run_dispatcher(facade: Arc<MemoryFacade>, mut shutdown: watch::Receiver<bool>) {
    let mut backoff = DISPATCH_INTERVAL;
    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("dispatcher: shutdown requested, stopping");
                    return;
                }
            }
            _ = tokio::time::sleep(backoff) => {}
        }
        if *shutdown.borrow() {
            return;
        }

        match dispatch_one(&facade).await {
            Ok(true) => backoff = DISPATCH_INTERVAL,
            Ok(false) => backoff = DISPATCH_INTERVAL,
            Err(e) => {
                warn!(error = %e, "dispatcher: tick failed, backing off");
                backoff = (backoff * 2).min(DISPATCH_MAX_BACKOFF);
            }
        }
    }
}

/// Claims and runs one pending job, if any. Returns whether work was found.
async fn dispatch_one(facade: &MemoryFacade) -> Result<bool, memoria_core::error::CoreError> {
    let queue = JobQueue::new(facade.store().as_ref());
    let pending = queue.get_pending(1).await?;
    let Some(job) = pending.into_iter().next() else {
        return Ok(false);
    };

    if !queue.claim(&job.id).await? {
        return Ok(false);
    }

    let transcript = job
        .metadata
        .get("transcript")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();

    let executor = PipelineExecutor::new(facade.store().as_ref(), facade.embedder().clone(), facade.llm().clone());
    let started_at = Utc::now();
    match executor.run(&job.id, &job.agent_id, job.session_id.clone(), &transcript, started_at).await {
        Ok(outcome) => info!(job_id = %job.id, agent_id = %job.agent_id, ?outcome, "dispatcher: job finished"),
        Err(e) => error!(job_id = %job.id, error = %e, "dispatcher: executor returned an error"),
    }
    Ok(true)
}

/// Sleeps until the next local 02:00, runs a decay pass over every agent,
/// reschedules for the following day. Recomputes the target instant each
/// iteration so a system clock jump (NTP step, suspend/resume) is absorbed
/// rather than causing a missed or doubled run.
pub async fn run_decay_scheduler(facade: Arc<MemoryFacade>, mut shutdown: watch::Receiver<bool>) {
    loop {
        let sleep_duration = duration_until_next(DECAY_HOUR);
        tokio::select! {
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("decay scheduler: shutdown requested, stopping");
                    return;
                }
            }
            _ = tokio::time::sleep(sleep_duration) => {
                if *shutdown.borrow() {
                    return;
                }
                match facade.trigger_decay(None, Utc::now()).await {
                    Ok(summary) => info!(?summary, "decay scheduler: daily pass complete"),
                    Err(e) => error!(error = %e, "decay scheduler: daily pass failed"),
                }
            }
        }
    }
}

/// Once a day, deletes reflection jobs past the retention window.
pub async fn run_cleanup_scheduler(facade: Arc<MemoryFacade>, mut shutdown: watch::Receiver<bool>) {
    loop {
        let sleep_duration = Duration::from_secs(24 * 60 * 60);
        tokio::select! {
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("cleanup scheduler: shutdown requested, stopping");
                    return;
                }
            }
            _ = tokio::time::sleep(sleep_duration) => {
                if *shutdown.borrow() {
                    return;
                }
                let queue = JobQueue::new(facade.store().as_ref());
                match queue.cleanup_old_jobs(CLEANUP_RETENTION_DAYS).await {
                    Ok(removed) => info!(removed, "cleanup scheduler: old jobs purged"),
                    Err(e) => error!(error = %e, "cleanup scheduler: purge failed"),
                }
            }
        }
    }
}

/// How long to sleep, from now, until the next local-time occurrence of
/// `hour:00:00`. Always positive; if `hour` has already passed today, targets
/// tomorrow.
fn duration_until_next(hour: u32) -> Duration {
    let now = Local::now();
    let today_target = now.date_naive().and_time(NaiveTime::from_hms_opt(hour, 0, 0).expect("hour must be 0..24"));
    let target = match Local.from_local_datetime(&today_target).single() {
        Some(t) if t > now => t,
        _ => {
            let tomorrow = now.date_naive().succ_opt().unwrap_or(now.date_naive());
            let tomorrow_target = tomorrow.and_time(NaiveTime::from_hms_opt(hour, 0, 0).expect("hour must be 0..24"));
            Local.from_local_datetime(&tomorrow_target).single().unwrap_or(now + chrono::Duration::days(1))
        }
    };
    (target - now).to_std().unwrap_or(Duration::from_secs(60))
}

#[cfg(test)]
mod tests {
    use super::*;
    use memoria_core::embedding::MockEmbedder;
    use memoria_core::llm::NullLlmClient;
    use memoria_core::model::RememberOptions;
    use memoria_core::store::memory_store::InMemoryStore;
    use std::collections::BTreeMap;

    #[test]
    fn duration_until_next_is_always_positive_and_bounded() {
        let d = duration_until_next(2);
        assert!(d.as_secs() > 0);
        assert!(d.as_secs() <= 24 * 60 * 60);
    }

    fn facade() -> Arc<MemoryFacade> {
        Arc::new(MemoryFacade::new(Arc::new(InMemoryStore::new()), Arc::new(MockEmbedder::new()), Arc::new(NullLlmClient)))
    }

    #[tokio::test]
    async fn dispatch_one_claims_and_runs_a_pending_job() {
        let facade = facade();
        let job_id = facade
            .trigger_reflection("agent-A", None, "User prefers dark mode. Switched to PostgreSQL.", BTreeMap::new(), Utc::now())
            .await
            .unwrap();

        let found_work = dispatch_one(&facade).await.unwrap();
        assert!(found_work);

        let job = JobQueue::new(facade.store().as_ref()).get(&job_id).await.unwrap().unwrap();
        assert_eq!(job.status, memoria_core::model::JobStatus::Complete);
        assert_eq!(job.stages.len(), 10);
    }

    #[tokio::test]
    async fn dispatch_one_is_a_no_op_with_no_pending_jobs() {
        let facade = facade();
        assert!(!dispatch_one(&facade).await.unwrap());
    }

    #[tokio::test]
    async fn dispatch_one_does_not_rerun_an_already_running_job() {
        let facade = facade();
        facade.remember("agent-A", "seed memory", RememberOptions::default(), Utc::now()).await.unwrap();
        let job_id = facade.trigger_reflection("agent-A", None, "transcript", BTreeMap::new(), Utc::now()).await.unwrap();

        let queue = JobQueue::new(facade.store().as_ref());
        assert!(queue.claim(&job_id).await.unwrap(), "job should start pending and claim successfully");

        assert!(!dispatch_one(&facade).await.unwrap(), "an already-claimed job must not be dispatched again");
    }
}
