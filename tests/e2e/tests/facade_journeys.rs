//! Seed scenarios driven purely through `MemoryFacade`, the same surface the
//! HTTP layer calls — no pipeline job involved.

use std::sync::Arc;

use chrono::{Duration, Utc};

use memoria_core::embedding::MockEmbedder;
use memoria_core::llm::NullLlmClient;
use memoria_core::model::{Layer, MemoryRecord, RememberOptions};
use memoria_core::store::memory_store::InMemoryStore;
use memoria_core::store::{to_insertable_document, Store, COLLECTION_MEMORIES};
use memoria_daemon::MemoryFacade;

fn facade() -> MemoryFacade {
    MemoryFacade::new(Arc::new(InMemoryStore::new()), Arc::new(MockEmbedder::new()), Arc::new(NullLlmClient))
}

/// Seed scenario 1: Remember+Recall happy path.
#[tokio::test]
async fn remember_then_recall_returns_the_memory_above_threshold() {
    let facade = facade();
    let now = Utc::now();
    let opts = RememberOptions { tags: ["pref".to_string()].into_iter().collect(), ..Default::default() };
    let id = facade.remember("agent-A", "User prefers dark mode", opts, now).await.unwrap();

    let outcome = facade.recall("agent-A", "what UI theme does user like?", 3, &Default::default()).await.unwrap();

    assert_eq!(outcome.method, "vector");
    assert_eq!(outcome.results.len(), 1);
    assert_eq!(outcome.results[0].id, id);
    assert_eq!(outcome.results[0].text, "User prefers dark mode");
    assert!(outcome.results[0].score >= 0.6, "score {} below seed scenario's threshold", outcome.results[0].score);
}

/// Seed scenario 3: decay and archival threshold.
#[tokio::test]
async fn decay_crosses_archival_threshold_for_a_stale_episodic_memory() {
    let facade = facade();
    let now = Utc::now();
    let thirty_days_ago = now - Duration::days(30);

    let opts = RememberOptions { layer: Some(Layer::Episodic), ..Default::default() };
    let mut record = MemoryRecord::new("agent-A", "User mentioned a deadline", vec![0.0; 4], 4, opts, thirty_days_ago).unwrap();
    record.strength = 0.3;
    record.last_reinforced_at = thirty_days_ago;
    let doc = to_insertable_document(&record).unwrap();
    facade.store().insert_one(COLLECTION_MEMORIES, doc).await.unwrap();

    let summary = facade.trigger_decay(Some("agent-A"), now).await.unwrap();

    assert_eq!(summary.total_memories, 1);
    assert_eq!(summary.archival_candidates, 1);
    assert_eq!(summary.expiration_candidates, 0);

    let docs = facade.store().find(COLLECTION_MEMORIES, memoria_core::store::Filter::new(), None, None).await.unwrap();
    let record: MemoryRecord = bson::from_document(docs.into_iter().next().unwrap()).unwrap();
    let expected = 0.3 * (-0.015_f64 * 30.0).exp();
    assert!((record.strength - expected).abs() < 1e-3, "strength {} not close to expected {}", record.strength, expected);
}

/// Seed scenario 4: global dedup keeps the oldest record and merges tags.
#[tokio::test]
async fn global_dedup_keeps_oldest_and_merges_tags() {
    let facade = facade();
    let t0 = Utc::now() - Duration::minutes(2);

    async fn seed_at(facade: &MemoryFacade, text: &str, tags: &[&str], created_at: chrono::DateTime<Utc>) {
        let record = MemoryRecord::new(
            "agent-A",
            text,
            vec![0.0; 4],
            4,
            RememberOptions { tags: tags.iter().map(|s| s.to_string()).collect(), ..Default::default() },
            created_at,
        )
        .unwrap();
        let doc = to_insertable_document(&record).unwrap();
        facade.store().insert_one(COLLECTION_MEMORIES, doc).await.unwrap();
    }

    seed_at(&facade, "User works with Postgres", &["x"], t0).await;
    seed_at(&facade, "User works with Postgres", &["y"], t0 + Duration::minutes(1)).await;
    seed_at(&facade, "User works with Postgres", &["x", "z"], t0 + Duration::minutes(2)).await;

    let summary = facade.deduplicate(Some("agent-A"), false, Utc::now()).await.unwrap();

    assert_eq!(summary.groups_merged, 1);
    assert_eq!(summary.records_deleted, 2);

    let docs = facade.store().find(COLLECTION_MEMORIES, memoria_core::store::Filter::new().eq("agentId", "agent-A"), None, None).await.unwrap();
    assert_eq!(docs.len(), 1);
    let survivor: MemoryRecord = bson::from_document(docs.into_iter().next().unwrap()).unwrap();
    assert_eq!(survivor.created_at, t0);
    assert_eq!(survivor.tags, ["x", "y", "z"].into_iter().map(String::from).collect());
}
