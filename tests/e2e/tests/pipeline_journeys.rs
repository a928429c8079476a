//! Seed scenarios that exercise the reflection pipeline itself, either end
//! to end through a claimed job or by driving individual stages directly the
//! way `memoria-core`'s own stage-level unit tests do.

use std::sync::Arc;

use chrono::Utc;

use memoria_core::embedding::MockEmbedder;
use memoria_core::llm::NullLlmClient;
use memoria_core::model::{EdgeType, Layer, MemoryRecord, PendingEdge, RememberOptions};
use memoria_core::pipeline::executor::RunOutcome;
use memoria_core::pipeline::stages::classify::ClassifyStage;
use memoria_core::pipeline::stages::confidence_update::ConfidenceUpdateStage;
use memoria_core::pipeline::stages::conflict_check::ConflictCheckStage;
use memoria_core::pipeline::stages::graph_apply::GraphApplyStage;
use memoria_core::pipeline::{CandidateAtom, PipelineContext, PipelineExecutor, Stage};
use memoria_core::queue::JobQueue;
use memoria_core::store::memory_store::InMemoryStore;
use memoria_core::store::{to_insertable_document, Filter, Store, COLLECTION_MEMORIES, COLLECTION_PENDING_EDGES};
use memoria_daemon::MemoryFacade;

use std::collections::BTreeMap;

/// Seed scenario 2: contradiction reinforces the right side.
///
/// The real `ExtractStage` never sets an atom's confidence (it always comes
/// back `None`, defaulting to 0.6 downstream), so a raw-transcript run can
/// never reach the "strong contradiction" (> 0.75) branch. This drives
/// conflict-check, classify, and confidence-update directly against a real
/// store with a hand-built atom instead, the same pattern the stage's own
/// unit tests use.
#[tokio::test]
async fn strong_contradiction_applies_proportional_penalty_and_persists_new_memory() {
    let store = InMemoryStore::new();
    let now = Utc::now();

    let m1 = MemoryRecord::new("agent-A", "I will use PostgreSQL", vec![0.9, 0.1, 0.0, 0.0], 4, RememberOptions::default(), now).unwrap();
    let m1_id = store.insert_one(COLLECTION_MEMORIES, to_insertable_document(&m1).unwrap()).await.unwrap();
    assert!((m1.confidence - 0.6).abs() < 1e-9, "seed scenario assumes the default confidence");

    let mut ctx = PipelineContext::new("agent-A", None, "job-1", "", now, &store, Arc::new(MockEmbedder::new()), Arc::new(NullLlmClient));
    let mut atom = CandidateAtom::new("No longer using that database, switched to MongoDB today.");
    atom.confidence = Some(0.8);
    atom.embedding = m1.embedding.clone();
    ctx.deduplicated_atoms = vec![atom];

    ConflictCheckStage.execute(&mut ctx).await.unwrap();
    assert_eq!(ctx.stats.get("conflict-check_conflicts"), Some(&1));
    assert!(!ctx.deduplicated_atoms[0].contradictions.is_empty());

    ClassifyStage.execute(&mut ctx).await.unwrap();
    assert!(ctx.classified_atoms[0].persisted_id.is_some(), "the new atom must be persisted as m2");

    ConfidenceUpdateStage.execute(&mut ctx).await.unwrap();

    let m1_after = store.find_one(COLLECTION_MEMORIES, Filter::new().eq("id", m1_id.as_str())).await.unwrap().unwrap();
    let confidence_after = m1_after.get_f64("confidence").unwrap();
    assert!((confidence_after - 0.42).abs() < 1e-9, "expected strong-contradiction penalty, got {confidence_after}");

    let total = store.count_documents(COLLECTION_MEMORIES, Filter::new().eq("agentId", "agent-A")).await.unwrap();
    assert_eq!(total, 2, "m1 plus the newly persisted m2");
}

/// Seed scenario 5: pending edge application with a missing target.
#[tokio::test]
async fn pending_edge_with_missing_target_applies_without_reverse_edge() {
    let store = InMemoryStore::new();
    let now = Utc::now();

    let source = MemoryRecord::new("agent-A", "User mentioned the deploy pipeline", vec![0.0; 4], 4, RememberOptions { layer: Some(Layer::Episodic), ..Default::default() }, now).unwrap();
    let source_id = store.insert_one(COLLECTION_MEMORIES, to_insertable_document(&source).unwrap()).await.unwrap();

    // The target memory was Forgotten before graph-apply ran: it never exists in the store.
    let edge = PendingEdge::new(source_id.clone(), "forgotten-target-id", EdgeType::CoOccurs, 0.4, 0.9, now);
    store.insert_one(COLLECTION_PENDING_EDGES, to_insertable_document(&edge).unwrap()).await.unwrap();

    let mut ctx = PipelineContext::new("agent-A", None, "job-1", "", now, &store, Arc::new(MockEmbedder::new()), Arc::new(NullLlmClient));
    GraphApplyStage.execute(&mut ctx).await.unwrap();

    assert_eq!(ctx.stats.get("graph-apply_applied"), Some(&1));
    assert_eq!(ctx.stats.get("graph-apply_skipped_missing_source"), Some(&0));
    assert_eq!(ctx.stats.get("graph-apply_reverse_applied"), Some(&0), "no reverse edge: the target never existed");

    let source_after = store.find_one(COLLECTION_MEMORIES, Filter::new().eq("id", source_id.as_str())).await.unwrap().unwrap();
    assert_eq!(source_after.get_array("edges").unwrap().len(), 1);
    assert_eq!(store.count_documents(COLLECTION_PENDING_EDGES, Filter::new()).await.unwrap(), 0);
}

/// Regression test for the `MENTIONS_ENTITY` edge target bug: running the
/// real default pipeline end to end over a transcript that mentions a
/// capitalized entity must leave that entity's `linkedMemories` non-empty.
#[tokio::test]
async fn entity_linkage_round_trip_surfaces_the_mentioning_memory() {
    let facade = MemoryFacade::new(Arc::new(InMemoryStore::new()), Arc::new(MockEmbedder::new()), Arc::new(NullLlmClient));
    let now = Utc::now();

    let job_id = facade
        .trigger_reflection("agent-A", Some("session-1".to_string()), "The user asked about Rust yesterday.", BTreeMap::new(), now)
        .await
        .unwrap();

    let queue = JobQueue::new(facade.store().as_ref());
    assert!(queue.claim(&job_id).await.unwrap());

    let executor = PipelineExecutor::new(facade.store().as_ref(), facade.embedder().clone(), facade.llm().clone());
    let job = queue.get(&job_id).await.unwrap().unwrap();
    let outcome = executor.run(&job_id, "agent-A", job.session_id.clone(), "The user asked about Rust yesterday.", now).await.unwrap();
    assert_eq!(outcome, RunOutcome::Complete);

    let (entity, linked) = facade.entity_get("agent-A", "rust").await.unwrap();
    assert_eq!(entity.display_name, "Rust");
    assert_eq!(linked.len(), 1, "linkedMemories must surface the memory that mentioned the entity");
    assert!(linked[0].text.contains("Rust"));
}
