//! Core facade (C11): the synchronous-looking operations the HTTP transport
//! calls directly, bypassing the reflection pipeline. Remember/Recall/Forget
//! plus the export/purge/decay/dedup/entity surface the route table needs.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;

use bson::doc;
use chrono::{DateTime, Utc};
use serde::Serialize;

use memoria_core::embedding::{cosine_similarity, EmbedRole, Embedder};
use memoria_core::error::{CoreError, Result};
use memoria_core::llm::LlmClient;
use memoria_core::model::{EdgeType, Entity, MemoryRecord, RememberOptions};
use memoria_core::pipeline::stages::decay_pass::{run_decay_pass, DecaySummary};
use memoria_core::pipeline::stages::global_dedup::{run_global_dedup, GlobalDedupSummary};
use memoria_core::queue::JobQueue;
use memoria_core::store::{
    to_insertable_document, Filter, Store, Update, UpdateOptions, COLLECTION_ENTITIES, COLLECTION_MEMORIES,
    COLLECTION_PENDING_EDGES,
};

/// One scored recall result.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecallResultItem {
    pub id: String,
    pub text: String,
    pub score: f64,
    pub tags: BTreeSet<String>,
    pub metadata: BTreeMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl RecallResultItem {
    fn from_record(record: MemoryRecord, score: f64) -> Self {
        Self {
            id: record.id,
            text: record.text,
            score,
            tags: record.tags,
            metadata: record.metadata,
            created_at: record.created_at,
        }
    }
}

pub struct RecallOutcome {
    pub results: Vec<RecallResultItem>,
    pub method: &'static str,
}

/// Wires `memoria-core`'s trait seams and the job queue into the operations
/// spec.md's HTTP layer expects. Holds `Arc`s so it can be shared across axum
/// handlers and the scheduler without re-reading configuration.
pub struct MemoryFacade {
    store: Arc<dyn Store>,
    embedder: Arc<dyn Embedder>,
    llm: Arc<dyn LlmClient>,
}

impl MemoryFacade {
    pub fn new(store: Arc<dyn Store>, embedder: Arc<dyn Embedder>, llm: Arc<dyn LlmClient>) -> Self {
        Self { store, embedder, llm }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    pub fn llm(&self) -> &Arc<dyn LlmClient> {
        &self.llm
    }

    /// Embeds `text` (document role), validates, and persists a new memory.
    pub async fn remember(&self, agent_id: &str, text: &str, opts: RememberOptions, now: DateTime<Utc>) -> Result<String> {
        if text.trim().is_empty() {
            return Err(CoreError::invalid("text must not be empty"));
        }
        let embedding = self
            .embedder
            .embed_one(text, EmbedRole::Document)
            .await
            .map_err(|e| CoreError::EmbedderFailed(e.to_string()))?;
        let dimension = embedding.len();
        let record = MemoryRecord::new(agent_id, text, embedding, dimension, opts, now)?;
        let doc = to_insertable_document(&record)?;
        self.store.insert_one(COLLECTION_MEMORIES, doc).await
    }

    /// Embeds `query` (query role) and ranks the agent's memories by cosine
    /// similarity. Falls back to a case-insensitive substring match, reported
    /// as `method="in_memory"`, when the embedder is unavailable.
    pub async fn recall(&self, agent_id: &str, query: &str, limit: usize, tags: &BTreeSet<String>) -> Result<RecallOutcome> {
        match self.embedder.embed_one(query, EmbedRole::Query).await {
            Ok(query_embedding) => {
                let docs = self.store.find(COLLECTION_MEMORIES, Filter::new().eq("agentId", agent_id), None, None).await?;
                let mut scored = Vec::new();
                for doc in docs {
                    let Ok(record) = bson::from_document::<MemoryRecord>(doc) else { continue };
                    if !tags.is_empty() && record.tags.intersection(tags).next().is_none() {
                        continue;
                    }
                    if record.embedding.len() != query_embedding.len() {
                        return Err(CoreError::invalid(format!(
                            "memory {} has embedding dimension {} but the query embedded to dimension {}",
                            record.id,
                            record.embedding.len(),
                            query_embedding.len()
                        )));
                    }
                    let score = cosine_similarity(&query_embedding, &record.embedding) as f64;
                    scored.push((score, record));
                }
                scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
                scored.truncate(limit);
                Ok(RecallOutcome {
                    results: scored.into_iter().map(|(score, r)| RecallResultItem::from_record(r, score)).collect(),
                    method: "vector",
                })
            }
            Err(_) => {
                let docs = self.store.find(COLLECTION_MEMORIES, Filter::new().eq("agentId", agent_id), None, None).await?;
                let needle = query.to_lowercase();
                let mut out = Vec::new();
                for doc in docs {
                    let Ok(record) = bson::from_document::<MemoryRecord>(doc) else { continue };
                    if !tags.is_empty() && record.tags.intersection(tags).next().is_none() {
                        continue;
                    }
                    if record.text.to_lowercase().contains(&needle) {
                        out.push(record);
                    }
                }
                out.truncate(limit);
                Ok(RecallOutcome {
                    results: out.into_iter().map(|r| RecallResultItem::from_record(r, 0.0)).collect(),
                    method: "in_memory",
                })
            }
        }
    }

    /// Deletes a memory and any pending edges that reference it.
    pub async fn forget(&self, id: &str) -> Result<()> {
        let r = self.store.delete_one(COLLECTION_MEMORIES, Filter::new().eq("id", id)).await?;
        if r.deleted_count == 0 {
            return Err(CoreError::not_found(format!("memory '{id}' not found")));
        }
        self.store.delete_many(COLLECTION_PENDING_EDGES, Filter::new().eq("sourceId", id)).await?;
        self.store.delete_many(COLLECTION_PENDING_EDGES, Filter::new().eq("targetId", id)).await?;
        Ok(())
    }

    pub async fn export(&self, agent_id: &str) -> Result<Vec<MemoryRecord>> {
        let docs = self.store.find(COLLECTION_MEMORIES, Filter::new().eq("agentId", agent_id), None, None).await?;
        Ok(docs.into_iter().filter_map(|d| bson::from_document(d).ok()).collect())
    }

    pub async fn purge(&self, agent_id: &str, older_than: DateTime<Utc>) -> Result<u64> {
        let filter = Filter::new().eq("agentId", agent_id).lt("createdAt", bson::DateTime::from_millis(older_than.timestamp_millis()));
        let r = self.store.delete_many(COLLECTION_MEMORIES, filter).await?;
        Ok(r.deleted_count)
    }

    pub async fn clear(&self, agent_id: &str) -> Result<u64> {
        let r = self.store.delete_many(COLLECTION_MEMORIES, Filter::new().eq("agentId", agent_id)).await?;
        Ok(r.deleted_count)
    }

    /// Enqueues a pending reflection job; the transcript is stashed in the
    /// job's metadata rather than threaded through a separate parameter, so
    /// the dispatcher can recover it without a second store round-trip.
    pub async fn trigger_reflection(&self, agent_id: &str, session_id: Option<String>, transcript: &str, mut metadata: BTreeMap<String, serde_json::Value>, now: DateTime<Utc>) -> Result<String> {
        metadata.insert("transcript".to_string(), serde_json::Value::String(transcript.to_string()));
        let job = memoria_core::model::ReflectionJob::new(agent_id, session_id, metadata, now);
        JobQueue::new(self.store.as_ref()).create(job).await
    }

    pub async fn trigger_decay(&self, agent_id: Option<&str>, now: DateTime<Utc>) -> Result<DecaySummary> {
        run_decay_pass(self.store.as_ref(), agent_id, now).await
    }

    pub async fn decay_expiration_candidates(&self, agent_id: &str) -> Result<Vec<MemoryRecord>> {
        let docs = self.store.find(COLLECTION_MEMORIES, Filter::new().eq("agentId", agent_id), None, None).await?;
        let records: Vec<MemoryRecord> = docs.into_iter().filter_map(|d| bson::from_document(d).ok()).collect();
        Ok(records.into_iter().filter(|m| memoria_core::decay::is_expiration_candidate(m.strength)).collect())
    }

    pub async fn promote_archival(&self, id: &str, now: DateTime<Utc>) -> Result<()> {
        let existing = self.store.find_one(COLLECTION_MEMORIES, Filter::new().eq("id", id)).await?;
        if existing.is_none() {
            return Err(CoreError::not_found(format!("memory '{id}' not found")));
        }
        let update = Update::new().set("layer", "archival").set("updatedAt", now.to_rfc3339());
        self.store.update_one(COLLECTION_MEMORIES, Filter::new().eq("id", id), update, UpdateOptions::default()).await?;
        Ok(())
    }

    pub async fn deduplicate(&self, agent_id: Option<&str>, dry_run: bool, now: DateTime<Utc>) -> Result<GlobalDedupSummary> {
        run_global_dedup(self.store.as_ref(), agent_id, now, dry_run).await
    }

    /// Re-runs the LLM explainer over up to `limit` memories that already
    /// carry at least one contradiction, replacing each explanation in place.
    pub async fn enhance_contradictions(&self, agent_id: &str, limit: usize, now: DateTime<Utc>) -> Result<u64> {
        let docs = self.store.find(COLLECTION_MEMORIES, Filter::new().eq("agentId", agent_id), None, None).await?;
        let mut enhanced = 0u64;
        for doc in docs {
            if enhanced as usize >= limit {
                break;
            }
            let Ok(mut record) = bson::from_document::<MemoryRecord>(doc) else { continue };
            if record.contradictions.is_empty() {
                continue;
            }
            let mut changed = false;
            for contradiction in &mut record.contradictions {
                let prompt = format!("Elaborate, in one or two sentences, on why this contradiction was flagged: {}", contradiction.explanation);
                if let Ok(explanation) = self.llm.complete(&prompt).await {
                    contradiction.explanation = explanation;
                    changed = true;
                }
            }
            if changed {
                let contradictions_bson = bson::to_bson(&record.contradictions).map_err(|e| CoreError::StoreUnavailable(e.to_string()))?;
                let update = Update::new().set("contradictions", contradictions_bson).set("updatedAt", now.to_rfc3339());
                self.store.update_one(COLLECTION_MEMORIES, Filter::new().eq("id", record.id.as_str()), update, UpdateOptions::default()).await?;
                enhanced += 1;
            }
        }
        Ok(enhanced)
    }

    pub async fn contradictions_for_memory(&self, id: &str) -> Result<MemoryRecord> {
        self.store
            .find_one(COLLECTION_MEMORIES, Filter::new().eq("id", id))
            .await?
            .and_then(|d| bson::from_document(d).ok())
            .ok_or_else(|| CoreError::not_found(format!("memory '{id}' not found")))
    }

    pub async fn entities_list(&self, agent_id: &str, type_filter: Option<&str>, limit: usize, sort_by: Option<&str>) -> Result<(Vec<Entity>, u64)> {
        let docs = self.store.find(COLLECTION_ENTITIES, Filter::new().eq("agentId", agent_id), None, None).await?;
        let mut entities: Vec<Entity> = docs.into_iter().filter_map(|d| bson::from_document(d).ok()).collect();
        if let Some(t) = type_filter {
            entities.retain(|e| e.attributes.get("type").and_then(|v| v.as_str()) == Some(t));
        }
        let total = entities.len() as u64;
        match sort_by {
            Some("memoryCount") => entities.sort_by(|a, b| b.memory_count.cmp(&a.memory_count)),
            Some("lastSeenAt") => entities.sort_by(|a, b| b.last_seen_at.cmp(&a.last_seen_at)),
            _ => entities.sort_by(|a, b| a.display_name.cmp(&b.display_name)),
        }
        entities.truncate(limit);
        Ok((entities, total))
    }

    pub async fn entity_get(&self, agent_id: &str, slug: &str) -> Result<(Entity, Vec<MemoryRecord>)> {
        let doc = self
            .store
            .find_one(COLLECTION_ENTITIES, Filter::new().eq("agentId", agent_id).eq("slug", slug))
            .await?;
        let entity: Entity = doc
            .and_then(|d| bson::from_document(d).ok())
            .ok_or_else(|| CoreError::not_found(format!("entity '{slug}' not found")))?;

        let memory_docs = self.store.find(COLLECTION_MEMORIES, Filter::new().eq("agentId", agent_id), None, None).await?;
        let linked = memory_docs
            .into_iter()
            .filter_map(|d| bson::from_document::<MemoryRecord>(d).ok())
            .filter(|m| m.edges.iter().any(|e| e.edge_type == EdgeType::MentionsEntity && e.target_id == slug))
            .collect();
        Ok((entity, linked))
    }

    pub async fn entities_search(&self, agent_id: &str, q: &str, limit: usize) -> Result<Vec<Entity>> {
        let docs = self.store.find(COLLECTION_ENTITIES, Filter::new().eq("agentId", agent_id), None, None).await?;
        let needle = q.to_lowercase();
        let mut entities: Vec<Entity> = docs
            .into_iter()
            .filter_map(|d| bson::from_document::<Entity>(d).ok())
            .filter(|e| e.display_name.to_lowercase().contains(&needle) || e.slug.contains(&needle) || e.aliases.iter().any(|a| a.to_lowercase().contains(&needle)))
            .collect();
        entities.truncate(limit);
        Ok(entities)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use memoria_core::embedding::MockEmbedder;
    use memoria_core::llm::NullLlmClient;
    use memoria_core::store::memory_store::InMemoryStore;

    fn facade() -> MemoryFacade {
        MemoryFacade::new(Arc::new(InMemoryStore::new()), Arc::new(MockEmbedder::new()), Arc::new(NullLlmClient))
    }

    #[tokio::test]
    async fn remember_then_recall_finds_the_memory() {
        let facade = facade();
        let now = Utc::now();
        let id = facade.remember("agent-A", "User prefers dark mode", RememberOptions::default(), now).await.unwrap();

        let outcome = facade.recall("agent-A", "what UI theme does the user like?", 3, &BTreeSet::new()).await.unwrap();
        assert_eq!(outcome.method, "vector");
        assert!(outcome.results.iter().any(|r| r.id == id));
    }

    #[tokio::test]
    async fn remember_rejects_empty_text() {
        let facade = facade();
        let err = facade.remember("agent-A", "   ", RememberOptions::default(), Utc::now()).await.unwrap_err();
        assert!(matches!(err, CoreError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn forget_unknown_id_is_not_found() {
        let facade = facade();
        let err = facade.forget("does-not-exist").await.unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn forget_removes_referencing_pending_edges() {
        let facade = facade();
        let now = Utc::now();
        let id = facade.remember("agent-A", "A fact", RememberOptions::default(), now).await.unwrap();
        let edge = memoria_core::model::PendingEdge::new(id.clone(), "other-id", EdgeType::CoOccurs, 1.0, 0.9, now);
        let doc = to_insertable_document(&edge).unwrap();
        facade.store.insert_one(COLLECTION_PENDING_EDGES, doc).await.unwrap();

        facade.forget(&id).await.unwrap();
        let remaining = facade.store.count_documents(COLLECTION_PENDING_EDGES, Filter::new()).await.unwrap();
        assert_eq!(remaining, 0);
    }

    #[tokio::test]
    async fn clear_removes_only_the_named_agent() {
        let facade = facade();
        let now = Utc::now();
        facade.remember("agent-A", "fact one", RememberOptions::default(), now).await.unwrap();
        facade.remember("agent-B", "fact two", RememberOptions::default(), now).await.unwrap();

        let deleted = facade.clear("agent-A").await.unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(facade.export("agent-B").await.unwrap().len(), 1);
    }
}
