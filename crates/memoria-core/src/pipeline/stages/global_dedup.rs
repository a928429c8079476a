//! Stage 10: global-deduplicate. Unlike stage 2 (which only compares new
//! atoms against existing memories by embedding similarity), this stage
//! catches exact-text duplicates that accumulated across separate reflection
//! runs: groups an agent's memories by identical text, keeps the oldest
//! member of each group, merges the rest's tags into it, and deletes them.

use async_trait::async_trait;
use bson::doc;
use chrono::{DateTime, Utc};

use crate::error::CoreError;
use crate::model::{MemoryRecord, StageName};
use crate::pipeline::{PipelineContext, Stage};
use crate::store::{AggregateStage, Filter, Store, Update, UpdateOptions, COLLECTION_MEMORIES};

/// One group of exact-text duplicates found by a dedup pass.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DedupGroupDetail {
    pub text: String,
    pub kept_id: String,
    pub removed_ids: Vec<String>,
}

/// Outcome of a global-dedup pass, shared by the pipeline stage and the
/// `/deduplicate` HTTP endpoint (which also supports a `dryRun` preview).
#[derive(Debug, Clone, Default, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalDedupSummary {
    pub groups_merged: u64,
    pub records_deleted: u64,
    pub details: Vec<DedupGroupDetail>,
}

/// Groups an agent's (or, if `agent_id` is `None`, every agent's) memories by
/// identical text, keeps the oldest member of each group, and — unless
/// `dry_run` — merges the rest's tags into it and deletes them.
pub async fn run_global_dedup(store: &dyn Store, agent_id: Option<&str>, now: DateTime<Utc>, dry_run: bool) -> Result<GlobalDedupSummary, CoreError> {
    let mut pipeline = Vec::new();
    if let Some(id) = agent_id {
        pipeline.push(AggregateStage::Match(doc! { "agentId": id }));
    }
    pipeline.push(AggregateStage::GroupPushSum {
        id_fields: vec!["agentId", "text"],
        push_field: "ids",
        push_source: "id",
        count_field: "count",
    });
    pipeline.push(AggregateStage::Match(doc! { "count": { "$gte": 2_i64 } }));
    let groups = store.aggregate(COLLECTION_MEMORIES, pipeline).await?;

    let mut summary = GlobalDedupSummary::default();

    for group in groups {
        let ids: Vec<String> = group
            .get_array("ids")
            .map(|arr| arr.iter().filter_map(|b| b.as_str().map(|s| s.to_string())).collect())
            .unwrap_or_default();
        if ids.len() < 2 {
            continue;
        }

        let mut records = Vec::new();
        for id in &ids {
            if let Some(doc) = store.find_one(COLLECTION_MEMORIES, Filter::new().eq("id", id.as_str())).await? {
                if let Ok(record) = bson::from_document::<MemoryRecord>(doc) {
                    records.push(record);
                }
            }
        }
        if records.len() < 2 {
            continue;
        }
        records.sort_by_key(|r| r.created_at);

        let mut iter = records.into_iter();
        let mut keep = iter.next().expect("checked len >= 2 above");
        let mut duplicate_ids = Vec::new();
        for duplicate in iter {
            keep.tags.extend(duplicate.tags);
            duplicate_ids.push(duplicate.id);
        }

        if !dry_run {
            let tags_bson = bson::to_bson(&keep.tags).map_err(|e| CoreError::StoreUnavailable(e.to_string()))?;
            let update = Update::new().set("tags", tags_bson).set("updatedAt", now.to_rfc3339());
            store.update_one(COLLECTION_MEMORIES, Filter::new().eq("id", keep.id.as_str()), update, UpdateOptions::default()).await?;

            for dup_id in &duplicate_ids {
                store.delete_one(COLLECTION_MEMORIES, Filter::new().eq("id", dup_id.as_str())).await?;
            }
        }

        summary.groups_merged += 1;
        summary.records_deleted += duplicate_ids.len() as u64;
        summary.details.push(DedupGroupDetail { text: keep.text.clone(), kept_id: keep.id.clone(), removed_ids: duplicate_ids });
    }

    Ok(summary)
}

pub struct GlobalDeduplicateStage;

#[async_trait]
impl Stage for GlobalDeduplicateStage {
    fn name(&self) -> StageName {
        StageName::GlobalDeduplicate
    }

    async fn execute(&self, ctx: &mut PipelineContext<'_>) -> Result<(), CoreError> {
        let summary = run_global_dedup(ctx.store, Some(&ctx.agent_id), ctx.now, false).await?;
        ctx.record_stat("global-deduplicate", "groups_merged", summary.groups_merged as i64);
        ctx.record_stat("global-deduplicate", "records_deleted", summary.records_deleted as i64);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::MockEmbedder;
    use crate::llm::NullLlmClient;
    use crate::model::{Layer, RememberOptions};
    use crate::store::memory_store::InMemoryStore;
    use crate::store::to_insertable_document;
    use std::sync::Arc;

    async fn seed(store: &InMemoryStore, text: &str, tag: &str, created_at: chrono::DateTime<chrono::Utc>) -> String {
        let opts = RememberOptions { layer: Some(Layer::Episodic), tags: [tag.to_string()].into_iter().collect(), ..Default::default() };
        let record = MemoryRecord::new("agent-A", text, vec![0.0; 2], 2, opts, created_at).unwrap();
        let doc = to_insertable_document(&record).unwrap();
        store.insert_one(COLLECTION_MEMORIES, doc).await.unwrap()
    }

    #[tokio::test]
    async fn exact_duplicate_text_merges_into_oldest() {
        let store = InMemoryStore::new();
        let now = chrono::Utc::now();
        let oldest_id = seed(&store, "User prefers dark mode", "ui", now - chrono::Duration::days(2)).await;
        seed(&store, "User prefers dark mode", "accessibility", now - chrono::Duration::days(1)).await;
        seed(&store, "Unrelated fact", "other", now).await;

        let mut ctx = PipelineContext::new("agent-A", None, "job-1", "", now, &store, Arc::new(MockEmbedder::new()), Arc::new(NullLlmClient));
        GlobalDeduplicateStage.execute(&mut ctx).await.unwrap();

        assert_eq!(ctx.stats.get("global-deduplicate_groups_merged"), Some(&1));
        assert_eq!(ctx.stats.get("global-deduplicate_records_deleted"), Some(&1));

        let remaining = store.count_documents(COLLECTION_MEMORIES, Filter::new()).await.unwrap();
        assert_eq!(remaining, 2, "one duplicate removed, the unrelated fact and the kept record survive");

        let kept = store.find_one(COLLECTION_MEMORIES, Filter::new().eq("id", oldest_id)).await.unwrap().unwrap();
        let tags = kept.get_array("tags").unwrap();
        assert_eq!(tags.len(), 2, "tags from the merged duplicate must be folded into the kept record");
    }

    #[tokio::test]
    async fn no_duplicates_is_a_no_op() {
        let store = InMemoryStore::new();
        let now = chrono::Utc::now();
        seed(&store, "Only one of these", "x", now).await;

        let mut ctx = PipelineContext::new("agent-A", None, "job-1", "", now, &store, Arc::new(MockEmbedder::new()), Arc::new(NullLlmClient));
        GlobalDeduplicateStage.execute(&mut ctx).await.unwrap();
        assert_eq!(ctx.stats.get("global-deduplicate_groups_merged"), None);
    }
}
