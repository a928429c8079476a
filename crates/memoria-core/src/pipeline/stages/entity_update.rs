//! Stage 7: entity-update. Scans newly classified atoms for mentioned
//! entities, upserts the corresponding hub documents, and proposes a
//! `MENTIONS_ENTITY` pending edge from each atom to each entity it mentions.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::CoreError;
use crate::model::{Entity, EdgeType, PendingEdge, StageName};
use crate::pipeline::{PipelineContext, Stage};
use crate::store::{to_insertable_document, Filter, Update, UpdateOptions, COLLECTION_ENTITIES, COLLECTION_PENDING_EDGES};

pub struct EntityUpdateStage;

const MENTION_PROBABILITY: f64 = 0.7;
const MENTION_WEIGHT: f64 = 0.5;

/// Common capitalized sentence-openers that aren't proper nouns on their own.
const STOPWORDS: &[&str] = &["I", "The", "A", "An", "It", "We", "They", "This", "That", "My", "Our"];

/// Pulls out runs of capitalized words as candidate entity mentions. The
/// extractor's precision is deliberately loose here: false positives become
/// low-traffic entities, which is cheaper to tolerate than missed mentions.
fn mentioned_entities(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut run: Vec<&str> = Vec::new();
    for (i, word) in text.split_whitespace().enumerate() {
        let clean = word.trim_matches(|c: char| !c.is_alphanumeric());
        let is_candidate = clean.chars().next().map(|c| c.is_uppercase()).unwrap_or(false)
            && clean.len() > 1
            && !(i == 0 && STOPWORDS.contains(&clean));
        if is_candidate {
            run.push(clean);
        } else if !run.is_empty() {
            out.push(run.join(" "));
            run.clear();
        }
    }
    if !run.is_empty() {
        out.push(run.join(" "));
    }
    out
}

/// Returns `(slug, was_created)`. The slug, not the entity's own id, is what
/// a `MENTIONS_ENTITY` edge's `target_id` carries — `facade::entity_get`
/// resolves `linkedMemories` by matching edges against the entity's slug.
async fn upsert_entity(ctx: &PipelineContext<'_>, display_name: &str, now: DateTime<Utc>) -> Result<(String, bool), CoreError> {
    let slug = Entity::slugify(display_name);
    let filter = Filter::new().eq("agentId", ctx.agent_id.as_str()).eq("slug", slug.as_str());
    if ctx.store.find_one(COLLECTION_ENTITIES, filter.clone()).await?.is_some() {
        let update = Update::new().set("lastSeenAt", now.to_rfc3339()).inc("memoryCount", 1_i64);
        ctx.store.update_one(COLLECTION_ENTITIES, filter, update, UpdateOptions::default()).await?;
        Ok((slug, false))
    } else {
        let mut entity = Entity::new(ctx.agent_id.as_str(), slug.clone(), display_name, now);
        entity.memory_count = 1;
        let doc = to_insertable_document(&entity)?;
        ctx.store.insert_one(COLLECTION_ENTITIES, doc).await?;
        Ok((slug, true))
    }
}

#[async_trait]
impl Stage for EntityUpdateStage {
    fn name(&self) -> StageName {
        StageName::EntityUpdate
    }

    async fn execute(&self, ctx: &mut PipelineContext<'_>) -> Result<(), CoreError> {
        let mut created = 0i64;
        let mut updated = 0i64;
        let mut edges_proposed = 0i64;

        for atom in &ctx.classified_atoms {
            let Some(memory_id) = atom.persisted_id.clone() else {
                continue;
            };
            for name in mentioned_entities(&atom.text) {
                let (slug, was_created) = upsert_entity(ctx, &name, ctx.now).await?;
                if was_created {
                    created += 1;
                } else {
                    updated += 1;
                }
                let edge = PendingEdge::new(memory_id.clone(), slug, EdgeType::MentionsEntity, MENTION_WEIGHT, MENTION_PROBABILITY, ctx.now);
                let doc = to_insertable_document(&edge)?;
                ctx.store.insert_one(COLLECTION_PENDING_EDGES, doc).await?;
                edges_proposed += 1;
            }
        }

        ctx.record_stat("entity-update", "entities_created", created);
        ctx.record_stat("entity-update", "entities_updated", updated);
        ctx.record_stat("entity-update", "edges_proposed", edges_proposed);
        Ok(())
    }
}
