//! Handlers for every route in the memory API, one function per endpoint.
//! Each borrows the shared [`AppState`] and talks to [`MemoryFacade`] only —
//! no store or provider type appears here.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

use memoria_core::error::CoreError;
use memoria_core::model::{Layer, MemoryType, RememberOptions};

use super::error::ApiError;
use super::AppState;

fn split_tags(raw: Option<String>) -> BTreeSet<String> {
    raw.map(|s| s.split(',').map(|t| t.trim().to_string()).filter(|t| !t.is_empty()).collect()).unwrap_or_default()
}

fn default_limit() -> usize {
    10
}

pub async fn health() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

pub async fn status(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    let total_memories = state.facade.store().count_documents(memoria_core::store::COLLECTION_MEMORIES, memoria_core::store::Filter::new()).await?;
    Ok(Json(json!({
        "status": "ok",
        "uptimeSeconds": state.started_at.elapsed().as_secs(),
        "store": state.store_backend,
        "embedder": state.embedder_mode,
        "totalMemories": total_memories,
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RememberBody {
    agent_id: String,
    text: String,
    #[serde(default)]
    tags: BTreeSet<String>,
    #[serde(default)]
    metadata: BTreeMap<String, Value>,
    #[serde(default)]
    ttl: Option<i64>,
    #[serde(default)]
    memory_type: Option<String>,
    #[serde(default)]
    layer: Option<String>,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default)]
    source_session_id: Option<String>,
    #[serde(default)]
    source_episode_id: Option<String>,
}

pub async fn remember(State(state): State<Arc<AppState>>, Json(body): Json<RememberBody>) -> Result<(StatusCode, Json<Value>), ApiError> {
    let memory_type = match body.memory_type.as_deref() {
        Some(s) => Some(MemoryType::parse(s).ok_or_else(|| CoreError::invalid(format!("unknown memoryType '{s}'")))?),
        None => None,
    };
    let layer = match body.layer.as_deref() {
        Some(s) => Some(Layer::parse(s).ok_or_else(|| CoreError::invalid(format!("unknown layer '{s}'")))?),
        None => None,
    };
    let opts = RememberOptions {
        tags: body.tags,
        metadata: body.metadata,
        ttl_seconds: body.ttl,
        memory_type,
        layer,
        confidence: body.confidence,
        source_session_id: body.source_session_id,
        source_episode_id: body.source_episode_id,
        project_id: None,
    };
    let id = state.facade.remember(&body.agent_id, &body.text, opts, Utc::now()).await?;
    Ok((StatusCode::CREATED, Json(json!({"success": true, "id": id}))))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecallQuery {
    agent_id: String,
    query: String,
    #[serde(default)]
    limit: Option<usize>,
    #[serde(default)]
    tags: Option<String>,
}

pub async fn recall(State(state): State<Arc<AppState>>, Query(q): Query<RecallQuery>) -> Result<Json<Value>, ApiError> {
    let limit = q.limit.unwrap_or_else(default_limit);
    let tags = split_tags(q.tags);
    let outcome = state.facade.recall(&q.agent_id, &q.query, limit, &tags).await?;
    Ok(Json(json!({
        "success": true,
        "count": outcome.results.len(),
        "method": outcome.method,
        "results": outcome.results,
    })))
}

pub async fn forget(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Result<Json<Value>, ApiError> {
    state.facade.forget(&id).await?;
    Ok(Json(json!({"success": true})))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentIdQuery {
    agent_id: String,
}

pub async fn export(State(state): State<Arc<AppState>>, Query(q): Query<AgentIdQuery>) -> Result<Json<Value>, ApiError> {
    let memories = state.facade.export(&q.agent_id).await?;
    Ok(Json(json!({"count": memories.len(), "memories": memories})))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurgeBody {
    agent_id: String,
    older_than: chrono::DateTime<Utc>,
}

pub async fn purge(State(state): State<Arc<AppState>>, Json(body): Json<PurgeBody>) -> Result<Json<Value>, ApiError> {
    let deleted = state.facade.purge(&body.agent_id, body.older_than).await?;
    Ok(Json(json!({"deleted": deleted})))
}

pub async fn clear(State(state): State<Arc<AppState>>, Query(q): Query<AgentIdQuery>) -> Result<Json<Value>, ApiError> {
    let deleted = state.facade.clear(&q.agent_id).await?;
    Ok(Json(json!({"deleted": deleted})))
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct DecayBody {
    #[serde(default)]
    agent_id: Option<String>,
}

pub async fn decay(State(state): State<Arc<AppState>>, body: Option<Json<DecayBody>>) -> Result<Json<Value>, ApiError> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let started = std::time::Instant::now();
    let summary = state.facade.trigger_decay(body.agent_id.as_deref(), Utc::now()).await?;
    Ok(Json(json!({
        "success": true,
        "stats": {
            "totalMemories": summary.total_memories,
            "decayed": summary.decayed,
            "archivalCandidates": summary.archival_candidates,
            "expirationCandidates": summary.expiration_candidates,
            "duration": started.elapsed().as_millis(),
        }
    })))
}

pub async fn decay_expiration_candidates(State(state): State<Arc<AppState>>, Query(q): Query<AgentIdQuery>) -> Result<Json<Value>, ApiError> {
    let candidates = state.facade.decay_expiration_candidates(&q.agent_id).await?;
    Ok(Json(json!({"candidates": candidates})))
}

pub async fn promote_archival(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Result<Json<Value>, ApiError> {
    state.facade.promote_archival(&id, Utc::now()).await?;
    Ok(Json(json!({"success": true})))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReflectBody {
    agent_id: String,
    #[serde(default)]
    session_id: Option<String>,
    transcript: String,
    #[serde(default)]
    metadata: BTreeMap<String, Value>,
}

pub async fn reflect(State(state): State<Arc<AppState>>, Json(body): Json<ReflectBody>) -> Result<(StatusCode, Json<Value>), ApiError> {
    let job_id = state.facade.trigger_reflection(&body.agent_id, body.session_id, &body.transcript, body.metadata, Utc::now()).await?;
    Ok((StatusCode::OK, Json(json!({"jobId": job_id}))))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReflectJobsQuery {
    agent_id: String,
    #[serde(default)]
    limit: Option<usize>,
}

pub async fn reflect_jobs(State(state): State<Arc<AppState>>, Query(q): Query<ReflectJobsQuery>) -> Result<Json<Value>, ApiError> {
    let queue = memoria_core::queue::JobQueue::new(state.facade.store().as_ref());
    let jobs = queue.list_jobs(&q.agent_id, q.limit.unwrap_or(20)).await?;
    Ok(Json(json!({"jobs": jobs})))
}

pub async fn reflect_job(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Result<Json<Value>, ApiError> {
    let queue = memoria_core::queue::JobQueue::new(state.facade.store().as_ref());
    let job = queue.get(&id).await?.ok_or_else(|| memoria_core::error::CoreError::not_found(format!("reflection job '{id}' not found")))?;
    Ok(Json(serde_json::to_value(job).unwrap_or(Value::Null)))
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct DeduplicateBody {
    #[serde(default)]
    agent_id: Option<String>,
    #[serde(default)]
    dry_run: bool,
}

pub async fn deduplicate(State(state): State<Arc<AppState>>, body: Option<Json<DeduplicateBody>>) -> Result<Json<Value>, ApiError> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let summary = state.facade.deduplicate(body.agent_id.as_deref(), body.dry_run, Utc::now()).await?;
    Ok(Json(json!({
        "duplicatesFound": summary.groups_merged,
        "memoriesRemoved": summary.records_deleted,
        "dryRun": body.dry_run,
        "details": summary.details,
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnhanceContradictionsBody {
    agent_id: String,
    #[serde(default)]
    limit: Option<usize>,
}

pub async fn contradictions_enhance(State(state): State<Arc<AppState>>, Json(body): Json<EnhanceContradictionsBody>) -> Result<Json<Value>, ApiError> {
    let enhanced = state.facade.enhance_contradictions(&body.agent_id, body.limit.unwrap_or(20), Utc::now()).await?;
    Ok(Json(json!({"enhanced": enhanced})))
}

pub async fn contradictions_for_memory(State(state): State<Arc<AppState>>, Path(memory_id): Path<String>) -> Result<Json<Value>, ApiError> {
    let memory = state.facade.contradictions_for_memory(&memory_id).await?;
    Ok(Json(serde_json::to_value(memory).unwrap_or(Value::Null)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitiesQuery {
    agent_id: String,
    #[serde(default, rename = "type")]
    type_: Option<String>,
    #[serde(default)]
    limit: Option<usize>,
    #[serde(default)]
    sort_by: Option<String>,
}

pub async fn entities_list(State(state): State<Arc<AppState>>, Query(q): Query<EntitiesQuery>) -> Result<Json<Value>, ApiError> {
    let (entities, total) = state.facade.entities_list(&q.agent_id, q.type_.as_deref(), q.limit.unwrap_or(50), q.sort_by.as_deref()).await?;
    Ok(Json(json!({"entities": entities, "total": total})))
}

pub async fn entity_get(State(state): State<Arc<AppState>>, Path(slug): Path<String>, Query(q): Query<AgentIdQuery>) -> Result<Json<Value>, ApiError> {
    let (entity, linked) = state.facade.entity_get(&q.agent_id, &slug).await?;
    let mut value = serde_json::to_value(&entity).unwrap_or(Value::Null);
    if let Value::Object(ref mut map) = value {
        map.insert("linkedMemories".to_string(), serde_json::to_value(&linked).unwrap_or(Value::Array(vec![])));
    }
    Ok(Json(value))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitiesSearchQuery {
    agent_id: String,
    q: String,
    #[serde(default)]
    limit: Option<usize>,
}

pub async fn entities_search(State(state): State<Arc<AppState>>, Query(q): Query<EntitiesSearchQuery>) -> Result<Json<Value>, ApiError> {
    let entities = state.facade.entities_search(&q.agent_id, &q.q, q.limit.unwrap_or(20)).await?;
    Ok(Json(json!({"entities": entities})))
}
