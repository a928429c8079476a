//! In-memory [`Store`] implementation.
//!
//! The default store for the daemon and for every test in this crate.
//! Simulates the atomic "update-if-matches, else push" protocol the job queue needs
//! with a single `tokio::sync::Mutex` guarding each named collection — the
//! non-native fallback for stores without a real positional-update
//! primitive.

use std::collections::HashMap;
use std::cmp::Ordering;

use async_trait::async_trait;
use bson::{Bson, Document};
use tokio::sync::Mutex;

use super::{AggregateStage, DeleteResult, Filter, Sort, SortDirection, Store, Update, UpdateOptions, UpdateResult};
use crate::error::CoreError;

#[derive(Default)]
pub struct InMemoryStore {
    collections: Mutex<HashMap<String, HashMap<String, Document>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Best-effort RFC3339 parse, used so date comparisons are correct
/// regardless of whether a timestamp reached the document as a native
/// `bson::DateTime` (constructed ad hoc by queue/store code) or as the
/// RFC3339 string chrono's default `Serialize` impl produces when a whole
/// domain struct is serialized via `bson::to_document` — the two must
/// compare as the same instant, not as unrelated byte strings.
fn as_instant_millis(value: &Bson) -> Option<i64> {
    match value {
        Bson::DateTime(dt) => Some(dt.timestamp_millis()),
        Bson::String(s) => chrono::DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.timestamp_millis()),
        _ => None,
    }
}

fn bson_cmp(a: &Bson, b: &Bson) -> Ordering {
    if let (Some(x), Some(y)) = (as_instant_millis(a), as_instant_millis(b)) {
        return x.cmp(&y);
    }
    match (a, b) {
        (Bson::String(x), Bson::String(y)) => x.cmp(y),
        (Bson::Double(x), Bson::Double(y)) => x.partial_cmp(y).unwrap_or(Ordering::Equal),
        (Bson::Int32(x), Bson::Int32(y)) => x.cmp(y),
        (Bson::Int64(x), Bson::Int64(y)) => x.cmp(y),
        (Bson::Int32(x), Bson::Int64(y)) => (*x as i64).cmp(y),
        (Bson::Int64(x), Bson::Int32(y)) => x.cmp(&(*y as i64)),
        _ => Ordering::Equal,
    }
}

fn matches_op(value: Option<&Bson>, op_doc: &Document) -> bool {
    op_doc.iter().all(|(op, expected)| match op.as_str() {
        "$gte" => value.map(|v| bson_cmp(v, expected) != Ordering::Less).unwrap_or(false),
        "$lt" => value.map(|v| bson_cmp(v, expected) == Ordering::Less).unwrap_or(false),
        "$in" => match expected {
            Bson::Array(arr) => value.map(|v| arr.contains(v)).unwrap_or(false),
            _ => false,
        },
        _ => false,
    })
}

fn is_operator_document(d: &Document) -> bool {
    d.keys().next().map(|k| k.starts_with('$')).unwrap_or(false)
}

/// Whether `doc` satisfies `filter`. A dotted key like `"stages.stage"` is an
/// array-membership check: does any element of the `stages` array have a
/// `stage` subfield equal to the expected value.
fn matches(doc: &Document, filter: &Document) -> bool {
    for (key, expected) in filter {
        if let Some((array_field, sub_field)) = key.split_once('.') {
            let found = match doc.get(array_field) {
                Some(Bson::Array(arr)) => arr.iter().any(|elem| match elem {
                    Bson::Document(d) => d.get(sub_field) == Some(expected),
                    _ => false,
                }),
                _ => false,
            };
            if !found {
                return false;
            }
            continue;
        }
        match expected {
            Bson::Document(op_doc) if is_operator_document(op_doc) => {
                if !matches_op(doc.get(key), op_doc) {
                    return false;
                }
            }
            other => {
                if doc.get(key) != Some(other) {
                    return false;
                }
            }
        }
    }
    true
}

fn apply_update(doc: &mut Document, update: &Update, filter: &Document) {
    for (field, value) in &update.set {
        if let Some(array_field) = field.strip_suffix(".$") {
            apply_positional_set(doc, array_field, value, filter);
        } else {
            doc.insert(field.clone(), value.clone());
        }
    }
    for (field, value) in &update.push {
        match doc.get_mut(field) {
            Some(Bson::Array(arr)) => arr.push(value.clone()),
            _ => {
                doc.insert(field.clone(), Bson::Array(vec![value.clone()]));
            }
        }
    }
    for (field, value) in &update.inc {
        apply_inc(doc, field, value);
    }
}

fn apply_positional_set(doc: &mut Document, array_field: &str, value: &Bson, filter: &Document) {
    let sub_field_match = filter
        .keys()
        .find_map(|k| k.split_once('.').filter(|(af, _)| *af == array_field));
    let Some((_, sub_field)) = sub_field_match else { return };
    let Some(expected) = filter.get(format!("{array_field}.{sub_field}")) else {
        return;
    };
    if let Some(Bson::Array(arr)) = doc.get_mut(array_field) {
        if let Some(idx) = arr.iter().position(|elem| match elem {
            Bson::Document(d) => d.get(sub_field) == Some(expected),
            _ => false,
        }) {
            arr[idx] = value.clone();
        }
    }
}

fn apply_inc(doc: &mut Document, field: &str, value: &Bson) {
    if let Some(delta) = match value {
        Bson::Int32(i) => Some(*i as i64),
        Bson::Int64(i) => Some(*i),
        _ => None,
    } {
        let current = match doc.get(field) {
            Some(Bson::Int32(i)) => *i as i64,
            Some(Bson::Int64(i)) => *i,
            _ => 0,
        };
        doc.insert(field, Bson::Int64(current + delta));
    } else if let Bson::Double(delta) = value {
        let current = match doc.get(field) {
            Some(Bson::Double(d)) => *d,
            Some(Bson::Int32(i)) => *i as f64,
            Some(Bson::Int64(i)) => *i as f64,
            _ => 0.0,
        };
        doc.insert(field, Bson::Double(current + delta));
    }
}

fn doc_key(doc: &Document) -> String {
    doc.get_str("id").map(|s| s.to_string()).unwrap_or_default()
}

#[async_trait]
impl Store for InMemoryStore {
    async fn insert_one(&self, collection: &str, mut doc: Document) -> Result<String, CoreError> {
        let id = match doc.get_str("id") {
            Ok(existing) if !existing.is_empty() => existing.to_string(),
            _ => {
                let fresh = uuid::Uuid::new_v4().to_string();
                doc.insert("id", fresh.clone());
                fresh
            }
        };
        let mut collections = self.collections.lock().await;
        collections.entry(collection.to_string()).or_default().insert(id.clone(), doc);
        Ok(id)
    }

    async fn find_one(&self, collection: &str, filter: Filter) -> Result<Option<Document>, CoreError> {
        let collections = self.collections.lock().await;
        let found = collections
            .get(collection)
            .and_then(|c| c.values().find(|d| matches(d, &filter.0)))
            .cloned();
        Ok(found)
    }

    async fn find(
        &self,
        collection: &str,
        filter: Filter,
        sort: Option<Sort>,
        limit: Option<usize>,
    ) -> Result<Vec<Document>, CoreError> {
        let collections = self.collections.lock().await;
        let mut results: Vec<Document> = collections
            .get(collection)
            .map(|c| c.values().filter(|d| matches(d, &filter.0)).cloned().collect())
            .unwrap_or_default();
        if let Some(sort) = sort {
            results.sort_by(|a, b| {
                let ord = bson_cmp(a.get(sort.field).unwrap_or(&Bson::Null), b.get(sort.field).unwrap_or(&Bson::Null));
                match sort.direction {
                    SortDirection::Ascending => ord,
                    SortDirection::Descending => ord.reverse(),
                }
            });
        }
        if let Some(limit) = limit {
            results.truncate(limit);
        }
        Ok(results)
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: Filter,
        update: Update,
        options: UpdateOptions,
    ) -> Result<UpdateResult, CoreError> {
        let mut collections = self.collections.lock().await;
        let coll = collections.entry(collection.to_string()).or_default();
        let target_key = coll.iter().find(|(_, d)| matches(d, &filter.0)).map(|(k, _)| k.clone());

        match target_key {
            Some(key) => {
                let doc = coll.get_mut(&key).expect("key came from this map");
                apply_update(doc, &update, &filter.0);
                Ok(UpdateResult {
                    matched_count: 1,
                    modified_count: if update.is_empty() { 0 } else { 1 },
                })
            }
            None if options.upsert => {
                let mut doc = filter.0.clone();
                apply_update(&mut doc, &update, &filter.0);
                let id = doc_key(&doc);
                let id = if id.is_empty() {
                    let fresh = uuid::Uuid::new_v4().to_string();
                    doc.insert("id", fresh.clone());
                    fresh
                } else {
                    id
                };
                coll.insert(id, doc);
                Ok(UpdateResult { matched_count: 0, modified_count: 1 })
            }
            None => Ok(UpdateResult::default()),
        }
    }

    async fn delete_one(&self, collection: &str, filter: Filter) -> Result<DeleteResult, CoreError> {
        let mut collections = self.collections.lock().await;
        let Some(coll) = collections.get_mut(collection) else {
            return Ok(DeleteResult::default());
        };
        let key = coll.iter().find(|(_, d)| matches(d, &filter.0)).map(|(k, _)| k.clone());
        if let Some(key) = key {
            coll.remove(&key);
            Ok(DeleteResult { deleted_count: 1 })
        } else {
            Ok(DeleteResult::default())
        }
    }

    async fn delete_many(&self, collection: &str, filter: Filter) -> Result<DeleteResult, CoreError> {
        let mut collections = self.collections.lock().await;
        let Some(coll) = collections.get_mut(collection) else {
            return Ok(DeleteResult::default());
        };
        let keys: Vec<String> = coll.iter().filter(|(_, d)| matches(d, &filter.0)).map(|(k, _)| k.clone()).collect();
        let deleted_count = keys.len() as u64;
        for key in keys {
            coll.remove(&key);
        }
        Ok(DeleteResult { deleted_count })
    }

    async fn bulk_write(&self, collection: &str, ops: Vec<(Filter, Update)>) -> Result<UpdateResult, CoreError> {
        let mut matched = 0;
        let mut modified = 0;
        for (filter, update) in ops {
            let r = self.update_one(collection, filter, update, UpdateOptions::default()).await?;
            matched += r.matched_count;
            modified += r.modified_count;
        }
        Ok(UpdateResult { matched_count: matched, modified_count: modified })
    }

    async fn aggregate(&self, collection: &str, pipeline: Vec<AggregateStage>) -> Result<Vec<Document>, CoreError> {
        let collections = self.collections.lock().await;
        let mut working: Vec<Document> = collections.get(collection).map(|c| c.values().cloned().collect()).unwrap_or_default();

        for stage in pipeline {
            match stage {
                AggregateStage::Match(filter) => {
                    working.retain(|d| matches(d, &filter));
                }
                AggregateStage::GroupPushSum { id_fields, push_field, push_source, count_field } => {
                    let mut groups: HashMap<Vec<String>, (Document, Vec<Bson>, i64)> = HashMap::new();
                    for doc in &working {
                        let key: Vec<String> = id_fields.iter().map(|f| doc.get(f).map(|v| v.to_string()).unwrap_or_default()).collect();
                        let entry = groups.entry(key).or_insert_with(|| {
                            let mut id_doc = Document::new();
                            for f in &id_fields {
                                id_doc.insert(*f, doc.get(f).cloned().unwrap_or(Bson::Null));
                            }
                            (id_doc, Vec::new(), 0)
                        });
                        entry.1.push(doc.get(push_source).cloned().unwrap_or(Bson::Null));
                        entry.2 += 1;
                    }
                    working = groups
                        .into_values()
                        .map(|(id_doc, members, count)| {
                            let mut out = Document::new();
                            out.insert("_id", id_doc);
                            out.insert(push_field, Bson::Array(members));
                            out.insert(count_field, Bson::Int64(count));
                            out
                        })
                        .collect();
                }
            }
        }
        Ok(working)
    }

    async fn count_documents(&self, collection: &str, filter: Filter) -> Result<u64, CoreError> {
        let collections = self.collections.lock().await;
        let count = collections.get(collection).map(|c| c.values().filter(|d| matches(d, &filter.0)).count()).unwrap_or(0);
        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[tokio::test]
    async fn insert_then_find_one_roundtrips() {
        let store = InMemoryStore::new();
        let id = store.insert_one("memories", doc! {"id": "", "text": "hello"}).await.unwrap();
        let found = store.find_one("memories", Filter::new().eq("id", id.clone())).await.unwrap().unwrap();
        assert_eq!(found.get_str("text").unwrap(), "hello");
        assert_eq!(found.get_str("id").unwrap(), id);
    }

    #[tokio::test]
    async fn update_or_push_stage_is_atomic_per_name() {
        let store = InMemoryStore::new();
        let id = store.insert_one("reflection_jobs", doc! {"id": "", "stages": []}).await.unwrap();

        let filter = Filter::new().eq("id", id.clone()).eq("stages.stage", "extract");
        let update = Update::new().set("stages.$", doc! {"stage": "extract", "status": "running"});
        let r = store.update_one("reflection_jobs", filter, update, UpdateOptions::default()).await.unwrap();
        assert_eq!(r.matched_count, 0, "no existing stage entry yet, positional set can't match");

        let push_update = Update::new().push("stages", doc! {"stage": "extract", "status": "running"});
        store
            .update_one("reflection_jobs", Filter::new().eq("id", id.clone()), push_update, UpdateOptions::default())
            .await
            .unwrap();

        let job = store.find_one("reflection_jobs", Filter::new().eq("id", id.clone())).await.unwrap().unwrap();
        assert_eq!(job.get_array("stages").unwrap().len(), 1);

        let filter = Filter::new().eq("id", id.clone()).eq("stages.stage", "extract");
        let update = Update::new().set("stages.$", doc! {"stage": "extract", "status": "complete"});
        let r = store.update_one("reflection_jobs", filter, update, UpdateOptions::default()).await.unwrap();
        assert_eq!(r.matched_count, 1);

        let job = store.find_one("reflection_jobs", Filter::new().eq("id", id)).await.unwrap().unwrap();
        let stages = job.get_array("stages").unwrap();
        assert_eq!(stages.len(), 1, "upsert-or-push must keep exactly one entry per stage name");
        let stage0 = stages[0].as_document().unwrap();
        assert_eq!(stage0.get_str("status").unwrap(), "complete");
    }

    #[tokio::test]
    async fn gte_and_lt_filter_dates() {
        let store = InMemoryStore::new();
        store.insert_one("memories", doc! {"id": "a", "count": 1_i64}).await.unwrap();
        store.insert_one("memories", doc! {"id": "b", "count": 5_i64}).await.unwrap();
        let results = store.find("memories", Filter::new().gte("count", 3_i64), None, None).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].get_str("id").unwrap(), "b");
    }

    #[tokio::test]
    async fn delete_many_removes_matching_only() {
        let store = InMemoryStore::new();
        store.insert_one("memories", doc! {"id": "a", "agentId": "x"}).await.unwrap();
        store.insert_one("memories", doc! {"id": "b", "agentId": "y"}).await.unwrap();
        let r = store.delete_many("memories", Filter::new().eq("agentId", "x")).await.unwrap();
        assert_eq!(r.deleted_count, 1);
        assert_eq!(store.count_documents("memories", Filter::new()).await.unwrap(), 1);
    }
}
