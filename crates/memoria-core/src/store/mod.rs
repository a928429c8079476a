//! Memory store: an abstract document-collection contract.
//!
//! Modeled on the corpus's own MongoDB integration (`dashflow-mongodb`):
//! every operation works over `bson::Document` values so the same pipeline
//! code runs unchanged against [`memory_store::InMemoryStore`] (the default,
//! used by every test) and a real MongoDB-backed store (`memoria-daemon`'s
//! `mongo_store`, behind the `mongodb-backend` feature).

pub mod memory_store;

use async_trait::async_trait;
use bson::{Bson, Document};

use crate::error::CoreError;

pub const COLLECTION_MEMORIES: &str = "memories";
pub const COLLECTION_ENTITIES: &str = "entities";
pub const COLLECTION_EPISODES: &str = "episodes";
pub const COLLECTION_PENDING_EDGES: &str = "pending_edges";
pub const COLLECTION_REFLECTION_JOBS: &str = "reflection_jobs";

/// Equality / `$gte` / `$lt` / `$in` predicates over top-level or
/// one-level-nested-array fields (e.g. `"stages.stage"`, matching any array
/// element whose `stage` subfield equals the given value).
#[derive(Debug, Clone, Default)]
pub struct Filter(pub Document);

impl Filter {
    pub fn new() -> Self {
        Filter(Document::new())
    }

    pub fn eq(mut self, field: &str, value: impl Into<Bson>) -> Self {
        self.0.insert(field, value.into());
        self
    }

    pub fn gte(mut self, field: &str, value: impl Into<Bson>) -> Self {
        self.0.insert(field, bson::doc! { "$gte": value.into() });
        self
    }

    pub fn lt(mut self, field: &str, value: impl Into<Bson>) -> Self {
        self.0.insert(field, bson::doc! { "$lt": value.into() });
        self
    }

    pub fn in_(mut self, field: &str, values: Vec<Bson>) -> Self {
        self.0.insert(field, bson::doc! { "$in": values });
        self
    }
}

/// Update builder carrying explicit `$set` / `$push` / `$inc` operations.
///
/// A `$set` key ending in `.$` (e.g. `"stages.$"`) denotes a positional
/// update: replace whichever element of the named array field matched the
/// filter's dotted array-membership clause. This is the mechanism the job
/// queue uses for its atomic "update-if-matches-stage, else push" protocol.
#[derive(Debug, Clone, Default)]
pub struct Update {
    pub set: Document,
    pub push: Document,
    pub inc: Document,
}

impl Update {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, field: &str, value: impl Into<Bson>) -> Self {
        self.set.insert(field, value.into());
        self
    }

    pub fn push(mut self, field: &str, value: impl Into<Bson>) -> Self {
        self.push.insert(field, value.into());
        self
    }

    pub fn inc(mut self, field: &str, value: impl Into<Bson>) -> Self {
        self.inc.insert(field, value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.push.is_empty() && self.inc.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, Copy)]
pub struct Sort {
    pub field: &'static str,
    pub direction: SortDirection,
}

/// A stage of an aggregation pipeline. Only the shapes global deduplication
/// needs: a `$match` filter and a `$group` that collects member ids with
/// `$push` and a count with `$sum`.
#[derive(Debug, Clone)]
pub enum AggregateStage {
    Match(Document),
    GroupPushSum {
        /// Fields forming the `_id` of each group (e.g. `["agentId", "text"]`).
        id_fields: Vec<&'static str>,
        /// Name of the output array field collecting `push_source` per member.
        push_field: &'static str,
        push_source: &'static str,
        count_field: &'static str,
    },
}

#[derive(Debug, Clone, Copy, Default)]
pub struct UpdateOptions {
    pub upsert: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DeleteResult {
    pub deleted_count: u64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct UpdateResult {
    pub matched_count: u64,
    pub modified_count: u64,
}

/// Abstract document-collection store.
#[async_trait]
pub trait Store: Send + Sync {
    async fn insert_one(&self, collection: &str, doc: Document) -> Result<String, CoreError>;

    async fn find_one(&self, collection: &str, filter: Filter) -> Result<Option<Document>, CoreError>;

    async fn find(
        &self,
        collection: &str,
        filter: Filter,
        sort: Option<Sort>,
        limit: Option<usize>,
    ) -> Result<Vec<Document>, CoreError>;

    async fn update_one(
        &self,
        collection: &str,
        filter: Filter,
        update: Update,
        options: UpdateOptions,
    ) -> Result<UpdateResult, CoreError>;

    async fn delete_one(&self, collection: &str, filter: Filter) -> Result<DeleteResult, CoreError>;

    async fn delete_many(&self, collection: &str, filter: Filter) -> Result<DeleteResult, CoreError>;

    /// Batched updates, applied in order. Mirrors `bulkWrite(ops)`.
    async fn bulk_write(&self, collection: &str, ops: Vec<(Filter, Update)>) -> Result<UpdateResult, CoreError>;

    async fn aggregate(&self, collection: &str, pipeline: Vec<AggregateStage>) -> Result<Vec<Document>, CoreError>;

    async fn count_documents(&self, collection: &str, filter: Filter) -> Result<u64, CoreError>;
}

/// Serialize a domain record into a storage document, stamping a fresh `id`
/// if it doesn't already carry a non-empty one.
///
/// Every domain struct in [`crate::model`] names its identity field `id`
/// (camelCase-serialized, like every other field); the store keys documents
/// on that same field rather than introducing a second Mongo-style `_id` —
/// the `MongoStore` backend (`memoria-daemon`, feature `mongodb-backend`) is
/// responsible for the `id` ⇄ native `_id` mapping at its own boundary.
pub fn to_insertable_document<T: serde::Serialize>(value: &T) -> Result<Document, CoreError> {
    let mut doc = bson::to_document(value).map_err(|e| CoreError::StoreUnavailable(e.to_string()))?;
    let needs_id = doc.get_str("id").map(|s| s.is_empty()).unwrap_or(true);
    if needs_id {
        doc.insert("id", uuid::Uuid::new_v4().to_string());
    }
    Ok(doc)
}

pub fn document_id(doc: &Document) -> Option<String> {
    doc.get_str("id").ok().map(|s| s.to_string())
}
