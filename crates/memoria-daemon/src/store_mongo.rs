//! MongoDB-backed [`Store`] implementation, feature-gated behind
//! `mongodb-backend`.
//!
//! Collection and filter/update shapes follow the corpus's own MongoDB
//! integration (`dashflow-memory`'s `MongoDBChatMessageHistory`): a
//! `mongodb::Client` held behind an `Arc`, one `Collection<Document>` per
//! named collection, cursors drained with `futures::TryStreamExt`. Unlike
//! that grounding source, `memoria_core::store::Filter`/`Update` already
//! carry Mongo-shaped operator documents (`$gte`, `$in`, `$set`, `$push`,
//! ...), so this store mostly just forwards them.

use async_trait::async_trait;
use bson::{doc, Bson, Document};
use futures::TryStreamExt;
use mongodb::{Client, Collection};

use memoria_core::error::CoreError;
use memoria_core::store::{AggregateStage, DeleteResult, Filter, Sort, SortDirection, Store, Update, UpdateOptions, UpdateResult};

pub struct MongoStore {
    client: Client,
    db_name: String,
}

impl MongoStore {
    pub async fn connect(uri: &str, db_name: &str) -> Result<Self, CoreError> {
        let client = Client::with_uri_str(uri).await.map_err(|e| CoreError::StoreUnavailable(e.to_string()))?;
        client
            .database(db_name)
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| CoreError::StoreUnavailable(format!("MongoDB ping failed: {e}")))?;
        Ok(Self { client, db_name: db_name.to_string() })
    }

    fn collection(&self, name: &str) -> Collection<Document> {
        self.client.database(&self.db_name).collection(name)
    }
}

fn to_update_document(update: &Update) -> Document {
    let mut doc = Document::new();
    if !update.set.is_empty() {
        doc.insert("$set", update.set.clone());
    }
    if !update.push.is_empty() {
        doc.insert("$push", update.push.clone());
    }
    if !update.inc.is_empty() {
        doc.insert("$inc", update.inc.clone());
    }
    doc
}

fn to_sort_document(sort: &Sort) -> Document {
    let direction = match sort.direction {
        SortDirection::Ascending => 1,
        SortDirection::Descending => -1,
    };
    doc! { sort.field: direction }
}

#[async_trait]
impl Store for MongoStore {
    async fn insert_one(&self, collection: &str, doc: Document) -> Result<String, CoreError> {
        let id = doc.get_str("id").map(|s| s.to_string()).map_err(|_| CoreError::StoreUnavailable("document missing 'id' field".into()))?;
        self.collection(collection).insert_one(doc).await.map_err(|e| CoreError::StoreUnavailable(e.to_string()))?;
        Ok(id)
    }

    async fn find_one(&self, collection: &str, filter: Filter) -> Result<Option<Document>, CoreError> {
        self.collection(collection).find_one(filter.0).await.map_err(|e| CoreError::StoreUnavailable(e.to_string()))
    }

    async fn find(&self, collection: &str, filter: Filter, sort: Option<Sort>, limit: Option<usize>) -> Result<Vec<Document>, CoreError> {
        let mut builder = self.collection(collection).find(filter.0);
        if let Some(sort) = sort {
            builder = builder.sort(to_sort_document(&sort));
        }
        if let Some(limit) = limit {
            builder = builder.limit(limit as i64);
        }
        let cursor = builder.await.map_err(|e| CoreError::StoreUnavailable(e.to_string()))?;
        cursor.try_collect().await.map_err(|e| CoreError::StoreUnavailable(e.to_string()))
    }

    async fn update_one(&self, collection: &str, filter: Filter, update: Update, options: UpdateOptions) -> Result<UpdateResult, CoreError> {
        let update_doc = to_update_document(&update);
        let result = self
            .collection(collection)
            .update_one(filter.0, update_doc)
            .upsert(options.upsert)
            .await
            .map_err(|e| CoreError::StoreUnavailable(e.to_string()))?;
        Ok(UpdateResult { matched_count: result.matched_count, modified_count: result.modified_count })
    }

    async fn delete_one(&self, collection: &str, filter: Filter) -> Result<DeleteResult, CoreError> {
        let result = self.collection(collection).delete_one(filter.0).await.map_err(|e| CoreError::StoreUnavailable(e.to_string()))?;
        Ok(DeleteResult { deleted_count: result.deleted_count })
    }

    async fn delete_many(&self, collection: &str, filter: Filter) -> Result<DeleteResult, CoreError> {
        let result = self.collection(collection).delete_many(filter.0).await.map_err(|e| CoreError::StoreUnavailable(e.to_string()))?;
        Ok(DeleteResult { deleted_count: result.deleted_count })
    }

    /// No native multi-filter bulk API is wired up (the `mongodb` crate's
    /// `bulk_write` operates on a client-wide model, not per-collection
    /// writes keyed by arbitrary filters); each pair is applied as its own
    /// `update_one`, matching the `ops` semantics the callers rely on.
    async fn bulk_write(&self, collection: &str, ops: Vec<(Filter, Update)>) -> Result<UpdateResult, CoreError> {
        let mut total = UpdateResult::default();
        for (filter, update) in ops {
            let r = self.update_one(collection, filter, update, UpdateOptions::default()).await?;
            total.matched_count += r.matched_count;
            total.modified_count += r.modified_count;
        }
        Ok(total)
    }

    async fn aggregate(&self, collection: &str, pipeline: Vec<AggregateStage>) -> Result<Vec<Document>, CoreError> {
        let mut mongo_pipeline = Vec::with_capacity(pipeline.len());
        for stage in pipeline {
            match stage {
                AggregateStage::Match(filter) => mongo_pipeline.push(doc! { "$match": filter }),
                AggregateStage::GroupPushSum { id_fields, push_field, push_source, count_field } => {
                    let mut id_doc = Document::new();
                    for field in &id_fields {
                        id_doc.insert(*field, format!("${field}"));
                    }
                    mongo_pipeline.push(doc! {
                        "$group": {
                            "_id": Bson::Document(id_doc),
                            push_field: { "$push": format!("${push_source}") },
                            count_field: { "$sum": 1_i64 },
                        }
                    });
                }
            }
        }
        let cursor = self.collection(collection).aggregate(mongo_pipeline).await.map_err(|e| CoreError::StoreUnavailable(e.to_string()))?;
        let docs: Vec<Document> = cursor.try_collect().await.map_err(|e| CoreError::StoreUnavailable(e.to_string()))?;
        Ok(docs)
    }

    async fn count_documents(&self, collection: &str, filter: Filter) -> Result<u64, CoreError> {
        self.collection(collection).count_documents(filter.0).await.map_err(|e| CoreError::StoreUnavailable(e.to_string()))
    }
}
