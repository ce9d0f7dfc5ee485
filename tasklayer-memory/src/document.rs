//! In-memory document driver.

use async_trait::async_trait;
use bson::Document;
use mea::rwlock::RwLock;
use std::{collections::HashMap, sync::Arc};
use tracing::debug;

use tasklayer_core::{
    backend::{Backend, BackendBuilder, DocumentDriver},
    error::{StoreError, StoreResult},
    page::Window,
    schema::DOCUMENT_ID_FIELD,
    transaction::{DocumentWrite, TransactionOutcome},
};

use crate::evaluator::{DocumentEvaluator, apply_update, compare_by};

type CollectionMap = HashMap<String, Vec<Document>>;

/// Thread-safe in-memory document store.
///
/// Collections are created on first insert. Queries scan the whole collection.
/// Clones share the same underlying data, so a test can keep a handle to the
/// driver after moving a clone into a [`Backend`].
///
/// # Example
///
/// ```ignore
/// use tasklayer_memory::InMemoryDocumentStore;
///
/// let driver = InMemoryDocumentStore::new();
/// let store = Store::new(Backend::document(driver.clone()));
/// ```
#[derive(Default, Clone, Debug)]
pub struct InMemoryDocumentStore {
    collections: Arc<RwLock<CollectionMap>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> InMemoryDocumentStoreBuilder {
        InMemoryDocumentStoreBuilder
    }

    /// Number of documents currently stored in `collection`.
    pub async fn count(&self, collection: &str) -> usize {
        self.collections
            .read()
            .await
            .get(collection)
            .map_or(0, Vec::len)
    }
}

/// Applies `update` to the first document of `documents` matching `filter`.
fn update_first(documents: &mut [Document], filter: &Document, update: &Document) -> StoreResult<u64> {
    for document in documents.iter_mut() {
        if DocumentEvaluator::new(document).matches(filter)? {
            apply_update(document, update)?;
            return Ok(1);
        }
    }

    Ok(0)
}

#[async_trait]
impl DocumentDriver for InMemoryDocumentStore {
    async fn insert_one(&self, collection: &str, document: Document) -> StoreResult<()> {
        let id = document
            .get_object_id(DOCUMENT_ID_FIELD)
            .map_err(|_| StoreError::Backend(format!("document without an object id in {DOCUMENT_ID_FIELD}")))?;

        let mut collections = self.collections.write().await;
        let documents = collections.entry(collection.to_string()).or_default();

        if documents
            .iter()
            .any(|existing| existing.get_object_id(DOCUMENT_ID_FIELD).ok() == Some(id))
        {
            return Err(StoreError::Backend(format!("duplicate key {id} in {collection}")));
        }

        documents.push(document);
        Ok(())
    }

    async fn find_one(&self, collection: &str, filter: Document) -> StoreResult<Option<Document>> {
        let collections = self.collections.read().await;
        let Some(documents) = collections.get(collection) else {
            return Ok(None);
        };

        for document in documents {
            if DocumentEvaluator::new(document).matches(&filter)? {
                return Ok(Some(document.clone()));
            }
        }

        Ok(None)
    }

    async fn find(&self, collection: &str, filter: Document, window: Window) -> StoreResult<Vec<Document>> {
        let collections = self.collections.read().await;
        let Some(documents) = collections.get(collection) else {
            return Ok(Vec::new());
        };

        let mut matched = Vec::new();
        for document in documents {
            if DocumentEvaluator::new(document).matches(&filter)? {
                matched.push(document);
            }
        }
        matched.sort_by(|left, right| compare_by(left, right, DOCUMENT_ID_FIELD));

        Ok(matched
            .into_iter()
            .skip(window.skip() as usize)
            .take(window.limit as usize)
            .cloned()
            .collect())
    }

    async fn update_one(&self, collection: &str, filter: Document, update: Document) -> StoreResult<u64> {
        let mut collections = self.collections.write().await;

        match collections.get_mut(collection) {
            Some(documents) => update_first(documents, &filter, &update),
            None => Ok(0),
        }
    }

    async fn delete_one(&self, collection: &str, filter: Document) -> StoreResult<u64> {
        let mut collections = self.collections.write().await;
        let Some(documents) = collections.get_mut(collection) else {
            return Ok(0);
        };

        let mut position = None;
        for (index, document) in documents.iter().enumerate() {
            if DocumentEvaluator::new(document).matches(&filter)? {
                position = Some(index);
                break;
            }
        }

        Ok(position.map_or(0, |index| {
            documents.remove(index);
            1
        }))
    }

    async fn execute_transaction(&self, writes: Vec<DocumentWrite>) -> StoreResult<TransactionOutcome> {
        let mut collections = self.collections.write().await;

        // Writes go to a copy that replaces the live data only on commit.
        let mut staged = collections.clone();
        for (index, write) in writes.iter().enumerate() {
            let matched = match staged.get_mut(write.collection) {
                Some(documents) => update_first(documents, &write.filter, &write.update)?,
                None => 0,
            };

            if matched == 0 {
                debug!(index, collection = write.collection, "aborting in-memory transaction");
                return Ok(TransactionOutcome::Cancelled { index });
            }
        }

        *collections = staged;
        Ok(TransactionOutcome::Committed)
    }
}

/// Builder for an in-memory document [`Backend`].
#[derive(Default)]
pub struct InMemoryDocumentStoreBuilder;

#[async_trait]
impl BackendBuilder for InMemoryDocumentStoreBuilder {
    async fn build(self) -> StoreResult<Backend> {
        Ok(Backend::document(InMemoryDocumentStore::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::{doc, oid::ObjectId};

    #[tokio::test]
    async fn test_duplicate_id_is_rejected() {
        let store = InMemoryDocumentStore::new();
        let id = ObjectId::new();

        store.insert_one("tasks", doc! { "_id": id }).await.unwrap();

        assert!(matches!(
            store.insert_one("tasks", doc! { "_id": id }).await,
            Err(StoreError::Backend(_))
        ));
    }

    #[tokio::test]
    async fn test_find_orders_by_id_and_windows() {
        let store = InMemoryDocumentStore::new();
        let mut ids = (0..5).map(|_| ObjectId::new()).collect::<Vec<_>>();
        for id in ids.iter().rev() {
            store.insert_one("tasks", doc! { "_id": *id, "completed": true }).await.unwrap();
        }
        ids.sort();

        let page = store
            .find("tasks", doc! { "completed": true }, Window { page: 2, limit: 2 })
            .await
            .unwrap();

        let found = page
            .iter()
            .map(|document| document.get_object_id("_id").unwrap())
            .collect::<Vec<_>>();
        assert_eq!(found, ids[2..4].to_vec());
    }

    #[tokio::test]
    async fn test_transaction_is_all_or_nothing() {
        let store = InMemoryDocumentStore::new();
        let id = ObjectId::new();
        store.insert_one("tasks", doc! { "_id": id, "completed": false }).await.unwrap();

        let writes = vec![
            DocumentWrite {
                collection: "tasks",
                filter: doc! { "_id": id },
                update: doc! { "$set": { "completed": true } },
            },
            DocumentWrite {
                collection: "tasks",
                filter: doc! { "_id": ObjectId::new() },
                update: doc! { "$set": { "completed": true } },
            },
        ];

        assert_eq!(
            store.execute_transaction(writes).await.unwrap(),
            TransactionOutcome::Cancelled { index: 1 }
        );
        let task = store.find_one("tasks", doc! { "_id": id }).await.unwrap().unwrap();
        assert!(!task.get_bool("completed").unwrap());
    }
}
