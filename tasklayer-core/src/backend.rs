//! Storage driver abstraction.
//!
//! Two driver shapes are supported, matching the two families of backing
//! stores:
//!
//! - [`DocumentDriver`]: query-by-example documents, native update operators,
//!   session transactions
//! - [`KeyValueDriver`]: items addressed by partition key, secondary index
//!   queries with continuation keys, expression based conditional updates and
//!   multi-item transactional writes
//!
//! A [`Backend`] wraps one driver of either shape and is what the store facades
//! dispatch on. Drivers only execute already rendered requests; every decision
//! about what a filter or an update means is made in this crate.
//!
//! # Example
//!
//! ```ignore
//! use tasklayer_core::backend::{Backend, BackendBuilder};
//!
//! let backend: Backend = MyDriverBuilder::new("connection-string").build().await?;
//! let store = Store::new(backend);
//! ```

use async_trait::async_trait;
use bson::{Document, doc};
use std::{fmt::Debug, sync::Arc};

use crate::{
    error::{StoreError, StoreResult},
    filter::KeyValueQuery,
    id::{Id, IdEncoding, ObjectIdEncoding, UuidEncoding},
    page::Window,
    schema::{DOCUMENT_ID_FIELD, KEY_VALUE_ID_ATTRIBUTE, Table},
    transaction::{DEFAULT_MAX_TRANSACTION_ITEMS, DocumentWrite, KeyValueWrite, TransactionOutcome},
    update::{Update, KeyValueUpdate},
};

/// A key-value item, as a map of attribute names to values.
pub type Item = Document;

/// Interface of a document database driver.
///
/// Filters and updates arrive fully rendered. Implementations must be
/// thread-safe; a single driver is shared by every store facade.
#[async_trait]
pub trait DocumentDriver: Send + Sync + Debug {
    /// Inserts a document. Fails if a document with the same `_id` exists.
    async fn insert_one(&self, collection: &str, document: Document) -> StoreResult<()>;

    /// Returns the first document matching `filter`.
    async fn find_one(&self, collection: &str, filter: Document) -> StoreResult<Option<Document>>;

    /// Returns the documents matching `filter` inside `window`, ordered by `_id`.
    async fn find(&self, collection: &str, filter: Document, window: Window) -> StoreResult<Vec<Document>>;

    /// Applies `update` to the first document matching `filter`.
    ///
    /// Returns the number of documents matched, which is zero or one.
    async fn update_one(&self, collection: &str, filter: Document, update: Document) -> StoreResult<u64>;

    /// Deletes the first document matching `filter`, returning the number deleted.
    async fn delete_one(&self, collection: &str, filter: Document) -> StoreResult<u64>;

    /// Applies every write inside one transaction.
    ///
    /// A write that matches no document aborts the transaction and is reported
    /// as [`TransactionOutcome::Cancelled`] with its index. Driver errors abort
    /// the transaction and are returned unchanged.
    async fn execute_transaction(&self, writes: Vec<DocumentWrite>) -> StoreResult<TransactionOutcome>;

    /// Releases connections held by the driver.
    async fn shutdown(&self) -> StoreResult<()> {
        Ok(())
    }
}

/// One page of a key-value index query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryPage {
    pub items: Vec<Item>,
    /// Continuation key; `None` when the query is exhausted.
    pub last_evaluated_key: Option<Item>,
}

/// Interface of a key-value store driver.
#[async_trait]
pub trait KeyValueDriver: Send + Sync + Debug {
    /// Writes an item, replacing any item with the same key.
    async fn put_item(&self, table: &str, item: Item) -> StoreResult<()>;

    async fn get_item(&self, table: &str, key: Item) -> StoreResult<Option<Item>>;

    /// Applies a conditional update.
    ///
    /// Returns the updated item, or `None` when the condition expression was
    /// not satisfied.
    async fn update_item(&self, table: &str, key: Item, update: KeyValueUpdate) -> StoreResult<Option<Item>>;

    /// Deletes an item, returning its previous attributes if it existed.
    async fn delete_item(&self, table: &str, key: Item) -> StoreResult<Option<Item>>;

    /// Reads one page of an index query.
    ///
    /// `limit` bounds the number of items evaluated, before the filter
    /// expression is applied.
    async fn query_page(
        &self,
        query: &KeyValueQuery,
        limit: i32,
        exclusive_start_key: Option<Item>,
    ) -> StoreResult<QueryPage>;

    /// Applies every conditional write atomically.
    async fn transact_write(&self, writes: Vec<KeyValueWrite>) -> StoreResult<TransactionOutcome>;

    async fn shutdown(&self) -> StoreResult<()> {
        Ok(())
    }
}

/// The driver behind a [`Backend`].
#[derive(Debug, Clone)]
pub enum Driver {
    Document(Arc<dyn DocumentDriver>),
    KeyValue(Arc<dyn KeyValueDriver>),
}

/// A configured storage backend.
#[derive(Debug, Clone)]
pub struct Backend {
    driver: Driver,
    max_transaction_items: usize,
}

impl Backend {
    pub fn document(driver: impl DocumentDriver + 'static) -> Self {
        Self {
            driver: Driver::Document(Arc::new(driver)),
            max_transaction_items: DEFAULT_MAX_TRANSACTION_ITEMS,
        }
    }

    pub fn key_value(driver: impl KeyValueDriver + 'static) -> Self {
        Self {
            driver: Driver::KeyValue(Arc::new(driver)),
            max_transaction_items: DEFAULT_MAX_TRANSACTION_ITEMS,
        }
    }

    /// Overrides the maximum number of entries a transaction plan may hold.
    pub fn with_max_transaction_items(mut self, max: usize) -> Self {
        self.max_transaction_items = max;
        self
    }

    pub fn driver(&self) -> &Driver {
        &self.driver
    }

    pub fn max_transaction_items(&self) -> usize {
        self.max_transaction_items
    }

    /// Short name of the driver shape, used in log events.
    pub fn shape(&self) -> &'static str {
        match self.driver {
            Driver::Document(_) => "document",
            Driver::KeyValue(_) => "key_value",
        }
    }

    /// Generates an identifier in this backend's key encoding.
    pub fn generate_id(&self) -> Id {
        match self.driver {
            Driver::Document(_) => Id::generate::<ObjectIdEncoding>(),
            Driver::KeyValue(_) => Id::generate::<UuidEncoding>(),
        }
    }

    /// Returns `true` if the entity `id` exists in `table`.
    pub async fn exists(&self, table: Table, id: &Id) -> StoreResult<bool> {
        match &self.driver {
            Driver::Document(driver) => Ok(driver
                .find_one(table.name(), document_id_filter(id)?)
                .await?
                .is_some()),
            Driver::KeyValue(driver) => Ok(driver
                .get_item(table.name(), key_value_key(id)?)
                .await?
                .is_some()),
        }
    }

    /// Explains why a guarded update of `id` was rejected.
    ///
    /// Only called after the rejection, so the read cannot race the write it
    /// classifies into succeeding.
    pub(crate) async fn classify_rejection(&self, table: Table, id: &Id, update: &Update) -> StoreError {
        match self.exists(table, id).await {
            Err(err) => err,
            Ok(false) => StoreError::NotFound(table.name().to_string(), id.to_string()),
            Ok(true) if update.is_append() => StoreError::FieldNotInitialized(update.field().to_string()),
            Ok(true) => StoreError::Backend(format!(
                "conditional update of {} in {} was rejected",
                id,
                table.name()
            )),
        }
    }

    /// Releases the resources held by the driver.
    pub async fn shutdown(&self) -> StoreResult<()> {
        match &self.driver {
            Driver::Document(driver) => driver.shutdown().await,
            Driver::KeyValue(driver) => driver.shutdown().await,
        }
    }
}

/// Factory for [`Backend`] instances.
///
/// Builders carry connection settings and perform any asynchronous setup
/// needed before the driver can serve requests.
#[async_trait]
pub trait BackendBuilder {
    async fn build(self) -> StoreResult<Backend>;
}

/// Filter selecting the document with identifier `id`.
pub fn document_id_filter(id: &Id) -> StoreResult<Document> {
    Ok(doc! { DOCUMENT_ID_FIELD: ObjectIdEncoding::to_key(id)? })
}

/// Primary key of the item with identifier `id`.
pub fn key_value_key(id: &Id) -> StoreResult<Item> {
    Ok(doc! { KEY_VALUE_ID_ATTRIBUTE: UuidEncoding::to_key(id)? })
}
