//! In-memory key-value driver.
//!
//! Emulates the parts of the key-value store protocol the core relies on:
//! conditional updates that report a failed condition instead of applying,
//! index queries where `Limit` bounds the number of items evaluated before the
//! filter expression runs, continuation keys, and transactional writes that
//! are cancelled as a whole when one condition fails.
//!
//! Index queries return items ordered by their `ID` attribute.

use async_trait::async_trait;
use bson::{Document, doc};
use mea::rwlock::RwLock;
use std::{
    collections::{HashMap, HashSet},
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};
use tracing::debug;

use tasklayer_core::{
    backend::{Backend, BackendBuilder, Item, KeyValueDriver, QueryPage},
    error::{StoreError, StoreResult},
    filter::KeyValueQuery,
    schema::KEY_VALUE_ID_ATTRIBUTE,
    transaction::{DEFAULT_MAX_TRANSACTION_ITEMS, KeyValueWrite, TransactionOutcome},
    update::KeyValueUpdate,
};

use crate::expression::{Condition, UpdateExpression};

type TableMap = HashMap<String, Vec<Item>>;

/// Thread-safe in-memory key-value store.
///
/// Every call to [`KeyValueDriver::query_page`] is counted, which lets tests
/// observe how many native page fetches a paginated read performs.
#[derive(Default, Clone, Debug)]
pub struct InMemoryKeyValueStore {
    tables: Arc<RwLock<TableMap>>,
    page_fetches: Arc<AtomicUsize>,
}

impl InMemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> InMemoryKeyValueStoreBuilder {
        InMemoryKeyValueStoreBuilder::default()
    }

    /// Number of index query pages served since creation or the last reset.
    pub fn page_fetches(&self) -> usize {
        self.page_fetches.load(Ordering::SeqCst)
    }

    pub fn reset_page_fetches(&self) {
        self.page_fetches.store(0, Ordering::SeqCst);
    }

    /// Number of items currently stored in `table`.
    pub async fn count(&self, table: &str) -> usize {
        self.tables
            .read()
            .await
            .get(table)
            .map_or(0, Vec::len)
    }
}

fn key_id(item: &Document) -> StoreResult<&str> {
    item.get_str(KEY_VALUE_ID_ATTRIBUTE)
        .map_err(|_| StoreError::Backend(format!("item without a string {KEY_VALUE_ID_ATTRIBUTE} attribute")))
}

fn position_of(items: &[Item], key: &Item) -> StoreResult<Option<usize>> {
    let id = key_id(key)?;

    Ok(items
        .iter()
        .position(|item| item.get_str(KEY_VALUE_ID_ATTRIBUTE).ok() == Some(id)))
}

/// Applies a conditional update, returning the updated item or `None` if the
/// condition failed. A missing item is created from its key when the update
/// carries no condition.
///
/// Conditions on a missing item see no attributes at all, so
/// `attribute_exists` on the key fails for it.
fn apply_conditional(items: &mut Vec<Item>, key: &Item, update: &KeyValueUpdate) -> StoreResult<Option<Item>> {
    let position = position_of(items, key)?;

    if let Some(condition) = &update.condition_expression {
        let condition = Condition::parse(condition, &update.attribute_names, &update.attribute_values)?;
        let satisfied = match position {
            Some(index) => condition.evaluate(&items[index]),
            None => condition.evaluate(&Item::new()),
        };
        if !satisfied {
            return Ok(None);
        }
    }

    let expression = UpdateExpression::parse(
        &update.update_expression,
        &update.attribute_names,
        &update.attribute_values,
    )?;

    let index = match position {
        Some(index) => index,
        None => {
            items.push(key.clone());
            items.len() - 1
        }
    };
    expression.apply(&mut items[index])?;

    Ok(Some(items[index].clone()))
}

#[async_trait]
impl KeyValueDriver for InMemoryKeyValueStore {
    async fn put_item(&self, table: &str, item: Item) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        let items = tables.entry(table.to_string()).or_default();

        match position_of(items, &item)? {
            Some(index) => items[index] = item,
            None => items.push(item),
        }

        Ok(())
    }

    async fn get_item(&self, table: &str, key: Item) -> StoreResult<Option<Item>> {
        let tables = self.tables.read().await;
        let Some(items) = tables.get(table) else {
            return Ok(None);
        };

        Ok(position_of(items, &key)?.map(|index| items[index].clone()))
    }

    async fn update_item(&self, table: &str, key: Item, update: KeyValueUpdate) -> StoreResult<Option<Item>> {
        let mut tables = self.tables.write().await;
        let items = tables.entry(table.to_string()).or_default();

        apply_conditional(items, &key, &update)
    }

    async fn delete_item(&self, table: &str, key: Item) -> StoreResult<Option<Item>> {
        let mut tables = self.tables.write().await;
        let Some(items) = tables.get_mut(table) else {
            return Ok(None);
        };

        Ok(position_of(items, &key)?.map(|index| items.remove(index)))
    }

    async fn query_page(
        &self,
        query: &KeyValueQuery,
        limit: i32,
        exclusive_start_key: Option<Item>,
    ) -> StoreResult<QueryPage> {
        let limit = usize::try_from(limit)
            .ok()
            .filter(|limit| *limit > 0)
            .ok_or_else(|| StoreError::Backend(format!("limit must be positive, got {limit}")))?;

        self.page_fetches.fetch_add(1, Ordering::SeqCst);

        let key_condition = Condition::parse(&query.key_condition, &query.attribute_names, &query.attribute_values)?;
        let filter = query
            .filter_expression
            .as_deref()
            .map(|expression| Condition::parse(expression, &query.attribute_names, &query.attribute_values))
            .transpose()?;

        let tables = self.tables.read().await;
        let Some(items) = tables.get(query.table) else {
            return Ok(QueryPage::default());
        };

        let mut candidates = items
            .iter()
            .filter(|item| key_condition.evaluate(item))
            .collect::<Vec<_>>();
        candidates.sort_by(|left, right| {
            left.get_str(KEY_VALUE_ID_ATTRIBUTE)
                .ok()
                .cmp(&right.get_str(KEY_VALUE_ID_ATTRIBUTE).ok())
        });

        // Resumes by position, so the start item itself may be gone.
        let start = exclusive_start_key.as_ref().map(key_id).transpose()?;
        let evaluated = candidates
            .into_iter()
            .filter(|item| {
                start.is_none_or(|start| {
                    item.get_str(KEY_VALUE_ID_ATTRIBUTE)
                        .is_ok_and(|id| id > start)
                })
            })
            .take(limit)
            .collect::<Vec<_>>();

        let last_evaluated_key = match evaluated.last() {
            Some(last) if evaluated.len() == limit => Some(doc! { KEY_VALUE_ID_ATTRIBUTE: key_id(last)? }),
            _ => None,
        };

        let items = evaluated
            .into_iter()
            .filter(|item| filter.as_ref().is_none_or(|filter| filter.evaluate(item)))
            .cloned()
            .collect::<Vec<_>>();

        debug!(
            table = query.table,
            index = query.index_name,
            returned = items.len(),
            more = last_evaluated_key.is_some(),
            "served in-memory query page"
        );

        Ok(QueryPage { items, last_evaluated_key })
    }

    async fn transact_write(&self, writes: Vec<KeyValueWrite>) -> StoreResult<TransactionOutcome> {
        let mut seen = HashSet::new();
        for write in &writes {
            if !seen.insert((write.table, key_id(&write.key)?.to_string())) {
                return Err(StoreError::Backend(
                    "transaction request cannot include multiple operations on one item".to_string(),
                ));
            }
        }

        let mut tables = self.tables.write().await;

        // Writes go to a copy that replaces the live data only on commit.
        let mut staged = tables.clone();
        for (index, write) in writes.iter().enumerate() {
            let items = staged.entry(write.table.to_string()).or_default();

            if apply_conditional(items, &write.key, &write.update)?.is_none() {
                debug!(index, table = write.table, "cancelling in-memory transaction");
                return Ok(TransactionOutcome::Cancelled { index });
            }
        }

        *tables = staged;
        Ok(TransactionOutcome::Committed)
    }
}

/// Builder for an in-memory key-value [`Backend`].
#[derive(Default)]
pub struct InMemoryKeyValueStoreBuilder {
    store: Option<InMemoryKeyValueStore>,
    max_transaction_items: Option<usize>,
}

impl InMemoryKeyValueStoreBuilder {
    /// Builds the backend over an existing store instead of a fresh one.
    pub fn with_store(mut self, store: InMemoryKeyValueStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_max_transaction_items(mut self, max: usize) -> Self {
        self.max_transaction_items = Some(max);
        self
    }
}

#[async_trait]
impl BackendBuilder for InMemoryKeyValueStoreBuilder {
    async fn build(self) -> StoreResult<Backend> {
        Ok(Backend::key_value(self.store.unwrap_or_default())
            .with_max_transaction_items(self.max_transaction_items.unwrap_or(DEFAULT_MAX_TRANSACTION_ITEMS)))
    }
}
