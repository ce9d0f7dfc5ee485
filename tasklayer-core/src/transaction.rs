//! All-or-nothing updates spanning several entities.
//!
//! A [`TransactionPlan`] is an ordered list of `(table, id, update)` entries.
//! Executing it either applies every update or none of them. On the document
//! store the plan runs inside a session transaction; on the key-value store it
//! becomes a single transactional write where every entry carries its own
//! existence guard.
//!
//! # Example
//!
//! ```ignore
//! let plan = TransactionPlan::new()
//!     .with_update(Table::Projects, project.id().clone(), Update::append(fields::TASKS, task.id()))
//!     .with_update(Table::Tasks, task.id().clone(), Update::set(fields::PROJECT_ID, project.id()));
//!
//! plan.execute(&backend).await?;
//! ```

use bson::Document;
use tracing::{debug, warn};

use crate::{
    backend::{Backend, Driver, Item, document_id_filter, key_value_key},
    error::{StoreError, StoreResult},
    id::Id,
    schema::Table,
    update::{KeyValueUpdate, Update},
};

/// Default upper bound on the entries of one plan.
pub const DEFAULT_MAX_TRANSACTION_ITEMS: usize = 100;

/// One update inside a [`TransactionPlan`].
#[derive(Debug, Clone, PartialEq)]
pub struct PlanEntry {
    pub table: Table,
    pub id: Id,
    pub update: Update,
}

/// An ordered set of updates applied atomically.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransactionPlan {
    entries: Vec<PlanEntry>,
}

impl TransactionPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_update(mut self, table: Table, id: Id, update: Update) -> Self {
        self.push(table, id, update);
        self
    }

    pub fn push(&mut self, table: Table, id: Id, update: Update) {
        self.entries.push(PlanEntry { table, id, update });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[PlanEntry] {
        &self.entries
    }

    /// Checks that the plan holds between 1 and `max` entries.
    pub fn validate(&self, max: usize) -> StoreResult<()> {
        if self.entries.is_empty() || self.entries.len() > max {
            return Err(StoreError::InvalidBatchSize(self.entries.len(), max));
        }

        Ok(())
    }

    /// Renders the plan as document store writes.
    pub fn render_document(&self) -> StoreResult<Vec<DocumentWrite>> {
        self.entries
            .iter()
            .map(|entry| {
                let rendered = entry.update.render_document()?;
                let mut filter = document_id_filter(&entry.id)?;
                filter.extend(rendered.guard);

                Ok(DocumentWrite {
                    collection: entry.table.name(),
                    filter,
                    update: rendered.update,
                })
            })
            .collect()
    }

    /// Renders the plan as key-value transactional writes.
    pub fn render_key_value(&self) -> StoreResult<Vec<KeyValueWrite>> {
        self.entries
            .iter()
            .map(|entry| {
                Ok(KeyValueWrite {
                    table: entry.table.name(),
                    key: key_value_key(&entry.id)?,
                    update: entry.update.render_key_value()?,
                })
            })
            .collect()
    }

    /// Executes the plan against `backend`.
    ///
    /// # Errors
    ///
    /// - [`StoreError::InvalidBatchSize`] before any backend call when the plan
    ///   is empty or too large
    /// - [`StoreError::NotFound`] when an entry targets a missing entity
    /// - [`StoreError::FieldNotInitialized`] when an append targets a missing list
    pub async fn execute(&self, backend: &Backend) -> StoreResult<()> {
        self.validate(backend.max_transaction_items())?;

        let outcome = match backend.driver() {
            Driver::Document(driver) => driver.execute_transaction(self.render_document()?).await?,
            Driver::KeyValue(driver) => driver.transact_write(self.render_key_value()?).await?,
        };

        match outcome {
            TransactionOutcome::Committed => {
                debug!(backend = backend.shape(), entries = self.entries.len(), "transaction committed");
                Ok(())
            }
            TransactionOutcome::Cancelled { index } => {
                let entry = self.entries.get(index).ok_or_else(|| {
                    StoreError::Backend(format!("transaction cancelled at unknown entry {index}"))
                })?;

                warn!(
                    backend = backend.shape(),
                    index,
                    table = entry.table.name(),
                    id = %entry.id,
                    "transaction cancelled"
                );

                Err(backend
                    .classify_rejection(entry.table, &entry.id, &entry.update)
                    .await)
            }
        }
    }
}

/// Result of a transaction reported by a driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionOutcome {
    Committed,
    /// The write at `index` did not apply and nothing was committed.
    Cancelled { index: usize },
}

/// A guarded single-document update inside a document store transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentWrite {
    pub collection: &'static str,
    /// Id filter merged with the update's guard.
    pub filter: Document,
    pub update: Document,
}

/// A conditional update inside a key-value transactional write.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyValueWrite {
    pub table: &'static str,
    pub key: Item,
    pub update: KeyValueUpdate,
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use crate::{
        id::{IdEncoding, ObjectIdEncoding, UuidEncoding},
        schema::fields,
    };

    fn scenario(project: Id, task: Id) -> TransactionPlan {
        TransactionPlan::new()
            .with_update(Table::Projects, project.clone(), Update::append(fields::TASKS, &task))
            .with_update(Table::Tasks, task, Update::set(fields::PROJECT_ID, &project))
    }

    #[test]
    fn test_batch_size_bounds() {
        assert_eq!(
            TransactionPlan::new().validate(100),
            Err(StoreError::InvalidBatchSize(0, 100))
        );

        let plan = scenario(Id::generate::<UuidEncoding>(), Id::generate::<UuidEncoding>());
        assert!(plan.validate(2).is_ok());
        assert_eq!(plan.validate(1), Err(StoreError::InvalidBatchSize(2, 1)));
    }

    #[test]
    fn test_document_writes_merge_guards() {
        let project = Id::generate::<ObjectIdEncoding>();
        let task = Id::generate::<ObjectIdEncoding>();

        let writes = scenario(project.clone(), task.clone()).render_document().unwrap();

        assert_eq!(writes.len(), 2);
        assert_eq!(writes[0].collection, "projects");
        assert_eq!(
            writes[0].filter,
            doc! {
                "_id": ObjectIdEncoding::to_key(&project).unwrap(),
                "tasks": { "$exists": true },
            }
        );
        assert_eq!(writes[1].filter, doc! { "_id": ObjectIdEncoding::to_key(&task).unwrap() });
    }

    #[test]
    fn test_key_value_writes_carry_existence_guard() {
        let project = Id::generate::<UuidEncoding>();
        let task = Id::generate::<UuidEncoding>();

        let writes = scenario(project.clone(), task).render_key_value().unwrap();

        assert_eq!(writes[0].table, "projects");
        assert_eq!(writes[0].key, doc! { "ID": project.to_string() });
        for write in &writes {
            assert!(write
                .update
                .condition_expression
                .as_deref()
                .is_some_and(|condition| condition.starts_with("attribute_exists(#k)")));
        }
    }

    #[test]
    fn test_foreign_id_fails_rendering() {
        let plan = scenario(Id::generate::<UuidEncoding>(), Id::generate::<UuidEncoding>());

        assert!(matches!(plan.render_document(), Err(StoreError::InvalidId(_))));
    }
}
