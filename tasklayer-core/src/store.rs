//! Typed store facades.
//!
//! [`EntityStore`] exposes the generic operations every entity supports.
//! Domain operations are inherent methods on the concrete aliases
//! [`TaskStore`], [`ProjectStore`], [`UserStore`] and [`AuthStore`]. [`Store`]
//! bundles the facades over one [`Backend`].
//!
//! Every mutation is a single guarded backend call. When the guard rejects the
//! call, one existence read classifies the failure as
//! [`StoreError::NotFound`] or [`StoreError::FieldNotInitialized`].
//!
//! # Example
//!
//! ```ignore
//! use tasklayer_core::{store::Store, page::Pagination};
//!
//! let store = Store::new(backend);
//! let task = store.tasks.insert(Task::new("write docs", "", due)).await?;
//! store.tasks.assign(task.id(), user.id()).await?;
//!
//! let open = store.tasks
//!     .get_by_assignee(user.id(), Some(false), &Pagination::new(1, 20))
//!     .await?;
//! ```

use std::marker::PhantomData;
use tracing::debug;

use crate::{
    backend::{Backend, Driver, document_id_filter, key_value_key},
    entity::{Entity, EntityExt},
    error::{StoreError, StoreResult},
    filter::Filter,
    id::Id,
    model::{Auth, AuthFilter, Project, Task, User},
    page::{KeyValuePageSource, Paginated, Pagination, collect_window},
    schema::{DATA_TYPE_ATTRIBUTE, DOCUMENT_ID_FIELD, KEY_VALUE_ID_ATTRIBUTE, Table, fields},
    transaction::TransactionPlan,
    update::Update,
};

/// Fields that identify an entity and can never be updated.
const IMMUTABLE_FIELDS: &[&str] = &[
    fields::ID,
    DOCUMENT_ID_FIELD,
    KEY_VALUE_ID_ATTRIBUTE,
    DATA_TYPE_ATTRIBUTE,
];

/// Generic persistence operations for one entity type.
#[derive(Debug)]
pub struct EntityStore<E: Entity> {
    backend: Backend,
    _marker: PhantomData<fn() -> E>,
}

impl<E: Entity> Clone for EntityStore<E> {
    fn clone(&self) -> Self {
        Self::new(self.backend.clone())
    }
}

impl<E: Entity> EntityStore<E> {
    pub fn new(backend: Backend) -> Self {
        Self {
            backend,
            _marker: PhantomData,
        }
    }

    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    fn table(&self) -> &'static str {
        E::TABLE.name()
    }

    /// Persists a new entity under a freshly generated identifier.
    ///
    /// Any identifier already set on `entity` is replaced. Returns the stored
    /// entity.
    pub async fn insert(&self, mut entity: E) -> StoreResult<E> {
        entity.set_id(self.backend.generate_id());

        match self.backend.driver() {
            Driver::Document(driver) => {
                driver
                    .insert_one(self.table(), entity.to_document_record()?)
                    .await?
            }
            Driver::KeyValue(driver) => driver.put_item(self.table(), entity.to_item()?).await?,
        }

        debug!(backend = self.backend.shape(), table = self.table(), id = %entity.id(), "inserted entity");
        Ok(entity)
    }

    /// Loads the entity with identifier `id`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if no such entity exists.
    pub async fn get_by_id(&self, id: &Id) -> StoreResult<E> {
        let found = match self.backend.driver() {
            Driver::Document(driver) => driver
                .find_one(self.table(), document_id_filter(id)?)
                .await?
                .map(E::from_document_record)
                .transpose()?,
            Driver::KeyValue(driver) => driver
                .get_item(self.table(), key_value_key(id)?)
                .await?
                .map(E::from_item)
                .transpose()?,
        };

        found.ok_or_else(|| StoreError::NotFound(self.table().to_string(), id.to_string()))
    }

    /// Retrieves one window of the entities matching `filter`.
    ///
    /// Filters that bind the same index key twice are rejected with
    /// [`StoreError::IncompatibleFilter`] before the backend is called.
    pub async fn get_page(&self, filter: &Filter, pagination: &Pagination) -> StoreResult<Paginated<E>> {
        let schema = E::TABLE.schema();

        let page = match self.backend.driver() {
            Driver::Document(driver) => {
                let query = filter.render_document(schema)?;
                if pagination.is_cancelled() {
                    return Err(StoreError::Cancelled);
                }

                let records = driver
                    .find(self.table(), query, pagination.window())
                    .await?;
                Paginated { items: records, fetches: 1 }.try_map(E::from_document_record)?
            }
            Driver::KeyValue(driver) => {
                let query = filter.render_key_value(schema)?;
                let mut source = KeyValuePageSource::new(driver.as_ref(), &query);

                collect_window(&mut source, pagination)
                    .await?
                    .try_map(E::from_item)?
            }
        };

        debug!(
            backend = self.backend.shape(),
            table = self.table(),
            page = pagination.window().page,
            items = page.items.len(),
            fetches = page.fetches,
            "retrieved page"
        );
        Ok(page)
    }

    /// Retrieves the entities matching `filter` inside one window.
    pub async fn get_many(&self, filter: &Filter, pagination: &Pagination) -> StoreResult<Vec<E>> {
        Ok(self.get_page(filter, pagination).await?.items)
    }

    /// Applies `update` to the entity `id`.
    ///
    /// # Errors
    ///
    /// - [`StoreError::NotFound`] if the entity does not exist
    /// - [`StoreError::FieldNotInitialized`] if an append targets a missing list
    /// - [`StoreError::ImmutableField`] if the update targets an identifying field
    pub async fn update(&self, id: &Id, update: Update) -> StoreResult<()> {
        if IMMUTABLE_FIELDS.contains(&update.field()) {
            return Err(StoreError::ImmutableField(update.field().to_string()));
        }

        let applied = match self.backend.driver() {
            Driver::Document(driver) => {
                let rendered = update.render_document()?;
                let mut filter = document_id_filter(id)?;
                filter.extend(rendered.guard);

                driver
                    .update_one(self.table(), filter, rendered.update)
                    .await?
                    > 0
            }
            Driver::KeyValue(driver) => driver
                .update_item(self.table(), key_value_key(id)?, update.render_key_value()?)
                .await?
                .is_some(),
        };

        if !applied {
            return Err(self
                .backend
                .classify_rejection(E::TABLE, id, &update)
                .await);
        }

        debug!(backend = self.backend.shape(), table = self.table(), %id, field = update.field(), "updated entity");
        Ok(())
    }

    /// Deletes the entity `id`.
    pub async fn delete(&self, id: &Id) -> StoreResult<()> {
        let deleted = match self.backend.driver() {
            Driver::Document(driver) => {
                driver
                    .delete_one(self.table(), document_id_filter(id)?)
                    .await?
                    > 0
            }
            Driver::KeyValue(driver) => driver
                .delete_item(self.table(), key_value_key(id)?)
                .await?
                .is_some(),
        };

        if !deleted {
            return Err(StoreError::NotFound(self.table().to_string(), id.to_string()));
        }

        debug!(backend = self.backend.shape(), table = self.table(), %id, "deleted entity");
        Ok(())
    }

    /// Executes a transaction plan on this store's backend.
    pub async fn execute_transaction(&self, plan: &TransactionPlan) -> StoreResult<()> {
        plan.execute(&self.backend).await
    }
}

pub type TaskStore = EntityStore<Task>;
pub type ProjectStore = EntityStore<Project>;
pub type UserStore = EntityStore<User>;
pub type AuthStore = EntityStore<Auth>;

impl EntityStore<Task> {
    pub async fn complete(&self, id: &Id) -> StoreResult<()> {
        self.update(id, Update::set(fields::COMPLETED, true)).await
    }

    pub async fn assign(&self, task: &Id, user: &Id) -> StoreResult<()> {
        self.update(task, Update::set(fields::ASSIGNED_TO, user)).await
    }

    /// Tasks assigned to `user`, optionally restricted by completion state.
    pub async fn get_by_assignee(
        &self,
        user: &Id,
        completed: Option<bool>,
        pagination: &Pagination,
    ) -> StoreResult<Vec<Task>> {
        let mut filter = Filter::eq(fields::ASSIGNED_TO, user);
        if let Some(completed) = completed {
            filter = filter.and(Filter::eq(fields::COMPLETED, completed));
        }

        self.get_many(&filter, pagination).await
    }

    pub async fn get_by_project(&self, project: &Id, pagination: &Pagination) -> StoreResult<Vec<Task>> {
        self.get_many(&Filter::eq(fields::PROJECT_ID, project), pagination)
            .await
    }

    /// Every task, or only those in the given completion state.
    pub async fn get_by_completion(&self, completed: Option<bool>, pagination: &Pagination) -> StoreResult<Vec<Task>> {
        let filter = completed.map_or_else(Filter::empty, |completed| Filter::eq(fields::COMPLETED, completed));

        self.get_many(&filter, pagination).await
    }
}

impl EntityStore<Project> {
    /// Adds `task` to `project` and points the task back at the project.
    ///
    /// Both writes happen in one transaction.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::AlreadyAssociated`] without starting a transaction
    /// when the project already lists the task.
    pub async fn add_task(&self, project: &Id, task: &Id) -> StoreResult<()> {
        if self.get_by_id(project).await?.contains_task(task) {
            return Err(StoreError::AlreadyAssociated(task.to_string(), project.to_string()));
        }

        let plan = TransactionPlan::new()
            .with_update(Table::Projects, project.clone(), Update::append(fields::TASKS, task))
            .with_update(Table::Tasks, task.clone(), Update::set(fields::PROJECT_ID, project));

        self.execute_transaction(&plan).await
    }

    pub async fn get_by_owner(&self, user: &Id, pagination: &Pagination) -> StoreResult<Vec<Project>> {
        self.get_many(&Filter::eq(fields::USER_ID, user), pagination)
            .await
    }
}

impl EntityStore<User> {
    /// Looks a user up by email address.
    pub async fn get_by_email(&self, email: &str) -> StoreResult<User> {
        self.get_many(&Filter::eq(fields::EMAIL, email), &Pagination::new(1, 1))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::NotFound(Table::Users.name().to_string(), email.to_string()))
    }

    pub async fn enable(&self, id: &Id) -> StoreResult<()> {
        self.update(id, Update::set(fields::ENABLED, true)).await
    }

    /// Replaces the stored password with an already encrypted one.
    pub async fn update_password(&self, id: &Id, encrypted_password: &str) -> StoreResult<()> {
        self.update(id, Update::set(fields::ENCRYPTED_PASSWORD, encrypted_password))
            .await
    }
}

impl EntityStore<Auth> {
    /// Looks up the session matching both the user and the UUID.
    pub async fn get_by_filter(&self, filter: &AuthFilter) -> StoreResult<Auth> {
        let query = Filter::eq(fields::USER_ID, &filter.user_id)
            .and(Filter::eq(fields::AUTH_UUID, filter.auth_uuid.as_str()));

        self.get_many(&query, &Pagination::new(1, 1))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::NotFound(Table::Auths.name().to_string(), filter.auth_uuid.clone()))
    }

    /// Ends the session matching `filter`.
    ///
    /// The delete itself is keyed by identifier, so a session removed
    /// concurrently is reported as [`StoreError::NotFound`].
    pub async fn delete_by_filter(&self, filter: &AuthFilter) -> StoreResult<()> {
        let auth = self.get_by_filter(filter).await?;

        self.delete(&auth.id).await
    }
}

/// The entity stores over a shared backend.
#[derive(Debug, Clone)]
pub struct Store {
    pub tasks: TaskStore,
    pub projects: ProjectStore,
    pub users: UserStore,
    pub auths: AuthStore,
    backend: Backend,
}

impl Store {
    pub fn new(backend: Backend) -> Self {
        Self {
            tasks: EntityStore::new(backend.clone()),
            projects: EntityStore::new(backend.clone()),
            users: EntityStore::new(backend.clone()),
            auths: EntityStore::new(backend.clone()),
            backend,
        }
    }

    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    pub async fn shutdown(&self) -> StoreResult<()> {
        self.backend.shutdown().await
    }
}
