//! Task, project, user and session persistence over interchangeable storage backends.
//!
//! This crate is the entry point of the tasklayer workspace. It re-exports the
//! core types, the in-memory drivers and, behind features, the MongoDB and
//! DynamoDB drivers, and it can build a [`Store`](store::Store) from
//! configuration.
//!
//! # Quick Start
//!
//! ```ignore
//! use tasklayer::{prelude::*, memory::InMemoryDocumentStore};
//!
//! #[tokio::main]
//! async fn main() -> StoreResult<()> {
//!     let store = Store::new(InMemoryDocumentStore::builder().build().await?);
//!
//!     let owner = store.users.insert(User::new("Ada", "Lovelace", "ada@example.com", "x")).await?;
//!     let project = store.projects.insert(Project::new("engine", "").with_owner(owner.id().clone())).await?;
//!     let task = store.tasks.insert(Task::new("notes", "", chrono::Utc::now())).await?;
//!
//!     store.projects.add_task(project.id(), task.id()).await?;
//!     store.tasks.assign(task.id(), owner.id()).await?;
//!
//!     let open = store.tasks
//!         .get_by_assignee(owner.id(), Some(false), &Pagination::new(1, 10))
//!         .await?;
//!     assert_eq!(open.len(), 1);
//!
//!     store.shutdown().await
//! }
//! ```
//!
//! # Choosing a backend at runtime
//!
//! ```ignore
//! let store = tasklayer::connect(&StoreConfig::from_env()?).await?;
//! ```
//!
//! # Backends
//!
//! - [`memory`] - in-memory document and key-value drivers
//! - `mongodb` - MongoDB driver (requires the `mongodb` feature)
//! - `dynamodb` - DynamoDB driver (requires the `dynamodb` feature)

pub mod config;
pub mod prelude;

pub use config::{StoreConfig, connect};
pub use tasklayer_core::{
    backend, entity, error, filter, id, model, page, schema, store, transaction, update, value,
};

pub use bson;

/// In-memory drivers.
pub mod memory {
    pub use tasklayer_memory::{
        InMemoryDocumentStore, InMemoryDocumentStoreBuilder, InMemoryKeyValueStore,
        InMemoryKeyValueStoreBuilder,
    };
}

/// MongoDB driver.
#[cfg(feature = "mongodb")]
pub mod mongodb {
    pub use tasklayer_mongodb::{MongoDbDriver, MongoDbDriverBuilder};
}

/// DynamoDB driver.
#[cfg(feature = "dynamodb")]
pub mod dynamodb {
    pub use tasklayer_dynamodb::{DynamoDbDriver, DynamoDbDriverBuilder};
}
