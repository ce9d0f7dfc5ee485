//! In-memory storage drivers for tasklayer.
//!
//! This crate provides thread-safe, in-memory implementations of both driver
//! shapes defined in `tasklayer-core`. They use async-aware read-write locks
//! and are intended for development and testing.
//!
//! # Features
//!
//! - **Document driver** ([`InMemoryDocumentStore`]) - Query-by-example evaluation, `$set`/`$push`,
//!   snapshot transactions
//! - **Key-value driver** ([`InMemoryKeyValueStore`]) - Condition and update expressions, limit
//!   before filter paging with continuation keys, transactional writes, a page fetch counter
//!
//! # Quick Start
//!
//! ```ignore
//! use tasklayer_core::{backend::BackendBuilder, store::Store};
//! use tasklayer_memory::InMemoryKeyValueStore;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let backend = InMemoryKeyValueStore::builder().build().await?;
//!     let store = Store::new(backend);
//!
//!     let project = store.projects.insert(Project::new("launch", "")).await?;
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as tasklayer_memory;

pub mod document;
pub mod evaluator;
pub mod expression;
pub mod key_value;

pub use document::{InMemoryDocumentStore, InMemoryDocumentStoreBuilder};
pub use key_value::{InMemoryKeyValueStore, InMemoryKeyValueStoreBuilder};
