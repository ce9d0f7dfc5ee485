//! A polymorphic persistence layer for a small task/project management backend.
//!
//! This crate is the core of the tasklayer project and provides:
//!
//! - **Identifiers** ([`id`]) - Opaque resource identifiers and their per-backend key encodings
//! - **Filter expressions** ([`filter`]) - Predicates rendered as document queries or key conditions
//! - **Update expressions** ([`update`]) - Mutations rendered as native operators or update expressions
//! - **Pagination** ([`page`]) - Skip/limit windows and client-side windowing over forward cursors
//! - **Transactions** ([`transaction`]) - Multi-item updates applied all-or-nothing
//! - **Driver abstraction** ([`backend`]) - Traits for document and key-value storage drivers
//! - **Entities** ([`entity`], [`model`]) - Persisted types and their record codecs
//! - **Store facades** ([`store`]) - Task, project, user and session operations over the active backend
//! - **Error handling** ([`error`]) - The error taxonomy shared by every backend
//!
//! # Example
//!
//! ```ignore
//! use tasklayer_core::{filter::Filter, page::Pagination, store::Store};
//!
//! let store = Store::new(backend);
//! let open_tasks = store
//!     .tasks
//!     .get_many(&Filter::eq("completed", false), &Pagination::new(1, 10))
//!     .await?;
//! ```

#[allow(unused_extern_crates)]
extern crate self as tasklayer_core;

pub mod backend;
pub mod entity;
pub mod error;
pub mod filter;
pub mod id;
pub mod model;
pub mod page;
pub mod schema;
pub mod store;
pub mod transaction;
pub mod update;
pub mod value;
