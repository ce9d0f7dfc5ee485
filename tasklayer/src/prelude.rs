//! Commonly used types and traits.
//!
//! ```ignore
//! use tasklayer::prelude::*;
//! ```

pub use crate::config::{BackendConfig, MemoryShape, StoreConfig, connect};
pub use tasklayer_core::{
    backend::{Backend, BackendBuilder, DocumentDriver, Driver, KeyValueDriver},
    entity::{Entity, EntityExt},
    error::{StoreError, StoreResult},
    filter::Filter,
    id::Id,
    model::{Auth, AuthFilter, Project, Task, User},
    page::{Paginated, Pagination},
    schema::{Table, fields},
    store::{AuthStore, EntityStore, ProjectStore, Store, TaskStore, UserStore},
    transaction::TransactionPlan,
    update::Update,
};
