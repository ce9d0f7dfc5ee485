//! Opaque resource identifiers.
//!
//! An [`Id`] is assigned by the store when an entity is inserted and never
//! changes afterwards. Each backend has its own physical key encoding, hidden
//! behind an [`IdEncoding`] implementation:
//!
//! - [`ObjectIdEncoding`] - 24 character hex object ids used by the document store
//! - [`UuidEncoding`] - random UUID strings used by the key-value store

use bson::oid::ObjectId;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};

/// Opaque identifier of a persisted entity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id(String);

impl Id {
    /// Generates a fresh identifier using the given backend encoding.
    pub fn generate<E: IdEncoding>() -> Self {
        E::from_key(&E::generate())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` for the placeholder id of an entity that was never persisted.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for Id {
    fn from(value: String) -> Self {
        Id(value)
    }
}

impl From<&str> for Id {
    fn from(value: &str) -> Self {
        Id(value.to_string())
    }
}

/// Conversion between [`Id`] and a backend's native key representation.
pub trait IdEncoding {
    /// The native key type.
    type Key;

    /// Creates a new unique native key.
    fn generate() -> Self::Key;

    /// Converts an identifier to the native key.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidId`] if the identifier was not produced by this encoding.
    fn to_key(id: &Id) -> StoreResult<Self::Key>;

    /// Converts a native key back to an identifier.
    fn from_key(key: &Self::Key) -> Id;
}

/// Document store encoding: BSON object ids.
pub struct ObjectIdEncoding;

impl IdEncoding for ObjectIdEncoding {
    type Key = ObjectId;

    fn generate() -> Self::Key {
        ObjectId::new()
    }

    fn to_key(id: &Id) -> StoreResult<Self::Key> {
        ObjectId::parse_str(id.as_str()).map_err(|_| StoreError::InvalidId(id.to_string()))
    }

    fn from_key(key: &Self::Key) -> Id {
        Id(key.to_hex())
    }
}

/// Key-value store encoding: hyphenated UUID v4 strings.
pub struct UuidEncoding;

impl IdEncoding for UuidEncoding {
    type Key = String;

    fn generate() -> Self::Key {
        Uuid::new_v4().to_string()
    }

    fn to_key(id: &Id) -> StoreResult<Self::Key> {
        Uuid::parse_str(id.as_str())
            .map(|uuid| uuid.hyphenated().to_string())
            .map_err(|_| StoreError::InvalidId(id.to_string()))
    }

    fn from_key(key: &Self::Key) -> Id {
        Id(key.clone())
    }
}
