//! Values carried by filters and updates.

use bson::Bson;

use crate::{
    error::StoreResult,
    id::{Id, IdEncoding, ObjectIdEncoding, UuidEncoding},
};

/// A value compared against or written to an entity field.
///
/// Identifiers are kept opaque until rendering, where they are converted to
/// the active backend's key encoding.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// A reference to another entity.
    Id(Id),
    /// Any other scalar or structured value.
    Bson(Bson),
}

impl FieldValue {
    /// Renders the value for the document store.
    pub fn to_document_bson(&self) -> StoreResult<Bson> {
        match self {
            FieldValue::Id(id) => Ok(Bson::ObjectId(ObjectIdEncoding::to_key(id)?)),
            FieldValue::Bson(value) => Ok(value.clone()),
        }
    }

    /// Renders the value for the key-value store.
    pub fn to_key_value_bson(&self) -> StoreResult<Bson> {
        match self {
            FieldValue::Id(id) => Ok(Bson::String(UuidEncoding::to_key(id)?)),
            FieldValue::Bson(value) => Ok(value.clone()),
        }
    }
}

impl From<Id> for FieldValue {
    fn from(value: Id) -> Self {
        FieldValue::Id(value)
    }
}

impl From<&Id> for FieldValue {
    fn from(value: &Id) -> Self {
        FieldValue::Id(value.clone())
    }
}

impl From<Bson> for FieldValue {
    fn from(value: Bson) -> Self {
        FieldValue::Bson(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bson(Bson::Boolean(value))
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        FieldValue::Bson(Bson::Int32(value))
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Bson(Bson::Int64(value))
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Bson(Bson::String(value.to_string()))
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Bson(Bson::String(value))
    }
}
