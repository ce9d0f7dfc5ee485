//! Single-field mutations and their per-backend renderings.

use bson::{Bson, Document, doc};
use std::collections::HashMap;

use crate::{
    error::StoreResult,
    schema::KEY_VALUE_ID_ATTRIBUTE,
    value::FieldValue,
};

/// A mutation applied to exactly one field of one entity.
#[derive(Debug, Clone, PartialEq)]
pub enum Update {
    /// Replaces the value of `field`.
    SetField { field: String, value: FieldValue },
    /// Appends `value` to the list stored in `field`.
    ///
    /// The field must already hold a list; appending to a missing field fails
    /// with [`StoreError::FieldNotInitialized`](crate::error::StoreError::FieldNotInitialized).
    AppendToList { field: String, value: FieldValue },
}

impl Update {
    pub fn set(field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Update::SetField {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn append(field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Update::AppendToList {
            field: field.into(),
            value: value.into(),
        }
    }

    /// The field this update touches.
    pub fn field(&self) -> &str {
        match self {
            Update::SetField { field, .. } | Update::AppendToList { field, .. } => field,
        }
    }

    pub fn is_append(&self) -> bool {
        matches!(self, Update::AppendToList { .. })
    }

    /// Renders the update as a document store modification.
    ///
    /// Appends carry an `$exists` guard so that a missing list makes the
    /// update match nothing instead of creating the field.
    pub fn render_document(&self) -> StoreResult<DocumentUpdate> {
        match self {
            Update::SetField { field, value } => Ok(DocumentUpdate {
                guard: doc! {},
                update: doc! { "$set": { field: value.to_document_bson()? } },
            }),
            Update::AppendToList { field, value } => Ok(DocumentUpdate {
                guard: doc! { field: { "$exists": true } },
                update: doc! { "$push": { field: value.to_document_bson()? } },
            }),
        }
    }

    /// Renders the update as a key-value update expression.
    ///
    /// Every rendering is conditioned on the item existing, so an update of a
    /// missing id is rejected instead of creating a partial item.
    pub fn render_key_value(&self) -> StoreResult<KeyValueUpdate> {
        let (update_expression, condition_expression, value) = match self {
            Update::SetField { value, .. } => (
                "SET #u0 = :u0",
                "attribute_exists(#k)",
                value.to_key_value_bson()?,
            ),
            Update::AppendToList { value, .. } => (
                "SET #u0 = list_append(#u0, :u0)",
                "attribute_exists(#k) AND attribute_exists(#u0)",
                Bson::Array(vec![value.to_key_value_bson()?]),
            ),
        };

        Ok(KeyValueUpdate {
            update_expression: update_expression.to_string(),
            condition_expression: Some(condition_expression.to_string()),
            attribute_names: HashMap::from([
                ("#k".to_string(), KEY_VALUE_ID_ATTRIBUTE.to_string()),
                ("#u0".to_string(), self.field().to_string()),
            ]),
            attribute_values: HashMap::from([(":u0".to_string(), value)]),
        })
    }
}

/// An update rendered for the document store.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentUpdate {
    /// Extra conditions merged into the id filter.
    pub guard: Document,
    /// The modification document (`$set` or `$push`).
    pub update: Document,
}

/// An update rendered for the key-value store.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyValueUpdate {
    pub update_expression: String,
    pub condition_expression: Option<String>,
    pub attribute_names: HashMap<String, String>,
    pub attribute_values: HashMap<String, Bson>,
}
