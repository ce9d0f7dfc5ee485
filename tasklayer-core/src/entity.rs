//! Entity trait and record codecs.
//!
//! Entities serialize with serde into a neutral shape where the identifier is
//! the `id` field and every reference is a plain string. The codecs in
//! [`EntityExt`] adapt that shape to each backend:
//!
//! | | document record | key-value item |
//! |---|---|---|
//! | identifier | `_id`, ObjectId | `ID`, string |
//! | references | ObjectId | string |
//! | discriminator | - | `dataType` |

use bson::{Bson, Document, de::deserialize_from_bson, oid::ObjectId, ser::serialize_to_bson};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Value, from_value, to_value};
use std::fmt::Debug;

use crate::{
    backend::Item,
    error::{StoreError, StoreResult},
    id::{Id, IdEncoding, ObjectIdEncoding, UuidEncoding},
    schema::{DATA_TYPE_ATTRIBUTE, DOCUMENT_ID_FIELD, KEY_VALUE_ID_ATTRIBUTE, Table, fields},
};

/// A persisted domain entity.
///
/// # Example
///
/// ```ignore
/// #[derive(Debug, Clone, Serialize, Deserialize)]
/// pub struct Label {
///     #[serde(default)]
///     pub id: Id,
///     pub name: String,
///     pub task: Id,
/// }
///
/// impl Entity for Label {
///     const TABLE: Table = Table::Tasks;
///     const REFERENCE_FIELDS: &'static [&'static str] = &["task"];
///
///     fn id(&self) -> &Id { &self.id }
///     fn set_id(&mut self, id: Id) { self.id = id; }
/// }
/// ```
pub trait Entity: Serialize + DeserializeOwned + Send + Sync + Clone + Debug + 'static {
    /// Table the entity is stored in.
    const TABLE: Table;

    /// Serialized names of the fields holding identifiers of other entities,
    /// either as a single value or as a list.
    const REFERENCE_FIELDS: &'static [&'static str];

    fn id(&self) -> &Id;

    /// Assigns the store generated identifier.
    fn set_id(&mut self, id: Id);
}

/// Conversions between entities and backend records.
///
/// Implemented for every [`Entity`].
pub trait EntityExt: Entity {
    /// Encodes the entity as a document store record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidId`] if the identifier or a reference is not
    /// an object id.
    fn to_document_record(&self) -> StoreResult<Document>;

    /// Decodes a document store record.
    fn from_document_record(record: Document) -> StoreResult<Self>;

    /// Encodes the entity as a key-value item, including its discriminator.
    fn to_item(&self) -> StoreResult<Item>;

    /// Decodes a key-value item.
    fn from_item(item: Item) -> StoreResult<Self>;

    fn to_json(&self) -> StoreResult<Value>;

    fn from_json(value: Value) -> StoreResult<Self>;
}

impl<E: Entity> EntityExt for E {
    fn to_document_record(&self) -> StoreResult<Document> {
        let mut record = to_document(self)?;

        let id = take_id(&mut record, fields::ID)?;
        record.insert(DOCUMENT_ID_FIELD, ObjectIdEncoding::to_key(&id)?);

        for field in E::REFERENCE_FIELDS {
            map_reference(&mut record, field, |value| match value {
                Bson::String(id) => Ok(Bson::ObjectId(ObjectIdEncoding::to_key(&Id::from(id))?)),
                other => Ok(other),
            })?;
        }

        Ok(record)
    }

    fn from_document_record(mut record: Document) -> StoreResult<Self> {
        match record.remove(DOCUMENT_ID_FIELD) {
            Some(Bson::ObjectId(oid)) => {
                record.insert(fields::ID, ObjectIdEncoding::from_key(&oid).to_string());
            }
            other => {
                return Err(StoreError::Serialization(format!(
                    "expected an object id in {DOCUMENT_ID_FIELD}, found {other:?}"
                )));
            }
        }

        for field in E::REFERENCE_FIELDS {
            map_reference(&mut record, field, |value| match value {
                Bson::ObjectId(oid) => Ok(Bson::String(oid_to_string(&oid))),
                other => Ok(other),
            })?;
        }

        Ok(deserialize_from_bson(Bson::Document(record))?)
    }

    fn to_item(&self) -> StoreResult<Item> {
        let mut item = to_document(self)?;

        let id = take_id(&mut item, fields::ID)?;
        item.insert(KEY_VALUE_ID_ATTRIBUTE, UuidEncoding::to_key(&id)?);
        item.insert(DATA_TYPE_ATTRIBUTE, E::TABLE.data_type());

        Ok(item)
    }

    fn from_item(mut item: Item) -> StoreResult<Self> {
        item.remove(DATA_TYPE_ATTRIBUTE);

        let id = take_id(&mut item, KEY_VALUE_ID_ATTRIBUTE)?;
        item.insert(fields::ID, id.to_string());

        Ok(deserialize_from_bson(Bson::Document(item))?)
    }

    fn to_json(&self) -> StoreResult<Value> {
        Ok(to_value(self)?)
    }

    fn from_json(value: Value) -> StoreResult<Self> {
        Ok(from_value(value)?)
    }
}

fn to_document<E: Serialize>(entity: &E) -> StoreResult<Document> {
    match serialize_to_bson(entity)? {
        Bson::Document(document) => Ok(document),
        other => Err(StoreError::Serialization(format!(
            "entity serialized to {:?} instead of a document",
            other.element_type()
        ))),
    }
}

/// Removes the string identifier stored under `field`.
fn take_id(document: &mut Document, field: &str) -> StoreResult<Id> {
    match document.remove(field) {
        Some(Bson::String(id)) if !id.is_empty() => Ok(Id::from(id)),
        Some(Bson::String(_)) | None => Err(StoreError::InvalidId(String::new())),
        Some(other) => Err(StoreError::Serialization(format!(
            "expected a string identifier in {field}, found {other:?}"
        ))),
    }
}

/// Rewrites a reference field in place, element-wise for lists.
fn map_reference<F>(document: &mut Document, field: &str, mut f: F) -> StoreResult<()>
where
    F: FnMut(Bson) -> StoreResult<Bson>,
{
    let Some(value) = document.remove(field) else {
        return Ok(());
    };

    let mapped = match value {
        Bson::Array(values) => Bson::Array(values.into_iter().map(&mut f).collect::<StoreResult<_>>()?),
        Bson::Null => Bson::Null,
        other => f(other)?,
    };
    document.insert(field, mapped);

    Ok(())
}

fn oid_to_string(oid: &ObjectId) -> String {
    ObjectIdEncoding::from_key(oid).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Project, Task};
    use bson::doc;
    use chrono::{TimeZone, Utc};

    fn task() -> Task {
        Task::new("write docs", "all of them", Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap())
    }

    #[test]
    fn test_document_record_uses_object_ids() {
        let mut project = Project::new("launch", "ship it");
        project.set_id(Id::generate::<ObjectIdEncoding>());
        let task = Id::generate::<ObjectIdEncoding>();
        project.tasks.push(task.clone());

        let record = project.to_document_record().unwrap();

        assert_eq!(record.get("_id"), Some(&Bson::ObjectId(ObjectIdEncoding::to_key(project.id()).unwrap())));
        assert!(record.get("id").is_none());
        assert_eq!(
            record.get_array("tasks").unwrap(),
            &vec![Bson::ObjectId(ObjectIdEncoding::to_key(&task).unwrap())]
        );

        assert_eq!(Project::from_document_record(record).unwrap().tasks, vec![task]);
    }

    #[test]
    fn test_item_carries_discriminator() {
        let mut task = task();
        task.set_id(Id::generate::<UuidEncoding>());

        let item = task.to_item().unwrap();

        assert_eq!(item.get_str("ID").unwrap(), task.id().as_str());
        assert_eq!(item.get_str("dataType").unwrap(), "task");
        assert!(item.get("assignedTo").is_none());

        let decoded = Task::from_item(item).unwrap();
        assert_eq!(decoded.id(), task.id());
        assert_eq!(decoded.due_date, task.due_date);
    }

    #[test]
    fn test_unassigned_entity_cannot_be_encoded() {
        assert_eq!(task().to_item(), Err(StoreError::InvalidId(String::new())));
    }

    #[test]
    fn test_missing_object_id_is_rejected() {
        let record = doc! { "name": "launch", "description": "", "tasks": [] };

        assert!(matches!(
            Project::from_document_record(record),
            Err(StoreError::Serialization(_))
        ));
    }
}
