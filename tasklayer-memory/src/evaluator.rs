//! Query-by-example evaluation and update operators for in-memory documents.
//!
//! Supports the subset of the document query language produced by the core
//! renderers: field equality (with array membership), `$and`, `$exists` and
//! `$eq`; and the `$set` and `$push` update operators.

use bson::{Bson, Document, datetime::DateTime, oid::ObjectId};
use std::{cmp::Ordering, collections::HashMap};

use tasklayer_core::error::{StoreError, StoreResult};

/// Comparable view of a BSON value.
///
/// Numeric types are normalized to f64 so that an `Int32` and an `Int64`
/// holding the same number compare equal.
#[derive(Debug)]
pub(crate) enum Comparable<'a> {
    /// Null, and every BSON type without a comparison
    Null,
    /// Boolean flag such as `completed` or `enabled`
    Bool(bool),
    /// Any numeric type, widened to f64
    Number(f64),
    /// BSON datetime
    DateTime(DateTime),
    /// Document identifier or reference, ordered by its timestamp prefix
    ObjectId(ObjectId),
    /// Borrowed string
    String(&'a str),
    /// List, compared element-wise; equality filters also match members
    Array(Vec<Comparable<'a>>),
    /// Embedded document, compared key by key
    Map(HashMap<&'a str, Comparable<'a>>),
}

impl<'a> From<&'a Bson> for Comparable<'a> {
    fn from(bson: &'a Bson) -> Self {
        match bson {
            Bson::Boolean(value) => Comparable::Bool(*value),
            Bson::Int32(value) => Comparable::Number(*value as f64),
            Bson::Int64(value) => Comparable::Number(*value as f64),
            Bson::Double(value) => Comparable::Number(*value),
            Bson::DateTime(value) => Comparable::DateTime(*value),
            Bson::ObjectId(value) => Comparable::ObjectId(*value),
            Bson::String(value) => Comparable::String(value),
            Bson::Array(values) => Comparable::Array(values.iter().map(Comparable::from).collect()),
            Bson::Document(document) => Comparable::Map(
                document
                    .iter()
                    .map(|(key, value)| (key.as_str(), Comparable::from(value)))
                    .collect(),
            ),
            _ => Comparable::Null,
        }
    }
}

impl PartialEq for Comparable<'_> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => true,
            (Comparable::Bool(a), Comparable::Bool(b)) => a == b,
            (Comparable::Number(a), Comparable::Number(b)) => a == b,
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a == b,
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a == b,
            (Comparable::String(a), Comparable::String(b)) => a == b,
            (Comparable::Array(a), Comparable::Array(b)) => a == b,
            (Comparable::Map(a), Comparable::Map(b)) => a == b,
            _ => false,
        }
    }
}

impl PartialOrd for Comparable<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Comparable::Bool(a), Comparable::Bool(b)) => a.partial_cmp(b),
            (Comparable::Number(a), Comparable::Number(b)) => a.partial_cmp(b),
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a.partial_cmp(b),
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a.partial_cmp(b),
            (Comparable::String(a), Comparable::String(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

/// Orders two documents by `field`, treating missing or incomparable values as equal.
pub(crate) fn compare_by(left: &Document, right: &Document, field: &str) -> Ordering {
    let left = left.get(field).map(Comparable::from).unwrap_or(Comparable::Null);
    let right = right.get(field).map(Comparable::from).unwrap_or(Comparable::Null);

    left.partial_cmp(&right).unwrap_or(Ordering::Equal)
}

/// Evaluates query documents against one stored document.
pub(crate) struct DocumentEvaluator<'a> {
    document: &'a Document,
}

impl<'a> DocumentEvaluator<'a> {
    pub fn new(document: &'a Document) -> Self {
        Self { document }
    }

    /// Returns `true` if the document satisfies every clause of `query`.
    pub fn matches(&self, query: &Document) -> StoreResult<bool> {
        for (key, condition) in query {
            let satisfied = match key.as_str() {
                "$and" => self.visit_and(condition)?,
                operator if operator.starts_with('$') => {
                    return Err(unsupported(operator));
                }
                field => self.visit_field(field, condition)?,
            };

            if !satisfied {
                return Ok(false);
            }
        }

        Ok(true)
    }

    fn visit_and(&self, operands: &Bson) -> StoreResult<bool> {
        let Bson::Array(operands) = operands else {
            return Err(StoreError::Backend("$and expects an array".to_string()));
        };

        for operand in operands {
            let Bson::Document(query) = operand else {
                return Err(StoreError::Backend("$and operands must be documents".to_string()));
            };
            if !self.matches(query)? {
                return Ok(false);
            }
        }

        Ok(true)
    }

    fn visit_field(&self, field: &str, condition: &Bson) -> StoreResult<bool> {
        let value = self.document.get(field);

        match condition {
            Bson::Document(operators) if operators.keys().any(|key| key.starts_with('$')) => {
                for (operator, operand) in operators {
                    let satisfied = match operator.as_str() {
                        "$exists" => value.is_some() == operand.as_bool().unwrap_or(true),
                        "$eq" => value.is_some_and(|value| equals(value, operand)),
                        other => return Err(unsupported(other)),
                    };
                    if !satisfied {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            expected => Ok(value.is_some_and(|value| equals(value, expected))),
        }
    }
}

/// Equality with array membership: an array field matches any of its elements.
fn equals(value: &Bson, expected: &Bson) -> bool {
    let (value, expected) = (Comparable::from(value), Comparable::from(expected));

    match &value {
        Comparable::Array(items) if !matches!(expected, Comparable::Array(_)) => {
            items.iter().any(|item| item == &expected)
        }
        _ => value == expected,
    }
}

/// Applies `$set` and `$push` operators to `document` in place.
pub(crate) fn apply_update(document: &mut Document, update: &Document) -> StoreResult<()> {
    for (operator, fields) in update {
        let Bson::Document(fields) = fields else {
            return Err(StoreError::Backend(format!("{operator} expects a document")));
        };

        match operator.as_str() {
            "$set" => {
                for (field, value) in fields {
                    document.insert(field.clone(), value.clone());
                }
            }
            "$push" => {
                for (field, value) in fields {
                    match document.get_mut(field) {
                        Some(Bson::Array(values)) => values.push(value.clone()),
                        Some(_) => {
                            return Err(StoreError::Backend(format!(
                                "the field '{field}' must be an array"
                            )));
                        }
                        None => {
                            document.insert(field.clone(), Bson::Array(vec![value.clone()]));
                        }
                    }
                }
            }
            other => return Err(unsupported(other)),
        }
    }

    Ok(())
}

fn unsupported(operator: &str) -> StoreError {
    StoreError::Backend(format!("unsupported operator {operator}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn test_equality_and_membership() {
        let oid = ObjectId::new();
        let document = doc! { "completed": true, "count": 3_i64, "tasks": [oid] };
        let evaluator = DocumentEvaluator::new(&document);

        assert!(evaluator.matches(&doc! {}).unwrap());
        assert!(evaluator.matches(&doc! { "completed": true }).unwrap());
        assert!(evaluator.matches(&doc! { "count": 3 }).unwrap());
        assert!(evaluator.matches(&doc! { "tasks": oid }).unwrap());
        assert!(!evaluator.matches(&doc! { "missing": true }).unwrap());
    }

    #[test]
    fn test_and_and_exists() {
        let document = doc! { "completed": false, "tasks": [] };
        let evaluator = DocumentEvaluator::new(&document);

        assert!(evaluator
            .matches(&doc! { "$and": [{ "completed": false }, { "tasks": { "$exists": true } }] })
            .unwrap());
        assert!(!evaluator
            .matches(&doc! { "$and": [{ "completed": false }, { "userID": { "$exists": true } }] })
            .unwrap());
    }

    #[test]
    fn test_unknown_operator_is_an_error() {
        let document = doc! { "count": 1 };

        assert!(DocumentEvaluator::new(&document)
            .matches(&doc! { "count": { "$gt": 0 } })
            .is_err());
    }

    #[test]
    fn test_set_and_push() {
        let mut document = doc! { "completed": false, "tasks": ["a"] };

        apply_update(&mut document, &doc! { "$set": { "completed": true } }).unwrap();
        apply_update(&mut document, &doc! { "$push": { "tasks": "b" } }).unwrap();

        assert_eq!(document, doc! { "completed": true, "tasks": ["a", "b"] });
        assert!(apply_update(&mut document, &doc! { "$push": { "completed": 1 } }).is_err());
    }
}
