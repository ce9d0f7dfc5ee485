//! Conversions between BSON values and DynamoDB attribute values.
//!
//! Numbers travel as strings on the wire; on the way back they become `Int64`
//! when they parse as an integer and `Double` otherwise. Object ids and
//! datetimes have no attribute counterpart and are stored as strings.

use aws_sdk_dynamodb::types::AttributeValue;
use bson::{Bson, Document};
use std::collections::HashMap;

use tasklayer_core::error::{StoreError, StoreResult};

pub fn to_attribute_value(value: &Bson) -> StoreResult<AttributeValue> {
    Ok(match value {
        Bson::String(value) => AttributeValue::S(value.clone()),
        Bson::Boolean(value) => AttributeValue::Bool(*value),
        Bson::Int32(value) => AttributeValue::N(value.to_string()),
        Bson::Int64(value) => AttributeValue::N(value.to_string()),
        Bson::Double(value) if value.is_finite() => AttributeValue::N(value.to_string()),
        Bson::Null => AttributeValue::Null(true),
        Bson::ObjectId(oid) => AttributeValue::S(oid.to_hex()),
        Bson::DateTime(datetime) => AttributeValue::S(
            datetime
                .try_to_rfc3339_string()
                .map_err(|e| StoreError::Serialization(e.to_string()))?,
        ),
        Bson::Array(values) => AttributeValue::L(
            values
                .iter()
                .map(to_attribute_value)
                .collect::<StoreResult<_>>()?,
        ),
        Bson::Document(document) => AttributeValue::M(to_attribute_map(document)?),
        other => {
            return Err(StoreError::Serialization(format!(
                "{:?} values cannot be stored as attributes",
                other.element_type()
            )));
        }
    })
}

pub fn to_attribute_map(document: &Document) -> StoreResult<HashMap<String, AttributeValue>> {
    document
        .iter()
        .map(|(key, value)| Ok((key.clone(), to_attribute_value(value)?)))
        .collect()
}

/// Converts placeholder values of an expression.
pub fn to_expression_values(values: &HashMap<String, Bson>) -> StoreResult<HashMap<String, AttributeValue>> {
    values
        .iter()
        .map(|(key, value)| Ok((key.clone(), to_attribute_value(value)?)))
        .collect()
}

pub fn from_attribute_value(value: &AttributeValue) -> StoreResult<Bson> {
    Ok(match value {
        AttributeValue::S(value) => Bson::String(value.clone()),
        AttributeValue::N(value) => parse_number(value)?,
        AttributeValue::Bool(value) => Bson::Boolean(*value),
        AttributeValue::Null(_) => Bson::Null,
        AttributeValue::L(values) => Bson::Array(
            values
                .iter()
                .map(from_attribute_value)
                .collect::<StoreResult<_>>()?,
        ),
        AttributeValue::M(map) => Bson::Document(from_attribute_map(map)?),
        AttributeValue::Ss(values) => Bson::Array(values.iter().cloned().map(Bson::String).collect()),
        AttributeValue::Ns(values) => Bson::Array(
            values
                .iter()
                .map(|value| parse_number(value))
                .collect::<StoreResult<_>>()?,
        ),
        other => {
            return Err(StoreError::Serialization(format!(
                "unsupported attribute value {other:?}"
            )));
        }
    })
}

pub fn from_attribute_map(map: &HashMap<String, AttributeValue>) -> StoreResult<Document> {
    map.iter()
        .map(|(key, value)| Ok((key.clone(), from_attribute_value(value)?)))
        .collect()
}

fn parse_number(value: &str) -> StoreResult<Bson> {
    if let Ok(integer) = value.parse::<i64>() {
        return Ok(Bson::Int64(integer));
    }

    value
        .parse::<f64>()
        .map(Bson::Double)
        .map_err(|_| StoreError::Serialization(format!("invalid number attribute {value}")))
}
