//! Filter expressions and their per-backend renderings.
//!
//! A [`Filter`] is a closed set of predicates. It is rendered once per request
//! for whichever backend is active:
//!
//! - [`Filter::render_document`] produces a query-by-example document
//! - [`Filter::render_key_value`] produces a [`KeyValueQuery`] holding an index
//!   name, a key condition, an optional filter expression and the attribute
//!   name/value maps both expressions refer to
//!
//! # Example
//!
//! ```ignore
//! use tasklayer_core::{filter::Filter, schema::{Table, fields}};
//!
//! let filter = Filter::eq(fields::ASSIGNED_TO, user.id())
//!     .and(Filter::eq(fields::COMPLETED, false));
//!
//! let query = filter.render_key_value(Table::Tasks.schema())?;
//! assert_eq!(query.index_name, "AssignedToGSI");
//! ```

use bson::{Bson, Document, doc};
use std::collections::{HashMap, HashSet};

use crate::{
    error::{StoreError, StoreResult},
    schema::{DATA_TYPE_ATTRIBUTE, DATA_TYPE_INDEX, TableSchema},
    value::FieldValue,
};

/// A predicate describing which entities to retrieve.
///
/// Filters are immutable values; [`Filter::and`] builds a new filter out of
/// its operands.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Matches every row of a table.
    Empty,
    /// Matches rows whose `field` equals `value`.
    FieldEquals {
        field: String,
        value: FieldValue,
    },
    /// Matches rows matched by both operands.
    And(Box<Filter>, Box<Filter>),
}

impl Filter {
    /// Creates a filter matching every row.
    pub fn empty() -> Self {
        Filter::Empty
    }

    /// Creates an equality filter.
    pub fn eq(field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Filter::FieldEquals {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Combines this filter with another using logical AND.
    pub fn and(self, other: Filter) -> Self {
        Filter::And(Box::new(self), Box::new(other))
    }

    /// Returns the fields bound by equality predicates, in rendering order.
    pub fn bound_fields(&self) -> Vec<&str> {
        match self {
            Filter::Empty => Vec::new(),
            Filter::FieldEquals { field, .. } => vec![field.as_str()],
            Filter::And(left, right) => {
                let mut fields = left.bound_fields();
                fields.extend(right.bound_fields());
                fields
            }
        }
    }

    /// Checks that no index key is bound more than once.
    ///
    /// The discriminator attribute counts as already bound, since every
    /// key-value query binds it in its key condition.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::IncompatibleFilter`] naming the offending field.
    pub fn validate(&self, schema: &TableSchema) -> StoreResult<()> {
        let mut seen = HashSet::from([DATA_TYPE_ATTRIBUTE]);

        for field in self.bound_fields() {
            if schema.is_index_key(field) && !seen.insert(field) {
                return Err(StoreError::IncompatibleFilter(field.to_string()));
            }
        }

        Ok(())
    }

    /// Renders this filter as a document store query.
    pub fn render_document(&self, schema: &TableSchema) -> StoreResult<Document> {
        self.validate(schema)?;

        DocumentFilterRenderer.visit_filter(self)
    }

    /// Renders this filter as a key-value index query.
    ///
    /// The first bound field that is the sort key of a secondary index selects
    /// that index and joins the key condition. Every other equality lands in
    /// the filter expression.
    pub fn render_key_value(&self, schema: &TableSchema) -> StoreResult<KeyValueQuery> {
        self.validate(schema)?;

        let index = self
            .bound_fields()
            .into_iter()
            .find_map(|field| schema.index_for(field));

        let mut renderer = KeyValueFilterRenderer::new(index.map(|index| index.sort_key));
        let partition = renderer.bind(
            DATA_TYPE_ATTRIBUTE,
            Bson::String(schema.table.data_type().to_string()),
        );
        let conditions = renderer.visit_filter(self)?;

        Ok(KeyValueQuery {
            table: schema.table.name(),
            index_name: index.map_or(DATA_TYPE_INDEX, |index| index.name),
            key_condition: std::iter::once(partition)
                .chain(conditions.key)
                .collect::<Vec<_>>()
                .join(" AND "),
            filter_expression: if conditions.filter.is_empty() {
                None
            } else {
                Some(conditions.filter.join(" AND "))
            },
            attribute_names: renderer.names,
            attribute_values: renderer.values,
        })
    }
}

/// A filter rendered for the key-value store.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyValueQuery {
    /// Table to query.
    pub table: &'static str,
    /// Secondary index to query.
    pub index_name: &'static str,
    /// Condition on the index partition key and, optionally, its sort key.
    pub key_condition: String,
    /// Condition applied to the rows read through the index.
    pub filter_expression: Option<String>,
    /// Placeholder (`#n0`) to attribute name.
    pub attribute_names: HashMap<String, String>,
    /// Placeholder (`:v0`) to attribute value.
    pub attribute_values: HashMap<String, Bson>,
}

/// Dispatches over the variants of a [`Filter`].
pub trait FilterVisitor {
    type Output;

    fn visit_empty(&mut self) -> StoreResult<Self::Output>;
    fn visit_field_equals(&mut self, field: &str, value: &FieldValue) -> StoreResult<Self::Output>;
    fn visit_and(&mut self, left: &Filter, right: &Filter) -> StoreResult<Self::Output>;

    fn visit_filter(&mut self, filter: &Filter) -> StoreResult<Self::Output> {
        match filter {
            Filter::Empty => self.visit_empty(),
            Filter::FieldEquals { field, value } => self.visit_field_equals(field, value),
            Filter::And(left, right) => self.visit_and(left, right),
        }
    }
}

/// Renders filters as query-by-example documents.
pub(crate) struct DocumentFilterRenderer;

impl FilterVisitor for DocumentFilterRenderer {
    type Output = Document;

    fn visit_empty(&mut self) -> StoreResult<Self::Output> {
        Ok(doc! {})
    }

    fn visit_field_equals(&mut self, field: &str, value: &FieldValue) -> StoreResult<Self::Output> {
        Ok(doc! { field: value.to_document_bson()? })
    }

    fn visit_and(&mut self, left: &Filter, right: &Filter) -> StoreResult<Self::Output> {
        Ok(doc! {
            "$and": [self.visit_filter(left)?, self.visit_filter(right)?],
        })
    }
}

/// Conditions collected while rendering a key-value query.
#[derive(Debug, Default)]
pub(crate) struct Conditions {
    key: Vec<String>,
    filter: Vec<String>,
}

/// Renders filters as key-value conditions.
///
/// Every equality gets its own `#nN`/`:vN` placeholders from a counter shared
/// across the whole render, so the maps of both sides of an `And` merge
/// without collisions.
pub(crate) struct KeyValueFilterRenderer {
    sort_key: Option<&'static str>,
    names: HashMap<String, String>,
    values: HashMap<String, Bson>,
    counter: usize,
}

impl KeyValueFilterRenderer {
    fn new(sort_key: Option<&'static str>) -> Self {
        Self {
            sort_key,
            names: HashMap::new(),
            values: HashMap::new(),
            counter: 0,
        }
    }

    /// Aliases `field` and `value`, returning the `#nN = :vN` condition.
    fn bind(&mut self, field: &str, value: Bson) -> String {
        let name = format!("#n{}", self.counter);
        let placeholder = format!(":v{}", self.counter);
        self.counter += 1;

        let condition = format!("{name} = {placeholder}");
        self.names.insert(name, field.to_string());
        self.values.insert(placeholder, value);

        condition
    }
}

impl FilterVisitor for KeyValueFilterRenderer {
    type Output = Conditions;

    fn visit_empty(&mut self) -> StoreResult<Self::Output> {
        Ok(Conditions::default())
    }

    fn visit_field_equals(&mut self, field: &str, value: &FieldValue) -> StoreResult<Self::Output> {
        let condition = self.bind(field, value.to_key_value_bson()?);

        // Only the first binding of the sort key reaches the key condition;
        // validation guarantees there is no second one.
        if self.sort_key == Some(field) {
            self.sort_key = None;
            Ok(Conditions { key: vec![condition], filter: Vec::new() })
        } else {
            Ok(Conditions { key: Vec::new(), filter: vec![condition] })
        }
    }

    fn visit_and(&mut self, left: &Filter, right: &Filter) -> StoreResult<Self::Output> {
        let mut conditions = self.visit_filter(left)?;
        let other = self.visit_filter(right)?;

        conditions.key.extend(other.key);
        conditions.filter.extend(other.filter);

        Ok(conditions)
    }
}
