//! Interpreter for key-value condition and update expressions.
//!
//! Understands the expressions rendered by the core crate:
//!
//! - conditions: `#name = :value` and `attribute_exists(#name)` clauses joined
//!   by ` AND `
//! - updates: `SET #name = :value` and `SET #name = list_append(#name, :value)`
//!   assignments separated by `, `
//!
//! Every name and value must be supplied through a placeholder, as the
//! rendered expressions always do.

use bson::Bson;
use std::collections::HashMap;

use tasklayer_core::{
    backend::Item,
    error::{StoreError, StoreResult},
};

use crate::evaluator::Comparable;

#[derive(Debug, Clone, PartialEq)]
enum Clause {
    Equals { name: String, value: Bson },
    Exists(String),
}

/// A parsed condition expression.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Condition {
    clauses: Vec<Clause>,
}

impl Condition {
    pub fn parse(
        expression: &str,
        names: &HashMap<String, String>,
        values: &HashMap<String, Bson>,
    ) -> StoreResult<Self> {
        let clauses = expression
            .split(" AND ")
            .map(str::trim)
            .map(|clause| {
                if let Some(inner) = clause
                    .strip_prefix("attribute_exists(")
                    .and_then(|rest| rest.strip_suffix(')'))
                {
                    return Ok(Clause::Exists(resolve_name(inner.trim(), names)?));
                }

                let (name, value) = clause
                    .split_once(" = ")
                    .ok_or_else(|| invalid(expression))?;

                Ok(Clause::Equals {
                    name: resolve_name(name.trim(), names)?,
                    value: resolve_value(value.trim(), values)?,
                })
            })
            .collect::<StoreResult<Vec<_>>>()?;

        Ok(Self { clauses })
    }

    pub fn evaluate(&self, item: &Item) -> bool {
        self.clauses.iter().all(|clause| match clause {
            Clause::Exists(name) => item.contains_key(name),
            Clause::Equals { name, value } => item
                .get(name)
                .is_some_and(|stored| Comparable::from(stored) == Comparable::from(value)),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Assignment {
    Set { name: String, value: Bson },
    Append { name: String, values: Vec<Bson> },
}

/// A parsed `SET` update expression.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct UpdateExpression {
    assignments: Vec<Assignment>,
}

impl UpdateExpression {
    pub fn parse(
        expression: &str,
        names: &HashMap<String, String>,
        values: &HashMap<String, Bson>,
    ) -> StoreResult<Self> {
        let body = expression
            .trim()
            .strip_prefix("SET ")
            .ok_or_else(|| invalid(expression))?;

        let mut assignments = Vec::new();
        for assignment in split_assignments(body) {
            let (target, source) = assignment
                .split_once(" = ")
                .ok_or_else(|| invalid(expression))?;
            let name = resolve_name(target.trim(), names)?;
            let source = source.trim();

            let Some(arguments) = source
                .strip_prefix("list_append(")
                .and_then(|rest| rest.strip_suffix(')'))
            else {
                assignments.push(Assignment::Set {
                    name,
                    value: resolve_value(source, values)?,
                });
                continue;
            };

            let (list, appended) = arguments
                .split_once(',')
                .ok_or_else(|| invalid(expression))?;
            if resolve_name(list.trim(), names)? != name {
                return Err(invalid(expression));
            }

            match resolve_value(appended.trim(), values)? {
                Bson::Array(values) => assignments.push(Assignment::Append { name, values }),
                _ => return Err(StoreError::Backend("list_append operands must be lists".to_string())),
            }
        }

        Ok(Self { assignments })
    }

    pub fn apply(&self, item: &mut Item) -> StoreResult<()> {
        for assignment in &self.assignments {
            match assignment {
                Assignment::Set { name, value } => {
                    item.insert(name.clone(), value.clone());
                }
                Assignment::Append { name, values } => match item.get_mut(name) {
                    Some(Bson::Array(list)) => list.extend(values.iter().cloned()),
                    _ => {
                        return Err(StoreError::Backend(format!(
                            "list_append target {name} is not a list"
                        )));
                    }
                },
            }
        }

        Ok(())
    }
}

/// Splits on top-level commas, leaving `list_append(a, b)` arguments intact.
fn split_assignments(body: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;

    for (index, character) in body.char_indices() {
        match character {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(body[start..index].trim());
                start = index + 1;
            }
            _ => {}
        }
    }
    parts.push(body[start..].trim());

    parts
}

fn resolve_name(token: &str, names: &HashMap<String, String>) -> StoreResult<String> {
    names
        .get(token)
        .cloned()
        .ok_or_else(|| StoreError::Backend(format!("undefined attribute name placeholder {token}")))
}

fn resolve_value(token: &str, values: &HashMap<String, Bson>) -> StoreResult<Bson> {
    values
        .get(token)
        .cloned()
        .ok_or_else(|| StoreError::Backend(format!("undefined attribute value placeholder {token}")))
}

fn invalid(expression: &str) -> StoreError {
    StoreError::Backend(format!("invalid expression: {expression}"))
}
