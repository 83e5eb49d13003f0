//! Per-field filter clauses

use serde_json::{Map, Value};

use super::FilterParser;
use crate::error::{Error, ErrorSource, Result};
use crate::repository::{Criteria, FilterOperator, FilterValue, Predicate};

/// Translates `filter[field]` entries of the configured fields into predicates
///
/// Per field, every shape present is applied and the results are AND-ed:
///
/// - a scalar, or an `eq` sub-key: equality
/// - `start` and/or `end`: `>=` / `<=` bounds
/// - `operator` (+ `value`): a clause with an allow-listed operator
/// - an array: membership
///
/// A field may therefore carry both an equality and an operator clause,
/// in which case both must hold.
pub struct ArrayFilterParser<'a> {
    filter: &'a Value,
    fields: Vec<String>,
}

impl<'a> ArrayFilterParser<'a> {
    /// Parse `filter` for the given filterable fields
    pub fn new(filter: &'a Value, fields: Vec<String>) -> Self {
        Self { filter, fields }
    }

    fn field_predicates(field: &str, value: &Value, criteria: &mut Criteria) -> Result<()> {
        match value {
            Value::String(_) | Value::Number(_) | Value::Bool(_) => {
                criteria.push(Predicate::eq(field, FilterValue::from_json(value)));
            }
            Value::Array(_) => {
                criteria.push(Predicate::new(
                    field,
                    FilterOperator::In,
                    FilterValue::list_from_json(value),
                ));
            }
            Value::Object(clause) => Self::clause_predicates(field, clause, criteria)?,
            Value::Null => {}
        }
        Ok(())
    }

    fn clause_predicates(field: &str, clause: &Map<String, Value>, criteria: &mut Criteria) -> Result<()> {
        if let Some(value) = clause.get("eq") {
            criteria.push(Predicate::eq(field, FilterValue::from_json(value)));
        }
        if let Some(start) = clause.get("start") {
            criteria.push(Predicate::gte(field, FilterValue::from_json(start)));
        }
        if let Some(end) = clause.get("end") {
            criteria.push(Predicate::lte(field, FilterValue::from_json(end)));
        }

        let Some(operator) = clause.get("operator") else {
            return Ok(());
        };
        let name = operator.as_str().ok_or_else(|| {
            Error::bad_request_at(
                "Filter operator must be a string.",
                ErrorSource::filter(field, operator.to_string()),
            )
        })?;
        let operator = FilterOperator::parse_for(field, name)?;

        let value = if operator.is_unary() {
            FilterValue::Null
        } else {
            let value = clause.get("value").filter(|v| !v.is_null()).ok_or_else(|| {
                Error::bad_request_at(
                    format!("Filter operator \"{}\" requires a value.", name),
                    ErrorSource::filter(field, name),
                )
            })?;
            if operator.takes_list() {
                FilterValue::list_from_json(value)
            } else {
                FilterValue::from_json(value)
            }
        };

        criteria.push(Predicate::new(field, operator, value));
        Ok(())
    }
}

impl FilterParser for ArrayFilterParser<'_> {
    fn apply_filter(&self, mut criteria: Criteria) -> Result<Criteria> {
        let Value::Object(filter) = self.filter else {
            return Ok(criteria);
        };

        for field in &self.fields {
            if let Some(value) = filter.get(field) {
                Self::field_predicates(field, value, &mut criteria)?;
            }
        }
        Ok(criteria)
    }
}
