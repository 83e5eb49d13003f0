//! Query criteria, ordering and pagination
//!
//! [`Criteria`] is an AND-list of [`Predicate`]s accumulated by the filter
//! parser chain and consumed once by the repository query builder.
//!
//! # Example
//!
//! ```rust
//! use jsonapi_service::repository::{Criteria, OrderDirection, Pagination, Predicate};
//!
//! let criteria = Criteria::new()
//!     .and(Predicate::eq("status", "active"))
//!     .and(Predicate::gte("age", 18));
//! assert_eq!(criteria.len(), 2);
//!
//! let page = Pagination::page(3, 20);
//! assert_eq!(page.offset, 40);
//!
//! let order = ("name".to_string(), OrderDirection::Descending);
//! assert_eq!(order.1.to_string(), "desc");
//! ```

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde_json::Value;

use crate::error::{Error, ErrorSource};

/// Direction for ordering results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderDirection {
    /// Sort in ascending order (A-Z, 0-9)
    #[default]
    Ascending,
    /// Sort in descending order (Z-A, 9-0)
    Descending,
}

impl fmt::Display for OrderDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ascending => write!(f, "asc"),
            Self::Descending => write!(f, "desc"),
        }
    }
}

/// Ordered sort keys, most significant first
pub type Sort = Vec<(String, OrderDirection)>;

/// Offset/limit window over a query result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    /// Number of results to skip
    pub offset: u64,
    /// Maximum number of results to return
    pub limit: u64,
}

impl Pagination {
    /// Create new pagination parameters
    #[must_use]
    pub const fn new(offset: u64, limit: u64) -> Self {
        Self { offset, limit }
    }

    /// Pagination for a 1-indexed page number
    #[must_use]
    pub const fn page(page_number: u64, page_size: u64) -> Self {
        let offset = page_number.saturating_sub(1).saturating_mul(page_size);
        Self {
            offset,
            limit: page_size,
        }
    }
}

/// Comparison operators accepted in filter clauses
///
/// Everything except [`FilterOperator::ContainsInsensitive`] can be named in
/// a `filter[field][operator]` clause; that one is produced by free-text
/// search only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterOperator {
    /// `eq`
    Equal,
    /// `neq`
    NotEqual,
    /// `gt`
    GreaterThan,
    /// `gte`
    GreaterThanOrEqual,
    /// `lt`
    LessThan,
    /// `lte`
    LessThanOrEqual,
    /// `in`
    In,
    /// `notIn`
    NotIn,
    /// `contains`
    Contains,
    /// `startsWith`
    StartsWith,
    /// `endsWith`
    EndsWith,
    /// `isNull`
    IsNull,
    /// `isNotNull`
    IsNotNull,
    /// Case-insensitive substring match used by search
    ContainsInsensitive,
}

impl FilterOperator {
    /// Operators a client may name, in their wire spelling
    pub const ALLOWED: [&'static str; 13] = [
        "eq",
        "gt",
        "gte",
        "lt",
        "lte",
        "neq",
        "in",
        "notIn",
        "contains",
        "startsWith",
        "endsWith",
        "isNull",
        "isNotNull",
    ];

    /// Wire spelling of the operator
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Equal => "eq",
            Self::NotEqual => "neq",
            Self::GreaterThan => "gt",
            Self::GreaterThanOrEqual => "gte",
            Self::LessThan => "lt",
            Self::LessThanOrEqual => "lte",
            Self::In => "in",
            Self::NotIn => "notIn",
            Self::Contains => "contains",
            Self::StartsWith => "startsWith",
            Self::EndsWith => "endsWith",
            Self::IsNull => "isNull",
            Self::IsNotNull => "isNotNull",
            Self::ContainsInsensitive => "search",
        }
    }

    /// Whether the operator takes no value operand
    pub fn is_unary(&self) -> bool {
        matches!(self, Self::IsNull | Self::IsNotNull)
    }

    /// Whether the operand is a list
    pub fn takes_list(&self) -> bool {
        matches!(self, Self::In | Self::NotIn)
    }

    /// Parse a client-named operator for `field`
    ///
    /// Fails with a bad request naming the field and operator when the
    /// operator is outside the allow-list.
    pub fn parse_for(field: &str, operator: &str) -> Result<Self, Error> {
        operator.parse().map_err(|_| {
            Error::bad_request_at(
                format!(
                    "Unsupported filter operator \"{}\". Allowed operators: {}.",
                    operator,
                    Self::ALLOWED.join(", ")
                ),
                ErrorSource::filter(field, operator),
            )
        })
    }
}

impl fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned for an operator outside the allow-list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownOperator(pub String);

impl fmt::Display for UnknownOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown filter operator \"{}\"", self.0)
    }
}

impl std::error::Error for UnknownOperator {}

impl FromStr for FilterOperator {
    type Err = UnknownOperator;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "eq" => Self::Equal,
            "neq" => Self::NotEqual,
            "gt" => Self::GreaterThan,
            "gte" => Self::GreaterThanOrEqual,
            "lt" => Self::LessThan,
            "lte" => Self::LessThanOrEqual,
            "in" => Self::In,
            "notIn" => Self::NotIn,
            "contains" => Self::Contains,
            "startsWith" => Self::StartsWith,
            "endsWith" => Self::EndsWith,
            "isNull" => Self::IsNull,
            "isNotNull" => Self::IsNotNull,
            other => return Err(UnknownOperator(other.to_string())),
        })
    }
}

/// Operand of a predicate
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    /// String value
    String(String),
    /// 64-bit integer value
    Integer(i64),
    /// 64-bit floating point value
    Float(f64),
    /// Boolean value
    Boolean(bool),
    /// List of values (for `in` / `notIn`)
    List(Vec<FilterValue>),
    /// No operand (for `isNull` / `isNotNull`)
    Null,
}

impl FilterValue {
    /// Convert a decoded JSON value
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::String(s) => Self::String(s.clone()),
            Value::Bool(b) => Self::Boolean(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Integer(i),
                None => Self::Float(n.as_f64().unwrap_or_default()),
            },
            Value::Array(items) => Self::List(items.iter().map(Self::from_json).collect()),
            Value::Null => Self::Null,
            Value::Object(_) => Self::String(value.to_string()),
        }
    }

    /// List operand from an array or a comma-separated string
    pub fn list_from_json(value: &Value) -> Self {
        match value {
            Value::String(s) => Self::List(
                s.split(',')
                    .map(str::trim)
                    .filter(|item| !item.is_empty())
                    .map(|item| Self::String(item.to_string()))
                    .collect(),
            ),
            Value::Array(_) => Self::from_json(value),
            other => Self::List(vec![Self::from_json(other)]),
        }
    }

    fn as_text(&self) -> Option<String> {
        match self {
            Self::String(s) => Some(s.clone()),
            Self::Integer(i) => Some(i.to_string()),
            Self::Float(f) => Some(f.to_string()),
            Self::Boolean(b) => Some(b.to_string()),
            Self::List(_) | Self::Null => None,
        }
    }

    fn as_number(&self) -> Option<f64> {
        match self {
            Self::Integer(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            Self::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

impl From<&str> for FilterValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<i64> for FilterValue {
    fn from(n: i64) -> Self {
        Self::Integer(n)
    }
}

impl From<i32> for FilterValue {
    fn from(n: i32) -> Self {
        Self::Integer(i64::from(n))
    }
}

impl From<f64> for FilterValue {
    fn from(n: f64) -> Self {
        Self::Float(n)
    }
}

impl From<bool> for FilterValue {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

impl From<Vec<String>> for FilterValue {
    fn from(list: Vec<String>) -> Self {
        Self::List(list.into_iter().map(Self::String).collect())
    }
}

/// A single `(field, operator, value)` expression
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    /// The field name to filter on
    pub field: String,
    /// The comparison operator
    pub operator: FilterOperator,
    /// The value to compare against
    pub value: FilterValue,
}

impl Predicate {
    /// Create a new predicate
    pub fn new(field: impl Into<String>, operator: FilterOperator, value: FilterValue) -> Self {
        Self {
            field: field.into(),
            operator,
            value,
        }
    }

    /// `field == value`
    pub fn eq(field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::new(field, FilterOperator::Equal, value.into())
    }

    /// `field >= value`
    pub fn gte(field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::new(field, FilterOperator::GreaterThanOrEqual, value.into())
    }

    /// `field <= value`
    pub fn lte(field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::new(field, FilterOperator::LessThanOrEqual, value.into())
    }

    /// `field IN (values)`
    pub fn in_list(field: impl Into<String>, values: Vec<String>) -> Self {
        Self::new(field, FilterOperator::In, values.into())
    }

    /// Case-insensitive substring match
    pub fn search(field: impl Into<String>, term: impl Into<String>) -> Self {
        Self::new(
            field,
            FilterOperator::ContainsInsensitive,
            FilterValue::String(term.into()),
        )
    }

    /// Evaluate against the stored value of the field (`None` when absent)
    ///
    /// Values are compared numerically when both sides are numbers (or
    /// numeric strings), as booleans when both sides are booleans, and as
    /// strings otherwise. Absent and `null` values only satisfy `isNull`,
    /// `neq` and `notIn`.
    pub fn evaluate(&self, actual: Option<&Value>) -> bool {
        let actual = match actual {
            None | Some(Value::Null) => {
                return matches!(
                    self.operator,
                    FilterOperator::IsNull | FilterOperator::NotEqual | FilterOperator::NotIn
                );
            }
            Some(value) => value,
        };

        match self.operator {
            FilterOperator::IsNull => false,
            FilterOperator::IsNotNull => true,
            FilterOperator::Equal => loosely_equal(actual, &self.value),
            FilterOperator::NotEqual => !loosely_equal(actual, &self.value),
            FilterOperator::GreaterThan => compare(actual, &self.value) == Some(Ordering::Greater),
            FilterOperator::GreaterThanOrEqual => matches!(
                compare(actual, &self.value),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            FilterOperator::LessThan => compare(actual, &self.value) == Some(Ordering::Less),
            FilterOperator::LessThanOrEqual => matches!(
                compare(actual, &self.value),
                Some(Ordering::Less | Ordering::Equal)
            ),
            FilterOperator::In => list_contains(actual, &self.value),
            FilterOperator::NotIn => !list_contains(actual, &self.value),
            FilterOperator::Contains => text_test(actual, &self.value, |a, b| a.contains(b)),
            FilterOperator::StartsWith => text_test(actual, &self.value, |a, b| a.starts_with(b)),
            FilterOperator::EndsWith => text_test(actual, &self.value, |a, b| a.ends_with(b)),
            FilterOperator::ContainsInsensitive => text_test(actual, &self.value, |a, b| {
                a.to_lowercase().contains(&b.to_lowercase())
            }),
        }
    }
}

fn json_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn json_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn loosely_equal(actual: &Value, expected: &FilterValue) -> bool {
    if let Value::Array(items) = actual {
        return items.iter().any(|item| loosely_equal(item, expected));
    }
    if let (Value::Bool(a), FilterValue::Boolean(b)) = (actual, expected) {
        return a == b;
    }
    compare(actual, expected) == Some(Ordering::Equal)
}

fn compare(actual: &Value, expected: &FilterValue) -> Option<Ordering> {
    if let (Some(a), Some(b)) = (json_number(actual), expected.as_number()) {
        return a.partial_cmp(&b);
    }
    match (json_text(actual), expected.as_text()) {
        (Some(a), Some(b)) => Some(a.cmp(&b)),
        _ => None,
    }
}

fn list_contains(actual: &Value, list: &FilterValue) -> bool {
    match list {
        FilterValue::List(items) => items.iter().any(|item| loosely_equal(actual, item)),
        single => loosely_equal(actual, single),
    }
}

fn text_test(actual: &Value, expected: &FilterValue, test: impl Fn(&str, &str) -> bool) -> bool {
    match (json_text(actual), expected.as_text()) {
        (Some(a), Some(b)) => test(&a, &b),
        _ => false,
    }
}

/// AND-composed list of predicates
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Criteria {
    predicates: Vec<Predicate>,
}

impl Criteria {
    /// Empty criteria, matching everything
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a predicate
    #[must_use]
    pub fn and(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    /// Append a predicate in place
    pub fn push(&mut self, predicate: Predicate) {
        self.predicates.push(predicate);
    }

    /// Append all predicates of another criteria
    #[must_use]
    pub fn merge(mut self, other: Criteria) -> Self {
        self.predicates.extend(other.predicates);
        self
    }

    /// The accumulated predicates
    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    /// Number of predicates
    pub fn len(&self) -> usize {
        self.predicates.len()
    }

    /// Whether no predicate has been added
    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    /// Evaluate every predicate with `lookup` resolving field values
    pub fn matches<'a>(&self, lookup: impl Fn(&str) -> Option<&'a Value>) -> bool {
        self.predicates
            .iter()
            .all(|predicate| predicate.evaluate(lookup(&predicate.field)))
    }
}
