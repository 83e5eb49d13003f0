//! Free-text search

use serde_json::Value;

use super::FilterParser;
use crate::error::Result;
use crate::repository::{Criteria, Predicate};

/// Reserved sub-key carrying a search term inside a filter map
pub const SEARCH_KEY: &str = "search";

/// Adds a case-insensitive substring match on one field
///
/// The term is the whole `filter` parameter when it is a plain string, or
/// `filter[search]` when it is a map. Empty terms add nothing.
pub struct SearchFilterParser<'a> {
    filter: &'a Value,
    field: String,
}

impl<'a> SearchFilterParser<'a> {
    /// Search `field` using the term found in `filter`
    pub fn new(filter: &'a Value, field: impl Into<String>) -> Self {
        Self {
            filter,
            field: field.into(),
        }
    }

    fn term(&self) -> Option<&str> {
        let term = match self.filter {
            Value::String(term) => term.as_str(),
            Value::Object(map) => map.get(SEARCH_KEY)?.as_str()?,
            _ => return None,
        };
        let term = term.trim();
        (!term.is_empty()).then_some(term)
    }
}

impl FilterParser for SearchFilterParser<'_> {
    fn apply_filter(&self, criteria: Criteria) -> Result<Criteria> {
        Ok(match self.term() {
            Some(term) => criteria.and(Predicate::search(self.field.clone(), term)),
            None => criteria,
        })
    }
}
