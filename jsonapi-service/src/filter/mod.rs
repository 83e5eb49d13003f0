//! Filter parser chain
//!
//! Each [`FilterParser`] inspects the decoded `filter` query parameter and
//! appends predicates to the [`Criteria`] it is handed. A [`CriteriaChain`]
//! threads one criteria value through its parsers in order.
//!
//! Accepted `filter` shapes:
//!
//! | Query | Predicate |
//! |---|---|
//! | `filter=ada` | search field contains `ada` (case-insensitive) |
//! | `filter[search]=ada` | same as above |
//! | `filter[name]=Ada` | `name = Ada` |
//! | `filter[age][start]=18&filter[age][end]=30` | `age >= 18 AND age <= 30` |
//! | `filter[age][operator]=gt&filter[age][value]=18` | `age > 18` |
//! | `filter[email][operator]=isNull` | `email IS NULL` |

mod array;
mod chain;
mod search;

use serde_json::Value;

pub use array::ArrayFilterParser;
pub use chain::CriteriaChain;
pub use search::SearchFilterParser;

use crate::error::Result;
use crate::repository::Criteria;
use crate::resource::ResourceDefinition;

/// A step of the filter chain
pub trait FilterParser: Send + Sync {
    /// Extend `criteria` with the predicates this parser derives
    fn apply_filter(&self, criteria: Criteria) -> Result<Criteria>;
}

impl<F> FilterParser for F
where
    F: Fn(Criteria) -> Result<Criteria> + Send + Sync,
{
    fn apply_filter(&self, criteria: Criteria) -> Result<Criteria> {
        self(criteria)
    }
}

/// Chain configured from a class's search field and filterable fields
pub fn chain_for<'a>(definition: &ResourceDefinition, filter: Option<&'a Value>) -> CriteriaChain<'a> {
    let mut chain = CriteriaChain::new();
    if let Some(filter) = filter {
        if let Some(search_field) = definition.search_field() {
            chain = chain.with(SearchFilterParser::new(filter, search_field));
        }
        if !definition.filterable().is_empty() {
            chain = chain.with(ArrayFilterParser::new(filter, definition.filterable().to_vec()));
        }
    }
    chain
}
