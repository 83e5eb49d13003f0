//! Ordered composition of filter parsers

use super::FilterParser;
use crate::error::Result;
use crate::repository::Criteria;

/// Filter parsers applied in insertion order to one criteria value
#[derive(Default)]
pub struct CriteriaChain<'a> {
    parsers: Vec<Box<dyn FilterParser + 'a>>,
}

impl<'a> CriteriaChain<'a> {
    /// Create an empty chain
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a parser
    #[must_use]
    pub fn with(mut self, parser: impl FilterParser + 'a) -> Self {
        self.parsers.push(Box::new(parser));
        self
    }

    /// Number of parsers in the chain
    pub fn len(&self) -> usize {
        self.parsers.len()
    }

    /// Whether the chain has no parser
    pub fn is_empty(&self) -> bool {
        self.parsers.is_empty()
    }

    /// Thread `criteria` through every parser, stopping at the first error
    pub fn apply(&self, criteria: Criteria) -> Result<Criteria> {
        self.parsers
            .iter()
            .try_fold(criteria, |criteria, parser| parser.apply_filter(criteria))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::repository::Predicate;

    #[test]
    fn test_parsers_run_in_order() {
        let chain = CriteriaChain::new()
            .with(|c: Criteria| -> Result<Criteria> { Ok(c.and(Predicate::eq("a", "1"))) })
            .with(|c: Criteria| -> Result<Criteria> { Ok(c.and(Predicate::eq("b", "2"))) });

        let criteria = chain.apply(Criteria::new()).unwrap();
        let fields: Vec<_> = criteria.predicates().iter().map(|p| p.field.as_str()).collect();
        assert_eq!(fields, vec!["a", "b"]);
        assert_eq!(chain.len(), 2);
    }

    #[test]
    fn test_error_stops_chain() {
        let chain = CriteriaChain::new()
            .with(|_: Criteria| -> Result<Criteria> { Err(Error::bad_request("nope")) })
            .with(|_: Criteria| -> Result<Criteria> { panic!("must not run") });

        assert!(matches!(chain.apply(Criteria::new()), Err(Error::BadRequest(_))));
    }

    #[test]
    fn test_empty_chain_is_identity() {
        let criteria = Criteria::new().and(Predicate::eq("a", "1"));
        assert_eq!(CriteriaChain::new().apply(criteria.clone()).unwrap(), criteria);
    }
}
