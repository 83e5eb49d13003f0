//! Resource queries and the query builder

use super::criteria::{Criteria, OrderDirection, Pagination, Predicate, Sort};
use super::traits::ResourceRepository;
use crate::error::Result;
use crate::resource::Resource;

/// A criteria query over one resource type
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceQuery {
    /// Resource type being queried
    pub resource_type: String,
    /// AND-composed predicates
    pub criteria: Criteria,
    /// Sort keys, most significant first
    pub sort: Sort,
    /// Result window, `None` for all results
    pub pagination: Option<Pagination>,
}

impl ResourceQuery {
    /// Unfiltered query over a resource type
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            criteria: Criteria::new(),
            sort: Vec::new(),
            pagination: None,
        }
    }
}

/// Builder that accumulates a [`ResourceQuery`] and runs it
///
/// ```rust,ignore
/// let (users, total) = repository
///     .resource_query_builder()
///     .filter(criteria)
///     .order_by("name", OrderDirection::Descending)
///     .paginate(Some(Pagination::page(2, 10)))
///     .fetch_page()
///     .await?;
/// ```
#[derive(Debug)]
pub struct ResourceQueryBuilder<'a> {
    repository: &'a ResourceRepository,
    query: ResourceQuery,
}

impl<'a> ResourceQueryBuilder<'a> {
    pub(crate) fn new(repository: &'a ResourceRepository) -> Self {
        Self {
            query: ResourceQuery::new(repository.definition().resource_type()),
            repository,
        }
    }

    /// AND the given criteria into the query
    #[must_use]
    pub fn filter(mut self, criteria: Criteria) -> Self {
        self.query.criteria = std::mem::take(&mut self.query.criteria).merge(criteria);
        self
    }

    /// AND a single predicate into the query
    #[must_use]
    pub fn and_where(mut self, predicate: Predicate) -> Self {
        self.query.criteria.push(predicate);
        self
    }

    /// Append a sort key
    #[must_use]
    pub fn order_by(mut self, field: impl Into<String>, direction: OrderDirection) -> Self {
        self.query.sort.push((field.into(), direction));
        self
    }

    /// Append several sort keys
    #[must_use]
    pub fn sort(mut self, sort: Sort) -> Self {
        self.query.sort.extend(sort);
        self
    }

    /// Restrict the result window
    #[must_use]
    pub fn paginate(mut self, pagination: Option<Pagination>) -> Self {
        self.query.pagination = pagination;
        self
    }

    /// The query built so far
    pub fn query(&self) -> &ResourceQuery {
        &self.query
    }

    /// Consume the builder, returning the query
    pub fn into_query(self) -> ResourceQuery {
        self.query
    }

    /// Run the query
    pub async fn fetch(self) -> Result<Vec<Box<dyn Resource>>> {
        self.repository.run(&self.query).await
    }

    /// Count matching entities, ignoring pagination
    pub async fn count(self) -> Result<u64> {
        self.repository.run_count(&self.query).await
    }

    /// Run the query and count all matches
    pub async fn fetch_page(self) -> Result<(Vec<Box<dyn Resource>>, u64)> {
        let total = self.repository.run_count(&self.query).await?;
        let entities = self.repository.run(&self.query).await?;
        Ok((entities, total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    #[tokio::test]
    async fn test_builder_accumulates_query() {
        let registry = testing::seeded_registry();
        let repository = registry.repository("users").unwrap();

        let query = repository
            .resource_query_builder()
            .filter(Criteria::new().and(Predicate::eq("name", "Ada")))
            .and_where(Predicate::gte("age", 18))
            .order_by("name", OrderDirection::Descending)
            .paginate(Some(Pagination::new(10, 5)))
            .into_query();

        assert_eq!(query.resource_type, "users");
        assert_eq!(query.criteria.len(), 2);
        assert_eq!(query.sort, vec![("name".to_string(), OrderDirection::Descending)]);
        assert_eq!(query.pagination, Some(Pagination::new(10, 5)));
    }

    #[tokio::test]
    async fn test_fetch_page_counts_beyond_window() {
        let registry = testing::seeded_registry();
        let repository = registry.repository("users").unwrap();

        let (users, total) = repository
            .resource_query_builder()
            .paginate(Some(Pagination::new(0, 1)))
            .fetch_page()
            .await
            .unwrap();

        assert_eq!(users.len(), 1);
        assert_eq!(total, testing::USER_COUNT);
    }
}
