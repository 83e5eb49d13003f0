//! Persistence collaborator and per-class repositories
//!
//! - [`EntityManager`]: the persistence layer the JSON:API layer consumes
//!   (`find`, criteria queries, `persist` / `remove` / `flush`)
//! - [`ResourceRepository`]: gateway for one registered class, bound to an
//!   entity manager
//!
//! Writes are staged by `persist` and `remove` and become visible on
//! `flush`, so a request that fails validation never touches storage.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use super::criteria::{Criteria, Predicate};
use super::error::RepositoryError;
use super::query::{ResourceQuery, ResourceQueryBuilder};
use crate::error::{Error, ErrorObject, ErrorSource, Result};
use crate::resource::{
    Linkage, RelationshipDescriptor, Resource, ResourceDefinition, ResourceIdentifier,
    IDENTIFIER_FIELD,
};

/// Result type for repository operations
pub type RepositoryResult<T> = std::result::Result<T, RepositoryError>;

/// Persistence layer consumed by the JSON:API layer
///
/// Implementations must be safe to share across concurrent requests; the
/// registry holds a single instance behind an `Arc`.
#[async_trait]
pub trait EntityManager: Send + Sync {
    /// Load an entity by type and id
    async fn find(&self, resource_type: &str, id: &str) -> RepositoryResult<Option<Box<dyn Resource>>>;

    /// Run a criteria query, applying sort and pagination
    async fn query(&self, query: &ResourceQuery) -> RepositoryResult<Vec<Box<dyn Resource>>>;

    /// Count entities matching the query's criteria, ignoring pagination
    async fn count(&self, query: &ResourceQuery) -> RepositoryResult<u64>;

    /// Stage a new or changed entity
    async fn persist(&self, entity: &dyn Resource) -> RepositoryResult<()>;

    /// Stage an entity removal
    async fn remove(&self, entity: &dyn Resource) -> RepositoryResult<()>;

    /// Write all staged changes
    async fn flush(&self) -> RepositoryResult<()>;
}

/// Repository gateway for one registered class
#[derive(Clone)]
pub struct ResourceRepository {
    definition: Arc<ResourceDefinition>,
    manager: Arc<dyn EntityManager>,
}

impl ResourceRepository {
    /// Bind a class to an entity manager
    pub fn new(definition: Arc<ResourceDefinition>, manager: Arc<dyn EntityManager>) -> Self {
        Self {
            definition,
            manager,
        }
    }

    /// Class served by this repository
    pub fn definition(&self) -> &Arc<ResourceDefinition> {
        &self.definition
    }

    /// Underlying entity manager
    pub fn entity_manager(&self) -> &Arc<dyn EntityManager> {
        &self.manager
    }

    /// Start a query over this class
    pub fn resource_query_builder(&self) -> ResourceQueryBuilder<'_> {
        ResourceQueryBuilder::new(self)
    }

    /// Load an entity by id
    pub async fn find_by_id(&self, id: &str) -> Result<Option<Box<dyn Resource>>> {
        Ok(self
            .manager
            .find(self.definition.resource_type(), id)
            .await?)
    }

    /// Load an entity by id, failing with 404 when it does not exist
    pub async fn get(&self, id: &str) -> Result<Box<dyn Resource>> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| Error::resource_not_found(self.definition.resource_type(), id))
    }

    /// Load the entity an identifier refers to
    ///
    /// The identifier's type must be this repository's type (422 at
    /// `pointer` otherwise); an unresolvable id is a 404.
    pub async fn find_by_object_identifier(
        &self,
        identifier: &ResourceIdentifier,
        pointer: &str,
    ) -> Result<Box<dyn Resource>> {
        if identifier.resource_type != self.definition.resource_type() {
            return Err(Error::validation_at(
                format!(
                    "Resource identifier type \"{}\" does not match \"{}\".",
                    identifier.resource_type,
                    self.definition.resource_type()
                ),
                ErrorSource::pointer(format!("{}/type", pointer)),
            ));
        }

        match self.find_by_id(&identifier.id).await? {
            Some(entity) => Ok(entity),
            None => Err(Error::NotFound(
                ErrorObject::new(format!(
                    "Resource \"{}\" with id \"{}\" not found.",
                    identifier.resource_type, identifier.id
                ))
                .with_source(ErrorSource::pointer(pointer))
                .into(),
            )),
        }
    }

    /// Stage an entity of this class
    pub async fn persist(&self, entity: &dyn Resource) -> Result<()> {
        Ok(self.manager.persist(entity).await?)
    }

    /// Stage the removal of an entity of this class
    pub async fn remove(&self, entity: &dyn Resource) -> Result<()> {
        Ok(self.manager.remove(entity).await?)
    }

    /// Write staged changes
    pub async fn flush(&self) -> Result<()> {
        Ok(self.manager.flush().await?)
    }

    pub(crate) async fn run(&self, query: &ResourceQuery) -> Result<Vec<Box<dyn Resource>>> {
        Ok(self.manager.query(query).await?)
    }

    pub(crate) async fn run_count(&self, query: &ResourceQuery) -> Result<u64> {
        Ok(self.manager.count(query).await?)
    }
}

impl fmt::Debug for ResourceRepository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceRepository")
            .field("resource_type", &self.definition.resource_type())
            .finish_non_exhaustive()
    }
}

/// Criteria selecting the resources related to `owner` through `relationship`
///
/// Stored linkage is turned into an id match on the target type. Without
/// stored linkage an inverse relationship matches targets whose `mapped_by`
/// field holds the owner's id; anything else matches nothing.
pub fn related_criteria(owner: &dyn Resource, relationship: &RelationshipDescriptor) -> Criteria {
    let nothing = || Criteria::new().and(Predicate::in_list(IDENTIFIER_FIELD, Vec::new()));

    match relationship.linkage(owner) {
        Some(Linkage::One(Some(id))) => Criteria::new().and(Predicate::eq(IDENTIFIER_FIELD, id)),
        Some(Linkage::One(None)) => nothing(),
        Some(Linkage::Many(ids)) => Criteria::new().and(Predicate::in_list(IDENTIFIER_FIELD, ids)),
        None => match (relationship.mapped_by(), owner.resource_id()) {
            (Some(mapped_by), Some(owner_id)) => Criteria::new().and(Predicate::eq(mapped_by, owner_id)),
            _ => nothing(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::InMemoryEntityManager;
    use crate::testing::{self, Page, User};

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let registry = testing::seeded_registry();
        let repository = registry.repository("users").unwrap();
        assert!(repository.get("1").await.is_ok());
        assert!(matches!(
            repository.get("999").await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_find_by_object_identifier_validates_type() {
        let registry = testing::seeded_registry();
        let repository = registry.repository("users").unwrap();

        let found = repository
            .find_by_object_identifier(&ResourceIdentifier::new("users", "2"), "/data")
            .await
            .unwrap();
        assert_eq!(found.resource_id().as_deref(), Some("2"));

        let wrong_type = repository
            .find_by_object_identifier(&ResourceIdentifier::new("pages", "1"), "/data")
            .await;
        assert!(matches!(wrong_type, Err(Error::Validation(_))));

        let missing = repository
            .find_by_object_identifier(&ResourceIdentifier::new("users", "404"), "/data")
            .await;
        assert!(matches!(missing, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_related_criteria_forms() {
        let registry = testing::registry(Arc::new(InMemoryEntityManager::new()));
        let users = registry.relationships_by_resource_type("users").unwrap();
        let pages = registry.relationships_by_resource_type("pages").unwrap();

        let user = User {
            id: Some("1".into()),
            roles: vec!["1".into(), "2".into()],
            ..User::default()
        };
        let roles = related_criteria(&user, users.get("roles").unwrap());
        assert_eq!(roles.predicates()[0], Predicate::in_list("id", vec!["1".into(), "2".into()]));

        let inverse = related_criteria(&user, users.get("pages").unwrap());
        assert_eq!(inverse.predicates()[0], Predicate::eq("user", "1"));

        let orphan = Page::default();
        let owner = related_criteria(&orphan, pages.get("user").unwrap());
        assert!(!owner.matches(|_| None));
    }
}
