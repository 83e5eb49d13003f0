//! Resource registry
//!
//! The registry maps resource types to their validated definitions and hands
//! out repositories. It is assembled once by [`RegistryBuilder`] and is
//! read-only afterwards, so it can be shared across requests behind an `Arc`.

use std::any::TypeId;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use super::relationship::{Cardinality, RelationshipDescriptor, RelationshipsCollection};
use super::schema::{ResourceDeclaration, ResourceDefinition, ResourceSchema};
use super::{Resource, ResourceEntity, IDENTIFIER_FIELD};
use crate::error::{Error, Result};
use crate::repository::{EntityManager, ResourceRepository};

/// Collects resource schemas and validates them into a [`ResourceRegistry`]
#[derive(Default)]
pub struct RegistryBuilder {
    declarations: Vec<ResourceDeclaration>,
}

impl RegistryBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a resource class
    pub fn register<T: ResourceEntity>(mut self, schema: ResourceSchema<T>) -> Self {
        self.declarations.push(schema.into_declaration());
        self
    }

    /// Validate every registered class and build the registry
    ///
    /// Fails with [`Error::Configuration`] on the first invalid declaration:
    /// a malformed or duplicated type, a relationship targeting an
    /// unregistered type, or names that collide.
    pub fn build(self, manager: Arc<dyn EntityManager>) -> Result<ResourceRegistry> {
        let mut known_types = HashSet::new();
        let mut classes = HashMap::new();

        for declaration in &self.declarations {
            ResourceRegistry::verify_resource_interface(declaration)?;

            if !known_types.insert(declaration.resource_type.clone()) {
                return Err(Error::Configuration(format!(
                    "Resource type \"{}\" is registered more than once",
                    declaration.resource_type
                )));
            }
            if classes
                .insert(declaration.type_id, declaration.resource_type.clone())
                .is_some()
            {
                return Err(Error::Configuration(format!(
                    "Class {} is registered under more than one resource type",
                    declaration.class_name
                )));
            }
        }

        let backing_fields: HashMap<String, HashSet<String>> = self
            .declarations
            .iter()
            .map(|declaration| {
                let fields = declaration
                    .fields
                    .iter()
                    .map(|f| f.name.clone())
                    .chain(
                        declaration
                            .relationships
                            .iter()
                            .filter_map(|r| r.field.clone()),
                    )
                    .collect();
                (declaration.resource_type.clone(), fields)
            })
            .collect();

        let mut definitions = HashMap::with_capacity(self.declarations.len());
        for declaration in self.declarations {
            let relationships = Self::describe_relationships(&declaration, &known_types, &backing_fields)?;

            for path in &declaration.default_includes {
                let head = path.split('.').next().unwrap_or_default();
                if !relationships.has(head) {
                    return Err(Error::Configuration(format!(
                        "Default include \"{}\" of \"{}\" is not a relationship",
                        path, declaration.resource_type
                    )));
                }
            }

            tracing::debug!(
                resource_type = %declaration.resource_type,
                fields = declaration.fields.len(),
                relationships = relationships.len(),
                "Registered resource class"
            );

            let definition = declaration.into_definition(relationships);
            definitions.insert(definition.resource_type().to_string(), Arc::new(definition));
        }

        tracing::info!(resource_types = definitions.len(), "Resource registry built");

        Ok(ResourceRegistry {
            definitions,
            classes,
            manager,
        })
    }

    fn describe_relationships(
        declaration: &ResourceDeclaration,
        known_types: &HashSet<String>,
        backing_fields: &HashMap<String, HashSet<String>>,
    ) -> Result<RelationshipsCollection> {
        let mut descriptors = Vec::with_capacity(declaration.relationships.len());

        for relationship in &declaration.relationships {
            let descriptor = match relationship.cardinality {
                Cardinality::ToOne => RelationshipDescriptor::to_one(
                    relationship.name.clone(),
                    relationship.target_type.clone(),
                    relationship.field.clone(),
                    known_types,
                ),
                Cardinality::ToMany => RelationshipDescriptor::to_many(
                    relationship.name.clone(),
                    relationship.target_type.clone(),
                    relationship.mapped_by.clone(),
                    relationship.field.clone(),
                    known_types,
                ),
            }
            .map_err(|e| match e {
                Error::Configuration(message) => Error::Configuration(format!(
                    "{} (declared on \"{}\")",
                    message, declaration.resource_type
                )),
                other => other,
            })?;

            if let Some(mapped_by) = descriptor.mapped_by() {
                let target_fields = backing_fields.get(descriptor.target_type());
                if !target_fields.is_some_and(|fields| fields.contains(mapped_by)) {
                    return Err(Error::Configuration(format!(
                        "Relationship \"{}\" of \"{}\" is mapped by \"{}\", which \"{}\" does not declare",
                        descriptor.name(),
                        declaration.resource_type,
                        mapped_by,
                        descriptor.target_type()
                    )));
                }
            }

            descriptors.push(descriptor);
        }

        RelationshipsCollection::new(descriptors)
    }
}

/// Read-only lookup of registered resource classes
pub struct ResourceRegistry {
    definitions: HashMap<String, Arc<ResourceDefinition>>,
    classes: HashMap<TypeId, String>,
    manager: Arc<dyn EntityManager>,
}

impl ResourceRegistry {
    /// Start building a registry
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Check that a declaration satisfies the resource capability contract
    pub(crate) fn verify_resource_interface(declaration: &ResourceDeclaration) -> Result<()> {
        let resource_type = &declaration.resource_type;

        let valid_type = !resource_type.is_empty()
            && resource_type
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid_type {
            return Err(Error::Configuration(format!(
                "Invalid resource type \"{}\" for class {}",
                resource_type, declaration.class_name
            )));
        }

        let reserved = [IDENTIFIER_FIELD, "type"];
        for field in &declaration.fields {
            if reserved.contains(&field.name.as_str()) {
                return Err(Error::Configuration(format!(
                    "\"{}\" declares reserved field \"{}\"",
                    resource_type, field.name
                )));
            }
        }

        for relationship in &declaration.relationships {
            if reserved.contains(&relationship.name.as_str())
                || declaration.has_field(&relationship.name)
            {
                return Err(Error::Configuration(format!(
                    "Relationship \"{}\" of \"{}\" collides with a field",
                    relationship.name, resource_type
                )));
            }
        }

        for setter in declaration.attribute_setters.keys() {
            if !declaration.has_field(setter) {
                return Err(Error::Configuration(format!(
                    "Setter for undeclared field \"{}\" on \"{}\"",
                    setter, resource_type
                )));
            }
        }

        if let Some(search) = &declaration.search_field {
            if !declaration.has_field(search) {
                return Err(Error::Configuration(format!(
                    "Search field \"{}\" is not declared on \"{}\"",
                    search, resource_type
                )));
            }
        }

        for field in &declaration.filterable {
            let backing = declaration
                .relationships
                .iter()
                .any(|r| r.field.as_deref() == Some(field.as_str()));
            if field != IDENTIFIER_FIELD && !declaration.has_field(field) && !backing {
                return Err(Error::Configuration(format!(
                    "Filterable field \"{}\" is not declared on \"{}\"",
                    field, resource_type
                )));
            }
        }

        Ok(())
    }

    /// Definition registered for a resource type
    pub fn class_by_resource_type(&self, resource_type: &str) -> Result<&Arc<ResourceDefinition>> {
        self.definitions.get(resource_type).ok_or_else(|| {
            Error::not_found(format!(
                "Resource type \"{}\" is not registered.",
                resource_type
            ))
        })
    }

    /// Definition of the class an entity belongs to
    pub fn class_of(&self, entity: &dyn Resource) -> Result<&Arc<ResourceDefinition>> {
        self.class_by_resource_type(entity.resource_type())
    }

    /// Definition registered for an entity type
    pub fn definition_for<T: ResourceEntity>(&self) -> Option<&Arc<ResourceDefinition>> {
        self.classes
            .get(&TypeId::of::<T>())
            .and_then(|resource_type| self.definitions.get(resource_type))
    }

    /// Relationship descriptors of a resource type
    pub fn relationships_by_resource_type(
        &self,
        resource_type: &str,
    ) -> Result<&RelationshipsCollection> {
        self.class_by_resource_type(resource_type)
            .map(|definition| definition.relationships())
    }

    /// Repository for a registered class
    pub fn repository_by_class(&self, class: &Arc<ResourceDefinition>) -> ResourceRepository {
        ResourceRepository::new(Arc::clone(class), Arc::clone(&self.manager))
    }

    /// Repository for a resource type
    pub fn repository(&self, resource_type: &str) -> Result<ResourceRepository> {
        self.class_by_resource_type(resource_type)
            .map(|class| self.repository_by_class(class))
    }

    /// Shared persistence collaborator
    pub fn entity_manager(&self) -> &Arc<dyn EntityManager> {
        &self.manager
    }

    /// Registered resource types, sorted
    pub fn resource_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.definitions.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }
}

impl fmt::Debug for ResourceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceRegistry")
            .field("resource_types", &self.resource_types())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::InMemoryEntityManager;
    use crate::resource::FieldType;
    use crate::testing::{self, Page, Role, User};

    fn manager() -> Arc<dyn EntityManager> {
        Arc::new(InMemoryEntityManager::new())
    }

    #[test]
    fn test_lookup_by_type_and_class() {
        let registry = testing::registry(manager());

        let users = registry.class_by_resource_type("users").unwrap();
        assert_eq!(users.class_name(), "User");
        assert_eq!(
            registry.definition_for::<Page>().unwrap().resource_type(),
            "pages"
        );
        assert_eq!(registry.resource_types(), vec!["pages", "roles", "users"]);
        assert_eq!(
            registry.repository("roles").unwrap().definition().resource_type(),
            "roles"
        );
    }

    #[test]
    fn test_unknown_type_is_not_found() {
        let registry = testing::registry(manager());
        let err = registry.class_by_resource_type("ghosts").unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_relationships_are_resolved_once() {
        let registry = testing::registry(manager());
        let first = registry.relationships_by_resource_type("users").unwrap() as *const _;
        let second = registry.relationships_by_resource_type("users").unwrap() as *const _;
        assert_eq!(first, second);

        let relationships = registry.relationships_by_resource_type("users").unwrap();
        assert!(relationships.get("roles").unwrap().is_to_many());
        assert_eq!(relationships.get("pages").unwrap().mapped_by(), Some("user"));
    }

    #[test]
    fn test_unregistered_target_fails_at_build() {
        let result = ResourceRegistry::builder()
            .register(
                ResourceSchema::new(Page::default)
                    .attribute("title", FieldType::String, |p: &mut Page, v: String| p.title = v)
                    .to_one("user", "users", |p: &mut Page, id| p.user = id),
            )
            .build(manager());
        assert!(matches!(result, Err(Error::Configuration(_))));
    }

    #[test]
    fn test_duplicate_type_rejected() {
        let result = ResourceRegistry::builder()
            .register(ResourceSchema::new(Role::default).field("name", FieldType::String))
            .register(ResourceSchema::new(Role::default).field("name", FieldType::String))
            .build(manager());
        assert!(matches!(result, Err(Error::Configuration(_))));
    }

    #[test]
    fn test_reserved_field_rejected() {
        let result = ResourceRegistry::builder()
            .register(ResourceSchema::new(Role::default).field("id", FieldType::String))
            .build(manager());
        assert!(matches!(result, Err(Error::Configuration(_))));
    }

    #[test]
    fn test_relationship_field_collision_rejected() {
        let result = ResourceRegistry::builder()
            .register(
                ResourceSchema::new(User::default)
                    .field("roles", FieldType::Json)
                    .to_many("roles", "users", |u: &mut User, ids| u.roles = ids),
            )
            .build(manager());
        assert!(matches!(result, Err(Error::Configuration(_))));
    }

    #[test]
    fn test_default_include_must_be_relationship() {
        let result = ResourceRegistry::builder()
            .register(
                ResourceSchema::new(Role::default)
                    .field("name", FieldType::String)
                    .default_includes(["owner"]),
            )
            .build(manager());
        assert!(matches!(result, Err(Error::Configuration(_))));
    }
}
