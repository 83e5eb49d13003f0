//! Resource manipulation
//!
//! [`ResourceManipulator`] creates entities and applies JSON:API payloads to
//! them through the setters registered on each schema. Hydration collects
//! every fault of a payload before failing, so one response reports all of
//! them, and it never persists: callers flush only after it succeeded.

use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::{Error, ErrorList, ErrorObject, ErrorSource, Result};
use crate::resource::{
    IdStrategy, Linkage, PropertyValue, RelationshipDescriptor, Resource, ResourceDefinition,
    ResourceIdentifier, ResourceRegistry,
};

/// Creates and mutates entities of registered resource classes
#[derive(Debug, Clone, Copy)]
pub struct ResourceManipulator<'a> {
    registry: &'a ResourceRegistry,
}

impl<'a> ResourceManipulator<'a> {
    /// Manipulator over the classes of `registry`
    pub fn new(registry: &'a ResourceRegistry) -> Self {
        Self { registry }
    }

    /// Instantiate a new entity and assign its id
    ///
    /// The class's [`IdStrategy`] decides whether `id` may, must or must not
    /// be supplied.
    pub fn create_resource(&self, resource_type: &str, id: Option<String>) -> Result<Box<dyn Resource>> {
        let definition = self.registry.class_by_resource_type(resource_type)?;

        let id = match (definition.id_strategy(), id) {
            (IdStrategy::ServerGenerated, Some(_)) => {
                return Err(Error::forbidden_at(
                    format!(
                        "Client-generated ids are not supported for \"{}\".",
                        resource_type
                    ),
                    ErrorSource::pointer("/data/id"),
                ))
            }
            (IdStrategy::ClientProvided, None) => {
                return Err(Error::validation_at(
                    format!("\"{}\" requires a client-generated id.", resource_type),
                    ErrorSource::pointer("/data/id"),
                ))
            }
            (_, Some(id)) => id,
            (_, None) => Uuid::new_v4().to_string(),
        };

        let mut entity = definition.instantiate();
        entity.assign_id(id);
        Ok(entity)
    }

    /// Apply the `attributes` and `relationships` of a resource object
    ///
    /// Unknown attributes, missing setters, unknown relationships, malformed
    /// linkage and unresolvable identifiers are all collected and returned
    /// together as one validation error.
    pub async fn hydrate_resource(
        &self,
        entity: &mut dyn Resource,
        data: &Map<String, Value>,
    ) -> Result<()> {
        let definition = self.registry.class_of(entity)?.clone();
        let mut errors = ErrorList::new();

        if let Some(Value::Object(attributes)) = data.get("attributes") {
            for (key, value) in attributes {
                let pointer = format!("/data/attributes/{}", key);

                if !definition.has_field(key) {
                    errors.push(
                        ErrorObject::new("Unknown attribute.").with_source(ErrorSource::pointer(&pointer)),
                    );
                }

                match definition.set_property(entity, key, PropertyValue::Attribute(value.clone())) {
                    Some(Ok(())) => {}
                    Some(Err(reason)) => errors.push(
                        ErrorObject::new(format!("Invalid value: {}.", reason))
                            .with_source(ErrorSource::pointer(&pointer)),
                    ),
                    None => errors.push(missing_setter(&definition, key)),
                }
            }
        }

        if let Some(Value::Object(relationships)) = data.get("relationships") {
            for (name, value) in relationships {
                let pointer = format!("/data/relationships/{}", name);

                let Some(relationship) = definition.relationships().get(name) else {
                    errors.push(
                        ErrorObject::new("Unknown relationship.").with_source(ErrorSource::pointer(&pointer)),
                    );
                    continue;
                };

                let Some(linkage) = value.as_object().and_then(|object| object.get("data")) else {
                    errors.push(
                        ErrorObject::new("Data is missing or not an array.")
                            .with_source(ErrorSource::pointer(&pointer)),
                    );
                    continue;
                };

                let outcome = match self
                    .resolve_linkage(relationship, linkage, &format!("{}/data", pointer))
                    .await
                {
                    Ok(linkage) => self.set_property(
                        &definition,
                        entity,
                        relationship.name(),
                        PropertyValue::Linkage(linkage),
                    ),
                    Err(e) => Err(e),
                };

                if let Err(e) = outcome {
                    accumulate(&mut errors, e)?;
                }
            }
        }

        if !errors.is_empty() {
            tracing::debug!(
                resource_type = definition.resource_type(),
                errors = errors.len(),
                "Hydration rejected"
            );
        }
        errors.into_result(()).map_err(Error::Validation)
    }

    /// Invoke the setter of a single field or relationship
    pub fn set_property(
        &self,
        definition: &ResourceDefinition,
        entity: &mut dyn Resource,
        field: &str,
        value: PropertyValue,
    ) -> Result<()> {
        match definition.set_property(entity, field, value) {
            Some(Ok(())) => Ok(()),
            Some(Err(reason)) => Err(Error::Validation(
                ErrorObject::new(format!("Invalid value: {}.", reason))
                    .with_source(ErrorSource::setter(definition.setter_name(field)))
                    .into(),
            )),
            None => Err(Error::Validation(missing_setter(definition, field).into())),
        }
    }

    /// Resolve relationship `data` into linkage
    ///
    /// To-one accepts an identifier or `null`, to-many an array of
    /// identifiers. Every identifier must name the relationship's target
    /// type (422) and an existing entity (404). `pointer` locates `data`.
    pub async fn resolve_linkage(
        &self,
        relationship: &RelationshipDescriptor,
        data: &Value,
        pointer: &str,
    ) -> Result<Linkage> {
        let repository = self.registry.repository(relationship.target_type())?;

        if relationship.is_to_one() {
            return match data {
                Value::Null => Ok(Linkage::One(None)),
                Value::Object(_) => {
                    let identifier = identifier_at(data, pointer)?;
                    repository.find_by_object_identifier(&identifier, pointer).await?;
                    Ok(Linkage::One(Some(identifier.id)))
                }
                _ => Err(Error::validation_at(
                    "Data must be a resource identifier or null.",
                    ErrorSource::pointer(pointer),
                )),
            };
        }

        let Value::Array(items) = data else {
            return Err(Error::validation_at(
                "Data is missing or not an array.",
                ErrorSource::pointer(pointer),
            ));
        };

        let mut ids: Vec<String> = Vec::with_capacity(items.len());
        let mut failures = Vec::new();
        for (index, item) in items.iter().enumerate() {
            let pointer = format!("{}/{}", pointer, index);
            let identifier = match identifier_at(item, &pointer) {
                Ok(identifier) => identifier,
                Err(e) => {
                    failures.push(e);
                    continue;
                }
            };

            if let Err(e) = repository.find_by_object_identifier(&identifier, &pointer).await {
                failures.push(e);
            } else if !ids.contains(&identifier.id) {
                ids.push(identifier.id);
            }
        }

        merge_failures(failures)?;
        Ok(Linkage::Many(ids))
    }
}

fn missing_setter(definition: &ResourceDefinition, field: &str) -> ErrorObject {
    ErrorObject::new("Missing property setter.")
        .with_source(ErrorSource::setter(definition.setter_name(field)))
}

fn identifier_at(value: &Value, pointer: &str) -> Result<ResourceIdentifier> {
    ResourceIdentifier::from_value(value).ok_or_else(|| {
        Error::validation_at(
            "Resource identifier must have a type and an id.",
            ErrorSource::pointer(pointer),
        )
    })
}

/// Combine the failures of a linkage array's members into one error
///
/// Members that are all missing stay a 404; any other mix becomes a
/// validation error with each member's status recorded.
fn merge_failures(mut failures: Vec<Error>) -> Result<()> {
    if failures.len() <= 1 {
        return failures.pop().map_or(Ok(()), Err);
    }

    let all_missing = failures
        .iter()
        .all(|e| e.status_code() == axum::http::StatusCode::NOT_FOUND);
    let mut errors = ErrorList::new();
    for error in failures {
        if all_missing {
            errors.extend(error.errors());
        } else {
            accumulate(&mut errors, error)?;
        }
    }

    Err(if all_missing {
        Error::NotFound(errors)
    } else {
        Error::Validation(errors)
    })
}

/// Add a request-time error to `errors`; server faults are returned instead
fn accumulate(errors: &mut ErrorList, error: Error) -> Result<()> {
    let status = error.status_code();
    if status.is_server_error() {
        return Err(error);
    }

    let tagged = error
        .errors()
        .into_iter()
        .map(|mut object| {
            if object.status.is_none() && status != axum::http::StatusCode::UNPROCESSABLE_ENTITY {
                object.status = Some(status.as_u16().to_string());
            }
            object
        })
        .collect();
    errors.extend(tagged);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{self, Page, User};
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    fn details(error: Error) -> Vec<(String, ErrorSource)> {
        error
            .errors()
            .into_iter()
            .map(|e| (e.detail, e.source.unwrap_or_default()))
            .collect()
    }

    #[test]
    fn test_create_resource_id_strategies() {
        let registry = testing::seeded_registry();
        let manipulator = ResourceManipulator::new(&registry);

        let user = manipulator.create_resource("users", None).unwrap();
        assert!(Uuid::parse_str(&user.resource_id().unwrap()).is_ok());

        assert!(matches!(
            manipulator.create_resource("users", Some("9".into())),
            Err(Error::Forbidden(_))
        ));
        assert!(matches!(
            manipulator.create_resource("roles", None),
            Err(Error::Validation(_))
        ));
        assert_eq!(
            manipulator
                .create_resource("roles", Some("editor".into()))
                .unwrap()
                .resource_id()
                .as_deref(),
            Some("editor")
        );
    }

    #[tokio::test]
    async fn test_hydrate_sets_attributes_and_relationships() {
        let registry = testing::seeded_registry();
        let manipulator = ResourceManipulator::new(&registry);
        let mut user = manipulator.create_resource("users", None).unwrap();

        let data = object(json!({
            "type": "users",
            "attributes": {"name": "Barbara", "age": 30},
            "relationships": {"roles": {"data": [{"type": "roles", "id": "2"}, {"type": "roles", "id": "2"}]}}
        }));
        manipulator.hydrate_resource(user.as_mut(), &data).await.unwrap();

        let user = user.downcast_ref::<User>().unwrap();
        assert_eq!(user.name, "Barbara");
        assert_eq!(user.age, 30);
        assert_eq!(user.roles, vec!["2"]);
    }

    #[tokio::test]
    async fn test_unknown_attribute_yields_two_errors() {
        let registry = testing::seeded_registry();
        let manipulator = ResourceManipulator::new(&registry);
        let mut user = manipulator.create_resource("users", None).unwrap();

        let data = object(json!({"attributes": {"bogus": 1}}));
        let error = manipulator.hydrate_resource(user.as_mut(), &data).await.unwrap_err();
        assert_eq!(error.status_code(), axum::http::StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            details(error),
            vec![
                (
                    "Unknown attribute.".to_string(),
                    ErrorSource::pointer("/data/attributes/bogus")
                ),
                (
                    "Missing property setter.".to_string(),
                    ErrorSource::setter("User::setBogus")
                ),
            ]
        );
    }

    #[tokio::test]
    async fn test_non_array_relationship_yields_one_error() {
        let registry = testing::seeded_registry();
        let manipulator = ResourceManipulator::new(&registry);
        let mut user = manipulator.create_resource("users", None).unwrap();

        let data = object(json!({"relationships": {"roles": 1}}));
        let error = manipulator.hydrate_resource(user.as_mut(), &data).await.unwrap_err();
        assert_eq!(
            details(error),
            vec![(
                "Data is missing or not an array.".to_string(),
                ErrorSource::pointer("/data/relationships/roles")
            )]
        );
    }

    #[tokio::test]
    async fn test_errors_accumulate_across_payload() {
        let registry = testing::seeded_registry();
        let manipulator = ResourceManipulator::new(&registry);
        let mut page = manipulator.create_resource("pages", None).unwrap();

        let data = object(json!({
            "attributes": {"title": 5},
            "relationships": {
                "owner": {"data": null},
                "user": {"data": {"type": "users", "id": "404"}}
            }
        }));
        let error = manipulator.hydrate_resource(page.as_mut(), &data).await.unwrap_err();
        let Error::Validation(errors) = error else {
            panic!("expected a validation error");
        };
        assert_eq!(errors.len(), 3);

        let missing = errors
            .iter()
            .find(|e| e.source.as_ref().and_then(|s| s.pointer.as_deref()) == Some("/data/relationships/user/data"))
            .unwrap();
        assert_eq!(missing.status.as_deref(), Some("404"));
    }

    #[tokio::test]
    async fn test_to_one_linkage_rules() {
        let registry = testing::seeded_registry();
        let manipulator = ResourceManipulator::new(&registry);
        let pages = registry.relationships_by_resource_type("pages").unwrap();
        let user = pages.get("user").unwrap();

        assert_eq!(
            manipulator.resolve_linkage(user, &Value::Null, "/data").await.unwrap(),
            Linkage::One(None)
        );
        assert_eq!(
            manipulator
                .resolve_linkage(user, &json!({"type": "users", "id": "2"}), "/data")
                .await
                .unwrap(),
            Linkage::One(Some("2".into()))
        );
        assert!(matches!(
            manipulator
                .resolve_linkage(user, &json!({"type": "roles", "id": "1"}), "/data")
                .await,
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            manipulator.resolve_linkage(user, &json!([]), "/data").await,
            Err(Error::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_to_many_linkage_reports_every_bad_member() {
        let registry = testing::seeded_registry();
        let manipulator = ResourceManipulator::new(&registry);
        let users = registry.relationships_by_resource_type("users").unwrap();
        let roles = users.get("roles").unwrap();

        let data = json!([
            {"type": "roles", "id": "9"},
            {"type": "roles", "id": "1"},
            {"type": "users", "id": "1"},
            {"type": "roles", "id": "8"}
        ]);
        let Err(Error::Validation(errors)) = manipulator.resolve_linkage(roles, &data, "/data").await
        else {
            panic!("expected a validation error");
        };
        let reported: Vec<(Option<&str>, Option<&str>)> = errors
            .iter()
            .map(|e| {
                (
                    e.source.as_ref().and_then(|s| s.pointer.as_deref()),
                    e.status.as_deref(),
                )
            })
            .collect();
        assert_eq!(
            reported,
            vec![
                (Some("/data/0"), Some("404")),
                (Some("/data/2/type"), None),
                (Some("/data/3"), Some("404")),
            ]
        );

        let missing = json!([{"type": "roles", "id": "9"}, {"type": "roles", "id": "8"}]);
        let Err(Error::NotFound(errors)) = manipulator.resolve_linkage(roles, &missing, "/data").await
        else {
            panic!("expected a not found error");
        };
        assert_eq!(errors.len(), 2);
    }

    #[tokio::test]
    async fn test_hydrate_points_at_each_unresolved_member() {
        let registry = testing::seeded_registry();
        let manipulator = ResourceManipulator::new(&registry);
        let mut user = manipulator.create_resource("users", None).unwrap();

        let data = object(json!({
            "relationships": {"roles": {"data": [
                {"type": "roles", "id": "1"},
                {"type": "roles", "id": "7"},
                {"type": "roles", "id": "8"}
            ]}}
        }));
        let error = manipulator.hydrate_resource(user.as_mut(), &data).await.unwrap_err();
        let pointers: Vec<String> = details(error)
            .into_iter()
            .filter_map(|(_, source)| source.pointer)
            .collect();
        assert_eq!(
            pointers,
            vec!["/data/relationships/roles/data/1", "/data/relationships/roles/data/2"]
        );
    }

    #[tokio::test]
    async fn test_set_property_without_setter() {
        let registry = testing::seeded_registry();
        let manipulator = ResourceManipulator::new(&registry);
        let definition = registry.definition_for::<User>().unwrap();
        let mut user = User::default();

        let error = manipulator
            .set_property(
                definition,
                &mut user,
                "pages",
                PropertyValue::Linkage(Linkage::Many(vec![])),
            )
            .unwrap_err();
        assert_eq!(
            details(error),
            vec![(
                "Missing property setter.".to_string(),
                ErrorSource::setter("User::setPages")
            )]
        );

        let page_definition = registry.definition_for::<Page>().unwrap();
        let mut page = Page::default();
        manipulator
            .set_property(
                page_definition,
                &mut page,
                "user",
                PropertyValue::Linkage(Linkage::One(Some("3".into()))),
            )
            .unwrap();
        assert_eq!(page.user.as_deref(), Some("3"));
    }
}
