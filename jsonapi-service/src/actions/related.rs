//! Read actions on related and relationships endpoints

use std::sync::Arc;

use async_trait::async_trait;

use super::{list, Action, ActionContext, Execution, Outcome};
use crate::error::Result;
use crate::repository::related_criteria;
use crate::request::ResolvedRequest;
use crate::serializer::{RelationshipTransformer, ResourceTransformer, Transformer};

/// Target of a to-one relationship, or `null`
async fn related_item(context: &ActionContext<'_>, resolved: &ResolvedRequest) -> Result<Execution> {
    let relationship = resolved.relationship()?;
    let target = Arc::clone(context.registry.class_by_resource_type(relationship.target_type())?);
    let repository = context.registry.repository_by_class(&target);

    let mut related = repository
        .resource_query_builder()
        .filter(related_criteria(resolved.entity()?, relationship))
        .fetch()
        .await?;

    let outcome = if related.is_empty() {
        Outcome::Null
    } else {
        Outcome::Item(related.swap_remove(0))
    };
    Ok(Execution::new(target, outcome))
}

/// Targets of a to-many relationship, filtered and paginated
async fn related_collection(
    context: &ActionContext<'_>,
    resolved: &ResolvedRequest,
) -> Result<Execution> {
    let relationship = resolved.relationship()?;
    let target = Arc::clone(context.registry.class_by_resource_type(relationship.target_type())?);
    let repository = context.registry.repository_by_class(&target);

    let (entities, page) = list(
        &repository,
        &resolved.request,
        related_criteria(resolved.entity()?, relationship),
    )
    .await?;
    Ok(Execution::new(
        target,
        Outcome::Collection {
            entities,
            page: Some(page),
        },
    ))
}

/// `GET /{type}/{id}/{relationship}` on a to-one relationship
#[derive(Debug, Clone, Copy, Default)]
pub struct ShowRelated;

#[async_trait]
impl Action for ShowRelated {
    fn name(&self) -> &'static str {
        "showRelated"
    }

    fn transformer(&self) -> &'static dyn Transformer {
        &ResourceTransformer
    }

    async fn execute(
        &self,
        context: &ActionContext<'_>,
        resolved: &mut ResolvedRequest,
    ) -> Result<Execution> {
        related_item(context, resolved).await
    }
}

/// `GET /{type}/{id}/{relationship}` on a to-many relationship
#[derive(Debug, Clone, Copy, Default)]
pub struct ListRelated;

#[async_trait]
impl Action for ListRelated {
    fn name(&self) -> &'static str {
        "listRelated"
    }

    fn transformer(&self) -> &'static dyn Transformer {
        &ResourceTransformer
    }

    async fn execute(
        &self,
        context: &ActionContext<'_>,
        resolved: &mut ResolvedRequest,
    ) -> Result<Execution> {
        related_collection(context, resolved).await
    }
}

/// `GET /{type}/{id}/relationships/{relationship}` on a to-one relationship
#[derive(Debug, Clone, Copy, Default)]
pub struct ShowRelationship;

#[async_trait]
impl Action for ShowRelationship {
    fn name(&self) -> &'static str {
        "showRelationship"
    }

    fn transformer(&self) -> &'static dyn Transformer {
        &RelationshipTransformer
    }

    async fn execute(
        &self,
        context: &ActionContext<'_>,
        resolved: &mut ResolvedRequest,
    ) -> Result<Execution> {
        related_item(context, resolved).await
    }
}

/// `GET /{type}/{id}/relationships/{relationship}` on a to-many relationship
#[derive(Debug, Clone, Copy, Default)]
pub struct ListRelationships;

#[async_trait]
impl Action for ListRelationships {
    fn name(&self) -> &'static str {
        "listRelationships"
    }

    fn transformer(&self) -> &'static dyn Transformer {
        &RelationshipTransformer
    }

    async fn execute(
        &self,
        context: &ActionContext<'_>,
        resolved: &mut ResolvedRequest,
    ) -> Result<Execution> {
        related_collection(context, resolved).await
    }
}

#[cfg(test)]
mod tests {
    use super::super::dispatch;
    use super::*;
    use crate::config::JsonApiConfig;
    use crate::request::{JsonApiRequest, Target};
    use crate::serializer::JsonApiResponse;
    use crate::testing;
    use axum::body::Bytes;
    use axum::http::{Method, Uri};
    use serde_json::{json, Value};

    async fn get(target: Target, uri: &str) -> JsonApiResponse {
        let registry = testing::seeded_registry();
        let config = JsonApiConfig::default();
        let gate = testing::gate();
        let actor = testing::root();
        let context = ActionContext {
            registry: &registry,
            gate: &gate,
            config: &config,
            actor: &actor,
        };
        let uri: Uri = uri.parse().unwrap();
        let request = JsonApiRequest::new(Method::GET, target, &uri, &Bytes::new(), &config).unwrap();
        dispatch(&context, request).await.unwrap()
    }

    fn data(response: &JsonApiResponse) -> &Value {
        &response.document().unwrap().data
    }

    #[tokio::test]
    async fn test_show_related_to_one() {
        let response = get(Target::related("pages", "1", "user"), "/pages/1/user").await;
        assert_eq!(data(&response)["type"], json!("users"));
        assert_eq!(data(&response)["attributes"]["name"], json!("Ada"));

        let empty = get(Target::related("pages", "3", "user"), "/pages/3/user").await;
        assert_eq!(data(&empty), &Value::Null);
    }

    #[tokio::test]
    async fn test_list_related_inverse_with_filter() {
        let response = get(Target::related("users", "1", "pages"), "/users/1/pages").await;
        assert_eq!(data(&response).as_array().unwrap().len(), 2);
        assert_eq!(response.document().unwrap().links["self"], json!("/users/1/pages"));

        let filtered = get(
            Target::related("users", "1", "pages"),
            "/users/1/pages?filter=Notes",
        )
        .await;
        let pages = data(&filtered).as_array().unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0]["id"], json!("2"));
    }

    #[tokio::test]
    async fn test_relationship_linkage_only() {
        let one = get(
            Target::relationships("pages", "1", "user"),
            "/pages/1/relationships/user",
        )
        .await;
        assert_eq!(
            data(&one),
            &json!({"id": "1", "type": "users", "links": {"self": "/users/1"}})
        );

        let many = get(
            Target::relationships("users", "1", "roles"),
            "/users/1/relationships/roles?include=roles",
        )
        .await;
        assert_eq!(
            data(&many),
            &json!([{"id": "1", "type": "roles", "links": {"self": "/roles/1"}}])
        );
        assert!(many.document().unwrap().included.is_empty());
    }
}
