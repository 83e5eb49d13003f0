//! Response serialization
//!
//! [`Serializer`] wraps transformed entities into JSON:API documents for one
//! request, applying its `fields`, `meta`, `include` and `exclude`
//! parameters. Includes are resolved breadth first through the repositories
//! of the related classes and deduplicated by `{type, id}`; a resource that is
//! part of the primary data is never repeated in `included`.
//!
//! | Operation      | Result                                   |
//! |----------------|------------------------------------------|
//! | [`item`]       | 200 with one resource object             |
//! | [`collection`] | 200 with an array, links and page meta   |
//! | [`created`]    | 201 with a `Location` header             |
//! | [`null`]       | 200 with `data: null`                    |
//! | [`no_content`] | 204 without a body                       |
//!
//! [`item`]: Serializer::item
//! [`collection`]: Serializer::collection
//! [`created`]: Serializer::created
//! [`null`]: Serializer::null
//! [`no_content`]: Serializer::no_content

mod document;
mod transformer;

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::Arc;

use serde_json::Value;

pub use document::{JsonApiDocument, JsonApiResponse};
pub use transformer::{
    linkage_value, RelationshipTransformer, ResourceTransformer, TransformContext, Transformer,
};

use crate::config::JsonApiConfig;
use crate::error::{Error, ErrorSource, Result};
use crate::repository::related_criteria;
use crate::request::{JsonApiRequest, PageSpec};
use crate::resource::{Linkage, Resource, ResourceDefinition, ResourceRegistry};

/// Relationship paths to include, as a tree
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IncludeTree {
    children: BTreeMap<String, IncludeTree>,
}

impl IncludeTree {
    /// Whether nothing is included
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Included relationships at this level
    pub fn children(&self) -> impl Iterator<Item = (&str, &IncludeTree)> {
        self.children.iter().map(|(name, child)| (name.as_str(), child))
    }

    /// Whether a dotted path is part of the tree
    pub fn contains(&self, path: &str) -> bool {
        let mut node = self;
        for segment in path.split('.') {
            match node.children.get(segment) {
                Some(child) => node = child,
                None => return false,
            }
        }
        true
    }
}

/// Pagination state of a collection response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageInfo {
    /// Requested page
    pub page: PageSpec,
    /// Matches across all pages
    pub total: u64,
}

/// Document builder for one request
#[derive(Debug, Clone, Copy)]
pub struct Serializer<'a> {
    registry: &'a ResourceRegistry,
    request: &'a JsonApiRequest,
    config: &'a JsonApiConfig,
}

impl<'a> Serializer<'a> {
    /// Serializer for `request`
    pub fn new(
        registry: &'a ResourceRegistry,
        request: &'a JsonApiRequest,
        config: &'a JsonApiConfig,
    ) -> Self {
        Self {
            registry,
            request,
            config,
        }
    }

    /// 200 with a single resource object
    pub async fn item(
        &self,
        definition: &Arc<ResourceDefinition>,
        entity: &dyn Resource,
        transformer: &dyn Transformer,
    ) -> Result<JsonApiResponse> {
        let document = self.single(definition, entity, transformer).await?;
        Ok(JsonApiResponse::ok(document))
    }

    /// 201 with the created resource and its `Location`
    pub async fn created(
        &self,
        definition: &Arc<ResourceDefinition>,
        entity: &dyn Resource,
        transformer: &dyn Transformer,
    ) -> Result<JsonApiResponse> {
        let document = self.single(definition, entity, transformer).await?;
        let location = self.config_link(definition.resource_type(), entity);
        Ok(JsonApiResponse::created(document, location))
    }

    /// 200 with an array of resource objects
    ///
    /// With `page` set, `meta.page` and the `first`/`last`/`prev`/`next`
    /// links are added next to `links.self`.
    pub async fn collection(
        &self,
        definition: &Arc<ResourceDefinition>,
        entities: &[Box<dyn Resource>],
        transformer: &dyn Transformer,
        page: Option<PageInfo>,
    ) -> Result<JsonApiResponse> {
        let primary: Vec<&dyn Resource> = entities.iter().map(|entity| entity.as_ref()).collect();
        let (data, included) = self.render(definition, &primary, transformer).await?;

        let base_url = &self.config.base_url;
        let mut document = JsonApiDocument::new(Value::Array(data))
            .with_link("self", self.request.self_link(base_url));
        document.included = included;

        if let Some(PageInfo { page, total }) = page {
            document = document.with_meta("page", page.meta(total));
            for (name, neighbour) in page.neighbours(total) {
                document = document.with_link(name, self.request.page_link(base_url, &neighbour));
            }
        }

        Ok(JsonApiResponse::ok(document))
    }

    /// 200 with `data: null`
    pub fn null(&self) -> JsonApiResponse {
        JsonApiResponse::ok(JsonApiDocument::null())
    }

    /// 204 without a body
    pub fn no_content(&self) -> JsonApiResponse {
        JsonApiResponse::no_content()
    }

    /// Parse and validate `include`/`exclude` against `definition`
    ///
    /// Without `include` the class's default includes apply, minus any
    /// `exclude` path and everything nested below it. Explicit includes are
    /// never excluded.
    pub fn include_tree(&self, definition: &Arc<ResourceDefinition>) -> Result<IncludeTree> {
        let requested = self.request.include()?;
        let paths = if requested.is_empty() {
            let exclude = self.request.exclude()?;
            definition
                .default_includes()
                .iter()
                .filter(|path| !exclude.iter().any(|excluded| is_within(path, excluded)))
                .cloned()
                .collect()
        } else {
            requested
        };

        let mut tree = IncludeTree::default();
        for path in &paths {
            let segments: Vec<&str> = path.split('.').collect();
            if segments.len() > self.config.max_include_depth {
                return Err(Error::bad_request_at(
                    format!(
                        "Include path \"{}\" exceeds the maximum depth of {}.",
                        path, self.config.max_include_depth
                    ),
                    ErrorSource::parameter("include"),
                ));
            }

            let mut class = Arc::clone(definition);
            let mut node = &mut tree;
            for segment in segments {
                let relationship = class.relationships().get(segment).ok_or_else(|| {
                    Error::bad_request_at(
                        format!(
                            "Relationship \"{}\" does not exist on \"{}\".",
                            segment,
                            class.resource_type()
                        ),
                        ErrorSource::parameter("include"),
                    )
                })?;
                let target = Arc::clone(self.registry.class_by_resource_type(relationship.target_type())?);
                node = node.children.entry(segment.to_string()).or_default();
                class = target;
            }
        }

        Ok(tree)
    }

    async fn single(
        &self,
        definition: &Arc<ResourceDefinition>,
        entity: &dyn Resource,
        transformer: &dyn Transformer,
    ) -> Result<JsonApiDocument> {
        let (mut data, included) = self.render(definition, &[entity], transformer).await?;
        let mut document = JsonApiDocument::new(data.pop().unwrap_or(Value::Null));
        document.included = included;
        Ok(document)
    }

    fn config_link(&self, resource_type: &str, entity: &dyn Resource) -> String {
        TransformContext::new(self.config.base_url.as_str())
            .resource_link(resource_type, &entity.resource_id().unwrap_or_default())
    }

    async fn render(
        &self,
        definition: &Arc<ResourceDefinition>,
        primary: &[&dyn Resource],
        transformer: &dyn Transformer,
    ) -> Result<(Vec<Value>, Vec<Value>)> {
        let mut context = TransformContext::new(self.config.base_url.as_str());

        if transformer.is_linkage_only() {
            let data = primary
                .iter()
                .map(|entity| transformer.transform(definition, *entity, &context))
                .collect();
            return Ok((data, Vec::new()));
        }

        context.fields = self.fields()?;
        context.meta = self.meta()?;

        let tree = self.include_tree(definition)?;
        let included = self.resolve_includes(definition, primary, &tree, &mut context).await?;

        let data = primary
            .iter()
            .map(|entity| transformer.transform(definition, *entity, &context))
            .collect();
        let included = included
            .iter()
            .map(|(class, entity)| ResourceTransformer.transform(class, entity.as_ref(), &context))
            .collect();

        Ok((data, included))
    }

    fn fields(&self) -> Result<BTreeMap<String, Vec<String>>> {
        let fields = self.request.fields()?;
        for resource_type in fields.keys() {
            if self.registry.class_by_resource_type(resource_type).is_err() {
                return Err(Error::bad_request_at(
                    format!("Resource type \"{}\" is not registered.", resource_type),
                    ErrorSource::parameter(format!("fields[{}]", resource_type)),
                ));
            }
        }
        Ok(fields)
    }

    fn meta(&self) -> Result<BTreeMap<String, Vec<String>>> {
        let meta = self.request.meta()?;
        for (resource_type, names) in &meta {
            let parameter = || ErrorSource::parameter(format!("meta[{}]", resource_type));
            let class = self.registry.class_by_resource_type(resource_type).map_err(|_| {
                Error::bad_request_at(
                    format!("Resource type \"{}\" is not registered.", resource_type),
                    parameter(),
                )
            })?;

            if let Some(unknown) = names
                .iter()
                .find(|name| !class.meta_names().any(|known| known == name.as_str()))
            {
                return Err(Error::bad_request_at(
                    format!(
                        "Meta \"{}\" is not defined on \"{}\".",
                        unknown, resource_type
                    ),
                    parameter(),
                ));
            }
        }
        Ok(meta)
    }

    async fn resolve_includes(
        &self,
        definition: &Arc<ResourceDefinition>,
        primary: &[&dyn Resource],
        tree: &IncludeTree,
        context: &mut TransformContext,
    ) -> Result<Vec<(Arc<ResourceDefinition>, Box<dyn Resource>)>> {
        let mut included = Vec::new();
        if tree.is_empty() {
            return Ok(included);
        }

        let mut seen: HashSet<(String, String)> = primary
            .iter()
            .filter_map(|entity| {
                entity
                    .resource_id()
                    .map(|id| (entity.resource_type().to_string(), id))
            })
            .collect();

        let mut queue: VecDeque<(Arc<ResourceDefinition>, Vec<Box<dyn Resource>>, &IncludeTree)> =
            VecDeque::new();
        queue.push_back((
            Arc::clone(definition),
            primary.iter().map(|entity| entity.clone_resource()).collect(),
            tree,
        ));

        while let Some((class, owners, node)) = queue.pop_front() {
            for (name, child) in node.children() {
                let Some(relationship) = class.relationships().get(name) else {
                    continue;
                };
                let target = Arc::clone(self.registry.class_by_resource_type(relationship.target_type())?);
                let repository = self.registry.repository_by_class(&target);

                let mut next: Vec<Box<dyn Resource>> = Vec::new();
                let mut next_ids: HashSet<String> = HashSet::new();

                for owner in &owners {
                    let related = repository
                        .resource_query_builder()
                        .filter(related_criteria(owner.as_ref(), relationship))
                        .fetch()
                        .await?;

                    if relationship.field().is_none() {
                        if let Some(owner_id) = owner.resource_id() {
                            context.resolved.insert(
                                (class.resource_type().to_string(), owner_id, name.to_string()),
                                Linkage::Many(related.iter().filter_map(|e| e.resource_id()).collect()),
                            );
                        }
                    }

                    for entity in related {
                        let Some(id) = entity.resource_id() else {
                            continue;
                        };
                        if seen.insert((target.resource_type().to_string(), id.clone())) {
                            included.push((Arc::clone(&target), entity.clone_resource()));
                        }
                        if next_ids.insert(id) {
                            next.push(entity);
                        }
                    }
                }

                if !child.is_empty() {
                    queue.push_back((target, next, child));
                }
            }
        }

        tracing::debug!(
            resource_type = definition.resource_type(),
            included = included.len(),
            "Resolved includes"
        );
        Ok(included)
    }
}

/// Whether `path` is `prefix` or nested below it
fn is_within(path: &str, prefix: &str) -> bool {
    path.strip_prefix(prefix)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('.'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::Target;
    use crate::testing::{self, User};
    use axum::body::Bytes;
    use axum::http::{Method, StatusCode, Uri};
    use serde_json::json;

    fn request(uri: &str) -> JsonApiRequest {
        let uri: Uri = uri.parse().unwrap();
        let target = Target::collection(uri.path().trim_start_matches('/').to_string());
        JsonApiRequest::new(Method::GET, target, &uri, &Bytes::new(), &JsonApiConfig::default()).unwrap()
    }

    async fn users(registry: &ResourceRegistry) -> Vec<Box<dyn Resource>> {
        registry
            .repository("users")
            .unwrap()
            .resource_query_builder()
            .fetch()
            .await
            .unwrap()
    }

    fn document(response: JsonApiResponse) -> Value {
        serde_json::to_value(response.document().unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_item_has_no_top_level_links() {
        let registry = testing::seeded_registry();
        let config = JsonApiConfig::default();
        let request = request("/users");
        let serializer = Serializer::new(&registry, &request, &config);
        let definition = registry.definition_for::<User>().unwrap();
        let user = registry.repository("users").unwrap().get("2").await.unwrap();

        let json = document(
            serializer
                .item(definition, user.as_ref(), &RelationshipTransformer)
                .await
                .unwrap(),
        );
        assert_eq!(
            json,
            json!({"data": {"id": "2", "type": "users", "links": {"self": "/users/2"}}})
        );
    }

    #[tokio::test]
    async fn test_collection_with_nested_includes_is_deduplicated() {
        let registry = testing::seeded_registry();
        let config = JsonApiConfig::default();
        let request = request("/pages?include=user.roles");
        let serializer = Serializer::new(&registry, &request, &config);
        let pages = registry.repository("pages").unwrap();
        let entities = pages.resource_query_builder().fetch().await.unwrap();

        let json = document(
            serializer
                .collection(pages.definition(), &entities, &ResourceTransformer, None)
                .await
                .unwrap(),
        );

        let included: Vec<(String, String)> = json["included"]
            .as_array()
            .unwrap()
            .iter()
            .map(|o| (o["type"].as_str().unwrap().to_string(), o["id"].as_str().unwrap().to_string()))
            .collect();
        assert_eq!(
            included,
            vec![("users".to_string(), "1".to_string()), ("roles".to_string(), "1".to_string())]
        );
        assert_eq!(json["links"]["self"], json!("/pages?include=user.roles"));
    }

    #[tokio::test]
    async fn test_inverse_include_sets_linkage() {
        let registry = testing::seeded_registry();
        let config = JsonApiConfig::default();
        let request = request("/users?include=pages");
        let serializer = Serializer::new(&registry, &request, &config);
        let definition = registry.definition_for::<User>().unwrap();
        let entities = users(&registry).await;

        let json = document(
            serializer
                .collection(definition, &entities, &ResourceTransformer, None)
                .await
                .unwrap(),
        );
        assert_eq!(
            json["data"][0]["relationships"]["pages"]["data"],
            json!([{"type": "pages", "id": "1"}, {"type": "pages", "id": "2"}])
        );
        assert_eq!(json["data"][2]["relationships"]["pages"]["data"], json!([]));
        assert_eq!(json["included"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_include_validation() {
        let registry = testing::seeded_registry();
        let mut config = JsonApiConfig::default();
        config.max_include_depth = 2;
        let definition = registry.definition_for::<User>().unwrap();

        for uri in ["/users?include=friends", "/users?include=pages.user.roles"] {
            let request = request(uri);
            let serializer = Serializer::new(&registry, &request, &config);
            let Err(Error::BadRequest(errors)) = serializer.include_tree(definition) else {
                panic!("expected a bad request for {}", uri);
            };
            let source = errors.iter().next().unwrap().source.clone().unwrap();
            assert_eq!(source.parameter.as_deref(), Some("include"));
        }

        let request = request("/users?include=pages.user,roles&exclude=roles");
        let tree = Serializer::new(&registry, &request, &config)
            .include_tree(definition)
            .unwrap();
        assert!(tree.contains("pages.user"));
        assert!(tree.contains("roles"));
    }

    #[tokio::test]
    async fn test_exclude_prunes_default_includes() {
        let registry = ResourceRegistry::builder()
            .register(testing::user_schema().default_includes(["roles", "pages.user"]))
            .register(testing::page_schema())
            .register(testing::role_schema())
            .build(testing::seeded_manager())
            .unwrap();
        let config = JsonApiConfig::default();
        let definition = registry.definition_for::<User>().unwrap();

        let defaults = request("/users");
        let tree = Serializer::new(&registry, &defaults, &config)
            .include_tree(definition)
            .unwrap();
        assert!(tree.contains("roles"));
        assert!(tree.contains("pages.user"));

        let excluded = request("/users?exclude=pages");
        let tree = Serializer::new(&registry, &excluded, &config)
            .include_tree(definition)
            .unwrap();
        assert!(tree.contains("roles"));
        assert!(!tree.contains("pages"));
        assert!(!tree.contains("pages.user"));

        let prefix_only = request("/users?exclude=page");
        let tree = Serializer::new(&registry, &prefix_only, &config)
            .include_tree(definition)
            .unwrap();
        assert!(tree.contains("pages.user"));
    }

    #[test]
    fn test_is_within() {
        assert!(is_within("pages", "pages"));
        assert!(is_within("pages.user", "pages"));
        assert!(!is_within("pages", "page"));
        assert!(!is_within("pages", "pages.user"));
    }

    #[tokio::test]
    async fn test_collection_pagination_links() {
        let registry = testing::seeded_registry();
        let config = JsonApiConfig::default();
        let request = request("/users?page%5Bnumber%5D=2&page%5Bsize%5D=1");
        let serializer = Serializer::new(&registry, &request, &config);
        let definition = registry.definition_for::<User>().unwrap();
        let page = request.page().unwrap();
        let entities = users(&registry).await;

        let response = serializer
            .collection(
                definition,
                &entities[1..2],
                &ResourceTransformer,
                Some(PageInfo { page, total: testing::USER_COUNT }),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = document(response);
        assert_eq!(json["meta"]["page"]["total"], json!(3));
        assert_eq!(
            json["links"]["next"],
            json!("/users?page%5Bnumber%5D=3&page%5Bsize%5D=1")
        );
        assert_eq!(
            json["links"]["prev"],
            json!("/users?page%5Bnumber%5D=1&page%5Bsize%5D=1")
        );
    }

    #[tokio::test]
    async fn test_unknown_meta_is_bad_request() {
        let registry = testing::seeded_registry();
        let config = JsonApiConfig::default();
        let definition = registry.definition_for::<User>().unwrap();
        let entities = users(&registry).await;

        let bogus = request("/users?meta%5Busers%5D=bogus");
        let result = Serializer::new(&registry, &bogus, &config)
            .collection(definition, &entities, &ResourceTransformer, None)
            .await;
        assert!(matches!(result, Err(Error::BadRequest(_))));

        let role_count = request("/users?meta%5Busers%5D=roleCount");
        let json = document(
            Serializer::new(&registry, &role_count, &config)
                .collection(definition, &entities, &ResourceTransformer, None)
                .await
                .unwrap(),
        );
        assert_eq!(json["data"][0]["meta"], json!({"roleCount": 1}));
    }

    #[tokio::test]
    async fn test_created_location() {
        let registry = testing::seeded_registry();
        let config = JsonApiConfig {
            base_url: "https://api.test".into(),
            ..JsonApiConfig::default()
        };
        let request = request("/users");
        let definition = registry.definition_for::<User>().unwrap();
        let user = User {
            id: Some("9".into()),
            ..User::default()
        };

        let response = Serializer::new(&registry, &request, &config)
            .created(definition, &user, &ResourceTransformer)
            .await
            .unwrap();
        let JsonApiResponse::Document { status, location, .. } = response else {
            panic!("expected a document");
        };
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(location.as_deref(), Some("https://api.test/users/9"));
    }
}
