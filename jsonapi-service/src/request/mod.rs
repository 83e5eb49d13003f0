//! JSON:API request abstraction
//!
//! [`JsonApiRequest`] wraps one HTTP request against a resource endpoint and
//! exposes its JSON:API parameters (`include`, `exclude`, `fields`, `meta`,
//! `filter`, `sort`, `page`) and body. [`JsonApiRequest::resolve`] looks the
//! route parameters up in the registry, yielding a [`ResolvedRequest`] with
//! the resource class, the addressed entity and the addressed relationship.

mod page;
mod params;

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::body::Bytes;
use axum::http::{Method, Uri};
use serde_json::{Map, Value};

pub use page::PageSpec;
pub use params::{QueryParams, EQUALITY_KEY};

use crate::config::JsonApiConfig;
use crate::error::{Error, ErrorSource, Result};
use crate::repository::{OrderDirection, ResourceRepository, Sort};
use crate::resource::{
    RelationshipDescriptor, Resource, ResourceDefinition, ResourceRegistry,
};

/// Kind of endpoint a route addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// `/{type}`
    Collection,
    /// `/{type}/{id}`
    Resource,
    /// `/{type}/{id}/{relationship}`
    Related,
    /// `/{type}/{id}/relationships/{relationship}`
    Relationships,
}

/// Route parameters of a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    /// Addressed endpoint kind
    pub endpoint: Endpoint,
    /// Resource type segment
    pub resource_type: String,
    /// Id segment
    pub id: Option<String>,
    /// Relationship segment
    pub relationship: Option<String>,
}

impl Target {
    /// `/{type}`
    pub fn collection(resource_type: impl Into<String>) -> Self {
        Self {
            endpoint: Endpoint::Collection,
            resource_type: resource_type.into(),
            id: None,
            relationship: None,
        }
    }

    /// `/{type}/{id}`
    pub fn resource(resource_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            endpoint: Endpoint::Resource,
            resource_type: resource_type.into(),
            id: Some(id.into()),
            relationship: None,
        }
    }

    /// `/{type}/{id}/{relationship}`
    pub fn related(
        resource_type: impl Into<String>,
        id: impl Into<String>,
        relationship: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: Endpoint::Related,
            resource_type: resource_type.into(),
            id: Some(id.into()),
            relationship: Some(relationship.into()),
        }
    }

    /// `/{type}/{id}/relationships/{relationship}`
    pub fn relationships(
        resource_type: impl Into<String>,
        id: impl Into<String>,
        relationship: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: Endpoint::Relationships,
            resource_type: resource_type.into(),
            id: Some(id.into()),
            relationship: Some(relationship.into()),
        }
    }
}

/// One JSON:API request
#[derive(Debug, Clone)]
pub struct JsonApiRequest {
    method: Method,
    target: Target,
    path: String,
    raw_query: Option<String>,
    params: QueryParams,
    body: Option<Value>,
    default_page_size: u64,
    max_page_size: Option<u64>,
}

impl JsonApiRequest {
    /// Build a request from its HTTP parts
    ///
    /// Fails with a bad request when the query string or the body cannot be
    /// decoded. An empty body is treated as absent.
    pub fn new(
        method: Method,
        target: Target,
        uri: &Uri,
        body: &Bytes,
        config: &JsonApiConfig,
    ) -> Result<Self> {
        let params = QueryParams::from_uri(uri)?;

        let body = if body.iter().all(u8::is_ascii_whitespace) {
            None
        } else {
            Some(serde_json::from_slice::<Value>(body).map_err(|e| {
                Error::bad_request_at(
                    format!("Request body is not valid JSON: {}", e),
                    ErrorSource::pointer(""),
                )
            })?)
        };

        Ok(Self {
            method,
            target,
            path: uri.path().to_string(),
            raw_query: uri.query().map(str::to_string),
            params,
            body,
            default_page_size: config.default_page_size,
            max_page_size: config.max_page_size,
        })
    }

    /// HTTP method
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Route parameters
    pub fn target(&self) -> &Target {
        &self.target
    }

    /// Addressed resource type
    pub fn resource_type(&self) -> &str {
        &self.target.resource_type
    }

    /// Addressed id
    pub fn id(&self) -> Option<&str> {
        self.target.id.as_deref()
    }

    /// Addressed relationship name
    pub fn relationship_name(&self) -> Option<&str> {
        self.target.relationship.as_deref()
    }

    /// Request path
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Decoded query parameters
    pub fn params(&self) -> &QueryParams {
        &self.params
    }

    /// Decoded body, if any
    pub fn body(&self) -> Option<&Value> {
        self.body.as_ref()
    }

    /// `include` paths, deduplicated in request order
    pub fn include(&self) -> Result<Vec<String>> {
        self.list_param("include")
    }

    /// `exclude` paths, deduplicated in request order
    pub fn exclude(&self) -> Result<Vec<String>> {
        self.list_param("exclude")
    }

    /// Sparse fieldsets: `fields[type]=a,b` per type
    pub fn fields(&self) -> Result<BTreeMap<String, Vec<String>>> {
        self.typed_lists("fields")
    }

    /// Requested meta functions: `meta[type]=a,b` per type
    pub fn meta(&self) -> Result<BTreeMap<String, Vec<String>>> {
        self.typed_lists("meta")
    }

    /// The `filter` parameter
    ///
    /// A string that decodes as a JSON object or array is used decoded; any
    /// other string is a free-text search term.
    pub fn filter(&self) -> Option<Value> {
        match self.params.get("filter")? {
            Value::String(raw) => match serde_json::from_str::<Value>(raw) {
                Ok(decoded @ (Value::Object(_) | Value::Array(_))) => Some(decoded),
                _ => Some(Value::String(raw.clone())),
            },
            other => Some(other.clone()),
        }
    }

    /// Sort keys: `sort=-name,age` → `[(name, desc), (age, asc)]`
    pub fn sort(&self) -> Result<Sort> {
        let Some(raw) = self.params.get("sort") else {
            return Ok(Vec::new());
        };
        let raw = raw.as_str().ok_or_else(|| {
            Error::bad_request_at(
                "sort must be a comma-separated list.",
                ErrorSource::parameter("sort"),
            )
        })?;

        Ok(split_list(raw)
            .map(|key| match key.strip_prefix('-') {
                Some(field) => (field.to_string(), OrderDirection::Descending),
                None => (
                    key.strip_prefix('+').unwrap_or(key).to_string(),
                    OrderDirection::Ascending,
                ),
            })
            .filter(|(field, _)| !field.is_empty())
            .collect())
    }

    /// Requested page, defaulting to the first page of the configured size
    pub fn page(&self) -> Result<PageSpec> {
        PageSpec::parse(
            self.params.get("page"),
            self.default_page_size,
            self.max_page_size,
        )
    }

    /// Index of the first result of the requested page
    pub fn first_result(&self) -> Result<u64> {
        Ok(self.page()?.first_result())
    }

    /// Size of the requested page
    pub fn max_results(&self) -> Result<u64> {
        Ok(self.page()?.max_results())
    }

    /// Primary `data` member of the body
    ///
    /// `null` is returned as is; a missing body or member is a bad request.
    pub fn data(&self) -> Result<&Value> {
        self.body
            .as_ref()
            .and_then(Value::as_object)
            .and_then(|document| document.get("data"))
            .ok_or_else(|| {
                Error::bad_request_at("Not found any validated data", ErrorSource::pointer("/data"))
            })
    }

    /// Primary data of a resource write, checked against the endpoint
    ///
    /// `data` must be an object whose `type` is `expected_type`; when
    /// `expected_id` is given a present `data.id` must equal it. `attributes`
    /// and `relationships`, when present, must be objects.
    pub fn resource_object(&self, expected_type: &str, expected_id: Option<&str>) -> Result<&Map<String, Value>> {
        let data = self.data()?.as_object().ok_or_else(|| {
            Error::bad_request_at(
                "Primary data must be a resource object.",
                ErrorSource::pointer("/data"),
            )
        })?;

        match data.get("type").and_then(Value::as_str) {
            Some(resource_type) if resource_type == expected_type => {}
            Some(resource_type) => {
                return Err(Error::validation_at(
                    format!(
                        "Resource type \"{}\" does not match endpoint type \"{}\".",
                        resource_type, expected_type
                    ),
                    ErrorSource::pointer("/data/type"),
                ))
            }
            None => {
                return Err(Error::validation_at(
                    "Resource object must have a type.",
                    ErrorSource::pointer("/data/type"),
                ))
            }
        }

        if let (Some(expected), Some(id)) = (expected_id, data.get("id")) {
            if id.as_str() != Some(expected) {
                return Err(Error::validation_at(
                    format!("Resource id does not match endpoint id \"{}\".", expected),
                    ErrorSource::pointer("/data/id"),
                ));
            }
        }

        for member in ["attributes", "relationships"] {
            if data.get(member).is_some_and(|value| !value.is_object()) {
                return Err(Error::bad_request_at(
                    format!("{} must be an object.", member),
                    ErrorSource::pointer(format!("/data/{}", member)),
                ));
            }
        }

        Ok(data)
    }

    /// Client-supplied id of a resource object, if any
    pub fn client_id(data: &Map<String, Value>) -> Result<Option<String>> {
        match data.get("id") {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(id)) if !id.is_empty() => Ok(Some(id.clone())),
            Some(_) => Err(Error::validation_at(
                "Resource id must be a non-empty string.",
                ErrorSource::pointer("/data/id"),
            )),
        }
    }

    /// Link to this request's path under `base_url`, query included
    pub fn self_link(&self, base_url: &str) -> String {
        match &self.raw_query {
            Some(query) if !query.is_empty() => format!("{}{}?{}", base_url, self.path, query),
            _ => format!("{}{}", base_url, self.path),
        }
    }

    /// Link to another page of this request, keeping every other parameter
    pub fn page_link(&self, base_url: &str, page: &PageSpec) -> String {
        let mut segments: Vec<String> = self
            .raw_query
            .as_deref()
            .unwrap_or_default()
            .split('&')
            .filter(|segment| !segment.is_empty() && !is_page_segment(segment))
            .map(str::to_string)
            .collect();
        segments.extend(
            page.query_pairs()
                .iter()
                .map(|(key, value)| format!("{}={}", key, value)),
        );
        format!("{}{}?{}", base_url, self.path, segments.join("&"))
    }

    /// Resolve route parameters against the registry
    ///
    /// Unknown resource types, ids and relationships are 404s.
    pub async fn resolve(self, registry: &ResourceRegistry) -> Result<ResolvedRequest> {
        let definition = Arc::clone(registry.class_by_resource_type(self.resource_type())?);
        let repository = registry.repository_by_class(&definition);

        let entity = match self.id() {
            Some(id) => Some(repository.get(id).await?),
            None => None,
        };

        let relationship = match self.relationship_name() {
            Some(name) => Some(
                definition
                    .relationships()
                    .get(name)
                    .cloned()
                    .ok_or_else(|| {
                        Error::not_found(format!(
                            "Relationship \"{}\" is not declared on \"{}\".",
                            name,
                            definition.resource_type()
                        ))
                    })?,
            ),
            None => None,
        };

        Ok(ResolvedRequest {
            request: self,
            definition,
            repository,
            entity,
            relationship,
        })
    }

    fn list_param(&self, key: &str) -> Result<Vec<String>> {
        match self.params.get(key) {
            None => Ok(Vec::new()),
            Some(Value::String(raw)) => {
                let mut items: Vec<String> = Vec::new();
                for item in split_list(raw) {
                    if !items.iter().any(|existing| existing == item) {
                        items.push(item.to_string());
                    }
                }
                Ok(items)
            }
            Some(_) => Err(Error::bad_request_at(
                format!("{} must be a comma-separated list.", key),
                ErrorSource::parameter(key),
            )),
        }
    }

    fn typed_lists(&self, key: &str) -> Result<BTreeMap<String, Vec<String>>> {
        let Some(value) = self.params.get(key) else {
            return Ok(BTreeMap::new());
        };
        let Value::Object(per_type) = value else {
            return Err(Error::bad_request_at(
                format!("{} must be given per resource type as {}[type].", key, key),
                ErrorSource::parameter(key),
            ));
        };

        per_type
            .iter()
            .map(|(resource_type, list)| match list {
                Value::String(raw) => Ok((
                    resource_type.clone(),
                    split_list(raw).map(str::to_string).collect(),
                )),
                _ => Err(Error::bad_request_at(
                    format!("{}[{}] must be a comma-separated list.", key, resource_type),
                    ErrorSource::parameter(format!("{}[{}]", key, resource_type)),
                )),
            })
            .collect()
    }
}

fn split_list(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(',').map(str::trim).filter(|item| !item.is_empty())
}

fn is_page_segment(segment: &str) -> bool {
    let key = segment.split('=').next().unwrap_or_default();
    let key = key.replace("%5B", "[").replace("%5b", "[");
    key.starts_with("page[")
}

/// A request whose route parameters have been looked up
#[derive(Debug)]
pub struct ResolvedRequest {
    /// The request
    pub request: JsonApiRequest,
    /// Class of the addressed resource type
    pub definition: Arc<ResourceDefinition>,
    /// Repository of that class
    pub repository: ResourceRepository,
    /// Entity addressed by the id segment
    pub entity: Option<Box<dyn Resource>>,
    /// Relationship addressed by the relationship segment
    pub relationship: Option<RelationshipDescriptor>,
}

impl ResolvedRequest {
    /// Addressed entity; only absent on collection endpoints
    pub fn entity(&self) -> Result<&dyn Resource> {
        self.entity
            .as_deref()
            .ok_or_else(|| Error::Internal("request addresses no entity".to_string()))
    }

    /// Addressed relationship; only absent outside relationship endpoints
    pub fn relationship(&self) -> Result<&RelationshipDescriptor> {
        self.relationship
            .as_ref()
            .ok_or_else(|| Error::Internal("request addresses no relationship".to_string()))
    }
}
