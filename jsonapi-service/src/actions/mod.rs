//! Action dispatch
//!
//! One [`Action`] exists per resource and relationship operation. A request
//! runs through three stages:
//!
//! 1. **Authorize**: the ability is guessed from the method and target and
//!    checked against the [`Gate`]
//! 2. **Execute**: the action reads or mutates entities and yields an
//!    [`Execution`]
//! 3. **Serialize**: the execution is rendered by the [`Serializer`] with the
//!    action's transformer
//!
//! A failure in any stage ends the request with an error document.

mod related;
mod relationships;
mod resource;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use axum::http::Method;
use tracing::Instrument;

pub use related::{ListRelated, ListRelationships, ShowRelated, ShowRelationship};
pub use relationships::{
    CreateRelationships, RemoveRelationships, UpdateRelationship, UpdateRelationships,
};
pub use resource::{CreateResource, ListResources, RemoveResource, ShowResource, UpdateResource};

use crate::config::JsonApiConfig;
use crate::error::{Error, ErrorSource, Result};
use crate::filter::chain_for;
use crate::gate::{guess_ability, Actor, Gate, GateArgument};
use crate::repository::{Criteria, ResourceRepository};
use crate::request::{Endpoint, JsonApiRequest, ResolvedRequest};
use crate::resource::{Resource, ResourceDefinition, ResourceRegistry};
use crate::serializer::{JsonApiResponse, PageInfo, Serializer, Transformer};

/// Stage of a dispatched request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Ability check
    Authorize,
    /// Business logic
    Execute,
    /// Document rendering
    Serialize,
    /// Response produced
    Done,
    /// Request ended with an error
    Failed,
}

impl Stage {
    /// Stage name as logged
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Authorize => "authorize",
            Self::Execute => "execute",
            Self::Serialize => "serialize",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Collaborators available to every action
#[derive(Debug, Clone, Copy)]
pub struct ActionContext<'a> {
    /// Registered resource classes
    pub registry: &'a ResourceRegistry,
    /// Authorization gate
    pub gate: &'a Gate,
    /// Document settings
    pub config: &'a JsonApiConfig,
    /// Acting principal
    pub actor: &'a Actor,
}

/// Result of the execute stage
pub enum Outcome {
    /// One resource
    Item(Box<dyn Resource>),
    /// A newly created resource
    Created(Box<dyn Resource>),
    /// Several resources, optionally paginated
    Collection {
        /// Resources in response order
        entities: Vec<Box<dyn Resource>>,
        /// Page state for `meta.page` and page links
        page: Option<PageInfo>,
    },
    /// `data: null`
    Null,
    /// No body
    NoContent,
}

impl fmt::Debug for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Item(entity) => f.debug_tuple("Item").field(entity).finish(),
            Self::Created(entity) => f.debug_tuple("Created").field(entity).finish(),
            Self::Collection { entities, page } => f
                .debug_struct("Collection")
                .field("len", &entities.len())
                .field("page", page)
                .finish(),
            Self::Null => f.write_str("Null"),
            Self::NoContent => f.write_str("NoContent"),
        }
    }
}

/// Outcome together with the class it is rendered as
#[derive(Debug)]
pub struct Execution {
    /// Class of the resources in the outcome
    pub definition: Arc<ResourceDefinition>,
    /// What to render
    pub outcome: Outcome,
}

impl Execution {
    /// Pair an outcome with its class
    pub fn new(definition: Arc<ResourceDefinition>, outcome: Outcome) -> Self {
        Self {
            definition,
            outcome,
        }
    }
}

/// One JSON:API operation
#[async_trait]
pub trait Action: Send + Sync {
    /// Action name as logged
    fn name(&self) -> &'static str;

    /// Transformer used in the serialize stage
    fn transformer(&self) -> &'static dyn Transformer;

    /// Gate arguments: `[subject, ...extra]`
    ///
    /// The subject is the addressed entity, or the resource type when there
    /// is none; the request's `data`, if any, follows.
    fn gate_arguments<'r>(&self, resolved: &'r ResolvedRequest) -> Vec<GateArgument<'r>> {
        let mut arguments = vec![match resolved.entity.as_deref() {
            Some(entity) => GateArgument::Entity(entity),
            None => GateArgument::Class(resolved.definition.resource_type()),
        }];
        if let Ok(data) = resolved.request.data() {
            arguments.push(GateArgument::Payload(data));
        }
        arguments
    }

    /// Run the operation
    async fn execute(
        &self,
        context: &ActionContext<'_>,
        resolved: &mut ResolvedRequest,
    ) -> Result<Execution>;
}

/// Pick the action for a resolved request
///
/// POST and DELETE on a to-one relationships endpoint are forbidden.
pub fn select_action(resolved: &ResolvedRequest) -> Result<&'static dyn Action> {
    let method = resolved.request.method();
    let endpoint = resolved.request.target().endpoint;
    let to_many = resolved.relationship.as_ref().map(|r| r.is_to_many());

    let action: &'static dyn Action = match (endpoint, method, to_many) {
        (Endpoint::Collection, &Method::GET, _) => &ListResources,
        (Endpoint::Collection, &Method::POST, _) => &CreateResource,
        (Endpoint::Resource, &Method::GET, _) => &ShowResource,
        (Endpoint::Resource, &Method::PATCH, _) => &UpdateResource,
        (Endpoint::Resource, &Method::DELETE, _) => &RemoveResource,
        (Endpoint::Related, &Method::GET, Some(false)) => &ShowRelated,
        (Endpoint::Related, &Method::GET, Some(true)) => &ListRelated,
        (Endpoint::Relationships, &Method::GET, Some(false)) => &ShowRelationship,
        (Endpoint::Relationships, &Method::GET, Some(true)) => &ListRelationships,
        (Endpoint::Relationships, &Method::PATCH, Some(false)) => &UpdateRelationship,
        (Endpoint::Relationships, &Method::PATCH, Some(true)) => &UpdateRelationships,
        (Endpoint::Relationships, &Method::POST, Some(true)) => &CreateRelationships,
        (Endpoint::Relationships, &Method::DELETE, Some(true)) => &RemoveRelationships,
        (Endpoint::Relationships, &Method::POST | &Method::DELETE, Some(false)) => {
            return Err(Error::forbidden_at(
                "A to-one relationship can only be replaced with PATCH.",
                ErrorSource::pointer("/"),
            ))
        }
        _ => {
            return Err(Error::forbidden_at(
                format!("{} is not supported on this endpoint.", method),
                ErrorSource::pointer("/"),
            ))
        }
    };
    Ok(action)
}

/// Run a request through authorize, execute and serialize
pub async fn dispatch(context: &ActionContext<'_>, request: JsonApiRequest) -> Result<JsonApiResponse> {
    let span = tracing::info_span!(
        "jsonapi.dispatch",
        method = %request.method(),
        resource_type = request.resource_type(),
        id = request.id(),
        relationship = request.relationship_name(),
        action = tracing::field::Empty,
        ability = tracing::field::Empty,
        stage = tracing::field::Empty,
    );

    async move {
        let mut stage = Stage::Authorize;
        let result = run(context, request, &mut stage).await;

        match &result {
            Ok(response) => {
                stage = Stage::Done;
                tracing::Span::current().record("stage", stage.as_str());
                tracing::debug!(status = response.status().as_u16(), "Request handled");
            }
            Err(e) => {
                tracing::debug!(
                    failed_stage = stage.as_str(),
                    status = e.status_code().as_u16(),
                    "Request failed"
                );
                tracing::Span::current().record("stage", Stage::Failed.as_str());
            }
        }
        result
    }
    .instrument(span)
    .await
}

async fn run(
    context: &ActionContext<'_>,
    request: JsonApiRequest,
    stage: &mut Stage,
) -> Result<JsonApiResponse> {
    let span = tracing::Span::current();
    span.record("stage", stage.as_str());

    let mut resolved = request.resolve(context.registry).await?;
    let action = select_action(&resolved)?;
    span.record("action", action.name());

    let ability = guess_ability(
        resolved.request.method(),
        resolved.request.id().is_some(),
        resolved.relationship.as_ref(),
    )?;
    span.record("ability", ability.as_str());
    context
        .gate
        .authorize(context.actor, &ability, &action.gate_arguments(&resolved))?;

    *stage = Stage::Execute;
    span.record("stage", stage.as_str());
    let execution = action.execute(context, &mut resolved).await?;

    *stage = Stage::Serialize;
    span.record("stage", stage.as_str());
    let serializer = Serializer::new(context.registry, &resolved.request, context.config);
    let transformer = action.transformer();
    let definition = &execution.definition;

    match execution.outcome {
        Outcome::Item(entity) => serializer.item(definition, entity.as_ref(), transformer).await,
        Outcome::Created(entity) => {
            serializer
                .created(definition, entity.as_ref(), transformer)
                .await
        }
        Outcome::Collection { entities, page } => {
            serializer
                .collection(definition, &entities, transformer, page)
                .await
        }
        Outcome::Null => Ok(serializer.null()),
        Outcome::NoContent => Ok(serializer.no_content()),
    }
}

/// Filtered, sorted and paginated query over a repository
///
/// `base` is ANDed with the criteria built from `filter`. Sort keys must be
/// sortable fields of the class.
pub(crate) async fn list(
    repository: &ResourceRepository,
    request: &JsonApiRequest,
    base: Criteria,
) -> Result<(Vec<Box<dyn Resource>>, PageInfo)> {
    let definition = repository.definition();
    let filter = request.filter();
    let criteria = chain_for(definition, filter.as_ref()).apply(base)?;

    let sort = request.sort()?;
    if let Some((field, _)) = sort.iter().find(|(field, _)| !definition.is_sortable(field)) {
        return Err(Error::bad_request_at(
            format!(
                "Sort field \"{}\" is not supported on \"{}\".",
                field,
                definition.resource_type()
            ),
            ErrorSource::parameter("sort"),
        ));
    }

    let page = request.page()?;
    let (entities, total) = repository
        .resource_query_builder()
        .filter(criteria)
        .sort(sort)
        .paginate(Some(page.pagination()))
        .fetch_page()
        .await?;

    Ok((entities, PageInfo { page, total }))
}

/// Take the addressed entity out of a resolved request
pub(crate) fn take_entity(resolved: &mut ResolvedRequest) -> Result<Box<dyn Resource>> {
    resolved
        .entity
        .take()
        .ok_or_else(|| Error::Internal("request addresses no entity".to_string()))
}
