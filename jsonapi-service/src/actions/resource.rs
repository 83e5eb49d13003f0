//! Actions on the collection and resource endpoints

use std::sync::Arc;

use async_trait::async_trait;

use super::{list, take_entity, Action, ActionContext, Execution, Outcome};
use crate::error::{Error, Result};
use crate::manipulator::ResourceManipulator;
use crate::repository::{Criteria, RepositoryError};
use crate::request::{JsonApiRequest, ResolvedRequest};
use crate::serializer::{ResourceTransformer, Transformer};

/// `GET /{type}/{id}`
#[derive(Debug, Clone, Copy, Default)]
pub struct ShowResource;

#[async_trait]
impl Action for ShowResource {
    fn name(&self) -> &'static str {
        "show"
    }

    fn transformer(&self) -> &'static dyn Transformer {
        &ResourceTransformer
    }

    async fn execute(
        &self,
        _context: &ActionContext<'_>,
        resolved: &mut ResolvedRequest,
    ) -> Result<Execution> {
        let entity = take_entity(resolved)?;
        Ok(Execution::new(
            Arc::clone(&resolved.definition),
            Outcome::Item(entity),
        ))
    }
}

/// `GET /{type}`
#[derive(Debug, Clone, Copy, Default)]
pub struct ListResources;

#[async_trait]
impl Action for ListResources {
    fn name(&self) -> &'static str {
        "list"
    }

    fn transformer(&self) -> &'static dyn Transformer {
        &ResourceTransformer
    }

    async fn execute(
        &self,
        _context: &ActionContext<'_>,
        resolved: &mut ResolvedRequest,
    ) -> Result<Execution> {
        let (entities, page) = list(&resolved.repository, &resolved.request, Criteria::new()).await?;
        Ok(Execution::new(
            Arc::clone(&resolved.definition),
            Outcome::Collection {
                entities,
                page: Some(page),
            },
        ))
    }
}

/// `POST /{type}`
#[derive(Debug, Clone, Copy, Default)]
pub struct CreateResource;

#[async_trait]
impl Action for CreateResource {
    fn name(&self) -> &'static str {
        "create"
    }

    fn transformer(&self) -> &'static dyn Transformer {
        &ResourceTransformer
    }

    async fn execute(
        &self,
        context: &ActionContext<'_>,
        resolved: &mut ResolvedRequest,
    ) -> Result<Execution> {
        let resource_type = resolved.definition.resource_type();
        let data = resolved.request.resource_object(resource_type, None)?;
        let id = JsonApiRequest::client_id(data)?;

        let manipulator = ResourceManipulator::new(context.registry);
        let mut entity = manipulator.create_resource(resource_type, id.clone())?;

        if let Some(id) = &id {
            if resolved.repository.find_by_id(id).await?.is_some() {
                return Err(Error::Repository(RepositoryError::already_exists(
                    resource_type,
                    id.as_str(),
                )));
            }
        }

        manipulator.hydrate_resource(entity.as_mut(), data).await?;
        resolved.repository.persist(entity.as_ref()).await?;
        resolved.repository.flush().await?;

        tracing::info!(
            resource_type,
            id = entity.resource_id().as_deref(),
            "Resource created"
        );
        Ok(Execution::new(
            Arc::clone(&resolved.definition),
            Outcome::Created(entity),
        ))
    }
}

/// `PATCH /{type}/{id}`
#[derive(Debug, Clone, Copy, Default)]
pub struct UpdateResource;

#[async_trait]
impl Action for UpdateResource {
    fn name(&self) -> &'static str {
        "update"
    }

    fn transformer(&self) -> &'static dyn Transformer {
        &ResourceTransformer
    }

    async fn execute(
        &self,
        context: &ActionContext<'_>,
        resolved: &mut ResolvedRequest,
    ) -> Result<Execution> {
        let mut entity = take_entity(resolved)?;
        let resource_type = resolved.definition.resource_type();
        let data = resolved
            .request
            .resource_object(resource_type, resolved.request.id())?;

        ResourceManipulator::new(context.registry)
            .hydrate_resource(entity.as_mut(), data)
            .await?;
        resolved.repository.persist(entity.as_ref()).await?;
        resolved.repository.flush().await?;

        tracing::info!(resource_type, id = resolved.request.id(), "Resource updated");
        Ok(Execution::new(
            Arc::clone(&resolved.definition),
            Outcome::Item(entity),
        ))
    }
}

/// `DELETE /{type}/{id}`
#[derive(Debug, Clone, Copy, Default)]
pub struct RemoveResource;

#[async_trait]
impl Action for RemoveResource {
    fn name(&self) -> &'static str {
        "remove"
    }

    fn transformer(&self) -> &'static dyn Transformer {
        &ResourceTransformer
    }

    async fn execute(
        &self,
        _context: &ActionContext<'_>,
        resolved: &mut ResolvedRequest,
    ) -> Result<Execution> {
        let entity = take_entity(resolved)?;
        resolved.repository.remove(entity.as_ref()).await?;
        resolved.repository.flush().await?;

        tracing::info!(
            resource_type = resolved.definition.resource_type(),
            id = resolved.request.id(),
            "Resource removed"
        );
        Ok(Execution::new(
            Arc::clone(&resolved.definition),
            Outcome::NoContent,
        ))
    }
}
