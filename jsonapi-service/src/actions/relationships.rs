//! Write actions on relationships endpoints

use std::sync::Arc;

use async_trait::async_trait;

use super::{take_entity, Action, ActionContext, Execution, Outcome};
use crate::error::{Error, Result};
use crate::manipulator::ResourceManipulator;
use crate::repository::related_criteria;
use crate::request::ResolvedRequest;
use crate::resource::{Linkage, PropertyValue, RelationshipDescriptor, Resource};
use crate::serializer::{RelationshipTransformer, Transformer};

/// How submitted identifiers combine with the current linkage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Merge {
    Add,
    Replace,
    Subtract,
}

impl Merge {
    fn apply(self, current: Vec<String>, submitted: Vec<String>) -> Vec<String> {
        match self {
            Self::Replace => submitted,
            Self::Add => {
                let mut ids = current;
                for id in submitted {
                    if !ids.contains(&id) {
                        ids.push(id);
                    }
                }
                ids
            }
            Self::Subtract => current
                .into_iter()
                .filter(|id| !submitted.contains(id))
                .collect(),
        }
    }
}

/// Apply submitted to-many linkage and persist it
async fn write_to_many(
    context: &ActionContext<'_>,
    resolved: &mut ResolvedRequest,
    merge: Merge,
) -> Result<(Box<dyn Resource>, RelationshipDescriptor)> {
    let relationship = resolved.relationship()?.clone();
    let manipulator = ResourceManipulator::new(context.registry);

    let submitted = match manipulator
        .resolve_linkage(&relationship, resolved.request.data()?, "/data")
        .await?
    {
        Linkage::Many(ids) => ids,
        Linkage::One(_) => {
            return Err(Error::Internal(format!(
                "relationship \"{}\" resolved to to-one linkage",
                relationship.name()
            )))
        }
    };

    let mut entity = take_entity(resolved)?;
    let current = match relationship.linkage(entity.as_ref()) {
        Some(Linkage::Many(ids)) => ids,
        _ => Vec::new(),
    };
    let ids = merge.apply(current, submitted);

    manipulator.set_property(
        &resolved.definition,
        entity.as_mut(),
        relationship.name(),
        PropertyValue::Linkage(Linkage::Many(ids)),
    )?;
    resolved.repository.persist(entity.as_ref()).await?;
    resolved.repository.flush().await?;

    tracing::info!(
        resource_type = resolved.definition.resource_type(),
        id = resolved.request.id(),
        relationship = relationship.name(),
        ?merge,
        "Relationship updated"
    );

    Ok((entity, relationship))
}

/// Render the members of a to-many relationship after a write
async fn linkage_collection(
    context: &ActionContext<'_>,
    entity: &dyn Resource,
    relationship: &RelationshipDescriptor,
) -> Result<Execution> {
    let target = Arc::clone(context.registry.class_by_resource_type(relationship.target_type())?);
    let entities = context
        .registry
        .repository_by_class(&target)
        .resource_query_builder()
        .filter(related_criteria(entity, relationship))
        .fetch()
        .await?;
    Ok(Execution::new(
        target,
        Outcome::Collection {
            entities,
            page: None,
        },
    ))
}

/// `PATCH /{type}/{id}/relationships/{relationship}` on a to-one relationship
///
/// `data` is a resource identifier or `null`; the response carries the new
/// linkage.
#[derive(Debug, Clone, Copy, Default)]
pub struct UpdateRelationship;

#[async_trait]
impl Action for UpdateRelationship {
    fn name(&self) -> &'static str {
        "updateRelationship"
    }

    fn transformer(&self) -> &'static dyn Transformer {
        &RelationshipTransformer
    }

    async fn execute(
        &self,
        context: &ActionContext<'_>,
        resolved: &mut ResolvedRequest,
    ) -> Result<Execution> {
        let relationship = resolved.relationship()?.clone();
        let manipulator = ResourceManipulator::new(context.registry);
        let linkage = manipulator
            .resolve_linkage(&relationship, resolved.request.data()?, "/data")
            .await?;

        let mut entity = take_entity(resolved)?;
        manipulator.set_property(
            &resolved.definition,
            entity.as_mut(),
            relationship.name(),
            PropertyValue::Linkage(linkage.clone()),
        )?;
        resolved.repository.persist(entity.as_ref()).await?;
        resolved.repository.flush().await?;

        tracing::info!(
            resource_type = resolved.definition.resource_type(),
            id = resolved.request.id(),
            relationship = relationship.name(),
            "Relationship replaced"
        );

        let target = Arc::clone(context.registry.class_by_resource_type(relationship.target_type())?);
        let outcome = match linkage {
            Linkage::One(Some(id)) => {
                Outcome::Item(context.registry.repository_by_class(&target).get(&id).await?)
            }
            _ => Outcome::Null,
        };
        Ok(Execution::new(target, outcome))
    }
}

/// `POST /{type}/{id}/relationships/{relationship}`: add members
#[derive(Debug, Clone, Copy, Default)]
pub struct CreateRelationships;

#[async_trait]
impl Action for CreateRelationships {
    fn name(&self) -> &'static str {
        "createRelationships"
    }

    fn transformer(&self) -> &'static dyn Transformer {
        &RelationshipTransformer
    }

    async fn execute(
        &self,
        context: &ActionContext<'_>,
        resolved: &mut ResolvedRequest,
    ) -> Result<Execution> {
        let (entity, relationship) = write_to_many(context, resolved, Merge::Add).await?;
        linkage_collection(context, entity.as_ref(), &relationship).await
    }
}

/// `PATCH /{type}/{id}/relationships/{relationship}` on a to-many
/// relationship: replace all members
#[derive(Debug, Clone, Copy, Default)]
pub struct UpdateRelationships;

#[async_trait]
impl Action for UpdateRelationships {
    fn name(&self) -> &'static str {
        "updateRelationships"
    }

    fn transformer(&self) -> &'static dyn Transformer {
        &RelationshipTransformer
    }

    async fn execute(
        &self,
        context: &ActionContext<'_>,
        resolved: &mut ResolvedRequest,
    ) -> Result<Execution> {
        let (entity, relationship) = write_to_many(context, resolved, Merge::Replace).await?;
        linkage_collection(context, entity.as_ref(), &relationship).await
    }
}

/// `DELETE /{type}/{id}/relationships/{relationship}`: remove members
///
/// Responds with no content once the members are removed.
#[derive(Debug, Clone, Copy, Default)]
pub struct RemoveRelationships;

#[async_trait]
impl Action for RemoveRelationships {
    fn name(&self) -> &'static str {
        "removeRelationships"
    }

    fn transformer(&self) -> &'static dyn Transformer {
        &RelationshipTransformer
    }

    async fn execute(
        &self,
        context: &ActionContext<'_>,
        resolved: &mut ResolvedRequest,
    ) -> Result<Execution> {
        write_to_many(context, resolved, Merge::Subtract).await?;
        Ok(Execution::new(
            Arc::clone(&resolved.definition),
            Outcome::NoContent,
        ))
    }
}
