//! Transformers turning entities into resource objects

use std::collections::{BTreeMap, HashMap};

use serde_json::{json, Map, Value};

use crate::resource::{Linkage, RelationshipDescriptor, Resource, ResourceDefinition};

/// Rendering options of one request
#[derive(Debug, Clone, Default)]
pub struct TransformContext {
    /// Prefix of every link
    pub base_url: String,
    /// Sparse fieldsets per resource type
    pub fields: BTreeMap<String, Vec<String>>,
    /// Requested meta functions per resource type
    pub meta: BTreeMap<String, Vec<String>>,
    /// Linkage found while resolving includes, keyed by owner type, owner id
    /// and relationship; used for relationships without a backing field
    pub resolved: HashMap<(String, String, String), Linkage>,
}

impl TransformContext {
    /// Context with only a link prefix
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// `/{type}/{id}` under the base url
    pub fn resource_link(&self, resource_type: &str, id: &str) -> String {
        format!("{}/{}/{}", self.base_url, resource_type, id)
    }

    fn is_visible(&self, resource_type: &str, name: &str) -> bool {
        self.fields
            .get(resource_type)
            .map_or(true, |allowed| allowed.iter().any(|field| field == name))
    }

    fn linkage(
        &self,
        owner: &dyn Resource,
        owner_id: &str,
        relationship: &RelationshipDescriptor,
    ) -> Option<Linkage> {
        relationship.linkage(owner).or_else(|| {
            self.resolved
                .get(&(
                    owner.resource_type().to_string(),
                    owner_id.to_string(),
                    relationship.name().to_string(),
                ))
                .cloned()
        })
    }
}

/// Renders one entity as a JSON:API object
pub trait Transformer: Send + Sync {
    /// Resource object (or linkage) for `entity`
    fn transform(
        &self,
        definition: &ResourceDefinition,
        entity: &dyn Resource,
        context: &TransformContext,
    ) -> Value;

    /// Whether the output is linkage only; compound members are skipped
    fn is_linkage_only(&self) -> bool {
        false
    }
}

/// Full resource objects: attributes, relationships, links and meta
#[derive(Debug, Clone, Copy, Default)]
pub struct ResourceTransformer;

impl Transformer for ResourceTransformer {
    fn transform(
        &self,
        definition: &ResourceDefinition,
        entity: &dyn Resource,
        context: &TransformContext,
    ) -> Value {
        let resource_type = definition.resource_type();
        let id = entity.resource_id().unwrap_or_default();
        let self_link = context.resource_link(resource_type, &id);

        let attributes: Map<String, Value> = definition
            .attributes(entity)
            .into_iter()
            .filter(|(name, _)| context.is_visible(resource_type, name))
            .collect();

        let relationships: Map<String, Value> = definition
            .relationships()
            .all()
            .iter()
            .filter(|relationship| context.is_visible(resource_type, relationship.name()))
            .map(|relationship| {
                let mut object = Map::new();
                object.insert(
                    "links".to_string(),
                    json!({
                        "self": format!("{}/relationships/{}", self_link, relationship.name()),
                        "related": format!("{}/{}", self_link, relationship.name()),
                    }),
                );
                if let Some(linkage) = context.linkage(entity, &id, relationship) {
                    object.insert(
                        "data".to_string(),
                        linkage_value(relationship.target_type(), &linkage),
                    );
                }
                (relationship.name().to_string(), Value::Object(object))
            })
            .collect();

        let meta: Map<String, Value> = context
            .meta
            .get(resource_type)
            .into_iter()
            .flatten()
            .filter_map(|name| {
                definition
                    .meta_value(name, entity)
                    .map(|value| (name.clone(), value))
            })
            .collect();

        let mut object = Map::new();
        object.insert("id".to_string(), Value::String(id));
        object.insert("type".to_string(), Value::String(resource_type.to_string()));
        if !attributes.is_empty() {
            object.insert("attributes".to_string(), Value::Object(attributes));
        }
        if !relationships.is_empty() {
            object.insert("relationships".to_string(), Value::Object(relationships));
        }
        object.insert("links".to_string(), json!({ "self": self_link }));
        if !meta.is_empty() {
            object.insert("meta".to_string(), Value::Object(meta));
        }
        Value::Object(object)
    }
}

/// Linkage objects `{id, type, links}` without attributes
#[derive(Debug, Clone, Copy, Default)]
pub struct RelationshipTransformer;

impl Transformer for RelationshipTransformer {
    fn transform(
        &self,
        definition: &ResourceDefinition,
        entity: &dyn Resource,
        context: &TransformContext,
    ) -> Value {
        let id = entity.resource_id().unwrap_or_default();
        json!({
            "id": id,
            "type": definition.resource_type(),
            "links": { "self": context.resource_link(definition.resource_type(), &id) },
        })
    }

    fn is_linkage_only(&self) -> bool {
        true
    }
}

/// Resource linkage as it appears under `relationships.{name}.data`
pub fn linkage_value(target_type: &str, linkage: &Linkage) -> Value {
    match linkage {
        Linkage::One(Some(id)) => json!({ "type": target_type, "id": id }),
        Linkage::One(None) => Value::Null,
        Linkage::Many(ids) => Value::Array(
            ids.iter()
                .map(|id| json!({ "type": target_type, "id": id }))
                .collect(),
        ),
    }
}
