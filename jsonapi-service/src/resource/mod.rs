//! Resources, schemas, relationships and the resource registry
//!
//! A persisted entity takes part in the JSON:API layer by implementing
//! [`ResourceEntity`] (the capability contract: resource type, id access and
//! a serialized state) and by being registered with a [`ResourceSchema`]
//! that declares its persistent fields, property setters and relationships.
//!
//! # Example
//!
//! ```rust
//! use jsonapi_service::resource::{FieldType, ResourceEntity, ResourceRegistry, ResourceSchema};
//! use jsonapi_service::repository::InMemoryEntityManager;
//! use serde::Serialize;
//! use std::sync::Arc;
//!
//! #[derive(Debug, Clone, Default, Serialize)]
//! struct Tag {
//!     id: Option<String>,
//!     label: String,
//! }
//!
//! impl ResourceEntity for Tag {
//!     const RESOURCE_TYPE: &'static str = "tags";
//!
//!     fn id(&self) -> Option<String> {
//!         self.id.clone()
//!     }
//!
//!     fn set_id(&mut self, id: String) {
//!         self.id = Some(id);
//!     }
//! }
//!
//! let registry = ResourceRegistry::builder()
//!     .register(
//!         ResourceSchema::new(Tag::default)
//!             .attribute("label", FieldType::String, |tag: &mut Tag, label: String| tag.label = label),
//!     )
//!     .build(Arc::new(InMemoryEntityManager::new()))
//!     .unwrap();
//!
//! assert!(registry.class_by_resource_type("tags").is_ok());
//! ```

mod registry;
mod relationship;
mod schema;

use std::any::Any;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use registry::{RegistryBuilder, ResourceRegistry};
pub use relationship::{Cardinality, Linkage, RelationshipDescriptor, RelationshipsCollection};
pub use schema::{
    FieldMetadata, FieldType, IdStrategy, PropertyValue, ResourceDefinition, ResourceSchema,
};

/// Name of the identifier pseudo-field used in criteria and sorting
pub const IDENTIFIER_FIELD: &str = "id";

/// Capability contract of a persisted entity
///
/// The serialized form (`serde::Serialize`) is the entity's readable state:
/// attributes are read from it, and so are relationship backing fields
/// (an id or `null` for to-one, an array of ids for to-many).
pub trait ResourceEntity: Serialize + Clone + fmt::Debug + Send + Sync + 'static {
    /// JSON:API resource type, unique within a registry
    const RESOURCE_TYPE: &'static str;

    /// Identifier, `None` until one is assigned
    fn id(&self) -> Option<String>;

    /// Assign the identifier
    fn set_id(&mut self, id: String);
}

/// Object-safe view of a [`ResourceEntity`]
///
/// Everything downstream of the registry works with `dyn Resource`; the
/// blanket implementation below is the only implementation.
pub trait Resource: Any + Send + Sync + fmt::Debug {
    /// JSON:API resource type
    fn resource_type(&self) -> &'static str;

    /// Identifier, `None` until one is assigned
    fn resource_id(&self) -> Option<String>;

    /// Assign the identifier
    fn assign_id(&mut self, id: String);

    /// Serialized state of the entity
    fn properties(&self) -> Map<String, Value>;

    /// Clone into a new box
    fn clone_resource(&self) -> Box<dyn Resource>;

    /// Upcast for downcasting to the concrete entity
    fn as_any(&self) -> &dyn Any;

    /// Mutable upcast for downcasting to the concrete entity
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: ResourceEntity> Resource for T {
    fn resource_type(&self) -> &'static str {
        T::RESOURCE_TYPE
    }

    fn resource_id(&self) -> Option<String> {
        self.id()
    }

    fn assign_id(&mut self, id: String) {
        self.set_id(id);
    }

    fn properties(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            Ok(_) => Map::new(),
            Err(e) => {
                tracing::warn!(
                    resource_type = T::RESOURCE_TYPE,
                    "Failed to serialize entity state: {}",
                    e
                );
                Map::new()
            }
        }
    }

    fn clone_resource(&self) -> Box<dyn Resource> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl Clone for Box<dyn Resource> {
    fn clone(&self) -> Self {
        self.clone_resource()
    }
}

impl dyn Resource {
    /// Downcast to the concrete entity
    pub fn downcast_ref<T: ResourceEntity>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    /// `{type, id}` pair of this entity, if it has an id
    pub fn identifier(&self) -> Option<ResourceIdentifier> {
        self.resource_id()
            .map(|id| ResourceIdentifier::new(self.resource_type(), id))
    }
}

/// A `{type, id}` pair referencing a resource without its attributes
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceIdentifier {
    /// Resource type
    #[serde(rename = "type")]
    pub resource_type: String,
    /// Resource id
    pub id: String,
}

impl ResourceIdentifier {
    /// Create a new identifier
    pub fn new(resource_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            id: id.into(),
        }
    }

    /// Read an identifier from a linkage payload element
    ///
    /// Numeric ids are accepted and converted to strings. Returns `None` when
    /// the value is not an object with a string `type` and an `id`.
    pub fn from_value(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        let resource_type = object.get("type")?.as_str()?;
        let id = match object.get("id")? {
            Value::String(id) => id.clone(),
            Value::Number(id) => id.to_string(),
            _ => return None,
        };
        Some(Self::new(resource_type, id))
    }
}

impl fmt::Display for ResourceIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.resource_type, self.id)
    }
}

/// Convert a field or relationship name to PascalCase (`created_at` → `CreatedAt`)
pub(crate) fn pascal_case(name: &str) -> String {
    name.split(['_', '-', ' '])
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect()
}
