//! Relationship descriptors

use std::collections::{HashMap, HashSet};

use serde_json::Value;

use super::Resource;
use crate::error::{Error, Result};

/// Cardinality of a relationship
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cardinality {
    /// At most one related resource
    ToOne,
    /// Any number of related resources
    ToMany,
}

/// Related ids held by an entity for one relationship
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Linkage {
    /// To-one linkage; `None` means the relationship is empty
    One(Option<String>),
    /// To-many linkage
    Many(Vec<String>),
}

/// Immutable description of one relationship of a resource class
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationshipDescriptor {
    name: String,
    target_type: String,
    cardinality: Cardinality,
    field: Option<String>,
    mapped_by: Option<String>,
}

impl RelationshipDescriptor {
    /// Describe a to-one relationship
    ///
    /// `field` names the backing property on the owner. Fails when
    /// `target_type` is not among `known_types`.
    pub fn to_one(
        name: impl Into<String>,
        target_type: impl Into<String>,
        field: Option<String>,
        known_types: &HashSet<String>,
    ) -> Result<Self> {
        Self::build(name.into(), target_type.into(), Cardinality::ToOne, field, None, known_types)
    }

    /// Describe a to-many relationship
    ///
    /// With `mapped_by` set, the relationship may be resolved from the
    /// target side when the owner carries no backing property.
    pub fn to_many(
        name: impl Into<String>,
        target_type: impl Into<String>,
        mapped_by: Option<String>,
        field: Option<String>,
        known_types: &HashSet<String>,
    ) -> Result<Self> {
        Self::build(
            name.into(),
            target_type.into(),
            Cardinality::ToMany,
            field,
            mapped_by,
            known_types,
        )
    }

    fn build(
        name: String,
        target_type: String,
        cardinality: Cardinality,
        field: Option<String>,
        mapped_by: Option<String>,
        known_types: &HashSet<String>,
    ) -> Result<Self> {
        if name.is_empty() {
            return Err(Error::Configuration(
                "Relationship name must not be empty".to_string(),
            ));
        }
        if !known_types.contains(&target_type) {
            return Err(Error::Configuration(format!(
                "Relationship \"{}\" targets unregistered resource type \"{}\"",
                name, target_type
            )));
        }

        Ok(Self {
            name,
            target_type,
            cardinality,
            field,
            mapped_by,
        })
    }

    /// Relationship name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Resource type of the related resources
    pub fn target_type(&self) -> &str {
        &self.target_type
    }

    /// Cardinality
    pub fn cardinality(&self) -> Cardinality {
        self.cardinality
    }

    /// Whether this is a to-one relationship
    pub fn is_to_one(&self) -> bool {
        self.cardinality == Cardinality::ToOne
    }

    /// Whether this is a to-many relationship
    pub fn is_to_many(&self) -> bool {
        self.cardinality == Cardinality::ToMany
    }

    /// Backing property on the owning entity, if any
    pub fn field(&self) -> Option<&str> {
        self.field.as_deref()
    }

    /// Property on the target that references the owner
    pub fn mapped_by(&self) -> Option<&str> {
        self.mapped_by.as_deref()
    }

    /// Read the linkage stored on `entity`
    ///
    /// Returns `None` when the owner carries no backing property; the
    /// relationship then has to be resolved from the target side.
    pub fn linkage(&self, entity: &dyn Resource) -> Option<Linkage> {
        let field = self.field.as_deref()?;
        let value = entity.properties().remove(field)?;

        Some(match self.cardinality {
            Cardinality::ToOne => Linkage::One(id_of(&value)),
            Cardinality::ToMany => Linkage::Many(match value {
                Value::Array(items) => items.iter().filter_map(id_of).collect(),
                _ => Vec::new(),
            }),
        })
    }
}

fn id_of(value: &Value) -> Option<String> {
    match value {
        Value::String(id) => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}

/// Ordered, name-indexed set of a class's relationship descriptors
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelationshipsCollection {
    items: Vec<RelationshipDescriptor>,
    index: HashMap<String, usize>,
}

impl RelationshipsCollection {
    /// Build a collection; names must be unique
    pub fn new(items: Vec<RelationshipDescriptor>) -> Result<Self> {
        let mut index = HashMap::with_capacity(items.len());
        for (position, item) in items.iter().enumerate() {
            if index.insert(item.name.clone(), position).is_some() {
                return Err(Error::Configuration(format!(
                    "Relationship \"{}\" is declared more than once",
                    item.name
                )));
            }
        }
        Ok(Self { items, index })
    }

    /// Descriptor by name
    pub fn get(&self, name: &str) -> Option<&RelationshipDescriptor> {
        self.index.get(name).map(|&position| &self.items[position])
    }

    /// Whether a relationship is declared under `name`
    pub fn has(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// All descriptors in declaration order
    pub fn all(&self) -> &[RelationshipDescriptor] {
        &self.items
    }

    /// To-one descriptors in declaration order
    pub fn to_one(&self) -> impl Iterator<Item = &RelationshipDescriptor> {
        self.items.iter().filter(|r| r.is_to_one())
    }

    /// To-many descriptors in declaration order
    pub fn to_many(&self) -> impl Iterator<Item = &RelationshipDescriptor> {
        self.items.iter().filter(|r| r.is_to_many())
    }

    /// Number of relationships
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether no relationship is declared
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
