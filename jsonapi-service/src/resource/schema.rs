//! Resource schemas
//!
//! A [`ResourceSchema`] is written against the concrete entity type and
//! declares what the JSON:API layer may do with it: its persistent fields,
//! the setter invoked for each writable attribute, its relationships, named
//! meta functions and how ids are assigned. Registration erases the entity
//! type into a [`ResourceDefinition`].

use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;

use super::relationship::{Cardinality, Linkage, RelationshipsCollection};
use super::{pascal_case, Resource, ResourceEntity, IDENTIFIER_FIELD};

/// Declared type of a persistent field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    /// UTF-8 string
    String,
    /// Signed integer
    Integer,
    /// Floating point number
    Float,
    /// Boolean
    Boolean,
    /// RFC 3339 timestamp stored as a string
    DateTime,
    /// Arbitrary JSON value
    Json,
}

/// Metadata of a declared persistent field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMetadata {
    /// Field name as exposed in `attributes`
    pub name: String,
    /// Declared type
    pub field_type: FieldType,
}

/// How ids of new resources are assigned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdStrategy {
    /// The server generates a UUID; a client-supplied id is rejected (403)
    #[default]
    ServerGenerated,
    /// The client must supply the id (422 when missing)
    ClientProvided,
    /// A client-supplied id is used when present, otherwise one is generated
    Either,
}

/// Value handed to a property setter
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    /// Raw attribute value from the request document
    Attribute(Value),
    /// Resolved relationship linkage
    Linkage(Linkage),
}

type AttributeSetter = Arc<dyn Fn(&mut dyn Resource, Value) -> Result<(), String> + Send + Sync>;
type LinkageSetter = Arc<dyn Fn(&mut dyn Resource, Linkage) -> Result<(), String> + Send + Sync>;
type MetaFunction = Arc<dyn Fn(&dyn Resource) -> Value + Send + Sync>;
type Factory = Arc<dyn Fn() -> Box<dyn Resource> + Send + Sync>;

/// Relationship as declared on a schema, before target validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RelationshipDeclaration {
    pub name: String,
    pub target_type: String,
    pub cardinality: Cardinality,
    pub field: Option<String>,
    pub mapped_by: Option<String>,
}

/// Typed schema builder for one entity type
pub struct ResourceSchema<T: ResourceEntity> {
    factory: Arc<dyn Fn() -> T + Send + Sync>,
    class_name: String,
    fields: Vec<FieldMetadata>,
    attribute_setters: HashMap<String, AttributeSetter>,
    linkage_setters: HashMap<String, LinkageSetter>,
    relationships: Vec<RelationshipDeclaration>,
    meta: HashMap<String, MetaFunction>,
    id_strategy: IdStrategy,
    search_field: Option<String>,
    filterable: Vec<String>,
    default_includes: Vec<String>,
}

impl<T: ResourceEntity> ResourceSchema<T> {
    /// Start a schema; `factory` creates blank entities for `POST`
    pub fn new(factory: impl Fn() -> T + Send + Sync + 'static) -> Self {
        let class_name = std::any::type_name::<T>()
            .rsplit("::")
            .next()
            .unwrap_or(T::RESOURCE_TYPE)
            .to_string();

        Self {
            factory: Arc::new(factory),
            class_name,
            fields: Vec::new(),
            attribute_setters: HashMap::new(),
            linkage_setters: HashMap::new(),
            relationships: Vec::new(),
            meta: HashMap::new(),
            id_strategy: IdStrategy::default(),
            search_field: None,
            filterable: Vec::new(),
            default_includes: Vec::new(),
        }
    }

    /// Override the class name used in setter names (`User::setEmail`)
    pub fn class_name(mut self, name: impl Into<String>) -> Self {
        self.class_name = name.into();
        self
    }

    /// Declare a persistent field without a setter
    pub fn field(mut self, name: impl Into<String>, field_type: FieldType) -> Self {
        let name = name.into();
        self.fields.retain(|f| f.name != name);
        self.fields.push(FieldMetadata { name, field_type });
        self
    }

    /// Declare a writable field whose setter receives the deserialized value
    pub fn attribute<V, F>(self, name: impl Into<String>, field_type: FieldType, setter: F) -> Self
    where
        V: DeserializeOwned,
        F: Fn(&mut T, V) + Send + Sync + 'static,
    {
        let name = name.into();
        self.field(name.clone(), field_type)
            .setter(name, move |entity: &mut T, value: Value| {
                let value = serde_json::from_value::<V>(value).map_err(|e| e.to_string())?;
                setter(entity, value);
                Ok(())
            })
    }

    /// Register a raw setter for a field
    ///
    /// The setter receives the attribute value as sent and may reject it.
    pub fn setter<F>(mut self, name: impl Into<String>, setter: F) -> Self
    where
        F: Fn(&mut T, Value) -> Result<(), String> + Send + Sync + 'static,
    {
        let erased: AttributeSetter = Arc::new(move |entity: &mut dyn Resource, value: Value| {
            let entity = entity
                .as_any_mut()
                .downcast_mut::<T>()
                .ok_or_else(|| format!("entity is not a \"{}\" resource", T::RESOURCE_TYPE))?;
            setter(entity, value)
        });
        self.attribute_setters.insert(name.into(), erased);
        self
    }

    /// Declare a to-one relationship backed by an id field
    pub fn to_one<F>(mut self, name: impl Into<String>, target_type: impl Into<String>, setter: F) -> Self
    where
        F: Fn(&mut T, Option<String>) + Send + Sync + 'static,
    {
        let name = name.into();
        self.relationships.push(RelationshipDeclaration {
            name: name.clone(),
            target_type: target_type.into(),
            cardinality: Cardinality::ToOne,
            field: Some(name.clone()),
            mapped_by: None,
        });
        self.linkage_setters.insert(
            name,
            Self::erase_linkage_setter(move |entity: &mut T, linkage: Linkage| match linkage {
                Linkage::One(id) => {
                    setter(entity, id);
                    Ok(())
                }
                Linkage::Many(_) => Err("expected a single resource identifier".to_string()),
            }),
        );
        self
    }

    /// Declare a to-many relationship backed by an id-list field
    pub fn to_many<F>(mut self, name: impl Into<String>, target_type: impl Into<String>, setter: F) -> Self
    where
        F: Fn(&mut T, Vec<String>) + Send + Sync + 'static,
    {
        let name = name.into();
        self.relationships.push(RelationshipDeclaration {
            name: name.clone(),
            target_type: target_type.into(),
            cardinality: Cardinality::ToMany,
            field: Some(name.clone()),
            mapped_by: None,
        });
        self.linkage_setters.insert(
            name,
            Self::erase_linkage_setter(move |entity: &mut T, linkage: Linkage| match linkage {
                Linkage::Many(ids) => {
                    setter(entity, ids);
                    Ok(())
                }
                Linkage::One(_) => Err("expected an array of resource identifiers".to_string()),
            }),
        );
        self
    }

    /// Declare a read-only inverse to-many relationship
    ///
    /// Related resources are those of `target_type` whose `mapped_by` field
    /// holds this resource's id.
    pub fn inverse_to_many(
        mut self,
        name: impl Into<String>,
        target_type: impl Into<String>,
        mapped_by: impl Into<String>,
    ) -> Self {
        self.relationships.push(RelationshipDeclaration {
            name: name.into(),
            target_type: target_type.into(),
            cardinality: Cardinality::ToMany,
            field: None,
            mapped_by: Some(mapped_by.into()),
        });
        self
    }

    /// Register a named meta function, selected with `meta[type]=name`
    pub fn meta<F>(mut self, name: impl Into<String>, function: F) -> Self
    where
        F: Fn(&T) -> Value + Send + Sync + 'static,
    {
        let erased: MetaFunction = Arc::new(move |entity: &dyn Resource| {
            entity
                .as_any()
                .downcast_ref::<T>()
                .map(&function)
                .unwrap_or(Value::Null)
        });
        self.meta.insert(name.into(), erased);
        self
    }

    /// Set the id assignment strategy
    pub fn id_strategy(mut self, strategy: IdStrategy) -> Self {
        self.id_strategy = strategy;
        self
    }

    /// Field matched by the free-text `filter=term` search
    pub fn search(mut self, field: impl Into<String>) -> Self {
        self.search_field = Some(field.into());
        self
    }

    /// Fields accepted as `filter[field]` keys
    pub fn filterable<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.filterable.extend(fields.into_iter().map(Into::into));
        self
    }

    /// Include paths rendered when the request names none
    pub fn default_includes<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.default_includes.extend(paths.into_iter().map(Into::into));
        self
    }

    fn erase_linkage_setter<F>(setter: F) -> LinkageSetter
    where
        F: Fn(&mut T, Linkage) -> Result<(), String> + Send + Sync + 'static,
    {
        Arc::new(move |entity: &mut dyn Resource, linkage: Linkage| {
            let entity = entity
                .as_any_mut()
                .downcast_mut::<T>()
                .ok_or_else(|| format!("entity is not a \"{}\" resource", T::RESOURCE_TYPE))?;
            setter(entity, linkage)
        })
    }

    /// Erase the entity type
    pub(crate) fn into_declaration(self) -> ResourceDeclaration {
        let factory = self.factory;
        ResourceDeclaration {
            resource_type: T::RESOURCE_TYPE.to_string(),
            class_name: self.class_name,
            type_id: TypeId::of::<T>(),
            fields: self.fields,
            attribute_setters: self.attribute_setters,
            linkage_setters: self.linkage_setters,
            relationships: self.relationships,
            meta: self.meta,
            factory: Arc::new(move || Box::new(factory()) as Box<dyn Resource>),
            id_strategy: self.id_strategy,
            search_field: self.search_field,
            filterable: self.filterable,
            default_includes: self.default_includes,
        }
    }
}

/// Type-erased schema awaiting registry validation
pub(crate) struct ResourceDeclaration {
    pub resource_type: String,
    pub class_name: String,
    pub type_id: TypeId,
    pub fields: Vec<FieldMetadata>,
    pub attribute_setters: HashMap<String, AttributeSetter>,
    pub linkage_setters: HashMap<String, LinkageSetter>,
    pub relationships: Vec<RelationshipDeclaration>,
    pub meta: HashMap<String, MetaFunction>,
    pub factory: Factory,
    pub id_strategy: IdStrategy,
    pub search_field: Option<String>,
    pub filterable: Vec<String>,
    pub default_includes: Vec<String>,
}

impl ResourceDeclaration {
    pub fn has_field(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f.name == name)
    }

    pub fn into_definition(self, relationships: RelationshipsCollection) -> ResourceDefinition {
        ResourceDefinition {
            resource_type: self.resource_type,
            class_name: self.class_name,
            type_id: self.type_id,
            fields: self.fields,
            attribute_setters: self.attribute_setters,
            linkage_setters: self.linkage_setters,
            relationships: Arc::new(relationships),
            meta: self.meta,
            factory: self.factory,
            id_strategy: self.id_strategy,
            search_field: self.search_field,
            filterable: self.filterable,
            default_includes: self.default_includes,
        }
    }
}

/// Registered, validated resource class
pub struct ResourceDefinition {
    resource_type: String,
    class_name: String,
    type_id: TypeId,
    fields: Vec<FieldMetadata>,
    attribute_setters: HashMap<String, AttributeSetter>,
    linkage_setters: HashMap<String, LinkageSetter>,
    relationships: Arc<RelationshipsCollection>,
    meta: HashMap<String, MetaFunction>,
    factory: Factory,
    id_strategy: IdStrategy,
    search_field: Option<String>,
    filterable: Vec<String>,
    default_includes: Vec<String>,
}

impl ResourceDefinition {
    /// JSON:API resource type
    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    /// Short class name of the entity type
    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    /// `TypeId` of the entity type
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Declared persistent fields, in declaration order
    pub fn metadata(&self) -> &[FieldMetadata] {
        &self.fields
    }

    /// Whether `name` is a declared persistent field
    pub fn has_field(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f.name == name)
    }

    /// Whether `name` may be used for sorting
    pub fn is_sortable(&self, name: &str) -> bool {
        name == IDENTIFIER_FIELD || self.has_field(name)
    }

    /// Relationship descriptors, computed once at registration
    pub fn relationships(&self) -> &RelationshipsCollection {
        &self.relationships
    }

    /// Id assignment strategy
    pub fn id_strategy(&self) -> IdStrategy {
        self.id_strategy
    }

    /// Field used by free-text search
    pub fn search_field(&self) -> Option<&str> {
        self.search_field.as_deref()
    }

    /// Fields accepted as `filter[field]` keys
    pub fn filterable(&self) -> &[String] {
        &self.filterable
    }

    /// Include paths rendered by default
    pub fn default_includes(&self) -> &[String] {
        &self.default_includes
    }

    /// Names of the registered meta functions
    pub fn meta_names(&self) -> impl Iterator<Item = &str> {
        self.meta.keys().map(String::as_str)
    }

    /// Evaluate a named meta function
    pub fn meta_value(&self, name: &str, entity: &dyn Resource) -> Option<Value> {
        self.meta.get(name).map(|function| function(entity))
    }

    /// Create a blank entity
    pub fn instantiate(&self) -> Box<dyn Resource> {
        (self.factory)()
    }

    /// Name of the setter for `field` (`email` → `User::setEmail`)
    pub fn setter_name(&self, field: &str) -> String {
        format!("{}::set{}", self.class_name, pascal_case(field))
    }

    /// Whether a setter is registered for `field`
    pub fn has_setter(&self, field: &str) -> bool {
        self.attribute_setters.contains_key(field) || self.linkage_setters.contains_key(field)
    }

    /// Invoke the setter registered for `field`
    ///
    /// Returns `None` when no setter exists, `Some(Err)` when the setter
    /// rejected the value.
    pub fn set_property(
        &self,
        entity: &mut dyn Resource,
        field: &str,
        value: PropertyValue,
    ) -> Option<Result<(), String>> {
        match value {
            PropertyValue::Attribute(value) => {
                let setter = self.attribute_setters.get(field)?;
                Some(setter(entity, value))
            }
            PropertyValue::Linkage(linkage) => {
                let setter = self.linkage_setters.get(field)?;
                Some(setter(entity, linkage))
            }
        }
    }

    /// Readable attributes of an entity: declared fields of its serialized state
    pub fn attributes(&self, entity: &dyn Resource) -> serde_json::Map<String, Value> {
        let mut properties = entity.properties();
        self.fields
            .iter()
            .filter_map(|field| {
                properties
                    .remove(&field.name)
                    .map(|value| (field.name.clone(), value))
            })
            .collect()
    }
}

impl fmt::Debug for ResourceDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceDefinition")
            .field("resource_type", &self.resource_type)
            .field("class_name", &self.class_name)
            .field("fields", &self.fields)
            .field("relationships", &self.relationships)
            .field("id_strategy", &self.id_strategy)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;
    use serde_json::json;

    #[derive(Debug, Clone, Default, Serialize)]
    struct Article {
        id: Option<String>,
        title: String,
        views: i64,
        author: Option<String>,
        tags: Vec<String>,
    }

    impl ResourceEntity for Article {
        const RESOURCE_TYPE: &'static str = "articles";

        fn id(&self) -> Option<String> {
            self.id.clone()
        }

        fn set_id(&mut self, id: String) {
            self.id = Some(id);
        }
    }

    fn definition() -> ResourceDefinition {
        let declaration = ResourceSchema::new(Article::default)
            .attribute("title", FieldType::String, |a: &mut Article, v: String| a.title = v)
            .field("views", FieldType::Integer)
            .to_one("author", "people", |a: &mut Article, id| a.author = id)
            .to_many("tags", "tags", |a: &mut Article, ids| a.tags = ids)
            .meta("wordCount", |a: &Article| json!(a.title.split_whitespace().count()))
            .into_declaration();
        declaration.into_definition(RelationshipsCollection::default())
    }

    #[test]
    fn test_class_name_from_type_name() {
        assert_eq!(definition().class_name(), "Article");
        assert_eq!(definition().setter_name("title"), "Article::setTitle");
    }

    #[test]
    fn test_attribute_setter_deserializes() {
        let definition = definition();
        let mut entity = definition.instantiate();

        let outcome = definition.set_property(
            entity.as_mut(),
            "title",
            PropertyValue::Attribute(json!("Hello world")),
        );
        assert_eq!(outcome, Some(Ok(())));
        assert_eq!(
            entity.downcast_ref::<Article>().unwrap().title,
            "Hello world"
        );

        let rejected = definition.set_property(
            entity.as_mut(),
            "title",
            PropertyValue::Attribute(json!(12)),
        );
        assert!(matches!(rejected, Some(Err(_))));
    }

    #[test]
    fn test_read_only_field_has_no_setter() {
        let definition = definition();
        let mut entity = definition.instantiate();
        assert!(definition.has_field("views"));
        assert!(!definition.has_setter("views"));
        assert!(definition
            .set_property(entity.as_mut(), "views", PropertyValue::Attribute(json!(3)))
            .is_none());
    }

    #[test]
    fn test_linkage_setters() {
        let definition = definition();
        let mut entity = definition.instantiate();

        definition
            .set_property(
                entity.as_mut(),
                "author",
                PropertyValue::Linkage(Linkage::One(Some("9".into()))),
            )
            .unwrap()
            .unwrap();
        definition
            .set_property(
                entity.as_mut(),
                "tags",
                PropertyValue::Linkage(Linkage::Many(vec!["a".into(), "b".into()])),
            )
            .unwrap()
            .unwrap();

        let article = entity.downcast_ref::<Article>().unwrap();
        assert_eq!(article.author.as_deref(), Some("9"));
        assert_eq!(article.tags, vec!["a", "b"]);

        let wrong_shape = definition.set_property(
            entity.as_mut(),
            "author",
            PropertyValue::Linkage(Linkage::Many(vec![])),
        );
        assert!(matches!(wrong_shape, Some(Err(_))));
    }

    #[test]
    fn test_attributes_exclude_relationship_fields() {
        let definition = definition();
        let entity = Article {
            id: Some("1".into()),
            title: "A B C".into(),
            views: 4,
            author: Some("9".into()),
            tags: vec![],
        };
        let attributes = definition.attributes(&entity);
        assert_eq!(attributes.len(), 2);
        assert_eq!(attributes["title"], json!("A B C"));
        assert_eq!(attributes["views"], json!(4));
        assert_eq!(definition.meta_value("wordCount", &entity), Some(json!(3)));
        assert_eq!(definition.meta_value("missing", &entity), None);
    }
}
