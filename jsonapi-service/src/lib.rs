//! # jsonapi-service
//!
//! JSON:API compliance layer over axum: resource registration, request
//! parsing, relationship dispatch, authorization and document serialization.
//!
//! ## Features
//!
//! - **Resource registry**: typed schemas with attributes, relationships
//!   (to-one, to-many, inverse), meta functions and id strategies
//! - **Query parameters**: `include`, `exclude`, `fields[type]`, `meta[type]`,
//!   `filter`, `sort` and `page[...]`
//! - **Relationship endpoints**: related resources and linkage reads and writes
//! - **Authorization**: abilities guessed from the request, checked by a
//!   policy gate
//! - **Errors**: accumulated `errors[]` documents with JSON pointers
//!
//! ## Example
//!
//! ```rust,no_run
//! use jsonapi_service::prelude::*;
//! use std::sync::Arc;
//!
//! #[derive(Debug, Clone, Default, serde::Serialize)]
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
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = Config::load()?;
//!     init_tracing(&config)?;
//!
//!     let registry = ResourceRegistry::builder()
//!         .register(ResourceSchema::new(Tag::default).attribute(
//!             "label",
//!             FieldType::String,
//!             |tag: &mut Tag, label: String| tag.label = label,
//!         ))
//!         .build(Arc::new(InMemoryEntityManager::new()))?;
//!
//!     let state = AppState::builder()
//!         .config(config.clone())
//!         .registry(registry)
//!         .gate(Gate::new())
//!         .without_tracing()
//!         .build()?;
//!
//!     Server::new(config).serve(router(state)).await
//! }
//! ```

pub mod actions;
pub mod config;
pub mod error;
pub mod filter;
pub mod gate;
pub mod manipulator;
pub mod observability;
pub mod repository;
pub mod request;
pub mod resource;
pub mod serializer;
pub mod state;

#[cfg(feature = "http")]
pub mod middleware;
#[cfg(feature = "http")]
pub mod routes;
#[cfg(feature = "http")]
pub mod server;

#[cfg(test)]
pub(crate) mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::actions::{dispatch, Action, ActionContext, Stage};
    pub use crate::config::{Config, JsonApiConfig, MiddlewareConfig, ServiceConfig};
    pub use crate::error::{Error, ErrorList, ErrorObject, ErrorSource, Result, JSONAPI_MEDIA_TYPE};
    pub use crate::filter::{chain_for, CriteriaChain, FilterParser};
    pub use crate::gate::{
        guess_ability, Actor, Decision, Gate, GateArgument, Policy, PolicyContext, ResourcePolicy,
        ROOT_ROLE,
    };
    pub use crate::manipulator::ResourceManipulator;
    pub use crate::observability::init_tracing;
    pub use crate::repository::{
        Criteria, EntityManager, InMemoryEntityManager, Predicate, RepositoryError,
        ResourceRepository,
    };
    pub use crate::request::{JsonApiRequest, PageSpec, ResolvedRequest, Target};
    pub use crate::resource::{
        FieldType, IdStrategy, Linkage, Resource, ResourceEntity, ResourceRegistry, ResourceSchema,
    };
    pub use crate::serializer::{
        JsonApiDocument, JsonApiResponse, RelationshipTransformer, ResourceTransformer,
        Serializer, Transformer,
    };
    pub use crate::state::{AppState, AppStateBuilder};

    #[cfg(feature = "http")]
    pub use crate::routes::router;
    #[cfg(feature = "http")]
    pub use crate::server::Server;
}
