//! Application state management

use std::fmt;
use std::sync::Arc;

use crate::{
    actions::ActionContext,
    config::Config,
    error::{Error, Result},
    gate::{Actor, Gate},
    repository::EntityManager,
    resource::ResourceRegistry,
};

/// Application state shared across handlers
///
/// Cloning is cheap; every member is reference counted.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    registry: Arc<ResourceRegistry>,
    gate: Arc<Gate>,
}

impl AppState {
    /// Create a state from its parts
    pub fn new(config: Config, registry: ResourceRegistry, gate: Gate) -> Self {
        Self {
            config: Arc::new(config),
            registry: Arc::new(registry),
            gate: Arc::new(gate),
        }
    }

    /// Create a builder for configuring AppState
    pub fn builder() -> AppStateBuilder {
        AppStateBuilder::new()
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Registered resource classes
    pub fn registry(&self) -> &ResourceRegistry {
        &self.registry
    }

    /// Persistence backend behind the registry
    pub fn entity_manager(&self) -> &Arc<dyn EntityManager> {
        self.registry.entity_manager()
    }

    /// Authorization gate
    pub fn gate(&self) -> &Gate {
        &self.gate
    }

    /// Collaborators for dispatching one request on behalf of `actor`
    pub fn action_context<'a>(&'a self, actor: &'a Actor) -> ActionContext<'a> {
        ActionContext {
            registry: &self.registry,
            gate: &self.gate,
            config: &self.config.jsonapi,
            actor,
        }
    }
}

impl fmt::Debug for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppState")
            .field("service", &self.config.service.name)
            .field("resource_types", &self.registry.resource_types())
            .field("gate", &self.gate)
            .finish()
    }
}

/// Builder for AppState
///
/// A registry is required; the configuration defaults to `Config::default()`
/// and the gate to one that only lets root through.
pub struct AppStateBuilder {
    config: Option<Config>,
    registry: Option<ResourceRegistry>,
    gate: Option<Gate>,
    enable_tracing: bool,
}

impl AppStateBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self {
            config: None,
            registry: None,
            gate: None,
            enable_tracing: true,
        }
    }

    /// Set the configuration
    pub fn config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the resource registry
    pub fn registry(mut self, registry: ResourceRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Set the authorization gate
    pub fn gate(mut self, gate: Gate) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Enable automatic tracing initialization (default: enabled)
    pub fn with_tracing(mut self) -> Self {
        self.enable_tracing = true;
        self
    }

    /// Disable automatic tracing initialization
    ///
    /// Use this when tracing is set up elsewhere, for example through
    /// [`crate::observability::init_tracing`].
    pub fn without_tracing(mut self) -> Self {
        self.enable_tracing = false;
        self
    }

    /// Install a plain formatter once per process
    fn init_tracing() {
        use std::sync::Once;
        static INIT: Once = Once::new();

        INIT.call_once(|| {
            let _ = tracing_subscriber::fmt()
                .with_max_level(tracing::Level::INFO)
                .with_target(false)
                .try_init();
            tracing::debug!("Tracing initialized with default configuration");
        });
    }

    /// Build the AppState
    pub fn build(self) -> Result<AppState> {
        if self.enable_tracing {
            Self::init_tracing();
        }

        let registry = self.registry.ok_or_else(|| {
            Error::Configuration("AppState requires a resource registry".to_string())
        })?;
        let config = self.config.unwrap_or_default();
        let gate = self.gate.unwrap_or_default();

        tracing::debug!(
            service = %config.service.name,
            resource_types = ?registry.resource_types(),
            "Application state built"
        );

        Ok(AppState::new(config, registry, gate))
    }
}

impl Default for AppStateBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    #[test]
    fn test_state_builder() {
        let state = AppStateBuilder::new()
            .registry(testing::seeded_registry())
            .gate(testing::gate())
            .without_tracing()
            .build()
            .unwrap();

        assert_eq!(state.config().jsonapi.default_page_size, 1000);
        assert!(state.registry().class_by_resource_type("users").is_ok());

        let actor = testing::root();
        let context = state.action_context(&actor);
        assert_eq!(context.actor, &actor);
    }

    #[test]
    fn test_registry_is_required() {
        let result = AppState::builder().without_tracing().build();
        assert!(matches!(result, Err(Error::Configuration(_))));
    }
}
