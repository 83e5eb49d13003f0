//! Authorization gate
//!
//! Every action asks the [`Gate`] whether the acting [`Actor`] may exercise
//! an ability (see [`guess_ability`]) on a subject: the addressed entity, or
//! the resource type when no instance exists yet (`list`, `create`).
//!
//! Policies are evaluated in registration order and the first one that does
//! not abstain decides. [`RootBypass`] is always evaluated first; when every
//! policy abstains the ability is denied.
//!
//! ```rust
//! use jsonapi_service::gate::{Actor, Gate, GateArgument, ResourcePolicy};
//!
//! let gate = Gate::new().policy(ResourcePolicy::new("pages").grant("moderator", ["show"]));
//!
//! let moderator = Actor::new("7").with_role("moderator");
//! assert!(gate.allows(&moderator, "show", &[GateArgument::Class("pages")]));
//! assert!(!gate.allows(&moderator, "remove", &[GateArgument::Class("pages")]));
//! ```

mod ability;
mod policy;

use std::convert::Infallible;
use std::fmt;
use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use ability::guess_ability;
pub use policy::{Decision, Policy, ResourcePolicy, RootBypass, ANY_ABILITY, ROOT_ROLE};

use crate::error::{Error, ErrorSource, Result};
use crate::resource::Resource;

/// Principal on whose behalf a request runs
///
/// An upstream authentication layer inserts it into the request extensions;
/// a request without one runs as the anonymous actor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    /// Subject id, `None` for anonymous requests
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,

    /// Roles
    #[serde(default)]
    pub roles: Vec<String>,
}

impl Actor {
    /// The anonymous actor
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// An identified actor without roles
    pub fn new(sub: impl Into<String>) -> Self {
        Self {
            sub: Some(sub.into()),
            roles: Vec::new(),
        }
    }

    /// Add a role
    #[must_use]
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        let role = role.into();
        if !self.has_role(&role) {
            self.roles.push(role);
        }
        self
    }

    /// Subject id
    pub fn id(&self) -> Option<&str> {
        self.sub.as_deref()
    }

    /// Roles held
    pub fn roles(&self) -> &[String] {
        &self.roles
    }

    /// Check if the actor holds a role
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    /// Check if the actor is anonymous
    pub fn is_anonymous(&self) -> bool {
        self.sub.is_none()
    }
}

impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> std::result::Result<Self, Self::Rejection> {
        Ok(parts.extensions.get::<Actor>().cloned().unwrap_or_default())
    }
}

/// Argument handed to the gate with an ability
#[derive(Debug, Clone, Copy)]
pub enum GateArgument<'a> {
    /// An existing entity
    Entity(&'a dyn Resource),
    /// A resource type, when no instance exists
    Class(&'a str),
    /// Request payload accompanying the ability
    Payload(&'a Value),
}

/// Everything a policy sees while deciding
#[derive(Debug, Clone, Copy)]
pub struct PolicyContext<'a> {
    /// Acting principal
    pub actor: &'a Actor,
    /// Ability being checked
    pub ability: &'a str,
    /// `[subject, ...extra]`
    pub arguments: &'a [GateArgument<'a>],
}

impl<'a> PolicyContext<'a> {
    /// First argument
    pub fn subject(&self) -> Option<&GateArgument<'a>> {
        self.arguments.first()
    }

    /// Resource type of the subject
    pub fn subject_type(&self) -> Option<&str> {
        match self.subject()? {
            GateArgument::Entity(entity) => Some(entity.resource_type()),
            GateArgument::Class(resource_type) => Some(resource_type),
            GateArgument::Payload(_) => None,
        }
    }

    /// Entity subject, if the ability targets an existing instance
    pub fn entity(&self) -> Option<&'a dyn Resource> {
        match self.subject()? {
            GateArgument::Entity(entity) => Some(*entity),
            _ => None,
        }
    }

    /// Payload argument, if any
    pub fn payload(&self) -> Option<&'a Value> {
        self.arguments.iter().find_map(|argument| match argument {
            GateArgument::Payload(value) => Some(*value),
            _ => None,
        })
    }

    /// Whether the subject's `field` holds the actor's id
    pub fn subject_is_owned_by_actor(&self, field: &str) -> bool {
        let (Some(entity), Some(actor)) = (self.entity(), self.actor.id()) else {
            return false;
        };
        match entity.properties().get(field) {
            Some(Value::String(owner)) => owner == actor,
            Some(Value::Number(owner)) => owner.to_string() == actor,
            _ => false,
        }
    }
}

/// Ordered policy set answering ability checks
#[derive(Clone)]
pub struct Gate {
    policies: Vec<Arc<dyn Policy>>,
}

impl Gate {
    /// Gate with only the root bypass; everything else is denied
    pub fn new() -> Self {
        Self {
            policies: vec![Arc::new(RootBypass)],
        }
    }

    /// Add a policy, evaluated after those already added
    #[must_use]
    pub fn policy(mut self, policy: impl Policy + 'static) -> Self {
        self.policies.push(Arc::new(policy));
        self
    }

    /// Evaluate policies, returning the decision and the deciding policy
    pub fn decide(
        &self,
        actor: &Actor,
        ability: &str,
        arguments: &[GateArgument<'_>],
    ) -> (Decision, Option<&str>) {
        let context = PolicyContext {
            actor,
            ability,
            arguments,
        };

        self.policies
            .iter()
            .find_map(|policy| match policy.evaluate(&context) {
                Decision::Abstain => None,
                decision => Some((decision, Some(policy.name()))),
            })
            .unwrap_or((Decision::Deny, None))
    }

    /// Whether `actor` may exercise `ability`
    pub fn allows(&self, actor: &Actor, ability: &str, arguments: &[GateArgument<'_>]) -> bool {
        self.decide(actor, ability, arguments).0 == Decision::Allow
    }

    /// Fail with 403 unless `actor` may exercise `ability`
    pub fn authorize(
        &self,
        actor: &Actor,
        ability: &str,
        arguments: &[GateArgument<'_>],
    ) -> Result<()> {
        let subject = PolicyContext {
            actor,
            ability,
            arguments,
        }
        .subject_type()
        .unwrap_or_default()
        .to_string();

        match self.decide(actor, ability, arguments) {
            (Decision::Allow, policy) => {
                tracing::debug!(
                    ability,
                    resource_type = %subject,
                    actor = actor.id().unwrap_or("anonymous"),
                    policy = policy.unwrap_or_default(),
                    "Ability granted"
                );
                Ok(())
            }
            (_, policy) => {
                tracing::warn!(
                    ability,
                    resource_type = %subject,
                    actor = actor.id().unwrap_or("anonymous"),
                    policy = policy.unwrap_or("default-deny"),
                    "Ability denied"
                );
                Err(Error::forbidden_at(
                    format!("This action is unauthorized: {} on \"{}\".", ability, subject),
                    ErrorSource::pointer("/"),
                ))
            }
        }
    }
}

impl Default for Gate {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Gate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gate")
            .field(
                "policies",
                &self.policies.iter().map(|p| p.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Page;

    fn gate() -> Gate {
        Gate::new().policy(
            ResourcePolicy::new("pages")
                .grant("moderator", ["show", "updateUser"])
                .allow_if("update", |context| context.subject_is_owned_by_actor("user")),
        )
    }

    #[test]
    fn test_default_deny() {
        let gate = gate();
        let actor = Actor::new("5");
        assert_eq!(
            gate.decide(&actor, "show", &[GateArgument::Class("pages")]),
            (Decision::Deny, None)
        );
        assert!(!gate.allows(&actor, "show", &[GateArgument::Class("users")]));
    }

    #[test]
    fn test_root_bypass_is_evaluated_first() {
        let gate = gate().policy(ResourcePolicy::new("users").deny_if("*", |_| true));
        let root = Actor::new("admin").with_role(ROOT_ROLE);
        assert_eq!(
            gate.decide(&root, "remove", &[GateArgument::Class("users")]),
            (Decision::Allow, Some("root-bypass"))
        );
    }

    #[test]
    fn test_owner_rule_uses_entity_subject() {
        let gate = gate();
        let page = Page {
            id: Some("1".into()),
            user: Some("5".into()),
            ..Page::default()
        };

        assert!(gate.allows(&Actor::new("5"), "update", &[GateArgument::Entity(&page)]));
        assert!(!gate.allows(&Actor::new("6"), "update", &[GateArgument::Entity(&page)]));
    }

    #[test]
    fn test_authorize_denial_points_at_document_root() {
        let Err(Error::Forbidden(errors)) =
            gate().authorize(&Actor::anonymous(), "remove", &[GateArgument::Class("pages")])
        else {
            panic!("expected a forbidden error");
        };
        let error = errors.iter().next().unwrap();
        assert_eq!(error.source.as_ref().unwrap().pointer.as_deref(), Some("/"));
    }

    #[tokio::test]
    async fn test_actor_extracted_from_extensions() {
        let mut request = axum::http::Request::new(());
        request
            .extensions_mut()
            .insert(Actor::new("7").with_role("moderator"));
        let (mut parts, _) = request.into_parts();

        let actor = Actor::from_request_parts(&mut parts, &()).await.unwrap();
        assert!(actor.has_role("moderator"));

        let (mut bare, _) = axum::http::Request::new(()).into_parts();
        let anonymous = Actor::from_request_parts(&mut bare, &()).await.unwrap();
        assert!(anonymous.is_anonymous());
    }
}
