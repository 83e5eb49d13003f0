//! Policies evaluated by the [`Gate`](super::Gate)

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use super::{Actor, PolicyContext};

/// Role that passes every ability check
pub const ROOT_ROLE: &str = "root";

/// Wildcard ability in a [`ResourcePolicy`] grant
pub const ANY_ABILITY: &str = "*";

/// Outcome of one policy evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Grant the ability; evaluation stops
    Allow,
    /// Refuse the ability; evaluation stops
    Deny,
    /// No opinion; the next policy decides
    Abstain,
}

/// A named authorization rule
pub trait Policy: Send + Sync {
    /// Name recorded in the gate's logs
    fn name(&self) -> &str;

    /// Decide on the ability in `context`
    fn evaluate(&self, context: &PolicyContext<'_>) -> Decision;
}

/// Allows everything to actors holding [`ROOT_ROLE`]
///
/// The gate evaluates it before any other policy.
#[derive(Debug, Clone, Copy, Default)]
pub struct RootBypass;

impl Policy for RootBypass {
    fn name(&self) -> &str {
        "root-bypass"
    }

    fn evaluate(&self, context: &PolicyContext<'_>) -> Decision {
        if context.actor.has_role(ROOT_ROLE) {
            Decision::Allow
        } else {
            Decision::Abstain
        }
    }
}

type Rule = Arc<dyn Fn(&PolicyContext<'_>) -> bool + Send + Sync>;

/// Role grants and predicate rules for one resource type
///
/// ```rust
/// use jsonapi_service::gate::ResourcePolicy;
///
/// let policy = ResourcePolicy::new("pages")
///     .grant("reader", ["list", "show"])
///     .grant("moderator", ["*"])
///     .allow_if("update", |context| context.subject_is_owned_by_actor("user"));
/// ```
#[derive(Clone)]
pub struct ResourcePolicy {
    name: String,
    resource_type: String,
    grants: HashMap<String, HashSet<String>>,
    rules: Vec<(String, Rule)>,
    denials: Vec<(String, Rule)>,
}

impl ResourcePolicy {
    /// Policy for `resource_type`; abstains on every other type
    pub fn new(resource_type: impl Into<String>) -> Self {
        let resource_type = resource_type.into();
        Self {
            name: format!("{}-policy", resource_type),
            resource_type,
            grants: HashMap::new(),
            rules: Vec::new(),
            denials: Vec::new(),
        }
    }

    /// Grant abilities to a role (`*` grants all)
    pub fn grant<I, S>(mut self, role: impl Into<String>, abilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.grants
            .entry(role.into())
            .or_default()
            .extend(abilities.into_iter().map(Into::into));
        self
    }

    /// Allow an ability whenever `rule` holds
    pub fn allow_if<F>(mut self, ability: impl Into<String>, rule: F) -> Self
    where
        F: Fn(&PolicyContext<'_>) -> bool + Send + Sync + 'static,
    {
        self.rules.push((ability.into(), Arc::new(rule)));
        self
    }

    /// Deny an ability whenever `rule` holds, regardless of grants
    pub fn deny_if<F>(mut self, ability: impl Into<String>, rule: F) -> Self
    where
        F: Fn(&PolicyContext<'_>) -> bool + Send + Sync + 'static,
    {
        self.denials.push((ability.into(), Arc::new(rule)));
        self
    }

    fn granted(&self, actor: &Actor, ability: &str) -> bool {
        actor.roles().iter().any(|role| {
            self.grants.get(role).is_some_and(|abilities| {
                abilities.contains(ability) || abilities.contains(ANY_ABILITY)
            })
        })
    }
}

fn applies(rule_ability: &str, ability: &str) -> bool {
    rule_ability == ability || rule_ability == ANY_ABILITY
}

impl Policy for ResourcePolicy {
    fn name(&self) -> &str {
        &self.name
    }

    fn evaluate(&self, context: &PolicyContext<'_>) -> Decision {
        if context.subject_type() != Some(self.resource_type.as_str()) {
            return Decision::Abstain;
        }

        if self
            .denials
            .iter()
            .any(|(ability, rule)| applies(ability, context.ability) && rule(context))
        {
            return Decision::Deny;
        }

        if self.granted(context.actor, context.ability)
            || self
                .rules
                .iter()
                .any(|(ability, rule)| applies(ability, context.ability) && rule(context))
        {
            return Decision::Allow;
        }

        Decision::Abstain
    }
}

impl fmt::Debug for ResourcePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourcePolicy")
            .field("resource_type", &self.resource_type)
            .field("grants", &self.grants)
            .field("rules", &self.rules.len())
            .field("denials", &self.denials.len())
            .finish()
    }
}
