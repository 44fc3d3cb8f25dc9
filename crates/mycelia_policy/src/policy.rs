//! Declarative authorization policies.

use crate::pattern::{ActionPattern, PathPattern};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Policy construction error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PolicyError {
    /// `modify` effect with no modifier descriptor
    #[error("Policy for '{resource}' has effect 'modify' but no modifier")]
    MissingModifier {
        /// Resource pattern of the policy
        resource: String,
    },

    /// Modifier descriptor on an allow/deny policy
    #[error("Policy for '{resource}' carries a modifier but its effect is not 'modify'")]
    UnexpectedModifier {
        /// Resource pattern of the policy
        resource: String,
    },
}

/// Reference to a transform registered on the target capability
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModifierRef {
    /// Modifier code within the capability's modifier map
    pub code: String,
    /// Argument validated by the modifier's own schema
    #[serde(default)]
    pub arg: Value,
}

impl ModifierRef {
    /// Create a modifier reference
    #[must_use]
    pub fn new(code: impl Into<String>, arg: Value) -> Self {
        Self {
            code: code.into(),
            arg,
        }
    }
}

/// Outcome a policy assigns to the pairs it matches
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Permit
    Allow,
    /// Forbid, overriding every allow or modify
    Deny,
    /// Permit through the named transform
    Modify(ModifierRef),
}

/// One authorization rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawPolicy", into = "RawPolicy")]
pub struct Policy {
    /// Resource path pattern
    pub resource: PathPattern,
    /// Action pattern
    pub action: ActionPattern,
    /// Effect on matching pairs
    pub effect: Effect,
}

impl Policy {
    /// Allow `action` on `resource`
    #[must_use]
    pub fn allow(resource: PathPattern, action: ActionPattern) -> Self {
        Self {
            resource,
            action,
            effect: Effect::Allow,
        }
    }

    /// Deny `action` on `resource`
    #[must_use]
    pub fn deny(resource: PathPattern, action: ActionPattern) -> Self {
        Self {
            resource,
            action,
            effect: Effect::Deny,
        }
    }

    /// Allow `action` on `resource` through a modifier
    #[must_use]
    pub fn modify(resource: PathPattern, action: ActionPattern, modifier: ModifierRef) -> Self {
        Self {
            resource,
            action,
            effect: Effect::Modify(modifier),
        }
    }

    /// Whether this policy applies to a (path, action) pair
    #[must_use]
    pub fn applies_to<S: AsRef<str>>(&self, path: &[S], action: &str) -> bool {
        self.resource.matches(path) && self.action.matches(action)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum EffectTag {
    #[serde(alias = "Allow")]
    Allow,
    #[serde(alias = "Deny")]
    Deny,
    #[serde(alias = "Modify")]
    Modify,
}

/// Flat wire shape of a policy
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPolicy {
    #[serde(alias = "resourcePattern", alias = "pattern")]
    resource: PathPattern,
    #[serde(alias = "actionPattern")]
    action: ActionPattern,
    effect: EffectTag,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    modifier: Option<ModifierRef>,
}

impl TryFrom<RawPolicy> for Policy {
    type Error = PolicyError;

    fn try_from(raw: RawPolicy) -> Result<Self, Self::Error> {
        let effect = match (raw.effect, raw.modifier) {
            (EffectTag::Modify, Some(modifier)) => Effect::Modify(modifier),
            (EffectTag::Modify, None) => {
                return Err(PolicyError::MissingModifier {
                    resource: raw.resource.to_string(),
                });
            }
            (_, Some(_)) => {
                return Err(PolicyError::UnexpectedModifier {
                    resource: raw.resource.to_string(),
                });
            }
            (EffectTag::Allow, None) => Effect::Allow,
            (EffectTag::Deny, None) => Effect::Deny,
        };

        Ok(Self {
            resource: raw.resource,
            action: raw.action,
            effect,
        })
    }
}

impl From<Policy> for RawPolicy {
    fn from(policy: Policy) -> Self {
        let (effect, modifier) = match policy.effect {
            Effect::Allow => (EffectTag::Allow, None),
            Effect::Deny => (EffectTag::Deny, None),
            Effect::Modify(modifier) => (EffectTag::Modify, Some(modifier)),
        };
        Self {
            resource: policy.resource,
            action: policy.action,
            effect,
            modifier,
        }
    }
}

/// Ordered policies granted to a principal
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PolicySet {
    policies: Vec<Policy>,
}

impl PolicySet {
    /// Create an empty set; it denies everything
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a policy
    #[must_use]
    pub fn with(mut self, policy: Policy) -> Self {
        self.policies.push(policy);
        self
    }

    /// Policies matching a (path, action) pair, in declaration order
    pub fn matching<'a, 'p, S: AsRef<str>>(
        &'a self,
        path: &'p [S],
        action: &'p str,
    ) -> impl Iterator<Item = &'a Policy> + use<'a, 'p, S> {
        self.policies
            .iter()
            .filter(move |policy| policy.applies_to(path, action))
    }

    /// Iterate over all policies
    pub fn iter(&self) -> std::slice::Iter<'_, Policy> {
        self.policies.iter()
    }

    /// Number of policies
    #[must_use]
    pub fn len(&self) -> usize {
        self.policies.len()
    }

    /// Whether the set is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}

impl From<Vec<Policy>> for PolicySet {
    fn from(policies: Vec<Policy>) -> Self {
        Self { policies }
    }
}

impl FromIterator<Policy> for PolicySet {
    fn from_iter<I: IntoIterator<Item = Policy>>(iter: I) -> Self {
        Self {
            policies: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a PolicySet {
    type Item = &'a Policy;
    type IntoIter = std::slice::Iter<'a, Policy>;

    fn into_iter(self) -> Self::IntoIter {
        self.policies.iter()
    }
}
