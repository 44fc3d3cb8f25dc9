//! Effect resolution.
//!
//! For each (path, action) pair, the matching policies decide the effect:
//! any deny wins, then any modify, then any allow; no match denies.
//! Declaration order never changes the outcome.

use crate::policy::{Effect, ModifierRef, PolicySet};
use mycelia_core::ActionRecord;
use std::fmt;

/// Why a pair was denied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    /// A matching policy has effect deny
    ExplicitDeny,
    /// No policy matched
    NoMatchingPolicy,
    /// The request declared no (path, action) pair at all
    NoActions,
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExplicitDeny => write!(f, "explicit deny"),
            Self::NoMatchingPolicy => write!(f, "no matching policy"),
            Self::NoActions => write!(f, "no actions declared"),
        }
    }
}

/// Effect resolved for a single pair
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution<'a> {
    /// Denied
    Denied(DenyReason),
    /// Authorized through the listed modifiers, in declaration order
    Modified(Vec<&'a ModifierRef>),
    /// Authorized
    Allowed,
}

impl Resolution<'_> {
    /// Whether the pair may proceed
    #[must_use]
    pub fn is_authorized(&self) -> bool {
        !matches!(self, Self::Denied(_))
    }
}

/// Resolve one (path, action) pair against a policy set
#[must_use]
pub fn resolve_pair<'a, S: AsRef<str>>(
    policies: &'a PolicySet,
    path: &[S],
    action: &str,
) -> Resolution<'a> {
    let mut allowed = false;
    let mut modifiers = Vec::new();

    for policy in policies.matching(path, action) {
        match &policy.effect {
            Effect::Deny => return Resolution::Denied(DenyReason::ExplicitDeny),
            Effect::Modify(modifier) => modifiers.push(modifier),
            Effect::Allow => allowed = true,
        }
    }

    if !modifiers.is_empty() {
        Resolution::Modified(modifiers)
    } else if allowed {
        Resolution::Allowed
    } else {
        Resolution::Denied(DenyReason::NoMatchingPolicy)
    }
}

/// First denied pair of a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Denial {
    /// Denied path (empty for [`DenyReason::NoActions`])
    pub path: Vec<String>,
    /// Denied action (empty for [`DenyReason::NoActions`])
    pub action: String,
    /// Reason
    pub reason: DenyReason,
}

impl fmt::Display for Denial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.reason {
            DenyReason::NoActions => write!(f, "{}", self.reason),
            _ => write!(f, "{} on {}: {}", self.action, self.path.join("/"), self.reason),
        }
    }
}

/// A granted request and the modifiers it must run through
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Authorization {
    modifiers: Vec<ModifierRef>,
    pairs: usize,
}

impl Authorization {
    /// Modifiers in discovery order, without duplicates
    #[must_use]
    pub fn modifiers(&self) -> &[ModifierRef] {
        &self.modifiers
    }

    /// Number of pairs checked
    #[must_use]
    pub fn pairs(&self) -> usize {
        self.pairs
    }

    fn add_modifier(&mut self, modifier: &ModifierRef) {
        if !self.modifiers.contains(modifier) {
            self.modifiers.push(modifier.clone());
        }
    }
}

/// Authorize every pair of every record.
///
/// # Errors
///
/// Returns the first denied pair; a request with no pairs is denied.
pub fn authorize(policies: &PolicySet, records: &[ActionRecord]) -> Result<Authorization, Denial> {
    let mut authorization = Authorization::default();

    for record in records {
        for (path, action) in record.pairs() {
            authorization.pairs += 1;
            match resolve_pair(policies, path, action) {
                Resolution::Denied(reason) => {
                    return Err(Denial {
                        path: path.to_vec(),
                        action: action.to_string(),
                        reason,
                    });
                }
                Resolution::Modified(found) => {
                    for modifier in found {
                        authorization.add_modifier(modifier);
                    }
                }
                Resolution::Allowed => {}
            }
            tracing::trace!(path = %record.display_path(), action, "pair authorized");
        }
    }

    if authorization.pairs == 0 {
        return Err(Denial {
            path: Vec::new(),
            action: String::new(),
            reason: DenyReason::NoActions,
        });
    }

    Ok(authorization)
}
