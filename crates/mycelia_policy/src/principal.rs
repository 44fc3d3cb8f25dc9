//! Authenticated principals.

use crate::policy::PolicySet;
use serde::{Deserialize, Serialize};

/// An authenticated caller identity and the policies granted to it.
///
/// Produced by token verification and immutable for the lifetime of a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Principal {
    /// Opaque principal identifier
    pub principal: String,
    /// Granted policies
    #[serde(default)]
    pub policies: PolicySet,
}

impl Principal {
    /// Create a principal
    #[must_use]
    pub fn new(principal: impl Into<String>, policies: PolicySet) -> Self {
        Self {
            principal: principal.into(),
            policies,
        }
    }

    /// Principal identifier
    #[must_use]
    pub fn id(&self) -> &str {
        &self.principal
    }

    /// Granted policies
    #[must_use]
    pub fn policies(&self) -> &PolicySet {
        &self.policies
    }
}
