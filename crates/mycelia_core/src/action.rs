//! Action records declared by capabilities.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// The resource instance a request touches and the verbs it performs on it.
///
/// A request may produce several records; every one of them must authorize.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActionRecord {
    /// Resource path segments
    pub path: Vec<String>,
    /// Action verbs performed against the path
    pub actions: BTreeSet<String>,
}

impl ActionRecord {
    /// Create a record for a path with no actions yet
    #[must_use]
    pub fn at<I, S>(path: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            path: path.into_iter().map(Into::into).collect(),
            actions: BTreeSet::new(),
        }
    }

    /// Add an action verb
    #[must_use]
    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.actions.insert(action.into());
        self
    }

    /// Iterate over every (path, action) pair of this record
    pub fn pairs(&self) -> impl Iterator<Item = (&[String], &str)> {
        self.actions
            .iter()
            .map(move |action| (self.path.as_slice(), action.as_str()))
    }

    /// Path joined with '/' for diagnostics
    #[must_use]
    pub fn display_path(&self) -> String {
        self.path.join("/")
    }
}
