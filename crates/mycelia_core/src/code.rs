//! Capability codes.
//!
//! A code is a reverse-DNS name such as `tech.mycelia.documents`: at least two
//! dot-separated labels, each lowercase ASCII alphanumerics or hyphens, never
//! starting or ending with a hyphen.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Error parsing a capability code
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodeError {
    /// Empty code
    #[error("Capability code is empty")]
    Empty,

    /// Fewer than two labels
    #[error("Capability code '{0}' must have at least two dot-separated labels")]
    TooShort(String),

    /// A label breaks the naming convention
    #[error("Invalid label '{label}' in capability code '{code}'")]
    InvalidLabel {
        /// Full code
        code: String,
        /// Offending label
        label: String,
    },
}

/// Globally unique capability identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CapabilityCode(String);

impl CapabilityCode {
    /// Parse and validate a code
    ///
    /// # Errors
    ///
    /// Returns error if the code is not reverse-DNS shaped
    pub fn parse(code: &str) -> Result<Self, CodeError> {
        if code.is_empty() {
            return Err(CodeError::Empty);
        }

        let labels: Vec<&str> = code.split('.').collect();
        if labels.len() < 2 {
            return Err(CodeError::TooShort(code.to_string()));
        }

        for label in labels {
            if !valid_label(label) {
                return Err(CodeError::InvalidLabel {
                    code: code.to_string(),
                    label: label.to_string(),
                });
            }
        }

        Ok(Self(code.to_string()))
    }

    /// Code as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn valid_label(label: &str) -> bool {
    !label.is_empty()
        && !label.starts_with('-')
        && !label.ends_with('-')
        && label
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

impl FromStr for CapabilityCode {
    type Err = CodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for CapabilityCode {
    type Error = CodeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<CapabilityCode> for String {
    fn from(code: CapabilityCode) -> Self {
        code.0
    }
}

impl AsRef<str> for CapabilityCode {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CapabilityCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
