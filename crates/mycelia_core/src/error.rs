//! Error taxonomy for capability invocation.
//!
//! Every call through the gate ends in a value or in exactly one of the
//! [`GateError`] kinds below. Adapters branch on [`ErrorKind`], never on messages.

use std::fmt;

/// Result type for gate operations
pub type GateResult<T> = Result<T, GateError>;

/// Boxed source error carried by [`CapabilityError`]
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Failure raised by a capability's `execute` or by a modifier body.
///
/// The gate forwards these verbatim; it never retries or rewrites them.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct CapabilityError {
    message: String,
    #[source]
    source: Option<BoxError>,
}

impl CapabilityError {
    /// Create an error with a message only
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Create an error wrapping an underlying cause
    #[must_use]
    pub fn with_source(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Error message
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Gate error type
#[derive(Debug, thiserror::Error)]
pub enum GateError {
    /// No capability is registered under the requested code
    #[error("Capability not found: {code}")]
    NotFound {
        /// Requested code
        code: String,
    },

    /// The request did not satisfy the capability's request schema
    #[error("Invalid request for {code}: {reason}")]
    Validation {
        /// Capability code
        code: String,
        /// What was wrong with the payload
        reason: String,
    },

    /// At least one (path, action) pair was denied.
    ///
    /// Deliberately carries no policy or path detail.
    #[error("Permission denied: {code}")]
    PermissionDenied {
        /// Capability code
        code: String,
    },

    /// A policy references a modifier that is unknown or whose argument is malformed
    #[error("Modifier '{modifier}' misconfigured for {code}: {reason}")]
    ModifierConfiguration {
        /// Capability code
        code: String,
        /// Modifier code named by the policy
        modifier: String,
        /// Configuration fault
        reason: String,
    },

    /// Failure inside the capability or one of its modifiers
    #[error(transparent)]
    Capability(#[from] CapabilityError),
}

impl GateError {
    /// Create a permission error for a capability
    #[must_use]
    pub fn denied(code: impl Into<String>) -> Self {
        Self::PermissionDenied { code: code.into() }
    }

    /// Create a validation error for a capability
    #[must_use]
    pub fn invalid(code: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            code: code.into(),
            reason: reason.into(),
        }
    }

    /// Kind of this error
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Validation { .. } => ErrorKind::Validation,
            Self::PermissionDenied { .. } => ErrorKind::PermissionDenied,
            Self::ModifierConfiguration { .. } => ErrorKind::ModifierConfiguration,
            Self::Capability(_) => ErrorKind::Capability,
        }
    }
}

/// Discriminant of [`GateError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Unknown capability code
    NotFound,
    /// Caller-side payload fault
    Validation,
    /// Access denied
    PermissionDenied,
    /// Malformed policy modifier, operator-facing
    ModifierConfiguration,
    /// Failure raised after authorization
    Capability,
}

impl ErrorKind {
    /// Stable snake_case name used on the wire
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Validation => "validation",
            Self::PermissionDenied => "permission_denied",
            Self::ModifierConfiguration => "modifier_configuration",
            Self::Capability => "capability",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
