//! Capability descriptors advertised to adapters.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Static description of a registered capability
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityDescriptor {
    /// Capability code
    pub code: String,
    /// Human description
    pub description: String,
    /// JSON schema of the request
    pub input_schema: Value,
    /// Codes of the modifiers policies may attach
    pub modifiers: Vec<String>,
}

impl CapabilityDescriptor {
    /// Create a descriptor
    #[must_use]
    pub fn new(code: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            description: description.into(),
            input_schema: serde_json::json!({ "type": "object" }),
            modifiers: Vec::new(),
        }
    }

    /// Set the input schema
    #[must_use]
    pub fn with_input_schema(mut self, schema: Value) -> Self {
        self.input_schema = schema;
        self
    }

    /// Add a modifier code
    #[must_use]
    pub fn with_modifier(mut self, code: impl Into<String>) -> Self {
        self.modifiers.push(code.into());
        self
    }

    /// Whether policies may attach the named modifier
    #[must_use]
    pub fn accepts_modifier(&self, code: &str) -> bool {
        self.modifiers.iter().any(|m| m == code)
    }
}
