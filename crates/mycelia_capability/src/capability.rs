//! Capability contract.

use crate::gate::Caller;
use crate::modifier::ModifierSet;
use async_trait::async_trait;
use mycelia_core::{ActionRecord, GateResult};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

/// A named, invocable unit of backend behavior.
///
/// `Request` deserialization is the request schema: any input that does not
/// deserialize is a validation error. `Response` serialization is the response
/// schema. Capabilities are registered once at startup and are never invoked
/// directly; callers go through [`Caller::invoke`], which authorizes first.
#[async_trait]
pub trait Capability: Send + Sync + 'static {
    /// Validated request type
    type Request: DeserializeOwned + Send + 'static;
    /// Response type
    type Response: Serialize + Send + 'static;

    /// Globally unique reverse-DNS code
    fn code(&self) -> &str;

    /// Human description
    fn description(&self) -> &str;

    /// JSON schema advertised to adapters
    fn input_schema(&self) -> Value {
        json!({ "type": "object" })
    }

    /// Semantic checks beyond the request's shape
    ///
    /// # Errors
    ///
    /// Returns the reason the request is invalid
    fn check(&self, _request: &Self::Request) -> Result<(), String> {
        Ok(())
    }

    /// Resource paths and actions this request touches. Must be pure.
    fn extract_actions(&self, request: &Self::Request) -> Vec<ActionRecord>;

    /// Perform the request
    ///
    /// # Errors
    ///
    /// Returns any failure of the underlying operation; the gate forwards it unchanged
    async fn execute(&self, request: Self::Request, caller: &Caller) -> GateResult<Self::Response>;

    /// Transforms that `modify` policies may attach to this capability
    fn modifiers(&self) -> ModifierSet<Self>
    where
        Self: Sized,
    {
        ModifierSet::new()
    }
}
